//! Thin adapter over the REST game service: battle metadata, publishing the
//! puzzle givens, and handing over the final solution for proof submission.

use std::time::Duration;

use async_trait::async_trait;
use battle_proto::{BattleInfo, StartGameRequest, SubmitSolutionRequest};
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid game service url: {0}")]
    InvalidUrl(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("game service returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("battle {0} not found")]
    BattleNotFound(u64),
}

#[async_trait]
pub trait GameService: Send + Sync {
    async fn battle_info(&self, battle_id: u64) -> Result<BattleInfo, ServiceError>;

    /// Publishes the givens; returns the transaction hash.
    async fn start_game(&self, request: &StartGameRequest) -> Result<String, ServiceError>;

    /// Hands the final board over for proof generation and payout; returns
    /// the transaction hash.
    async fn submit_solution(
        &self,
        request: &SubmitSolutionRequest,
    ) -> Result<String, ServiceError>;
}

pub struct HttpGameService {
    client: reqwest::Client,
    base: Url,
}

impl HttpGameService {
    /// `base_url` includes the API prefix, e.g. `https://host/api/v1`.
    pub fn new(base_url: &str) -> Result<Self, ServiceError> {
        let mut base =
            Url::parse(base_url).map_err(|err| ServiceError::InvalidUrl(err.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ServiceError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                base.scheme()
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(8))
            .no_proxy()
            .build()?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        self.base
            .join(path)
            .map_err(|err| ServiceError::InvalidUrl(err.to_string()))
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!(target: "battle::service", %url, "post");
        let response = self.client.post(url).json(body).send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ServiceError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ServiceError::Status { status, body });
    }
    Ok(response.json::<T>().await?)
}

#[async_trait]
impl GameService for HttpGameService {
    async fn battle_info(&self, battle_id: u64) -> Result<BattleInfo, ServiceError> {
        let url = self.endpoint(&format!("games/battle/info/{battle_id}"))?;
        debug!(target: "battle::service", %url, "get");
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ServiceError::BattleNotFound(battle_id));
        }
        decode(response).await
    }

    async fn start_game(&self, request: &StartGameRequest) -> Result<String, ServiceError> {
        self.post("games/start-game", request).await
    }

    async fn submit_solution(
        &self,
        request: &SubmitSolutionRequest,
    ) -> Result<String, ServiceError> {
        self.post("games/battle/submit-solution", request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_keep_api_prefix() {
        let service = HttpGameService::new("https://games.example/api/v1").unwrap();
        assert_eq!(
            service.endpoint("games/start-game").unwrap().as_str(),
            "https://games.example/api/v1/games/start-game"
        );
        assert!(matches!(
            HttpGameService::new("ftp://games.example"),
            Err(ServiceError::InvalidUrl(_))
        ));
    }
}
