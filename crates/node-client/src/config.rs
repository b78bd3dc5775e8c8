use std::fmt;

use time::OffsetDateTime;
use url::Url;

use crate::error::NodeError;

/// Bearer credential issued by the node's admin API.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
    expires_at: Option<OffsetDateTime>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: OffsetDateTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Raw token, for persisting. Use [`AccessToken::bearer`] for requests.
    pub fn secret(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now)
    }

    /// Token value for an `Authorization: Bearer` header. Empty or expired
    /// tokens are refused here so no request leaves with them.
    pub fn bearer(&self) -> Result<&str, NodeError> {
        let token = self.token.trim();
        if token.is_empty() {
            return Err(NodeError::Unauthorized("access token is empty".into()));
        }
        if self.is_expired_at(OffsetDateTime::now_utc()) {
            return Err(NodeError::Unauthorized("access token expired".into()));
        }
        Ok(token)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct NodeConfig {
    base_url: Url,
    access_token: Option<AccessToken>,
}

impl NodeConfig {
    pub fn new(node_url: impl AsRef<str>) -> Result<Self, NodeError> {
        let mut base = node_url.as_ref().trim().to_string();
        if base.is_empty() {
            return Err(NodeError::InvalidConfig("node url cannot be empty".into()));
        }
        if !base.contains("://") {
            base = format!("{}{base}", infer_scheme(&base));
        }
        let mut parsed = Url::parse(&base)
            .map_err(|err| NodeError::InvalidConfig(format!("invalid node url: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(NodeError::InvalidConfig(format!(
                "node url must use http or https, got {}",
                parsed.scheme()
            )));
        }
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }
        Ok(Self {
            base_url: parsed,
            access_token: None,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn with_access_token(mut self, token: Option<AccessToken>) -> Self {
        self.access_token = token;
        self
    }

    pub fn set_access_token(&mut self, token: Option<AccessToken>) {
        self.access_token = token;
    }

    pub fn access_token(&self) -> Option<&AccessToken> {
        self.access_token.as_ref()
    }

    pub fn rpc_endpoint(&self) -> Result<Url, NodeError> {
        self.base_url
            .join("jsonrpc")
            .map_err(|err| NodeError::InvalidConfig(format!("invalid jsonrpc endpoint: {err}")))
    }

    /// `{node}/ws` with the scheme switched to ws/wss.
    pub fn ws_endpoint(&self) -> Result<Url, NodeError> {
        let mut url = self
            .base_url
            .join("ws")
            .map_err(|err| NodeError::InvalidConfig(format!("invalid ws endpoint: {err}")))?;
        let scheme = if self.base_url.scheme() == "https" {
            "wss"
        } else {
            "ws"
        };
        url.set_scheme(scheme)
            .map_err(|_| NodeError::InvalidConfig(format!("cannot switch {url} to {scheme}")))?;
        Ok(url)
    }
}

/// Bare hosts on loopback or private ranges get plain http; anything else
/// is assumed to sit behind TLS.
pub(crate) fn infer_scheme(base: &str) -> &'static str {
    let host_part = base
        .split('/')
        .next()
        .unwrap_or(base)
        .trim_start_matches('[')
        .split(']')
        .next()
        .unwrap_or(base);
    let host = host_part.to_ascii_lowercase();
    let private_172 = host
        .strip_prefix("172.")
        .and_then(|rest| rest.split('.').next())
        .and_then(|octet| octet.parse::<u8>().ok())
        .is_some_and(|octet| (16..32).contains(&octet));
    if host.starts_with("localhost")
        || host.starts_with("0.0.0.0")
        || host.starts_with("127.")
        || host == "::1"
        || host.starts_with("10.")
        || host.starts_with("192.168.")
        || private_172
    {
        "http://"
    } else {
        "https://"
    }
}
