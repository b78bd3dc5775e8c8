//! Client-local persistence of the current battle, the node it lives on and
//! the credentials used to reach it. Joining a new battle supersedes the
//! stored one.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use node_client::AccessToken;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::session::BattleContext;
use crate::wallet::WalletType;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unable to determine home directory")]
    NoHome,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for StoreError {
    fn from(value: toml::de::Error) -> Self {
        StoreError::Toml(value.to_string())
    }
}

impl From<toml::ser::Error> for StoreError {
    fn from(value: toml::ser::Error) -> Self {
        StoreError::Toml(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    #[serde(default)]
    pub node_url: Option<String>,
    #[serde(default)]
    pub access_token: Option<StoredToken>,
    #[serde(default)]
    pub principal: Option<String>,
    #[serde(default)]
    pub wallet: Option<WalletType>,
    #[serde(default)]
    pub battle: Option<BattleContext>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl StoredSession {
    /// Replaces whatever battle was stored before.
    pub fn join_battle(&mut self, battle: BattleContext) {
        if let Some(previous) = &self.battle {
            if previous.battle_id != battle.battle_id {
                info!(
                    target: "battle::store",
                    previous = previous.battle_id,
                    next = battle.battle_id,
                    "superseding stored battle"
                );
            }
        }
        self.battle = Some(battle);
        self.touch();
    }

    pub fn leave_battle(&mut self) -> Option<BattleContext> {
        let previous = self.battle.take();
        self.touch();
        previous
    }

    pub fn access_token(&self) -> Option<AccessToken> {
        self.access_token.as_ref().map(|stored| {
            let token = AccessToken::new(&stored.token);
            match stored.expires_at {
                Some(expiry) => token.with_expiry(expiry),
                None => token,
            }
        })
    }

    pub fn set_access_token(&mut self, token: &AccessToken) {
        self.access_token = Some(StoredToken {
            token: token.secret().to_string(),
            expires_at: token.expires_at(),
        });
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Some(OffsetDateTime::now_utc());
    }
}

pub struct BattleStore {
    path: PathBuf,
}

impl BattleStore {
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let base = BaseDirs::new().ok_or(StoreError::NoHome)?;
        Ok(base.home_dir().join(".sudoku-battle").join("session"))
    }

    pub fn open_default() -> Result<Self, StoreError> {
        Ok(Self::at(Self::default_path()?))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<StoredSession, StoreError> {
        if !self.path.exists() {
            return Ok(StoredSession::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Writes the session readable by the owner only; it holds a bearer token.
    pub fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let serialized = toml::to_string_pretty(session)?;
        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        file.write_all(serialized.as_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = file.metadata()?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&self.path, perms)?;
        }
        debug!(target: "battle::store", path = %self.path.display(), "session saved");
        Ok(())
    }

    /// Removes the stored session. Returns whether anything was there.
    pub fn clear(&self) -> Result<bool, StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn temp_store() -> BattleStore {
        let dir = std::env::temp_dir().join(format!("battle-store-{}", uuid::Uuid::new_v4()));
        BattleStore::at(dir.join("session"))
    }

    fn battle(id: u64) -> BattleContext {
        BattleContext {
            battle_id: id,
            context_id: format!("ctx-{id}"),
            context_identity: "exec".into(),
            creator_identity: "creator".into(),
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let store = temp_store();
        assert_eq!(store.load().unwrap(), StoredSession::default());
        assert!(!store.clear().unwrap());
    }

    #[test]
    fn saves_and_reloads_session() {
        let store = temp_store();
        let mut session = StoredSession {
            node_url: Some("http://localhost:2428".into()),
            principal: Some("aaaaa-bbbbb".into()),
            wallet: Some(WalletType::near(Some("testnet"))),
            ..Default::default()
        };
        let expiry = OffsetDateTime::now_utc().replace_nanosecond(0).unwrap() + Duration::hours(1);
        session.set_access_token(&AccessToken::new("secret").with_expiry(expiry));
        session.join_battle(battle(4));
        store.save(&session).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.battle, Some(battle(4)));
        assert_eq!(loaded.wallet, session.wallet);
        let token = loaded.access_token().unwrap();
        assert_eq!(token.secret(), "secret");
        assert_eq!(token.expires_at(), Some(expiry));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(store.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
        assert!(store.clear().unwrap());
    }

    #[test]
    fn joining_supersedes_previous_battle() {
        let mut session = StoredSession::default();
        session.join_battle(battle(1));
        session.join_battle(battle(2));
        assert_eq!(session.battle.as_ref().map(|b| b.battle_id), Some(2));
        assert_eq!(session.leave_battle().map(|b| b.battle_id), Some(2));
        assert!(session.battle.is_none());
    }
}
