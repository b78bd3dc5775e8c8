use node_client::CallContext;
use serde::{Deserialize, Serialize};

use crate::wallet::WalletType;

/// Identifies the battle a client is playing and the node context backing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleContext {
    pub battle_id: u64,
    pub context_id: String,
    /// Executor key this client uses inside the node context.
    pub context_identity: String,
    /// Wallet principal of the player who created the battle.
    pub creator_identity: String,
}

/// The connected wallet. Its principal is the editor id attached to writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIdentity {
    pub principal: String,
    pub display_name: String,
    pub wallet: WalletType,
}

impl PlayerIdentity {
    pub fn new(principal: impl Into<String>, wallet: WalletType) -> Self {
        let principal = principal.into();
        Self {
            display_name: short_principal(&principal),
            principal,
            wallet,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }
}

/// Everything the sync components need to know about who is playing what.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub battle: BattleContext,
    pub identity: Option<PlayerIdentity>,
}

impl SessionContext {
    pub fn new(battle: BattleContext, identity: Option<PlayerIdentity>) -> Self {
        Self { battle, identity }
    }

    pub fn call_context(&self) -> CallContext {
        CallContext::new(&self.battle.context_id, &self.battle.context_identity)
    }

    pub fn self_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.principal.as_str())
    }

    pub fn is_creator(&self) -> bool {
        self.self_id() == Some(self.battle.creator_identity.as_str())
    }
}

/// `abcde-fghij-...-xyz` style principals are long; keep the first and last group.
fn short_principal(principal: &str) -> String {
    let groups: Vec<&str> = principal.split('-').collect();
    match groups.as_slice() {
        [first, .., last] if groups.len() > 2 => format!("{first}...{last}"),
        _ => principal.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battle() -> BattleContext {
        BattleContext {
            battle_id: 3,
            context_id: "ctx-3".into(),
            context_identity: "exec-key".into(),
            creator_identity: "aaaaa-bbbbb-ccccc".into(),
        }
    }

    #[test]
    fn creator_is_matched_by_principal() {
        let creator = PlayerIdentity::new("aaaaa-bbbbb-ccccc", WalletType::default());
        let guest = PlayerIdentity::new("ddddd-eeeee-fffff", WalletType::default());
        assert!(SessionContext::new(battle(), Some(creator)).is_creator());
        assert!(!SessionContext::new(battle(), Some(guest)).is_creator());
        assert!(!SessionContext::new(battle(), None).is_creator());
    }

    #[test]
    fn call_context_uses_executor_key() {
        let ctx = SessionContext::new(battle(), None).call_context();
        assert_eq!(ctx.context_id, "ctx-3");
        assert_eq!(ctx.executor_public_key, "exec-key");
    }

    #[test]
    fn display_names_shorten_principals() {
        let identity = PlayerIdentity::new("aaaaa-bbbbb-ccccc", WalletType::default());
        assert_eq!(identity.display_name, "aaaaa...ccccc");
        let plain = PlayerIdentity::new("alice", WalletType::default());
        assert_eq!(plain.display_name, "alice");
        assert_eq!(plain.with_display_name("Al").display_name, "Al");
    }
}
