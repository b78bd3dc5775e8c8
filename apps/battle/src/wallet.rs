use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_ICP_CANISTER: &str = "rdmx6-jaaaa-aaaaa-aaadq-cai";
const DEFAULT_ICP_WALLET: &str = "II";
const DEFAULT_STARKNET_WALLET: &str = "MS";
const DEFAULT_NEAR_NETWORK: &str = "mainnet";
const DEFAULT_ETH_CHAIN: u64 = 1;

/// Wallet network a player signed in with, tagged by network kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum WalletType {
    #[serde(rename_all = "camelCase")]
    Eth { chain_id: u64 },
    #[serde(rename_all = "camelCase")]
    Near { network_id: String },
    #[serde(rename_all = "camelCase")]
    Starknet { wallet_name: String },
    #[serde(rename_all = "camelCase")]
    Icp {
        canister_id: String,
        wallet_name: String,
    },
}

impl Default for WalletType {
    fn default() -> Self {
        WalletType::icp(None)
    }
}

impl WalletType {
    pub fn eth(chain_id: Option<u64>) -> Self {
        WalletType::Eth {
            chain_id: chain_id.unwrap_or(DEFAULT_ETH_CHAIN),
        }
    }

    pub fn near(network_id: Option<&str>) -> Self {
        WalletType::Near {
            network_id: network_id.unwrap_or(DEFAULT_NEAR_NETWORK).to_string(),
        }
    }

    pub fn starknet(wallet_name: Option<&str>) -> Self {
        WalletType::Starknet {
            wallet_name: wallet_name.unwrap_or(DEFAULT_STARKNET_WALLET).to_string(),
        }
    }

    pub fn icp(canister_id: Option<&str>) -> Self {
        WalletType::Icp {
            canister_id: canister_id.unwrap_or(DEFAULT_ICP_CANISTER).to_string(),
            wallet_name: DEFAULT_ICP_WALLET.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WalletType::Eth { .. } => "ETH",
            WalletType::Near { .. } => "NEAR",
            WalletType::Starknet { .. } => "STARKNET",
            WalletType::Icp { .. } => "ICP",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WalletParseError {
    #[error("unknown wallet kind '{0}' (expected eth, near, starknet or icp)")]
    UnknownKind(String),
    #[error("invalid eth chain id '{0}'")]
    InvalidChainId(String),
}

impl FromStr for WalletType {
    type Err = WalletParseError;

    /// `kind[:detail]`, e.g. `icp`, `eth:5`, `near:testnet`, `starknet:AX`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (kind, detail) = match text.trim().split_once(':') {
            Some((kind, detail)) => (kind, Some(detail.trim()).filter(|d| !d.is_empty())),
            None => (text.trim(), None),
        };
        match kind.to_ascii_lowercase().as_str() {
            "eth" => {
                let chain_id = detail
                    .map(|raw| {
                        raw.parse::<u64>()
                            .map_err(|_| WalletParseError::InvalidChainId(raw.to_string()))
                    })
                    .transpose()?;
                Ok(WalletType::eth(chain_id))
            }
            "near" => Ok(WalletType::near(detail)),
            "starknet" => Ok(WalletType::starknet(detail)),
            "icp" => Ok(WalletType::icp(detail)),
            other => Err(WalletParseError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for WalletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletType::Eth { chain_id } => write!(f, "eth:{chain_id}"),
            WalletType::Near { network_id } => write!(f, "near:{network_id}"),
            WalletType::Starknet { wallet_name } => write!(f, "starknet:{wallet_name}"),
            WalletType::Icp { canister_id, .. } => write!(f, "icp:{canister_id}"),
        }
    }
}
