use crate::board::BoardError;
use crate::service::ServiceError;
use crate::session::SessionError;
use crate::store::StoreError;
use node_client::NodeError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("{0}")]
    Node(#[from] NodeError),
    #[error("{0}")]
    Service(#[from] ServiceError),
    #[error("session store: {0}")]
    Store(#[from] StoreError),
    #[error("invalid puzzle: {0}")]
    Puzzle(#[from] BoardError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("logging initialization failed: {0}")]
    Logging(String),
    #[error("no node url; pass --node-url or set BATTLE_NODE_URL")]
    MissingNodeUrl,
    #[error("no battle to play; pass --battle with --context-id and --context-identity")]
    MissingBattle,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
