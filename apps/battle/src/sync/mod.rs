//! Keeps the local board converged with the node's execution log.
//!
//! Three call sites mutate the board: the [`dispatch::Dispatcher`] after a
//! successful write, the event stream handler installed by
//! [`reconcile::Reconciler::event_callback`], and the log pollers in
//! [`poller`]. All of them funnel through [`crate::game::GameHandle::apply`],
//! whose value idempotence is what makes duplicate delivery safe.

pub mod dispatch;
pub mod node;
pub mod poller;
pub mod reconcile;
pub mod retry;

use node_client::{ExecutionError, NodeError};
use thiserror::Error;

use crate::board::BoardError;
use crate::game::GameError;

pub use dispatch::{Dispatcher, EditResult};
pub use node::BattleNode;
pub use poller::{PollOutput, PollTarget, PollingReader};
pub use reconcile::{ReconcileReport, Reconciler};
pub use retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no wallet identity is connected")]
    NotAuthenticated,
    /// Network or protocol failure; the outcome of the call is unknown.
    #[error("transport error: {0}")]
    Transport(NodeError),
    /// The node ran the call and rejected it; nothing was applied.
    #[error("{0}")]
    Execution(ExecutionError),
    #[error("node rejected credentials: {0}")]
    Unauthorized(String),
    #[error("cannot place remote state: {0}")]
    StaleRead(String),
    #[error("already voted in this battle")]
    AlreadyVoted,
    #[error(transparent)]
    Game(#[from] GameError),
    #[error(transparent)]
    Board(#[from] BoardError),
}

impl From<NodeError> for SyncError {
    fn from(err: NodeError) -> Self {
        match err {
            NodeError::Execution(execution) => SyncError::Execution(execution),
            NodeError::Unauthorized(reason) => SyncError::Unauthorized(reason),
            other => SyncError::Transport(other),
        }
    }
}

impl SyncError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Transport(err) if err.is_transient())
    }
}
