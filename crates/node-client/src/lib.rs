//! Client for a Calimero-style application node: JSON-RPC execution of
//! context procedures plus the WebSocket event feed.

pub mod config;
pub mod error;
pub mod rpc;
pub mod ws;

pub use config::{AccessToken, NodeConfig};
pub use error::{ExecutionError, NodeError};
pub use rpc::{CallContext, JsonRpcClient, NodeRpc, execute};
pub use ws::{EventCallback, EventStreamClient, ExecutionEventPayload, HandlerError, NodeEvent};
