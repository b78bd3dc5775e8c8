use std::fmt;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Application-level failure reported inside a successful JSON-RPC response.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionError {
    pub kind: String,
    pub data: Option<Value>,
}

impl ExecutionError {
    /// Accepts both the node's `{type, data}` shape (optionally nested under
    /// a `ServerError`) and plain JSON-RPC `{code, message}` errors.
    pub fn from_rpc_error(raw: &Value) -> Self {
        let mut current = raw;
        while current.get("type").and_then(Value::as_str) == Some("ServerError") {
            match current.get("data") {
                Some(inner) if inner.is_object() => current = inner,
                _ => break,
            }
        }
        let kind = current
            .get("type")
            .or_else(|| current.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("UnknownError")
            .to_string();
        let data = current
            .get("data")
            .filter(|value| !value.is_null())
            .cloned();
        Self { kind, data }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            Some(Value::String(detail)) => write!(f, "{}: {detail}", self.kind),
            Some(other) => write!(f, "{}: {other}", self.kind),
            None => f.write_str(&self.kind),
        }
    }
}

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("invalid node configuration: {0}")]
    InvalidConfig(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected http status {0}")]
    HttpStatus(StatusCode),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("execution failed: {0}")]
    Execution(ExecutionError),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("event stream is not connected")]
    NotConnected,
}

impl NodeError {
    /// Whether repeating the same read could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            NodeError::Transport(_) | NodeError::WebSocket(_) | NodeError::NotConnected => true,
            NodeError::HttpStatus(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            NodeError::InvalidConfig(_)
            | NodeError::Unauthorized(_)
            | NodeError::Execution(_)
            | NodeError::InvalidResponse(_) => false,
        }
    }
}
