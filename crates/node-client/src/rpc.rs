use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::config::NodeConfig;
use crate::error::{ExecutionError, NodeError};

/// Which context a procedure runs in and on whose behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub context_id: String,
    pub executor_public_key: String,
}

impl CallContext {
    pub fn new(context_id: impl Into<String>, executor_public_key: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
            executor_public_key: executor_public_key.into(),
        }
    }
}

/// Execution surface of a node. `Ok` means the node durably applied the call.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    async fn execute_raw(
        &self,
        ctx: &CallContext,
        method: &str,
        args: Value,
    ) -> Result<Value, NodeError>;
}

/// Typed wrapper over [`NodeRpc::execute_raw`].
pub async fn execute<R, A, T>(
    rpc: &R,
    ctx: &CallContext,
    method: &str,
    args: &A,
) -> Result<T, NodeError>
where
    R: NodeRpc + ?Sized,
    A: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let args = serde_json::to_value(args)
        .map_err(|err| NodeError::InvalidConfig(format!("unable to encode {method} args: {err}")))?;
    let output = rpc.execute_raw(ctx, method, args).await?;
    serde_json::from_value(output)
        .map_err(|err| NodeError::InvalidResponse(format!("{method} output: {err}")))
}

pub struct JsonRpcClient {
    client: reqwest::Client,
    config: NodeConfig,
    endpoint: Url,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(8))
            .no_proxy()
            .build()?;
        let endpoint = config.rpc_endpoint()?;
        Ok(Self {
            client,
            config,
            endpoint,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl NodeRpc for JsonRpcClient {
    async fn execute_raw(
        &self,
        ctx: &CallContext,
        method: &str,
        args: Value,
    ) -> Result<Value, NodeError> {
        let token = self
            .config
            .access_token()
            .ok_or_else(|| NodeError::Unauthorized("no access token configured".into()))?
            .bearer()?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method: "execute",
            params: ExecuteParams {
                context_id: &ctx.context_id,
                method,
                args_json: args,
                executor_public_key: &ctx.executor_public_key,
            },
        };
        trace!(target: "battle::node", id, method, context_id = %ctx.context_id, "jsonrpc request");

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(NodeError::Unauthorized(format!("node answered {status}")));
        }
        if !status.is_success() {
            return Err(NodeError::HttpStatus(status));
        }

        let payload = response.json::<RpcResponse>().await?;
        debug!(target: "battle::node", id, method, ok = payload.error.is_none(), "jsonrpc response");
        payload.into_output()
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: ExecuteParams<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteParams<'a> {
    context_id: &'a str,
    method: &'a str,
    args_json: Value,
    executor_public_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<ExecuteResult>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ExecuteResult {
    #[serde(default)]
    output: Value,
}

impl RpcResponse {
    fn into_output(self) -> Result<Value, NodeError> {
        if let Some(error) = self.error.filter(|error| !error.is_null()) {
            return Err(NodeError::Execution(ExecutionError::from_rpc_error(&error)));
        }
        self.result
            .map(|result| result.output)
            .ok_or_else(|| NodeError::InvalidResponse("response carried neither result nor error".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_uses_node_param_names() {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 7,
            method: "execute",
            params: ExecuteParams {
                context_id: "ctx",
                method: "set_cell",
                args_json: json!({"position": 1}),
                executor_public_key: "pk",
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["params"]["contextId"], "ctx");
        assert_eq!(value["params"]["argsJson"]["position"], 1);
        assert_eq!(value["params"]["executorPublicKey"], "pk");
    }

    #[test]
    fn response_output_and_errors() {
        let ok: RpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "result": {"output": [1, 2]}}))
                .unwrap();
        assert_eq!(ok.into_output().unwrap(), json!([1, 2]));

        let unit: RpcResponse =
            serde_json::from_value(json!({"id": 1, "result": {"output": null}})).unwrap();
        assert_eq!(unit.into_output().unwrap(), Value::Null);

        let failed: RpcResponse = serde_json::from_value(json!({
            "id": 1,
            "result": null,
            "error": {"type": "FunctionCallError", "data": "boom"}
        }))
        .unwrap();
        assert!(matches!(failed.into_output(), Err(NodeError::Execution(err)) if err.kind == "FunctionCallError"));

        let empty: RpcResponse = serde_json::from_value(json!({"id": 1})).unwrap();
        assert!(matches!(empty.into_output(), Err(NodeError::InvalidResponse(_))));
    }

    struct EchoNode;

    #[async_trait]
    impl NodeRpc for EchoNode {
        async fn execute_raw(
            &self,
            _ctx: &CallContext,
            _method: &str,
            args: Value,
        ) -> Result<Value, NodeError> {
            Ok(args)
        }
    }

    #[test_timeout::tokio_timeout_test]
    async fn typed_execute_decodes_output() {
        let ctx = CallContext::new("ctx", "pk");
        let echoed: Vec<u32> = execute(&EchoNode, &ctx, "echo", &vec![3u32, 4]).await.unwrap();
        assert_eq!(echoed, vec![3, 4]);

        let mismatch: Result<String, _> = execute(&EchoNode, &ctx, "echo", &vec![1u32]).await;
        assert!(matches!(mismatch, Err(NodeError::InvalidResponse(_))));
    }

    #[test_timeout::tokio_timeout_test]
    async fn missing_token_fails_before_any_request() {
        let config = NodeConfig::new("http://127.0.0.1:9").unwrap();
        let client = JsonRpcClient::new(config).unwrap();
        let ctx = CallContext::new("ctx", "pk");
        let err = client.execute_raw(&ctx, "set_cell", json!({})).await.unwrap_err();
        assert!(matches!(err, NodeError::Unauthorized(_)));
    }
}
