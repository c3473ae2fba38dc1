//! HTTP client for the scoreboard's tool surfaces.

use crate::error::BridgeError;
use crate::mcp::{
    FunctionTool, InitializeResult, LegacyCallRequest, LegacyCallResponse, LegacyToolList,
    ListToolsResult, Request, RequestId, Response,
};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);
const LIST_TIMEOUT: Duration = Duration::from_secs(5);
const CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Which tool surface the bridge talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeMode {
    /// `POST /mcp` with JSON-RPC envelopes.
    JsonRpc,
    /// `GET /api/mcp/tools` and `POST /api/mcp/call-tool`.
    Legacy,
}

#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Protocol handshake. Surfaces without one return `Ok(None)`.
    async fn initialize(&self) -> Result<Option<InitializeResult>, BridgeError>;

    async fn list_tools(&self) -> Result<Vec<FunctionTool>, BridgeError>;

    /// Run a tool and return its result payload.
    async fn call_tool(&self, name: &str, arguments: Map<String, Value>)
    -> Result<Value, BridgeError>;
}

pub struct HttpToolClient {
    http: reqwest::Client,
    base_url: String,
    mode: BridgeMode,
    /// Sent in the `initialize` handshake.
    protocol_version: String,
    next_id: AtomicI64,
}

impl HttpToolClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        mode: BridgeMode,
        protocol_version: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            mode,
            protocol_version: protocol_version.into(),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn mode(&self) -> BridgeMode {
        self.mode
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Succeeds only when `GET /health` answers 200.
    pub async fn check_health(&self) -> Result<(), BridgeError> {
        let res = self
            .http
            .get(self.url("/health"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?;
        expect_ok("scoreboard health", res).await.map(drop)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Make a JSON-RPC call and check the response belongs to it.
    async fn rpc<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<T, BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = Request::new(id, method, params);
        debug!(id, method, "Sent request");

        let bytes = self.post("/mcp", &request, timeout).await?;
        let response: Response = decode("JSON-RPC response", &bytes)?;

        if response.id != Some(RequestId::Number(id)) {
            return Err(BridgeError::IdMismatch {
                expected: id,
                got: response.id.map(|got| match got {
                    RequestId::Number(n) => n.to_string(),
                    RequestId::String(s) => s,
                }),
            });
        }
        if let Some(err) = response.error {
            return Err(BridgeError::Rpc(err));
        }
        let result = response.result.unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|source| BridgeError::Decode {
            what: "JSON-RPC result",
            source,
        })
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<Vec<u8>, BridgeError> {
        let res = self
            .http
            .post(self.url(path))
            .timeout(timeout)
            .json(body)
            .send()
            .await?;
        expect_ok("scoreboard API", res).await
    }
}

async fn expect_ok(
    service: &'static str,
    res: reqwest::Response,
) -> Result<Vec<u8>, BridgeError> {
    let status = res.status();
    let bytes = res.bytes().await?.to_vec();
    if status != reqwest::StatusCode::OK {
        return Err(BridgeError::Status {
            service,
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
        });
    }
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(what: &'static str, bytes: &[u8]) -> Result<T, BridgeError> {
    serde_json::from_slice(bytes).map_err(|source| BridgeError::Decode { what, source })
}

#[async_trait]
impl ToolTransport for HttpToolClient {
    async fn initialize(&self) -> Result<Option<InitializeResult>, BridgeError> {
        if self.mode == BridgeMode::Legacy {
            return Ok(None);
        }
        let params = json!({
            "protocolVersion": self.protocol_version,
            "capabilities": {},
            "clientInfo": {
                "name": concat!(env!("CARGO_PKG_NAME"), "-chat"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let result: InitializeResult = self.rpc("initialize", Some(params), LIST_TIMEOUT).await?;
        info!(
            server = %result.server_info.name,
            version = %result.server_info.version,
            protocol = %result.protocol_version,
            "Connected to tool server"
        );
        Ok(Some(result))
    }

    async fn list_tools(&self) -> Result<Vec<FunctionTool>, BridgeError> {
        match self.mode {
            BridgeMode::JsonRpc => {
                let result: ListToolsResult = self.rpc("tools/list", None, LIST_TIMEOUT).await?;
                Ok(result.tools.iter().map(FunctionTool::from).collect())
            }
            BridgeMode::Legacy => {
                let res = self
                    .http
                    .get(self.url("/api/mcp/tools"))
                    .timeout(LIST_TIMEOUT)
                    .send()
                    .await?;
                let bytes = expect_ok("scoreboard API", res).await?;
                let list: LegacyToolList = decode("legacy tool list", &bytes)?;
                Ok(list.tools)
            }
        }
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<Value, BridgeError> {
        match self.mode {
            BridgeMode::JsonRpc => {
                let params = json!({"name": name, "arguments": arguments});
                self.rpc("tools/call", Some(params), CALL_TIMEOUT).await
            }
            BridgeMode::Legacy => {
                let request = LegacyCallRequest {
                    tool_name: name.to_string(),
                    arguments: Some(arguments),
                };
                let bytes = self.post("/api/mcp/call-tool", &request, CALL_TIMEOUT).await?;
                let response: LegacyCallResponse = decode("legacy call response", &bytes)?;
                if response.success {
                    Ok(response.result)
                } else {
                    Err(BridgeError::ToolFailed(
                        response.error.unwrap_or_else(|| "unknown error".to_string()),
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    /// Serve `POST /mcp` with `reply`, recording every request body.
    async fn stub_server<F>(reply: F) -> (String, Arc<Mutex<Vec<Value>>>)
    where
        F: Fn(&Value) -> Value + Clone + Send + Sync + 'static,
    {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let app = Router::new().route(
            "/mcp",
            post(move |Json(body): Json<Value>| {
                let reply = reply.clone();
                let log = log.clone();
                async move {
                    let answer = reply(&body);
                    log.lock().unwrap().push(body);
                    Json(answer)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let client = HttpToolClient::new(
            reqwest::Client::new(),
            "http://localhost:8000/",
            BridgeMode::Legacy,
            "2024-11-05",
        );
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.url("/health"), "http://localhost:8000/health");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let client = HttpToolClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            BridgeMode::JsonRpc,
            "2024-11-05",
        );
        let err = client.check_health().await.unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
    }

    #[tokio::test]
    async fn response_with_foreign_id_is_rejected() {
        let (url, _) = stub_server(|_| {
            json!({"jsonrpc": "2.0", "id": 999, "result": {"tools": []}})
        })
        .await;
        let client = HttpToolClient::new(reqwest::Client::new(), &url, BridgeMode::JsonRpc, "2024-11-05");
        let err = client.list_tools().await.unwrap_err();
        match err {
            BridgeError::IdMismatch { expected, got } => {
                assert_eq!(expected, 1);
                assert_eq!(got.as_deref(), Some("999"));
            }
            other => panic!("expected id mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn response_without_id_is_rejected() {
        let (url, _) = stub_server(|_| json!({"jsonrpc": "2.0", "result": {"tools": []}})).await;
        let client = HttpToolClient::new(reqwest::Client::new(), &url, BridgeMode::JsonRpc, "2024-11-05");
        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, BridgeError::IdMismatch { expected: 1, got: None }));
    }

    #[tokio::test]
    async fn handshake_sends_configured_protocol_version() {
        let (url, seen) = stub_server(|body| {
            json!({
                "jsonrpc": "2.0",
                "id": body["id"],
                "result": {
                    "protocolVersion": body["params"]["protocolVersion"],
                    "capabilities": {},
                    "serverInfo": {"name": "stub", "version": "0"}
                }
            })
        })
        .await;
        let client = HttpToolClient::new(reqwest::Client::new(), &url, BridgeMode::JsonRpc, "2025-03-26");
        let result = client.initialize().await.unwrap().unwrap();
        assert_eq!(result.protocol_version, "2025-03-26");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["method"], "initialize");
        assert_eq!(seen[0]["params"]["protocolVersion"], "2025-03-26");
    }
}
