//! JSON-RPC dispatcher for the MCP methods plus the legacy REST tool shapes.

use crate::mcp::{
    CallToolParams, InitializeResult, JSONRPC_VERSION, LegacyCallRequest, LegacyCallResponse,
    LegacyToolList, ListToolsResult, McpRequest, Request, RequestId, Response, RpcError,
    ServerCapabilities, ServerInfo,
};
use crate::registry::Registry;
use serde::Serialize;
use serde_json::Value;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, error, info, warn};

/// Stateless request router. Shared read-only across connections.
pub struct Dispatcher {
    registry: Registry,
    protocol_version: String,
}

impl Dispatcher {
    pub fn new(registry: Registry, protocol_version: impl Into<String>) -> Self {
        Self {
            registry,
            protocol_version: protocol_version.into(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn handle_initialize(&self) -> Result<Value, RpcError> {
        info!(protocol = %self.protocol_version, "Client initializing");
        to_result(InitializeResult {
            protocol_version: self.protocol_version.clone(),
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        })
    }

    fn handle_list_tools(&self) -> Result<Value, RpcError> {
        let tools = self.registry.list();
        debug!(count = tools.len(), "Serving tool list");
        to_result(ListToolsResult { tools })
    }

    fn handle_call_tool(&self, params: CallToolParams) -> Result<Value, RpcError> {
        info!(tool = %params.name, "Calling tool");
        let result = self
            .registry
            .call(&params.name, params.arguments.as_ref())
            .map_err(|e| {
                warn!(tool = %params.name, error = %e, "Tool call failed");
                RpcError::from(e)
            })?;
        to_result(result)
    }

    fn dispatch(&self, request: McpRequest) -> Result<Value, RpcError> {
        match request {
            McpRequest::Initialize => self.handle_initialize(),
            McpRequest::ListTools => self.handle_list_tools(),
            McpRequest::CallTool(params) => self.handle_call_tool(params),
        }
    }

    /// Handle a single request. The response always carries the request's id,
    /// including when a handler panics.
    pub fn handle_request(&self, request: Request) -> Response {
        let id = request.id.clone();
        debug!(method = %request.method, id = ?id, "Handling request");

        if request.jsonrpc != JSONRPC_VERSION {
            return Response::failure(
                id,
                RpcError::invalid_request(format!("unsupported jsonrpc version '{}'", request.jsonrpc)),
            );
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            McpRequest::parse(&request.method, request.params.clone())
                .and_then(|parsed| self.dispatch(parsed))
        }))
        .unwrap_or_else(|panic| {
            let detail = panic_message(panic.as_ref());
            error!(method = %request.method, detail = %detail, "Handler panicked");
            Err(RpcError::internal_error(detail))
        });

        match outcome {
            Ok(result) => Response::success(id, result),
            Err(err) => Response::failure(id, err),
        }
    }

    /// Handle an already-decoded JSON body that may not be a valid request.
    pub fn handle_value(&self, raw: Value) -> Response {
        let id = raw
            .get("id")
            .cloned()
            .and_then(|v| serde_json::from_value::<RequestId>(v).ok());

        match serde_json::from_value::<Request>(raw) {
            Ok(request) => self.handle_request(request),
            Err(e) => {
                warn!(error = %e, "Rejecting malformed request");
                Response::failure(id, RpcError::invalid_request(e))
            }
        }
    }

    /// Handle a raw request body.
    pub fn handle_str(&self, body: &str) -> Response {
        self.handle_slice(body.as_bytes())
    }

    /// Handle raw request bytes. Invalid UTF-8 is a parse error.
    pub fn handle_slice(&self, body: &[u8]) -> Response {
        match serde_json::from_slice::<Value>(body) {
            Ok(raw) => self.handle_value(raw),
            Err(e) => {
                warn!(error = %e, "Rejecting unparsable body");
                Response::failure(None, RpcError::parse_error(e))
            }
        }
    }

    /// Legacy `GET /tools`: descriptors reshaped for function calling.
    pub fn legacy_tools(&self) -> LegacyToolList {
        LegacyToolList {
            tools: self.registry.list().iter().map(Into::into).collect(),
        }
    }

    /// Legacy `POST /call-tool`. `result` matches what `tools/call` returns.
    pub fn legacy_call(&self, request: LegacyCallRequest) -> LegacyCallResponse {
        info!(tool = %request.tool_name, "Legacy tool call");
        let outcome = self
            .registry
            .call(&request.tool_name, request.arguments.as_ref())
            .map_err(|e| e.to_string())
            .and_then(|result| serde_json::to_value(result).map_err(|e| e.to_string()));

        match outcome {
            Ok(result) => LegacyCallResponse {
                success: true,
                result,
                error: None,
            },
            Err(e) => {
                warn!(tool = %request.tool_name, error = %e, "Legacy tool call failed");
                LegacyCallResponse {
                    success: false,
                    result: Value::Null,
                    error: Some(e),
                }
            }
        }
    }
}

fn to_result<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(RpcError::internal_error)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
