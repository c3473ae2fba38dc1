//! Error types for each layer. The binary edge wraps these in `anyhow`.

use crate::mcp::{INVALID_PARAMS, RpcError};
use thiserror::Error;

/// Failure talking to the score database.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid timestamp '{value}' in column {column}")]
    Timestamp { column: &'static str, value: String },
    #[error("batch {batch} failed: {source}")]
    Statement {
        batch: usize,
        #[source]
        source: rusqlite::Error,
    },
    #[error("database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Failure looking up or running a registered tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("Tool {tool} failed: {reason}")]
    Failed { tool: String, reason: String },
}

impl From<ToolError> for RpcError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::UnknownTool(_) | ToolError::InvalidArguments { .. } => {
                RpcError::new(INVALID_PARAMS, err.to_string())
            }
            ToolError::Failed { .. } => RpcError::internal_error(&err),
        }
    }
}

/// Failure inside the chat bridge. Never fatal to the session.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{service} answered HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("response id {got:?} does not match request id {expected}")]
    IdMismatch { expected: i64, got: Option<String> },
    #[error("tool call failed: {0}")]
    ToolFailed(String),
    #[error("malformed arguments for tool {tool}: {reason}")]
    MalformedToolArguments { tool: String, reason: String },
    #[error("completion response contained no choices")]
    EmptyCompletion,
    #[error("could not decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Invalid configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is not set")]
    Missing { var: &'static str },
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}
