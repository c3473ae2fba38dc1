//! Configuration loaded once from the environment and passed down explicitly.

use crate::error::ConfigError;
use crate::mcp::DEFAULT_PROTOCOL_VERSION;
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_BIND: &str = "0.0.0.0:8000";
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:8100,http://localhost:4200";
const DEFAULT_DATABASE_PATH: &str = "scoreboard.db";
const DEFAULT_DATABASE_NAME: &str = "main";
const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_API_VERSION: &str = "2024-12-01-preview";
const DEFAULT_DEPLOYMENT: &str = "gpt-4o";
const DEFAULT_MAX_COMPLETION_TOKENS: u32 = 2000;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Protocol version advertised by `initialize`.
    pub protocol_version: String,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// Label reported by the health check.
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Base URL of the scoreboard API the bridge relays tool calls to.
    pub api_url: String,
    pub completion: CompletionConfig,
}

/// Chat-completion API settings. Endpoint and key are only required by `chat`.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub api_version: String,
    pub deployment: String,
    pub max_completion_tokens: u32,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// - `SCOREBOARD_BIND`, `SCOREBOARD_CORS_ORIGINS` (comma separated)
    /// - `DATABASE_PATH`, `DATABASE_NAME`
    /// - `MCP_PROTOCOL_VERSION`
    /// - `SCOREBOARD_API_URL`
    /// - `COMPLETION_ENDPOINT`, `COMPLETION_API_KEY`, `COMPLETION_API_VERSION`,
    ///   `COMPLETION_DEPLOYMENT`, `COMPLETION_MAX_TOKENS`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_raw = get("SCOREBOARD_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind_raw.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
            var: "SCOREBOARD_BIND",
            value: bind_raw.clone(),
            reason: e.to_string(),
        })?;

        let cors_origins = csv(&get("SCOREBOARD_CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string()));

        let max_completion_tokens = match get("COMPLETION_MAX_TOKENS") {
            Some(raw) => raw.parse::<u32>().map_err(|e| ConfigError::Invalid {
                var: "COMPLETION_MAX_TOKENS",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_MAX_COMPLETION_TOKENS,
        };

        Ok(Self {
            server: ServerConfig { bind, cors_origins },
            database: DatabaseConfig {
                path: PathBuf::from(
                    get("DATABASE_PATH").unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string()),
                ),
                name: get("DATABASE_NAME").unwrap_or_else(|| DEFAULT_DATABASE_NAME.to_string()),
            },
            protocol_version: get("MCP_PROTOCOL_VERSION")
                .unwrap_or_else(|| DEFAULT_PROTOCOL_VERSION.to_string()),
            chat: ChatConfig {
                api_url: get("SCOREBOARD_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
                completion: CompletionConfig {
                    endpoint: get("COMPLETION_ENDPOINT"),
                    api_key: get("COMPLETION_API_KEY"),
                    api_version: get("COMPLETION_API_VERSION")
                        .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
                    deployment: get("COMPLETION_DEPLOYMENT")
                        .unwrap_or_else(|| DEFAULT_DEPLOYMENT.to_string()),
                    max_completion_tokens,
                },
            },
        })
    }
}

impl CompletionConfig {
    pub fn endpoint(&self) -> Result<&str, ConfigError> {
        self.endpoint.as_deref().ok_or(ConfigError::Missing {
            var: "COMPLETION_ENDPOINT",
        })
    }

    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::Missing {
            var: "COMPLETION_API_KEY",
        })
    }
}

fn csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
