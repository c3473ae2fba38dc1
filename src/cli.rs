//! Command-line interface for scoreboard.

use crate::api;
use crate::chat::{AzureCompletionClient, BridgeMode, ChatBridge, HttpToolClient, run_console};
use crate::config::Config;
use crate::script::render_report;
use crate::store::ScoreStore;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::info;

#[derive(Parser)]
#[command(name = "scoreboard")]
#[command(about = "Game leaderboard API with an MCP tool endpoint and a tool-calling chat console")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Run the HTTP API (leaderboard, MCP endpoint, legacy tool routes)
    Serve {
        /// Address to listen on (overrides SCOREBOARD_BIND)
        #[arg(long)]
        bind: Option<SocketAddr>,
        /// SQLite database file (overrides DATABASE_PATH)
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Chat with a model that can call the scoreboard's tools
    Chat {
        /// Scoreboard API base URL (overrides SCOREBOARD_API_URL)
        #[arg(long)]
        api_url: Option<String>,
        /// Use the legacy REST tool routes instead of JSON-RPC
        #[arg(long)]
        legacy: bool,
    },

    /// Run a SQL script whose statements are separated by GO lines
    Sql {
        /// Script file
        file: PathBuf,
        /// SQLite database file (overrides DATABASE_PATH)
        #[arg(long)]
        database: Option<PathBuf>,
    },
}

impl Commands {
    /// Fold command-line flags into the environment configuration.
    fn apply_overrides(&self, config: &mut Config) {
        match self {
            Commands::Serve { bind, database } => {
                if let Some(bind) = bind {
                    config.server.bind = *bind;
                }
                if let Some(path) = database {
                    config.database.path = path.clone();
                }
            }
            Commands::Chat { api_url, .. } => {
                if let Some(url) = api_url {
                    config.chat.api_url = url.clone();
                }
            }
            Commands::Sql { database, .. } => {
                if let Some(path) = database {
                    config.database.path = path.clone();
                }
            }
        }
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let mut config = Config::from_env().context("Invalid configuration")?;
        self.command.apply_overrides(&mut config);

        match self.command {
            Commands::Serve { .. } => api::serve(&config).await,

            Commands::Chat { legacy, .. } => {
                let mode = if legacy {
                    BridgeMode::Legacy
                } else {
                    BridgeMode::JsonRpc
                };
                let http = reqwest::Client::new();
                let api_url = &config.chat.api_url;

                let tools =
                    HttpToolClient::new(http.clone(), api_url, mode, &config.protocol_version);
                tools.check_health().await.with_context(|| {
                    format!(
                        "Scoreboard API at {api_url} is not healthy; start it with `scoreboard serve`"
                    )
                })?;

                let completion = AzureCompletionClient::new(http, &config.chat.completion)
                    .context("Chat completion API is not configured")?;

                info!(api = %api_url, ?mode, "Starting chat session");
                let mut bridge = ChatBridge::new(completion, tools);
                bridge.start().await;
                run_console(
                    &mut bridge,
                    BufReader::new(tokio::io::stdin()),
                    tokio::io::stdout(),
                )
                .await?;
                Ok(())
            }

            Commands::Sql { file, .. } => {
                let script = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let store = ScoreStore::new(config.database.path.clone());
                info!(file = %file.display(), database = %store.path().display(), "Running script");

                let outcomes = store
                    .blocking(move |s| s.run_script(&script))
                    .await
                    .with_context(|| format!("Script {} failed", file.display()))?;
                print!("{}", render_report(&outcomes));
                println!("Script finished: {} statements executed", outcomes.len());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Commands {
        Cli::try_parse_from(args).unwrap().command
    }

    fn defaults() -> Config {
        Config::from_lookup(|_| None).unwrap()
    }

    #[test]
    fn serve_flags_override_config() {
        let cmd = parse(&["scoreboard", "serve", "--bind", "127.0.0.1:9000", "--database", "x.db"]);
        let mut config = defaults();
        cmd.apply_overrides(&mut config);
        assert_eq!(config.server.bind, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.database.path, PathBuf::from("x.db"));
    }

    #[test]
    fn serve_without_flags_keeps_config() {
        let cmd = parse(&["scoreboard", "serve"]);
        let mut config = defaults();
        cmd.apply_overrides(&mut config);
        assert_eq!(config.server.bind, defaults().server.bind);
        assert_eq!(config.database.path, defaults().database.path);
    }

    #[test]
    fn chat_parses_mode_and_url() {
        let cmd = parse(&["scoreboard", "chat", "--legacy", "--api-url", "http://h:1"]);
        assert_eq!(
            cmd,
            Commands::Chat {
                api_url: Some("http://h:1".into()),
                legacy: true
            }
        );
        let mut config = defaults();
        cmd.apply_overrides(&mut config);
        assert_eq!(config.chat.api_url, "http://h:1");
    }

    #[test]
    fn sql_requires_file() {
        assert!(Cli::try_parse_from(["scoreboard", "sql"]).is_err());
        let cmd = parse(&["scoreboard", "sql", "schema.sql"]);
        assert_eq!(
            cmd,
            Commands::Sql {
                file: PathBuf::from("schema.sql"),
                database: None
            }
        );
    }

    #[test]
    fn bad_bind_address_is_rejected() {
        assert!(Cli::try_parse_from(["scoreboard", "serve", "--bind", "nowhere"]).is_err());
    }
}
