//! HTTP surface: JSON-RPC endpoint, legacy tool routes, leaderboard and health.

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::StoreError;
use crate::mcp::{LegacyCallRequest, LegacyCallResponse, LegacyToolList, Response as RpcResponse};
use crate::registry::Registry;
use crate::store::{ScoreRecord, ScoreStore};
use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub store: ScoreStore,
    /// Database label reported by the health check.
    pub database_name: String,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, store: ScoreStore, database_name: impl Into<String>) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            store,
            database_name: database_name.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Dispatcher::new(Registry::builtin(), config.protocol_version.clone()),
            ScoreStore::new(config.database.path.clone()),
            config.database.name.clone(),
        )
    }
}

/// Error surfaced to HTTP clients as `{"detail": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },
}

impl ApiError {
    fn store(context: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| ApiError::Store { context, source }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = self.to_string();
        error!(error = %detail, "Request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": detail })),
        )
            .into_response()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewScore {
    #[serde(alias = "PlayerName")]
    pub player_name: String,
    #[serde(alias = "Score")]
    pub score: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub message: String,
    pub id: Option<i64>,
}

/// Leaderboard row in the PascalCase shape the `/api/snake-scores` client reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LegacyScoreRecord {
    pub id: i64,
    pub player_name: String,
    pub score: i64,
    #[serde(with = "crate::store::sql_timestamp")]
    pub game_date: NaiveDateTime,
    #[serde(with = "crate::store::sql_timestamp")]
    pub created_at: NaiveDateTime,
}

impl From<ScoreRecord> for LegacyScoreRecord {
    fn from(record: ScoreRecord) -> Self {
        Self {
            id: record.id,
            player_name: record.player_name,
            score: record.score,
            game_date: record.game_date,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub timestamp: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthChecks {
    pub application: ComponentCheck,
    pub database: DatabaseCheck,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseCheck {
    pub status: String,
    pub message: String,
    pub path: String,
    pub database: String,
}

fn tool_routes() -> Router<AppState> {
    Router::new()
        .route("/tools", get(legacy_tools))
        .route("/call-tool", post(legacy_call_tool))
}

fn score_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_score))
        .route("/top/:limit", get(top_scores))
        .route("/player/:name", get(player_scores))
}

fn legacy_score_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_score))
        .route("/top/:limit", get(legacy_top_scores))
        .route("/player/:name", get(legacy_player_scores))
}

/// Routes are served both at the root and under the legacy `/api` prefixes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/mcp", post(rpc))
        .merge(tool_routes())
        .nest("/scores", score_routes())
        .nest("/api/mcp", tool_routes().route("/", post(rpc)))
        .nest("/api/snake-scores", legacy_score_routes())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(config: &Config) -> Result<()> {
    let state = AppState::from_config(config);
    state
        .store
        .blocking(|s| s.init())
        .await
        .with_context(|| format!("Failed to prepare database at {}", config.database.path.display()))?;

    match state.store.blocking(|s| s.ping()).await {
        Ok(()) => info!(path = %config.database.path.display(), "Database connection successful"),
        Err(e) => warn!(error = %e, "Database connection failed"),
    }

    let app = build_router(state).layer(cors_layer(&config.server.cors_origins));
    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(addr = %config.server.bind, "Scoreboard API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(tokio::signal::ctrl_c()))
        .await?;
    Ok(())
}

/// Resolves when `signal` fires. If the handler cannot be installed the
/// server keeps running instead of shutting down at once.
async fn shutdown_signal<F>(signal: F)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Shutting down"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl-C, graceful shutdown disabled");
            std::future::pending::<()>().await;
        }
    }
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "Scoreboard API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "mcp": "/mcp",
            "tools": "/tools",
            "scores": "/scores",
        }
    }))
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let check = state.store.blocking(|s| s.ping()).await;
    let healthy = check.is_ok();
    let message = match &check {
        Ok(()) => "Database connection successful".to_string(),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            e.to_string()
        }
    };

    let report = HealthReport {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        checks: HealthChecks {
            application: ComponentCheck {
                status: "up".to_string(),
                message: "Application is running".to_string(),
            },
            database: DatabaseCheck {
                status: if healthy { "up" } else { "down" }.to_string(),
                message,
                path: state.store.path().display().to_string(),
                database: state.database_name.clone(),
            },
        },
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

async fn rpc(State(state): State<AppState>, body: Bytes) -> Json<RpcResponse> {
    Json(state.dispatcher.handle_slice(&body))
}

async fn legacy_tools(State(state): State<AppState>) -> Json<LegacyToolList> {
    Json(state.dispatcher.legacy_tools())
}

async fn legacy_call_tool(
    State(state): State<AppState>,
    Json(request): Json<LegacyCallRequest>,
) -> Json<LegacyCallResponse> {
    Json(state.dispatcher.legacy_call(request))
}

async fn create_score(
    State(state): State<AppState>,
    Json(new_score): Json<NewScore>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let NewScore { player_name, score } = new_score;
    let id = state
        .store
        .blocking(move |s| s.submit_score(&player_name, score))
        .await
        .map_err(ApiError::store("Failed to save score"))?;
    Ok(Json(SubmitResponse {
        success: true,
        message: "Score saved".to_string(),
        id: Some(id),
    }))
}

async fn load_top(state: &AppState, limit: i64) -> Result<Vec<ScoreRecord>, ApiError> {
    state
        .store
        .blocking(move |s| s.top_scores(limit))
        .await
        .map_err(ApiError::store("Failed to load scores"))
}

async fn load_player(state: &AppState, name: String) -> Result<Vec<ScoreRecord>, ApiError> {
    state
        .store
        .blocking(move |s| s.scores_for_player(&name))
        .await
        .map_err(ApiError::store("Failed to load player scores"))
}

fn to_legacy(records: Vec<ScoreRecord>) -> Vec<LegacyScoreRecord> {
    records.into_iter().map(Into::into).collect()
}

async fn top_scores(
    State(state): State<AppState>,
    Path(limit): Path<i64>,
) -> Result<Json<Vec<ScoreRecord>>, ApiError> {
    Ok(Json(load_top(&state, limit).await?))
}

async fn legacy_top_scores(
    State(state): State<AppState>,
    Path(limit): Path<i64>,
) -> Result<Json<Vec<LegacyScoreRecord>>, ApiError> {
    Ok(Json(to_legacy(load_top(&state, limit).await?)))
}

async fn legacy_player_scores(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<LegacyScoreRecord>>, ApiError> {
    Ok(Json(to_legacy(load_player(&state, name).await?)))
}

async fn player_scores(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<ScoreRecord>>, ApiError> {
    Ok(Json(load_player(&state, name).await?))
}
