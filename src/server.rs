//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | `{query, k?}` → `{answer, sources}` (no caching) |
//! | `POST` | `/workflows/support/run` | `{query, session_id?}` → resolution output |
//! | `GET`  | `/stats` | `{files, chunks}` of the current index |
//! | `POST` | `/index/rebuild` | Force an index rebuild, returns `{files, chunks}` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::index::{IndexHandle, IndexOptions};
use crate::models::{IndexStats, ResolutionInput, ResolutionOutput};
use crate::reply::AgentReply;
use crate::workflow::{ResolutionWorkflow, WorkflowError};

/// Shared application state, built once per server.
#[derive(Clone)]
pub struct AppState {
    index: Arc<IndexHandle>,
    workflow: Arc<ResolutionWorkflow>,
}

impl AppState {
    pub fn new(index: Arc<IndexHandle>, workflow: Arc<ResolutionWorkflow>) -> Self {
        Self { index, workflow }
    }

    /// Production wiring from configuration. The index is built or loaded
    /// here so the first request does not pay for it.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let index = Arc::new(IndexHandle::new(IndexOptions::from_config(config)));
        let stats = index.stats().await?;
        tracing::info!(files = stats.files, chunks = stats.chunks, "index ready");

        let workflow = ResolutionWorkflow::from_config(config, index.clone()).await?;
        Ok(Self::new(index, Arc::new(workflow)))
    }
}

/// All routes over `state`, with permissive CORS.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask", post(handle_ask))
        .route("/workflows/support/run", post(handle_run_workflow))
        .route("/stats", get(handle_stats))
        .route("/index/rebuild", post(handle_rebuild))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Start the server on `[server].bind` and run until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "support server listening");
    println!("Support server listening on http://{}", config.server.bind);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::EmptyQuery => bad_request(err.to_string()),
            WorkflowError::Retrieval(_) => {
                tracing::error!(error = %err, "workflow failed");
                internal(err.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %format!("{:#}", err), "request failed");
        internal(format!("{:#}", err))
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /stats, POST /index/rebuild ============

async fn handle_stats(State(state): State<AppState>) -> Result<Json<IndexStats>, AppError> {
    Ok(Json(state.index.stats().await?))
}

async fn handle_rebuild(State(state): State<AppState>) -> Result<Json<IndexStats>, AppError> {
    let (index, origin) = state.index.rebuild(true).await?;
    tracing::info!(%origin, "index rebuilt on request");
    Ok(Json(index.stats()))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AgentReply>, AppError> {
    tracing::info!(query = %req.query, k = ?req.k, "ask request");
    let reply = state.workflow.ask(&req.query, req.k).await?;
    tracing::info!(sources = reply.sources.len(), "ask answered");
    Ok(Json(reply))
}

// ============ POST /workflows/support/run ============

#[derive(Deserialize)]
struct RunRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    session_id: Option<String>,
}

async fn handle_run_workflow(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<Json<ResolutionOutput>, AppError> {
    let input = ResolutionInput {
        query: req.query,
        session_id: req.session_id,
    };
    Ok(Json(state.workflow.run(&input).await?))
}
