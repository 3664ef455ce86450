//! HTTP API server.
//!
//! Exposes the audit pipeline as a JSON API and, optionally, serves the
//! browser frontend from `[server].static_dir`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/audit` | Audit a product description (`{text}`) |
//! | `POST` | `/api/audit-clauses` | Extract suspicious terms and check each (`{text}`) |
//! | `POST` | `/api/check-clause` | Check one clause (`{clause}`) |
//! | `POST` | `/api/find-source` | Best reference passage for a clause (`{clause}`) |
//! | `POST` | `/api/extract` | Structured summary of a product description (`{text}`) |
//! | `GET`  | `/health` | Health check (version, indexed chunk count) |
//!
//! # Error Contract
//!
//! All error responses share one shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "text must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `llm_unavailable` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the frontend can be
//! hosted separately.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::audit::{AuditError, Auditor};
use crate::config::Config;
use crate::llm::OpenAiCompatClient;
use crate::models::{AuditRequest, AuditResult, ClauseAudit, ClauseCheck, ProductSummary, SourceExcerpt};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub auditor: Arc<Auditor>,
    /// Reported by `/health`.
    pub pdf_folder: String,
}

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
///
/// Fails before binding if the LLM API key is missing (or rejected, with
/// `llm.verify_on_startup`), or the index cannot be opened.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    if config.llm.verify_on_startup {
        OpenAiCompatClient::from_config(&config.llm)?.verify().await?;
        tracing::info!(base_url = %config.llm.base_url, "LLM API key accepted");
    }
    let auditor = Auditor::from_config(config).await?;
    let chunks = auditor.store().count().await?;
    if chunks == 0 {
        tracing::warn!("index is empty; run `audit ingest` to index the PDF folder");
    }

    let state = AppState {
        auditor: Arc::new(auditor),
        pdf_folder: config.documents.folder.display().to_string(),
    };
    let app = router(state, config.server.static_dir.as_deref());

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, chunks, "server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router. When `static_dir` is set, unmatched paths are served
/// from it (`/` → `index.html`).
pub fn router(state: AppState, static_dir: Option<&std::path::Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/api/audit", post(handle_audit))
        .route("/api/audit-clauses", post(handle_audit_clauses))
        .route("/api/check-clause", post(handle_check_clause))
        .route("/api/find-source", post(handle_find_source))
        .route("/api/extract", post(handle_extract))
        .route("/health", get(handle_health));

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
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

/// Error type that converts into the JSON error response.
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

impl From<AuditError> for AppError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::InvalidInput(msg) => bad_request(msg),
            AuditError::Llm(e) => {
                tracing::error!(error = %e, "LLM call failed");
                AppError {
                    status: StatusCode::BAD_GATEWAY,
                    code: "llm_unavailable".to_string(),
                    message: e.to_string(),
                }
            }
            AuditError::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal".to_string(),
                    message: e.to_string(),
                }
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    chunks: i64,
    pdf_folder: String,
}

async fn handle_health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let chunks = state
        .auditor
        .store()
        .count()
        .await
        .map_err(AuditError::from)?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        chunks,
        pdf_folder: state.pdf_folder.clone(),
    }))
}

// ============ POST /api/* ============

#[derive(Deserialize)]
struct ClauseRequest {
    clause: String,
}

async fn handle_audit(
    State(state): State<AppState>,
    body: Result<Json<AuditRequest>, JsonRejection>,
) -> Result<Json<AuditResult>, AppError> {
    let Json(req) = body?;
    Ok(Json(state.auditor.audit(&req.text).await?))
}

async fn handle_audit_clauses(
    State(state): State<AppState>,
    body: Result<Json<AuditRequest>, JsonRejection>,
) -> Result<Json<ClauseAudit>, AppError> {
    let Json(req) = body?;
    Ok(Json(state.auditor.audit_clauses(&req.text).await?))
}

async fn handle_check_clause(
    State(state): State<AppState>,
    body: Result<Json<ClauseRequest>, JsonRejection>,
) -> Result<Json<ClauseCheck>, AppError> {
    let Json(req) = body?;
    Ok(Json(state.auditor.check_clause(&req.clause).await?))
}

async fn handle_find_source(
    State(state): State<AppState>,
    body: Result<Json<ClauseRequest>, JsonRejection>,
) -> Result<Json<SourceExcerpt>, AppError> {
    let Json(req) = body?;
    state
        .auditor
        .find_source(&req.clause)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("no reference passage found; is the index empty?"))
}

async fn handle_extract(
    State(state): State<AppState>,
    body: Result<Json<AuditRequest>, JsonRejection>,
) -> Result<Json<ProductSummary>, AppError> {
    let Json(req) = body?;
    Ok(Json(state.auditor.extract(&req.text).await?))
}
