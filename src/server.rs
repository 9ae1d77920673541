//! Reconciliation HTTP server.
//!
//! Accepts CSV uploads and reconciles them against the external catalog.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Reconcile with the concurrent policy |
//! | `POST` | `/upload-seq` | Reconcile with the sequential, fail-fast policy |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Uploads are `multipart/form-data` with the CSV in a field named `file`.
//! The optional `X-Batch-Size` header overrides the configured batch size
//! when it holds an integer in `[1, 1000]`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "file is required" } }
//! ```
//!
//! Error codes: `bad_request` (400, also returned when the upload needs
//! catalog pages past `u32::MAX`), `invalid_csv` (400),
//! `external_api_failure` (502), `comparison_failure` (500), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front-ends can
//! upload directly.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, Dispatch};

use crate::config::Config;
use crate::decode::decode_records;
use crate::dispatch::{BatchError, DispatchError, DispatchPolicy};
use crate::reconcile::{ReconcileError, ReconcileReport, Reconciler};

/// Header carrying the per-request batch size override.
pub const BATCH_SIZE_HEADER: &str = "x-batch-size";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    reconciler: Arc<Reconciler>,
}

/// Starts the HTTP server and runs until the process is terminated.
pub async fn run_server(config: &Config, logger: Dispatch) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let reconciler = Reconciler::from_config(Arc::new(config.clone()), logger)?;
    let app = router(reconciler);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Reconcile server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the router. Exposed so tests can drive it without a socket.
pub fn router(reconciler: Reconciler) -> Router {
    let body_limit = reconciler.config().server.max_upload_bytes;
    let state = AppState {
        reconciler: Arc::new(reconciler),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/upload", post(handle_upload))
        .route("/upload-seq", post(handle_upload_sequential))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

/// JSON error response body: `{"error": {"code": ..., "message": ...}}`.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"invalid_csv"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    /// HTTP status sent with the body.
    status: StatusCode,
    /// One of the codes listed in the module docs.
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Plan(e) => bad_request(e.to_string()),
            ReconcileError::Dispatch(e) => e.into(),
        }
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        let message = err.to_string();
        match err.source {
            BatchError::Fetch(_) => {
                AppError::new(StatusCode::BAD_GATEWAY, "external_api_failure", message)
            }
            BatchError::Compare(_) => AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "comparison_failure",
                message,
            ),
            BatchError::Panicked(_) => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
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

// ============ POST /upload, /upload-seq ============

async fn handle_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<ReconcileReport>, AppError> {
    upload(state, headers, multipart, DispatchPolicy::Concurrent).await
}

async fn handle_upload_sequential(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<ReconcileReport>, AppError> {
    upload(state, headers, multipart, DispatchPolicy::Sequential).await
}

async fn upload(
    state: AppState,
    headers: HeaderMap,
    multipart: Multipart,
    policy: DispatchPolicy,
) -> Result<Json<ReconcileReport>, AppError> {
    let requested = requested_batch_size(&headers);
    let batch_size = state.reconciler.batch_size(requested.as_deref());

    let csv = read_file_field(multipart).await?;
    let records = decode_records(csv.as_slice())
        .map_err(|e| AppError::new(StatusCode::BAD_REQUEST, "invalid_csv", e.to_string()))?;

    let report = state.reconciler.reconcile(records, batch_size, policy).await?;
    Ok(Json(report))
}

/// The raw `X-Batch-Size` value. Non-ASCII bytes are kept (lossily) so the
/// value is reported as invalid rather than treated as absent.
fn requested_batch_size(headers: &HeaderMap) -> Option<Cow<'_, str>> {
    headers
        .get(BATCH_SIZE_HEADER)
        .map(|v| String::from_utf8_lossy(v.as_bytes()))
}

/// Returns the bytes of the `file` multipart field.
async fn read_file_field(mut multipart: Multipart) -> Result<Vec<u8>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("cannot read file: {}", e)))?;
            return Ok(bytes.to_vec());
        }
    }
    Err(bad_request("file is required"))
}
