pub mod config;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use estados_core::{Money, NormalizedRow};
use estados_import::{AmountWarning, Bank, ParseError, SerializeError, StatementProcessor};
use serde::Serialize;
use tower_http::trace::TraceLayer;

pub use config::Config;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub struct AppState {
    pub processor: StatementProcessor,
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/statements/{bank}", post(process_statement))
        .route("/api/statements/{bank}/export", post(export_statement))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: message.into() }
    }
}

impl From<ParseError> for AppError {
    fn from(e: ParseError) -> Self {
        let status = if e.is_schema() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else {
            StatusCode::BAD_REQUEST
        };
        Self { status, message: e.to_string() }
    }
}

impl From<SerializeError> for AppError {
    fn from(e: SerializeError) -> Self {
        tracing::error!("Export failed: {e}");
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: e.to_string() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StatementResponse {
    pub bank: Bank,
    pub total: Money,
    /// `$12,345.67`
    pub total_display: String,
    pub rows: Vec<NormalizedRow>,
    pub warnings: Vec<AmountWarning>,
}

#[derive(Debug, Serialize)]
pub struct RejectedResponse {
    pub error: String,
    pub total_display: String,
}

async fn health() -> &'static str {
    "ok"
}

fn parse_bank(raw: &str) -> Result<Bank, AppError> {
    raw.parse().map_err(AppError::not_found)
}

/// Pulls the `file` field out of a multipart upload.
async fn read_upload(mut multipart: Multipart) -> Result<Vec<u8>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("Failed to read form field: {e}")))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::bad_request(format!("Failed to read file data: {e}")))?;
            return Ok(bytes.to_vec());
        }
    }
    Err(AppError::bad_request("Missing file field"))
}

/// POST /api/statements/{bank} - classify an upload and return rows plus total.
///
/// A rejected statement is answered with the message and a `$0.00` total:
/// 422 when the layout is wrong, 400 when the bytes can't be read at all.
/// Same statuses as the export endpoint.
async fn process_statement(
    State(state): State<Arc<AppState>>,
    Path(bank): Path<String>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let bank = parse_bank(&bank)?;
    let data = read_upload(multipart).await?;

    let report = state.processor.process_or_report(bank, &data);
    let response = match report.statement {
        Some(statement) => Json(StatementResponse {
            bank,
            total: statement.total,
            total_display: statement.total_display(),
            rows: statement.table.rows,
            warnings: statement.warnings,
        })
        .into_response(),
        None => {
            let status = if report.schema {
                StatusCode::UNPROCESSABLE_ENTITY
            } else {
                StatusCode::BAD_REQUEST
            };
            (
                status,
                    Json(RejectedResponse {
                    error: report.error.unwrap_or_default(),
                    total_display: report.total.to_string(),
                }),
            )
                .into_response()
        }
    };
    Ok(response)
}

/// POST /api/statements/{bank}/export - the classified upload as an xlsx download.
async fn export_statement(
    State(state): State<Arc<AppState>>,
    Path(bank): Path<String>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let bank = parse_bank(&bank)?;
    let data = read_upload(multipart).await?;

    let statement = state.processor.process(bank, &data)?;
    let bytes = statement.to_xlsx()?;
    let disposition = format!("attachment; filename=\"{}\"", statement.export_filename());

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
