use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use crate::dto::history_dto::{HistoryQuery, MAX_HISTORY_LIMIT};
use crate::services::export_service::ExportService;
use crate::services::report_service::ReportService;
use crate::error::{Error, Result, StorageError};
use crate::AppState;

/// Render a stored attempt as a PDF report
pub async fn export_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let attempt = match state.history_service.load(id).await {
        Ok(attempt) => attempt,
        Err(Error::Storage(StorageError::Serialization(msg))) => {
            return Err(Error::Render(format!("stored payload is unreadable: {}", msg)));
        }
        Err(e) => return Err(e),
    };
    let buffer = ReportService::render_pdf(&attempt)?;

    let filename = format!(
        "quiz_{}_{}.pdf",
        attempt.id,
        attempt.created_at.format("%Y%m%d")
    );
    let disposition = format!("attachment; filename=\"{}\"", filename);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        buffer,
    ))
}

/// Export recent attempts as XLSX
pub async fn export_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse> {
    let limit = query.limit.unwrap_or(MAX_HISTORY_LIMIT).clamp(0, MAX_HISTORY_LIMIT);
    let attempts = state.history_service.list_recent(limit).await?;

    let buffer = ExportService::generate_history_xlsx(&attempts)?;
    let filename = format!(
        "quiz_history_{}.xlsx",
        chrono::Utc::now().format("%Y%m%d_%H%M")
    );
    let disposition = format!("attachment; filename=\"{}\"", filename);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        buffer,
    ))
}
