use axum::{
    extract::{Path, Query, State},
    response::Json,
};

use crate::dto::history_dto::{
    AttemptDetail, HistoryListResponse, HistoryQuery, MAX_HISTORY_LIMIT,
};
use crate::error::{Error, Result};
use crate::models::attempt::QuizStatistics;
use crate::AppState;

#[axum::debug_handler]
pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryListResponse>> {
    let limit = query.limit();
    if !(0..=MAX_HISTORY_LIMIT).contains(&limit) {
        return Err(Error::BadRequest(format!(
            "limit must be between 0 and {}",
            MAX_HISTORY_LIMIT
        )));
    }
    let items = state.history_service.list_recent(limit).await?;
    Ok(Json(HistoryListResponse {
        count: items.len(),
        items,
    }))
}

#[axum::debug_handler]
pub async fn history_stats(State(state): State<AppState>) -> Result<Json<QuizStatistics>> {
    Ok(Json(state.history_service.statistics().await?))
}

#[axum::debug_handler]
pub async fn get_attempt(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<AttemptDetail>> {
    let attempt = state.history_service.load(id).await?;
    Ok(Json(AttemptDetail::from(&attempt)))
}
