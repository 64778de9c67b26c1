use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::quiz_dto::{
    AnswerResponse, FinishResponse, GenerateQuizRequest, SessionView, SubmitAnswerRequest,
};
use crate::error::{Error, Result};
use crate::services::grading_service::{grade_label, GradingService};
use crate::services::session_service::{QuizRequest, QuizSession};
use crate::AppState;

#[axum::debug_handler]
pub async fn create_quiz(
    State(state): State<AppState>,
    Json(mut payload): Json<GenerateQuizRequest>,
) -> Result<Response> {
    payload.topic = payload.topic.trim().to_string();
    payload.validate()?;
    if payload.num_questions > state.max_questions {
        return Err(Error::BadRequest(format!(
            "num_questions must be between 1 and {}",
            state.max_questions
        )));
    }

    let request = QuizRequest {
        topic: payload.topic,
        difficulty: payload.difficulty,
        count: payload.num_questions,
    };
    let session = QuizSession::generate(request, &state.ai_service).await;
    if let Some(error) = session.error() {
        return Err(error.clone().into());
    }

    let view_source = session.clone();
    let id = state.sessions.insert(session)?;
    tracing::info!(session_id = %id, topic = %view_source.request().topic, "quiz session started");

    Ok((
        StatusCode::CREATED,
        Json(SessionView::from_session(id, &view_source)),
    )
        .into_response())
}

#[axum::debug_handler]
pub async fn get_quiz(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>> {
    let view = state
        .sessions
        .with_session(id, |session| Ok(SessionView::from_session(id, session)))?;
    Ok(Json(view))
}

#[axum::debug_handler]
pub async fn discard_quiz(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state
        .sessions
        .remove(id)?
        .ok_or_else(|| Error::NotFound(format!("Quiz session {} not found", id)))?;
    tracing::info!(session_id = %id, "quiz session discarded");
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn submit_answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<AnswerResponse>> {
    let response = state.sessions.with_session(id, |session| {
        let feedback = session.submit_answer(payload.option)?;
        Ok(AnswerResponse {
            feedback,
            session: SessionView::from_session(id, session),
        })
    })?;
    Ok(Json(response))
}

/// Scores the session and persists its single attempt.
///
/// The session leaves the registry before the save, so overlapping calls see
/// `NotFound`. A failed save puts it back Completed and the call can be repeated.
#[axum::debug_handler]
pub async fn finish_quiz(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FinishResponse>> {
    let (session, attempt) = state.sessions.checkout_completed(id)?;

    let saved = match state.history_service.save(&attempt).await {
        Ok(saved) => saved,
        Err(e) => {
            state.sessions.restore(id, session)?;
            return Err(e);
        }
    };
    tracing::info!(session_id = %id, attempt_id = saved.id, "quiz session finished");

    let breakdown = GradingService::breakdown(&saved.payload.quiz, &saved.payload.answers);
    Ok(Json(FinishResponse {
        attempt_id: saved.id,
        topic: saved.topic,
        difficulty: saved.difficulty,
        raw_score: saved.raw_score,
        question_count: saved.question_count,
        percentage: saved.percentage,
        grade: grade_label(saved.percentage).to_string(),
        created_at: saved.created_at,
        breakdown,
    }))
}
