use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::question::{Difficulty, Question};
use crate::services::grading_service::GradedQuestion;
use crate::services::session_service::{AnswerFeedback, QuizSession, SessionStatus};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GenerateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub topic: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[validate(range(min = 1))]
    pub num_questions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAnswerRequest {
    pub option: usize,
}

/// A question as shown while answering; the correct index stays hidden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub position: usize,
    pub number: usize,
    pub question: String,
    pub options: Vec<String>,
}

impl QuestionView {
    pub fn new(position: usize, question: &Question) -> Self {
        Self {
            position,
            number: position + 1,
            question: question.question.clone(),
            options: question.options.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub status: SessionStatus,
    pub topic: String,
    pub difficulty: Difficulty,
    pub total_questions: usize,
    pub answered: usize,
    pub current_question: Option<QuestionView>,
    pub ready_to_finish: bool,
}

impl SessionView {
    pub fn from_session(id: Uuid, session: &QuizSession) -> Self {
        let current_question = session
            .current_position()
            .zip(session.current_question())
            .map(|(pos, q)| QuestionView::new(pos, q));
        Self {
            id,
            status: session.status(),
            topic: session.request().topic.clone(),
            difficulty: session.request().difficulty,
            total_questions: session.total_questions(),
            answered: session.answered(),
            current_question,
            ready_to_finish: session.is_ready_to_finish(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
    pub feedback: AnswerFeedback,
    pub session: SessionView,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinishResponse {
    pub attempt_id: i64,
    pub topic: String,
    pub difficulty: Difficulty,
    pub raw_score: i32,
    pub question_count: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub percentage: rust_decimal::Decimal,
    pub grade: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub breakdown: Vec<GradedQuestion>,
}
