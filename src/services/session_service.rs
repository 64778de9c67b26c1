use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::{Error, GenerationError, Result};
use crate::models::attempt::{AnswerRecord, AttemptPayload, NewAttempt};
use crate::models::question::{Difficulty, Question, Quiz};
use crate::services::ai_service::AIService;
use crate::services::grading_service::GradingService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizRequest {
    pub topic: String,
    pub difficulty: Difficulty,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Generating,
    Answering,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
enum Phase {
    Generating,
    Answering {
        quiz: Quiz,
        answers: AnswerRecord,
        current: usize,
    },
    Completed {
        attempt: NewAttempt,
    },
    Failed {
        error: GenerationError,
    },
}

/// Result of answering the current question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerFeedback {
    pub position: usize,
    pub selected: usize,
    pub is_correct: bool,
    pub correct_answer: usize,
    pub correct_option: String,
    pub explanation: Option<String>,
    pub remaining: usize,
}

/// One quiz lifecycle: Generating -> Answering -> Completed, or Generating -> Failed.
#[derive(Debug, Clone)]
pub struct QuizSession {
    request: QuizRequest,
    phase: Phase,
}

impl QuizSession {
    pub fn new(request: QuizRequest) -> Self {
        Self {
            request,
            phase: Phase::Generating,
        }
    }

    /// Runs the generator once and applies its outcome.
    pub async fn generate(request: QuizRequest, generator: &AIService) -> Self {
        let mut session = Self::new(request);
        let result = generator
            .generate_quiz(
                &session.request.topic,
                session.request.difficulty,
                session.request.count,
            )
            .await;
        if let Err(e) = session.on_generated(result) {
            tracing::error!(error = %e, "generation result was not applied");
        }
        session
    }

    pub fn on_generated(&mut self, result: std::result::Result<Quiz, GenerationError>) -> Result<()> {
        if !matches!(self.phase, Phase::Generating) {
            return Err(Error::InvalidOperation(format!(
                "cannot apply a generation result while {:?}",
                self.status()
            )));
        }

        self.phase = match result {
            Ok(quiz) => Phase::Answering {
                quiz,
                answers: AnswerRecord::new(),
                current: 0,
            },
            Err(error) => {
                tracing::warn!(topic = %self.request.topic, error = %error, "quiz generation failed");
                Phase::Failed { error }
            }
        };
        Ok(())
    }

    pub fn request(&self) -> &QuizRequest {
        &self.request
    }

    pub fn status(&self) -> SessionStatus {
        match self.phase {
            Phase::Generating => SessionStatus::Generating,
            Phase::Answering { .. } => SessionStatus::Answering,
            Phase::Completed { .. } => SessionStatus::Completed,
            Phase::Failed { .. } => SessionStatus::Failed,
        }
    }

    pub fn error(&self) -> Option<&GenerationError> {
        match &self.phase {
            Phase::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn quiz(&self) -> Option<&Quiz> {
        match &self.phase {
            Phase::Answering { quiz, .. } => Some(quiz),
            Phase::Completed { attempt } => Some(&attempt.payload.quiz),
            _ => None,
        }
    }

    pub fn answers(&self) -> Option<&AnswerRecord> {
        match &self.phase {
            Phase::Answering { answers, .. } => Some(answers),
            Phase::Completed { attempt } => Some(&attempt.payload.answers),
            _ => None,
        }
    }

    pub fn attempt(&self) -> Option<&NewAttempt> {
        match &self.phase {
            Phase::Completed { attempt } => Some(attempt),
            _ => None,
        }
    }

    /// Position of the next question to answer, 0-based.
    pub fn current_position(&self) -> Option<usize> {
        match &self.phase {
            Phase::Answering { current, .. } => Some(*current),
            _ => None,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        match &self.phase {
            Phase::Answering { quiz, current, .. } => quiz.questions.get(*current),
            _ => None,
        }
    }

    pub fn total_questions(&self) -> usize {
        self.quiz().map(Quiz::len).unwrap_or(self.request.count)
    }

    pub fn answered(&self) -> usize {
        self.answers().map(AnswerRecord::len).unwrap_or(0)
    }

    /// True once every question has an answer and `finish` may be called.
    pub fn is_ready_to_finish(&self) -> bool {
        matches!(&self.phase, Phase::Answering { quiz, current, .. } if *current >= quiz.len())
    }

    pub fn submit_answer(&mut self, option: usize) -> Result<AnswerFeedback> {
        let status = self.status();
        let Phase::Answering {
            quiz,
            answers,
            current,
        } = &mut self.phase
        else {
            return Err(Error::InvalidOperation(format!(
                "cannot submit an answer while {:?}",
                status
            )));
        };

        let Some(question) = quiz.questions.get(*current) else {
            return Err(Error::InvalidOperation(format!(
                "all {} questions have already been answered",
                quiz.len()
            )));
        };

        if option >= question.options.len() {
            return Err(Error::BadRequest(format!(
                "option {} does not exist; question {} has {} options",
                option,
                *current + 1,
                question.options.len()
            )));
        }

        let feedback = AnswerFeedback {
            position: *current,
            selected: option,
            is_correct: option == question.correct_answer,
            correct_answer: question.correct_answer,
            correct_option: question.correct_option().to_string(),
            explanation: question.explanation.clone(),
            remaining: quiz.len() - *current - 1,
        };

        answers.record(*current, option);
        *current += 1;
        Ok(feedback)
    }

    /// Scores the quiz and moves to Completed.
    ///
    /// Returns the already built attempt when the session is Completed.
    pub fn finish(&mut self) -> Result<&NewAttempt> {
        let attempt = match &self.phase {
            Phase::Completed { .. } => None,
            Phase::Answering { quiz, answers, .. } => {
                if answers.len() < quiz.len() {
                    return Err(Error::IncompleteQuiz {
                        answered: answers.len(),
                        total: quiz.len(),
                    });
                }
                let score = GradingService::score(quiz, answers);
                Some(NewAttempt {
                    topic: quiz.topic.clone(),
                    difficulty: quiz.difficulty,
                    question_count: i32::try_from(quiz.len()).map_err(|_| {
                        Error::Internal("question count exceeds storage range".to_string())
                    })?,
                    raw_score: score.raw,
                    percentage: score.percentage,
                    payload: AttemptPayload {
                        quiz: quiz.clone(),
                        answers: answers.clone(),
                    },
                })
            }
            Phase::Generating | Phase::Failed { .. } => {
                return Err(Error::InvalidOperation(format!(
                    "cannot finish a session while {:?}",
                    self.status()
                )));
            }
        };

        if let Some(attempt) = attempt {
            tracing::info!(
                topic = %attempt.topic,
                raw_score = attempt.raw_score,
                percentage = %attempt.percentage,
                "quiz session completed"
            );
            self.phase = Phase::Completed { attempt };
        }

        match &self.phase {
            Phase::Completed { attempt } => Ok(attempt),
            _ => Err(Error::Internal("session did not reach Completed".to_string())),
        }
    }
}

struct SessionEntry {
    session: QuizSession,
    touched_at: DateTime<Utc>,
}

/// In-memory sessions addressed by handle.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<Uuid, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, SessionEntry>>> {
        self.sessions
            .lock()
            .map_err(|_| Error::Internal("session registry lock poisoned".to_string()))
    }

    pub fn insert(&self, session: QuizSession) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.lock()?.insert(
            id,
            SessionEntry {
                session,
                touched_at: Utc::now(),
            },
        );
        Ok(id)
    }

    /// Runs `f` against the session while holding the registry lock.
    pub fn with_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut QuizSession) -> Result<T>,
    ) -> Result<T> {
        let mut sessions = self.lock()?;
        let entry = sessions
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Quiz session {} not found", id)))?;
        entry.touched_at = Utc::now();
        f(&mut entry.session)
    }

    /// Finishes the session and takes it out of the registry in one locked step.
    ///
    /// Only one caller can hold a given session's attempt; the rest see `NotFound`.
    /// A session that cannot finish stays registered.
    pub fn checkout_completed(&self, id: Uuid) -> Result<(QuizSession, NewAttempt)> {
        let mut sessions = self.lock()?;
        let entry = sessions
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Quiz session {} not found", id)))?;
        entry.touched_at = Utc::now();
        let attempt = entry.session.finish()?.clone();
        let entry = sessions
            .remove(&id)
            .ok_or_else(|| Error::Internal(format!("session {} vanished under lock", id)))?;
        Ok((entry.session, attempt))
    }

    /// Puts a checked-out session back under its original handle.
    pub fn restore(&self, id: Uuid, session: QuizSession) -> Result<()> {
        self.lock()?.insert(
            id,
            SessionEntry {
                session,
                touched_at: Utc::now(),
            },
        );
        Ok(())
    }

    pub fn remove(&self, id: Uuid) -> Result<Option<QuizSession>> {
        Ok(self.lock()?.remove(&id).map(|e| e.session))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops sessions untouched for longer than `max_idle`; returns how many went.
    pub fn prune_idle(&self, max_idle: Duration) -> Result<usize> {
        let cutoff = Utc::now() - max_idle;
        let mut sessions = self.lock()?;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.touched_at >= cutoff);
        Ok(before - sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn request(count: usize) -> QuizRequest {
        QuizRequest {
            topic: "Astronomy".into(),
            difficulty: Difficulty::Medium,
            count,
        }
    }

    fn quiz(count: usize) -> Quiz {
        Quiz {
            topic: "Astronomy".into(),
            difficulty: Difficulty::Medium,
            questions: (0..count)
                .map(|i| Question {
                    question: format!("Q{}", i + 1),
                    options: vec!["w".into(), "x".into(), "y".into(), "z".into()],
                    correct_answer: 1,
                    explanation: Some(format!("Because {}", i + 1)),
                })
                .collect(),
        }
    }

    fn answering(count: usize) -> QuizSession {
        let mut session = QuizSession::new(request(count));
        session.on_generated(Ok(quiz(count))).unwrap();
        session
    }

    #[test]
    fn starts_in_generating() {
        let session = QuizSession::new(request(3));
        assert_eq!(session.status(), SessionStatus::Generating);
        assert!(session.quiz().is_none());
        assert_eq!(session.total_questions(), 3);
    }

    #[test]
    fn generation_success_moves_to_answering() {
        let session = answering(3);
        assert_eq!(session.status(), SessionStatus::Answering);
        assert_eq!(session.current_position(), Some(0));
        assert_eq!(session.answered(), 0);
        assert_eq!(session.current_question().unwrap().question, "Q1");
    }

    #[test]
    fn generation_failure_moves_to_failed() {
        let mut session = QuizSession::new(request(3));
        session
            .on_generated(Err(GenerationError::ServiceUnavailable("timed out".into())))
            .unwrap();
        assert_eq!(session.status(), SessionStatus::Failed);
        assert!(matches!(
            session.error(),
            Some(GenerationError::ServiceUnavailable(_))
        ));
        assert!(session.quiz().is_none());
        assert!(matches!(session.submit_answer(0), Err(Error::InvalidOperation(_))));
        assert!(matches!(session.finish(), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn generation_result_applies_only_once() {
        let mut session = answering(2);
        let err = session.on_generated(Ok(quiz(2))).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn submit_records_and_advances() {
        let mut session = answering(2);
        let fb = session.submit_answer(1).unwrap();
        assert!(fb.is_correct);
        assert_eq!(fb.position, 0);
        assert_eq!(fb.correct_option, "x");
        assert_eq!(fb.remaining, 1);
        assert_eq!(session.current_position(), Some(1));

        let fb = session.submit_answer(3).unwrap();
        assert!(!fb.is_correct);
        assert_eq!(fb.explanation.as_deref(), Some("Because 2"));
        assert_eq!(fb.remaining, 0);
        assert!(session.is_ready_to_finish());
    }

    #[test]
    fn submitting_past_the_last_question_is_invalid() {
        let mut session = answering(1);
        session.submit_answer(0).unwrap();
        let err = session.submit_answer(0).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
        assert_eq!(session.answered(), 1);
    }

    #[test]
    fn out_of_range_option_is_rejected_without_advancing() {
        let mut session = answering(2);
        let err = session.submit_answer(4).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
        assert_eq!(session.current_position(), Some(0));
        assert_eq!(session.answered(), 0);
    }

    #[test]
    fn finishing_early_is_incomplete() {
        let mut session = answering(3);
        session.submit_answer(1).unwrap();
        match session.finish() {
            Err(Error::IncompleteQuiz { answered, total }) => {
                assert_eq!(answered, 1);
                assert_eq!(total, 3);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(session.status(), SessionStatus::Answering);
    }

    #[test]
    fn five_questions_three_correct() {
        let mut session = answering(5);
        for option in [1, 1, 1, 0, 2] {
            session.submit_answer(option).unwrap();
        }
        let attempt = session.finish().unwrap().clone();
        assert_eq!(attempt.raw_score, 3);
        assert_eq!(attempt.question_count, 5);
        assert_eq!(attempt.percentage, Decimal::from_str("60.00").unwrap());
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(attempt.payload.answers.get(4), Some(2));
    }

    #[test]
    fn finish_is_idempotent_once_completed() {
        let mut session = answering(1);
        session.submit_answer(1).unwrap();
        let first = session.finish().unwrap().clone();
        let second = session.finish().unwrap().clone();
        assert_eq!(first, second);
        assert!(matches!(session.submit_answer(1), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn registry_round_trip_and_removal() {
        let registry = SessionRegistry::new();
        let id = registry.insert(answering(2)).unwrap();
        let fb = registry
            .with_session(id, |s| s.submit_answer(1))
            .unwrap();
        assert!(fb.is_correct);
        assert_eq!(registry.len(), 1);

        let removed = registry.remove(id).unwrap().unwrap();
        assert_eq!(removed.answered(), 1);
        assert!(registry.is_empty());
        assert!(matches!(
            registry.with_session(id, |s| Ok(s.status())),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn checkout_hands_out_the_attempt_once() {
        let registry = SessionRegistry::new();
        let id = registry.insert(answering(2)).unwrap();
        registry.with_session(id, |s| s.submit_answer(1)).unwrap();
        registry.with_session(id, |s| s.submit_answer(0)).unwrap();

        let (session, attempt) = registry.checkout_completed(id).unwrap();
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(attempt.raw_score, 1);
        assert!(registry.is_empty());
        assert!(matches!(
            registry.checkout_completed(id),
            Err(Error::NotFound(_))
        ));

        // a failed save puts it back and the same attempt comes out again
        registry.restore(id, session).unwrap();
        let (_, again) = registry.checkout_completed(id).unwrap();
        assert_eq!(again, attempt);
    }

    #[test]
    fn checkout_of_unfinished_session_keeps_it_registered() {
        let registry = SessionRegistry::new();
        let id = registry.insert(answering(2)).unwrap();
        assert!(matches!(
            registry.checkout_completed(id),
            Err(Error::IncompleteQuiz { answered: 0, total: 2 })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn concurrent_checkouts_yield_one_attempt() {
        let registry = SessionRegistry::new();
        let id = registry.insert(answering(1)).unwrap();
        registry.with_session(id, |s| s.submit_answer(1)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.checkout_completed(id).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn prune_drops_only_idle_sessions() {
        let registry = SessionRegistry::new();
        registry.insert(answering(1)).unwrap();
        assert_eq!(registry.prune_idle(Duration::minutes(5)).unwrap(), 0);
        assert_eq!(registry.prune_idle(Duration::zero() - Duration::seconds(1)).unwrap(), 1);
        assert!(registry.is_empty());
    }
}
