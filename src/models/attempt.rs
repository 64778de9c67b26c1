use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;

use crate::error::StorageError;
use crate::models::question::{Difficulty, Quiz};

/// Selected option per question position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerRecord {
    answers: BTreeMap<usize, usize>,
}

impl AnswerRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, position: usize, option: usize) {
        self.answers.insert(position, option);
    }

    pub fn get(&self, position: usize) -> Option<usize> {
        self.answers.get(&position).copied()
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.answers.iter().map(|(p, o)| (*p, *o))
    }
}

impl FromIterator<(usize, usize)> for AnswerRecord {
    fn from_iter<I: IntoIterator<Item = (usize, usize)>>(iter: I) -> Self {
        Self {
            answers: iter.into_iter().collect(),
        }
    }
}

/// Serialized form stored in `quiz_history.quiz_payload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptPayload {
    pub quiz: Quiz,
    pub answers: AnswerRecord,
}

impl AttemptPayload {
    pub fn to_json(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self, StorageError> {
        serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

/// A scored attempt that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAttempt {
    pub topic: String,
    pub difficulty: Difficulty,
    pub question_count: i32,
    pub raw_score: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub percentage: Decimal,
    pub payload: AttemptPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub id: i64,
    pub topic: String,
    pub difficulty: Difficulty,
    pub question_count: i32,
    pub raw_score: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub percentage: Decimal,
    pub payload: AttemptPayload,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AttemptRow {
    pub id: i64,
    pub topic: String,
    pub difficulty: String,
    pub question_count: i32,
    pub raw_score: i32,
    pub percentage: Decimal,
    pub quiz_payload: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = StorageError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        let difficulty = row
            .difficulty
            .parse::<Difficulty>()
            .map_err(StorageError::Serialization)?;
        let payload = AttemptPayload::from_json(&row.quiz_payload)?;
        Ok(Attempt {
            id: row.id,
            topic: row.topic,
            difficulty,
            question_count: row.question_count,
            raw_score: row.raw_score,
            percentage: row.percentage,
            payload,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AttemptSummaryRow {
    pub id: i64,
    pub topic: String,
    pub difficulty: String,
    pub question_count: i32,
    pub raw_score: i32,
    pub percentage: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub id: i64,
    pub topic: String,
    pub difficulty: Difficulty,
    pub question_count: i32,
    pub raw_score: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub percentage: Decimal,
    pub grade: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AttemptSummaryRow> for AttemptSummary {
    type Error = StorageError;

    fn try_from(row: AttemptSummaryRow) -> Result<Self, Self::Error> {
        let difficulty = row
            .difficulty
            .parse::<Difficulty>()
            .map_err(StorageError::Serialization)?;
        Ok(AttemptSummary {
            id: row.id,
            topic: row.topic,
            difficulty,
            question_count: row.question_count,
            raw_score: row.raw_score,
            grade: crate::services::grading_service::grade_label(row.percentage).to_string(),
            percentage: row.percentage,
            created_at: row.created_at,
        })
    }
}

impl From<&Attempt> for AttemptSummary {
    fn from(a: &Attempt) -> Self {
        AttemptSummary {
            id: a.id,
            topic: a.topic.clone(),
            difficulty: a.difficulty,
            question_count: a.question_count,
            raw_score: a.raw_score,
            percentage: a.percentage,
            grade: crate::services::grading_service::grade_label(a.percentage).to_string(),
            created_at: a.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuizStatistics {
    pub total_quizzes: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub average_percentage: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub best_percentage: Decimal,
    pub total_questions_answered: i64,
}
