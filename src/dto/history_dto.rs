use serde::{Deserialize, Serialize};

use crate::models::attempt::{Attempt, AttemptSummary};
use crate::services::grading_service::{GradedQuestion, GradingService};

pub const DEFAULT_HISTORY_LIMIT: i64 = 10;
/// Largest page the history endpoints hand out.
pub const MAX_HISTORY_LIMIT: i64 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

impl HistoryQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_HISTORY_LIMIT)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryListResponse {
    pub items: Vec<AttemptSummary>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptDetail {
    #[serde(flatten)]
    pub summary: AttemptSummary,
    pub breakdown: Vec<GradedQuestion>,
}

impl From<&Attempt> for AttemptDetail {
    fn from(attempt: &Attempt) -> Self {
        Self {
            summary: AttemptSummary::from(attempt),
            breakdown: GradingService::breakdown(&attempt.payload.quiz, &attempt.payload.answers),
        }
    }
}
