use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::models::attempt::AnswerRecord;
use crate::models::question::Quiz;

/// Decimal places kept on every stored or displayed percentage.
pub const PERCENTAGE_SCALE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Score {
    pub raw: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub percentage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradedQuestion {
    pub position: usize,
    pub question: String,
    pub options: Vec<String>,
    pub chosen_answer: Option<usize>,
    pub correct_answer: usize,
    pub is_correct: bool,
    pub explanation: Option<String>,
}

/// `raw / count * 100`, rounded half-to-even at two decimal places.
pub fn percentage_of(raw: i32, count: i32) -> Decimal {
    if count <= 0 {
        return round_percentage(Decimal::ZERO);
    }
    let exact = Decimal::from(raw) * Decimal::ONE_HUNDRED / Decimal::from(count);
    round_percentage(exact)
}

pub fn round_percentage(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(PERCENTAGE_SCALE, RoundingStrategy::MidpointNearestEven);
    // round_dp never widens the scale; pad so "60" is carried as "60.00"
    rounded.rescale(PERCENTAGE_SCALE);
    rounded
}

/// Band a percentage falls into; 80 and 60 are inclusive lower bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    Excellent,
    Good,
    KeepLearning,
}

impl Grade {
    pub fn from_percentage(percentage: Decimal) -> Self {
        if percentage >= Decimal::from(80) {
            Grade::Excellent
        } else if percentage >= Decimal::from(60) {
            Grade::Good
        } else {
            Grade::KeepLearning
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Grade::Excellent => "Excellent",
            Grade::Good => "Good",
            Grade::KeepLearning => "Keep Learning",
        }
    }
}

pub fn grade_label(percentage: Decimal) -> &'static str {
    Grade::from_percentage(percentage).label()
}

pub struct GradingService;

impl GradingService {
    pub fn score(quiz: &Quiz, answers: &AnswerRecord) -> Score {
        let raw = quiz
            .questions
            .iter()
            .enumerate()
            .filter(|(idx, q)| answers.get(*idx) == Some(q.correct_answer))
            .count();
        let raw = i32::try_from(raw).unwrap_or(i32::MAX);
        let count = i32::try_from(quiz.questions.len()).unwrap_or(i32::MAX);

        Score {
            raw,
            percentage: percentage_of(raw, count),
        }
    }

    pub fn breakdown(quiz: &Quiz, answers: &AnswerRecord) -> Vec<GradedQuestion> {
        quiz.questions
            .iter()
            .enumerate()
            .map(|(idx, q)| {
                let chosen = answers.get(idx);
                GradedQuestion {
                    position: idx + 1,
                    question: q.question.clone(),
                    options: q.options.clone(),
                    chosen_answer: chosen,
                    correct_answer: q.correct_answer,
                    is_correct: chosen == Some(q.correct_answer),
                    explanation: q.explanation.clone(),
                }
            })
            .collect()
    }
}
