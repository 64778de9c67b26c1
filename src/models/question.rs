use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Minimum number of answer options a question must carry.
pub const MIN_OPTIONS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Question {
    /// Checks the structural invariants of a single question.
    pub fn check(&self) -> Result<(), String> {
        if self.question.trim().is_empty() {
            return Err("question text is empty".to_string());
        }
        if self.options.len() < MIN_OPTIONS {
            return Err(format!(
                "expected at least {} options, got {}",
                MIN_OPTIONS,
                self.options.len()
            ));
        }
        if let Some(pos) = self.options.iter().position(|o| o.trim().is_empty()) {
            return Err(format!("option {} is empty", pos));
        }
        if self.correct_answer >= self.options.len() {
            return Err(format!(
                "correct_answer {} is out of range for {} options",
                self.correct_answer,
                self.options.len()
            ));
        }
        Ok(())
    }

    pub fn correct_option(&self) -> &str {
        self.options
            .get(self.correct_answer)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub topic: String,
    pub difficulty: Difficulty,
    pub questions: Vec<Question>,
}

impl Quiz {
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Checks every question plus the expected question count.
    pub fn check(&self, expected_count: usize) -> Result<(), String> {
        if self.questions.len() != expected_count {
            return Err(format!(
                "expected {} questions, got {}",
                expected_count,
                self.questions.len()
            ));
        }
        for (idx, q) in self.questions.iter().enumerate() {
            q.check().map_err(|e| format!("question {}: {}", idx + 1, e))?;
        }
        Ok(())
    }
}

/// Letter shown in front of an option, `A` for index 0.
pub fn option_letter(index: usize) -> char {
    u8::try_from(index)
        .ok()
        .filter(|i| *i < 26)
        .map(|i| (b'A' + i) as char)
        .unwrap_or('?')
}
