use crate::config::{Config, DEFAULT_AI_BASE_URL, DEFAULT_AI_MODEL};
use crate::error::GenerationError;
use crate::models::question::{Difficulty, Question, Quiz};
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;

const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawQuizData {
    questions: Vec<RawQuestion>,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    question: String,
    options: Vec<String>,
    correct_answer: i64,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Clone)]
pub struct AIService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    shuffle_options: bool,
}

impl AIService {
    pub fn new(api_key: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            base_url: DEFAULT_AI_BASE_URL.to_string(),
            model: DEFAULT_AI_MODEL.to_string(),
            timeout: Duration::from_secs(120),
            shuffle_options: true,
        }
    }

    pub fn from_config(config: &Config, client: Client) -> Self {
        Self::new(config.ai_api_key.clone(), client)
            .with_endpoint(&config.ai_base_url, &config.ai_model)
            .with_timeout(Duration::from_secs(config.ai_timeout_secs))
            .with_option_shuffling(config.shuffle_options)
    }

    pub fn with_endpoint(mut self, base_url: &str, model: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self.model = model.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_option_shuffling(mut self, enabled: bool) -> Self {
        self.shuffle_options = enabled;
        self
    }

    /// Generates a validated quiz with exactly `count` questions.
    ///
    /// Performs one outbound call and never retries.
    pub async fn generate_quiz(
        &self,
        topic: &str,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Quiz, GenerationError> {
        if count == 0 {
            return Err(GenerationError::InvalidRequest(
                "requested question count must be positive".to_string(),
            ));
        }

        tracing::info!(topic, %difficulty, count, model = %self.model, "requesting quiz generation");
        let payload = build_generation_request(topic, difficulty, count);
        let text = self.generate_content(payload).await?;

        let mut quiz = parse_quiz(&text, topic, difficulty, count).map_err(|e| {
            tracing::warn!(error = %e, "AI response failed validation");
            e
        })?;
        if self.shuffle_options {
            shuffle_quiz_options(&mut quiz, &mut rand::thread_rng());
        }

        tracing::info!(questions = quiz.len(), "quiz generated");
        Ok(quiz)
    }

    async fn generate_content(&self, payload: JsonValue) -> Result<String, GenerationError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, timeout = e.is_timeout(), "AI request failed");
                GenerationError::ServiceUnavailable(describe_transport_error(&e))
            })?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| GenerationError::ServiceUnavailable(describe_transport_error(&e)))?;

        if !status.is_success() {
            tracing::warn!(%status, "AI service returned an error status");
            return Err(classify_status(status, &body));
        }

        extract_candidate_text(&body)
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("could not connect: {}", err)
    } else {
        err.to_string()
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}

pub fn classify_status(status: StatusCode, body: &str) -> GenerationError {
    let detail = format!("HTTP {}: {}", status.as_u16(), truncate(body));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            GenerationError::AuthenticationFailed(detail)
        }
        StatusCode::BAD_REQUEST
            if body.contains("API_KEY_INVALID") || body.contains("API key not valid") =>
        {
            GenerationError::AuthenticationFailed(detail)
        }
        _ => GenerationError::ServiceUnavailable(detail),
    }
}

fn extract_candidate_text(body: &str) -> Result<String, GenerationError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body).map_err(|e| {
        GenerationError::InvalidResponseShape(format!("response is not valid JSON: {}", e))
    })?;

    let candidate = parsed.candidates.into_iter().next().ok_or_else(|| {
        GenerationError::InvalidResponseShape("response contained no candidates".to_string())
    })?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(GenerationError::InvalidResponseShape(format!(
            "candidate has no text (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(text)
}

pub fn build_generation_request(topic: &str, difficulty: Difficulty, count: usize) -> JsonValue {
    let system_prompt = format!(
        "You are an expert quiz maker. Create {count} multiple-choice questions about {topic} \
         at {difficulty} difficulty. Each question should have exactly 4 options (A, B, C, D). \
         Provide the correct answer as an index (0 for A, 1 for B, 2 for C, 3 for D). \
         Include a brief explanation for each correct answer. \
         Make sure questions are educational and appropriately challenging. \
         Respond with a JSON object containing a 'questions' array.",
        count = count,
        topic = topic,
        difficulty = difficulty.as_str(),
    );
    let prompt = format!(
        "Generate {} {} multiple-choice questions about {}.",
        count,
        difficulty.as_str(),
        topic
    );

    serde_json::json!({
        "systemInstruction": { "parts": [{ "text": system_prompt }] },
        "contents": [
            { "role": "user", "parts": [{ "text": prompt }] }
        ],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "questions": {
                        "type": "ARRAY",
                        "items": {
                            "type": "OBJECT",
                            "properties": {
                                "question": { "type": "STRING" },
                                "options": { "type": "ARRAY", "items": { "type": "STRING" } },
                                "correct_answer": { "type": "INTEGER" },
                                "explanation": { "type": "STRING" }
                            },
                            "required": ["question", "options", "correct_answer", "explanation"]
                        }
                    }
                },
                "required": ["questions"]
            }
        }
    })
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Parses the model's JSON text into a quiz and enforces every question invariant.
pub fn parse_quiz(
    text: &str,
    topic: &str,
    difficulty: Difficulty,
    count: usize,
) -> Result<Quiz, GenerationError> {
    let raw: RawQuizData = serde_json::from_str(strip_code_fence(text)).map_err(|e| {
        GenerationError::InvalidResponseShape(format!("quiz JSON does not match schema: {}", e))
    })?;

    let questions = raw
        .questions
        .into_iter()
        .enumerate()
        .map(|(idx, q)| {
            let correct_answer = usize::try_from(q.correct_answer).map_err(|_| {
                GenerationError::InvalidResponseShape(format!(
                    "question {}: negative correct_answer {}",
                    idx + 1,
                    q.correct_answer
                ))
            })?;
            Ok(Question {
                question: q.question.trim().to_string(),
                options: q.options.into_iter().map(|o| o.trim().to_string()).collect(),
                correct_answer,
                explanation: q
                    .explanation
                    .map(|e| e.trim().to_string())
                    .filter(|e| !e.is_empty()),
            })
        })
        .collect::<Result<Vec<_>, GenerationError>>()?;

    let quiz = Quiz {
        topic: topic.trim().to_string(),
        difficulty,
        questions,
    };
    quiz.check(count)
        .map_err(GenerationError::InvalidResponseShape)?;
    Ok(quiz)
}

/// Reorders each question's options, keeping `correct_answer` on the same text.
pub fn shuffle_quiz_options<R: Rng + ?Sized>(quiz: &mut Quiz, rng: &mut R) {
    for q in &mut quiz.questions {
        let mut order: Vec<usize> = (0..q.options.len()).collect();
        order.shuffle(rng);
        let Some(new_correct) = order.iter().position(|&old| old == q.correct_answer) else {
            continue;
        };
        q.options = order.iter().map(|&old| q.options[old].clone()).collect();
        q.correct_answer = new_correct;
    }
}
