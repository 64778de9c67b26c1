pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::services::{
    ai_service::AIService, history_service::HistoryService, session_service::SessionRegistry,
};
use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use sqlx::PgPool;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub ai_service: AIService,
    pub history_service: HistoryService,
    pub sessions: SessionRegistry,
    pub max_questions: usize,
}

impl AppState {
    pub fn new(pool: PgPool, config: &Config) -> Result<Self> {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?;

        let ai_service = AIService::from_config(config, http_client);
        let history_service = HistoryService::new(pool.clone());

        Ok(Self {
            pool,
            ai_service,
            history_service,
            sessions: SessionRegistry::new(),
            max_questions: config.max_questions,
        })
    }
}

pub fn router(state: AppState) -> Router {
    let base_routes = Router::new().route("/health", get(routes::health::health));

    let quiz_api = Router::new()
        .route("/api/quizzes", post(routes::quiz::create_quiz))
        .route(
            "/api/quizzes/:id",
            get(routes::quiz::get_quiz).delete(routes::quiz::discard_quiz),
        )
        .route("/api/quizzes/:id/answers", post(routes::quiz::submit_answer))
        .route("/api/quizzes/:id/finish", post(routes::quiz::finish_quiz));

    let history_api = Router::new()
        .route("/api/history", get(routes::history::list_history))
        .route("/api/history/stats", get(routes::history::history_stats))
        .route("/api/history/export", get(routes::export::export_history))
        .route("/api/history/:id", get(routes::history::get_attempt))
        .route("/api/history/:id/report", get(routes::export::export_report));

    base_routes
        .merge(quiz_api)
        .merge(history_api)
        .with_state(state)
}
