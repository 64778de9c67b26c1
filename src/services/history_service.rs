use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::{Error, Result, StorageError};
use crate::models::attempt::{
    Attempt, AttemptRow, AttemptSummary, AttemptSummaryRow, NewAttempt, QuizStatistics,
};
use crate::services::grading_service::round_percentage;

const SCHEMA_LOCK_KEY: i64 = 0x5155_495A;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS quiz_history (
    id BIGSERIAL PRIMARY KEY,
    topic TEXT NOT NULL,
    difficulty TEXT NOT NULL,
    question_count INTEGER NOT NULL CHECK (question_count > 0),
    raw_score INTEGER NOT NULL CHECK (raw_score >= 0 AND raw_score <= question_count),
    percentage NUMERIC(5, 2) NOT NULL CHECK (percentage >= 0 AND percentage <= 100),
    quiz_payload TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_quiz_history_created_at
    ON quiz_history (created_at DESC, id DESC)
"#;

#[derive(Clone)]
pub struct HistoryService {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl HistoryService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    /// Creates the history table if it is missing. Safe to call repeatedly.
    ///
    /// Concurrent `CREATE ... IF NOT EXISTS` can still collide in Postgres, so the
    /// DDL runs under a transaction-scoped advisory lock.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                let mut tx = self.pool.begin().await.map_err(StorageError::from)?;
                sqlx::query("SELECT pg_advisory_xact_lock($1)")
                    .bind(SCHEMA_LOCK_KEY)
                    .execute(&mut *tx)
                    .await
                    .map_err(StorageError::from)?;
                sqlx::query(CREATE_TABLE)
                    .execute(&mut *tx)
                    .await
                    .map_err(StorageError::from)?;
                sqlx::query(CREATE_INDEX)
                    .execute(&mut *tx)
                    .await
                    .map_err(StorageError::from)?;
                tx.commit().await.map_err(StorageError::from)?;
                tracing::info!("quiz_history schema ready");
                Ok::<(), Error>(())
            })
            .await?;
        Ok(())
    }

    pub async fn save(&self, attempt: &NewAttempt) -> Result<Attempt> {
        self.ensure_schema().await?;
        let payload = attempt.payload.to_json()?;

        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            INSERT INTO quiz_history (
                topic, difficulty, question_count, raw_score, percentage, quiz_payload
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, topic, difficulty, question_count, raw_score, percentage,
                      quiz_payload, created_at
            "#,
        )
        .bind(&attempt.topic)
        .bind(attempt.difficulty.as_str())
        .bind(attempt.question_count)
        .bind(attempt.raw_score)
        .bind(attempt.percentage)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::from)?;

        let saved = Attempt::try_from(row)?;
        tracing::info!(id = saved.id, topic = %saved.topic, "quiz attempt saved");
        Ok(saved)
    }

    /// Newest first; equal timestamps fall back to the later insert first.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<AttemptSummary>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }
        self.ensure_schema().await?;

        let rows = sqlx::query_as::<_, AttemptSummaryRow>(
            r#"
            SELECT id, topic, difficulty, question_count, raw_score, percentage, created_at
            FROM quiz_history
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;

        rows.into_iter()
            .map(|row| AttemptSummary::try_from(row).map_err(Error::from))
            .collect()
    }

    pub async fn load(&self, id: i64) -> Result<Attempt> {
        self.ensure_schema().await?;

        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT id, topic, difficulty, question_count, raw_score, percentage,
                   quiz_payload, created_at
            FROM quiz_history
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::from)?
        .ok_or_else(|| Error::NotFound(format!("Quiz attempt {} not found", id)))?;

        Ok(Attempt::try_from(row)?)
    }

    pub async fn statistics(&self) -> Result<QuizStatistics> {
        self.ensure_schema().await?;

        let (total_quizzes, average, best, total_questions): (i64, Decimal, Decimal, i64) =
            sqlx::query_as(
                r#"
                SELECT COUNT(*)::BIGINT,
                       COALESCE(AVG(percentage), 0)::NUMERIC,
                       COALESCE(MAX(percentage), 0)::NUMERIC,
                       COALESCE(SUM(question_count), 0)::BIGINT
                FROM quiz_history
                "#,
            )
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(QuizStatistics {
            total_quizzes,
            average_percentage: round_percentage(average),
            best_percentage: round_percentage(best),
            total_questions_answered: total_questions,
        })
    }
}
