use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the external quiz generation call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("AI service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("AI service returned an invalid quiz: {0}")]
    InvalidResponseShape(String),

    #[error("AI service rejected the credentials: {0}")]
    AuthenticationFailed(String),

    /// The caller asked for something no generation call can satisfy.
    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),
}

impl GenerationError {
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::ServiceUnavailable(_) => "service_unavailable",
            GenerationError::InvalidResponseShape(_) => "invalid_response_shape",
            GenerationError::AuthenticationFailed(_) => "authentication_failed",
            GenerationError::InvalidRequest(_) => "invalid_request",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database connection unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Payload serialization failed: {0}")]
    Serialization(String),
}

impl StorageError {
    pub fn kind(&self) -> &'static str {
        match self {
            StorageError::ConnectionUnavailable(_) => "connection_unavailable",
            StorageError::ConstraintViolation(_) => "constraint_violation",
            StorageError::Query(_) => "query_failed",
            StorageError::Serialization(_) => "serialization_failed",
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StorageError::ConnectionUnavailable(err.to_string()),
            sqlx::Error::Database(ref db) => {
                let violation = db.is_unique_violation()
                    || db.is_foreign_key_violation()
                    || db.is_check_violation()
                    // not_null_violation
                    || db.code().as_deref() == Some("23502");
                if violation {
                    StorageError::ConstraintViolation(db.message().to_string())
                } else {
                    StorageError::Query(err.to_string())
                }
            }
            other => StorageError::Query(other.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Quiz is incomplete: {answered} of {total} questions answered")]
    IncompleteQuiz { answered: usize, total: usize },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Report rendering failed: {0}")]
    Render(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Excel export error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::BadRequest(_) | Error::Validation(_) | Error::Json(_) => "bad_request",
            Error::NotFound(_) => "not_found",
            Error::IncompleteQuiz { .. } => "incomplete_quiz",
            Error::InvalidOperation(_) => "invalid_operation",
            Error::Generation(e) => e.kind(),
            Error::Storage(e) => e.kind(),
            Error::Render(_) => "render_failed",
            Error::Xlsx(_) => "export_failed",
            Error::Io(_) | Error::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) | Error::Validation(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::IncompleteQuiz { .. } | Error::InvalidOperation(_) => StatusCode::CONFLICT,
            Error::Generation(GenerationError::ServiceUnavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Generation(GenerationError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
            Error::Generation(_) => StatusCode::BAD_GATEWAY,
            Error::Storage(StorageError::ConnectionUnavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Storage(StorageError::ConstraintViolation(_)) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        } else {
            tracing::warn!(kind = self.kind(), error = %self, "request rejected");
        }

        let error_message = match &self {
            Error::Config(_) | Error::Io(_) | Error::Internal(_) => {
                "An unexpected error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({ "error": error_message, "kind": self.kind() }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Storage(StorageError::from(other)),
        }
    }
}
