use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// DomainError
///
/// Every failure a use case can report, distinguishable by kind. Handlers return it directly;
/// the `IntoResponse` impl below turns it into a JSON error body with the matching status.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("{0}")]
    NotFound(String),

    #[error("Job offer with ID {job_offer_id} is closed and no longer accepting applications.")]
    ClosedJob { job_offer_id: i64 },

    #[error("User {user_id} has already applied to job offer {job_offer_id}.")]
    DuplicateApplication { user_id: i64, job_offer_id: i64 },

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("invalid credentials")]
    Unauthorized,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("token signing failed: {0}")]
    Token(String),

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

impl DomainError {
    /// Stable, machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::NotFound(_) => "not_found",
            DomainError::ClosedJob { .. } => "closed_job",
            DomainError::DuplicateApplication { .. } => "duplicate_application",
            DomainError::Validation(_) => "validation_error",
            DomainError::AlreadyExists(_) => "already_exists",
            DomainError::Forbidden(_) => "forbidden",
            DomainError::Unauthorized => "unauthorized",
            DomainError::Hashing(_) | DomainError::Token(_) | DomainError::Storage(_) => {
                "internal_error"
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::ClosedJob { .. }
            | DomainError::DuplicateApplication { .. }
            | DomainError::Validation(_) => StatusCode::BAD_REQUEST,
            DomainError::AlreadyExists(_) => StatusCode::CONFLICT,
            DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
            DomainError::Unauthorized => StatusCode::UNAUTHORIZED,
            DomainError::Hashing(_) | DomainError::Token(_) | DomainError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for DomainError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal failures are logged in full but never echoed to the client.
        let message = if status.is_server_error() {
            tracing::error!(error = ?self, "request failed with an internal error");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": self.kind(),
            "message": message,
            "code": status.as_u16(),
        }));
        (status, body).into_response()
    }
}

/// RepositoryError
///
/// Failures reported by a store implementation.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// A uniqueness constraint rejected the write.
    #[error("record already exists: {0}")]
    Conflict(String),

    #[error("record not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("repository unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be turned back into a domain entity.
    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("unique constraint");
                return RepositoryError::Conflict(constraint.to_string());
            }
        }
        if matches!(err, sqlx::Error::RowNotFound) {
            return RepositoryError::NotFound;
        }
        RepositoryError::Database(err)
    }
}
