//! Error kinds produced by the Tubeline core

use thiserror::Error;

/// Every core operation fails with exactly one of these kinds.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Missing or empty required input. Nothing was changed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Duplicate username or email.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Bad credentials or a missing, invalid, expired or revoked token.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage or signing failure unrelated to caller input.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Human-readable message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(msg)
            | Self::Conflict(msg)
            | Self::Unauthorized(msg)
            | Self::NotFound(msg)
            | Self::Internal(msg) => msg,
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                // PostgreSQL unique violation
                if db_err.code().as_deref() == Some("23505") {
                    return CoreError::conflict("User with this email or username already exists");
                }
                tracing::error!(error = %db_err, "Database error");
                CoreError::internal("Database error")
            }
            other => {
                tracing::error!(error = ?other, "Database error");
                CoreError::internal("Database error")
            }
        }
    }
}

/// Result alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;
