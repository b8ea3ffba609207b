//! Error types for the database layer

use thiserror::Error;

/// Failures surfaced by the connection source and the repositories.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// No session could be established: unreachable host, bad credentials,
    /// acquire timeout or a closed pool.
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    #[error("Duplicate entity: {0}")]
    Duplicate(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Any other read or write failure, with the driver error that caused it.
    #[error("Database storage error: {message}")]
    StorageError {
        message: String,
        #[source]
        source: BoxError,
    },
}

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

impl DatabaseError {
    /// Wraps a failure raised while obtaining a connection.
    pub fn connection(error: impl std::fmt::Display) -> Self {
        Self::ConnectionError(error.to_string())
    }

    pub fn storage(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::StorageError {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionError(_) => "connection",
            Self::Duplicate(_) => "duplicate",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation",
            Self::StorageError { .. } => "storage",
        }
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Self::Duplicate(db.message().to_string())
            }
            sqlx::Error::RowNotFound => Self::NotFound(error.to_string()),
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::ConnectionError(error.to_string()),
            other => Self::storage("statement failed", other),
        }
    }
}
