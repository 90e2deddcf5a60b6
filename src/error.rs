//! Error kinds raised by the scheduling core and its persistence layer.

use thiserror::Error;

/// Bad input rejected before any computation or write happens.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Grade must be between 0 and 20, got {0}")]
    GradeOutOfRange(f64),

    #[error("Grade must have at most one decimal digit, got {0}")]
    GradePrecision(f64),

    #[error("Malformed date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Adding {days} days to {date} leaves the supported calendar range")]
    DateOverflow { date: String, days: u32 },
}

/// Failure reading or writing persisted records.
///
/// Only lost engagement races are retried by the core; everything else is
/// surfaced as is.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database connection lock poisoned")]
    LockPoisoned,

    #[error("Database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The review was completed by someone else between read and write.
    #[error("Review {0} is not pending")]
    NotPending(i64),

    #[error("Engagement state kept changing, gave up after {0} attempts")]
    EngagementContended(u32),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Stored records disagree with each other (missing topic, foreign review).
    #[error("Consistency error: {0}")]
    Consistency(String),
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Persistence(PersistenceError::Sqlite(e))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
