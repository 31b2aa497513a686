//! Error types for leaseq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Queue, or the active lease on an item, does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Completion of an item that is not currently pending.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Empty or malformed identifier/item after sanitization.
    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Error::Other(format!("migration failed: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
