//! Error types for the switchboard core
//!
//! Untrusted input (unknown specialist ids, oversized tool lists) never shows
//! up here: it is filtered or truncated where it enters. These variants cover
//! the failures callers are expected to observe and handle.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeapError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid router output: {0}")]
    InvalidRouterOutput(String),

    #[error("Chooser error: {0}")]
    Chooser(String),

    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("Job failed: {0}")]
    Job(String),

    #[error("Job was dropped before it settled")]
    JobAborted,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, HeapError>;
