//! Error types for ingestion, storage and aggregation queries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using the crate's top-level error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for record store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Why a single record in a batch was rejected.
///
/// Serialized as `INVALID_PAYLOAD`, `INVALID_DURATION`, `FUTURE_EVENT_TIME`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    #[error("Invalid or incomplete event data")]
    InvalidPayload,

    #[error("Duration must be between 0 and 6 hours")]
    InvalidDuration,

    #[error("Event time cannot be more than 15 minutes in the future")]
    FutureEventTime,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::InvalidPayload => "INVALID_PAYLOAD",
            RejectionReason::InvalidDuration => "INVALID_DURATION",
            RejectionReason::FutureEventTime => "FUTURE_EVENT_TIME",
        }
    }
}

/// Failures raised by a record store implementation.
///
/// Key collisions and guard mismatches are NOT errors; they are ordinary
/// results of the store contract (see `store::InsertOutcome` and
/// `store::ReplaceOutcome`).
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Store could not be reached (poisoned lock, cancelled blocking task).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A value could not be converted to or from its stored form.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Failures while resolving a single record during batch ingestion.
///
/// Never escapes `IngestionEngine::process_batch`; each one becomes an
/// `InvalidPayload` rejection for the record that raised it.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The stored record vanished after a key collision and the single
    /// insert retry collided again.
    #[error("Conflict for event {0} could not be resolved")]
    UnresolvedConflict(String),
}

/// Failures of aggregation queries.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Bad query parameters: inverted range, non-positive limit.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Top-level error used by the command-line adapters.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Query(#[from] QueryError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration or command-line error.
    #[error("Configuration error: {0}")]
    Config(String),
}
