//! Error types for the batch subsystem.
//!
//! Provides a hierarchy of error types using `thiserror` for ergonomic error handling.
//! Per-item worker failures are deliberately absent here: they are captured as
//! [`ItemError`](crate::core::ItemError) values inside the result vector and never
//! surface as a `BatchError`.

use serde::Serialize;
use thiserror::Error;

/// Validation errors for options and configuration.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum ValidationError {
    /// A batch size of zero was requested
    #[error("Batch size must be at least 1, got {0}")]
    BatchSize(usize),
    /// Minimum batch size exceeds maximum batch size
    #[error("Batch size bounds are inverted: min {min} > max {max}")]
    Bounds { min: usize, max: usize },
    /// A ratio threshold fell outside `[0, 1]`
    #[error("Threshold `{name}` must be within [0, 1], got {value}")]
    Threshold { name: &'static str, value: f64 },
    /// Invalid settings error
    #[error("Settings error: {0}")]
    Settings(String),
}

/// Failures reported by a persistent store collaborator.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum StoreError {
    /// A write transaction failed and was rolled back by the store
    #[error("Transaction on `{collection}` failed: {message}")]
    Transaction { collection: String, message: String },
    /// Opening or advancing a cursor failed
    #[error("Cursor on `{collection}` failed: {message}")]
    Cursor { collection: String, message: String },
    /// The named collection does not exist
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),
    /// The transaction was aborted before it finished
    #[error("Transaction aborted")]
    Aborted,
}

/// Main error type for the public entry points.
///
/// Only store-transaction failures, malformed options and explicit aborts reach
/// the caller through this type.
#[derive(Error, Debug)]
pub enum BatchError {
    /// Options or configuration failed validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A store transaction or cursor failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The call was aborted through its abort signal
    #[error("Operation aborted")]
    Aborted,

    /// The execution state already has a pass in flight
    #[error("Execution is already running")]
    AlreadyRunning,

    /// Configuration could not be loaded or parsed
    #[error("Config error: {0}")]
    Config(String),
}

/// Convenience result type for batch operations.
pub type BatchResult<T> = Result<T, BatchError>;

impl BatchError {
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }
}

impl ValidationError {
    pub fn settings(msg: impl Into<String>) -> Self {
        Self::Settings(msg.into())
    }

    pub fn threshold(name: &'static str, value: f64) -> Self {
        Self::Threshold { name, value }
    }
}

impl StoreError {
    pub fn transaction(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transaction {
            collection: collection.into(),
            message: message.into(),
        }
    }

    pub fn cursor(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Cursor {
            collection: collection.into(),
            message: message.into(),
        }
    }
}

// Convert serde_json::Error to BatchError
impl From<serde_json::Error> for BatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
