//! Per-item outcome types.

use std::fmt;
use serde::{Deserialize, Serialize};

/// Failure captured from a worker after its retry budget ran out.
///
/// Holds the rendered error chain rather than the error itself so outcomes stay
/// cloneable and comparable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemError {
    /// Rendered error message, including its cause chain
    pub message: String,
    /// Total number of worker invocations made for the item
    pub attempts: u32,
}

impl ItemError {
    pub fn new(message: impl Into<String>, attempts: u32) -> Self {
        Self {
            message: message.into(),
            attempts,
        }
    }

    pub fn from_error(err: &anyhow::Error, attempts: u32) -> Self {
        Self::new(format!("{err:#}"), attempts)
    }
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {} attempts)", self.message, self.attempts)
    }
}

/// Terminal status tag of an [`Outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutcomeStatus {
    Success,
    Error,
    Skipped,
    Cancelled,
}

/// Result recorded for exactly one input item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Outcome<R> {
    /// The worker returned a value
    Success { value: R },
    /// Retries were exhausted and no error handler chose otherwise
    Error { error: ItemError },
    /// The error handler chose to skip the item
    Skipped { error: ItemError },
    /// The item never ran because the execution was cancelled
    Cancelled,
}

impl<R> Outcome<R> {
    pub fn status(&self) -> OutcomeStatus {
        match self {
            Self::Success { .. } => OutcomeStatus::Success,
            Self::Error { .. } => OutcomeStatus::Error,
            Self::Skipped { .. } => OutcomeStatus::Skipped,
            Self::Cancelled => OutcomeStatus::Cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn value(&self) -> Option<&R> {
        match self {
            Self::Success { value } => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<R> {
        match self {
            Self::Success { value } => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ItemError> {
        match self {
            Self::Error { error } | Self::Skipped { error } => Some(error),
            _ => None,
        }
    }
}
