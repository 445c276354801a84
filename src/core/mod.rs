//! Core data model shared by the executor and the stream processor.
//!
//! This module contains the fundamental types used throughout the crate:
//! - [`Outcome`]: Terminal result for one input item
//! - [`ProgressSnapshot`]: Progress tracking for batch operations
//! - [`ExecutionControl`]: Pause/resume/cancel handle over the execution state machine
//! - [`ExecutionResult`]: Result vector plus final status of one pass

mod progress;
mod result;
mod state;
mod types;

pub use progress::{ProgressSnapshot, StreamProgress};
pub use result::ExecutionResult;
pub use state::{ExecutionControl, ExecutionStatus};
pub(crate) use state::Checkpoint;
pub use types::{ItemError, Outcome, OutcomeStatus};
