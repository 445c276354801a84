use serde::{Deserialize, Serialize};
use crate::core::Outcome;

/// Point-in-time view of a batch execution, re-derivable from the results so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Number of items with a terminal outcome
    pub processed: usize,
    /// Total number of input items
    pub total: usize,
    /// Progress percentage (0-100)
    pub percentage: f64,
    /// 1-based index of the most recently finished batch (0 before the first)
    pub current_batch: usize,
    /// Total number of batches in the run
    pub total_batches: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ProgressSnapshot {
    pub fn new(total: usize, total_batches: usize) -> Self {
        Self {
            processed: 0,
            total,
            percentage: 0.0,
            current_batch: 0,
            total_batches,
            succeeded: 0,
            failed: 0,
            skipped: 0,
        }
    }

    /// Folds one finished batch into the snapshot.
    pub fn record_batch<R>(&mut self, outcomes: &[Outcome<R>], batch_index: usize) {
        for outcome in outcomes {
            match outcome {
                Outcome::Success { .. } => self.succeeded += 1,
                Outcome::Error { .. } => self.failed += 1,
                Outcome::Skipped { .. } => self.skipped += 1,
                Outcome::Cancelled => {}
            }
        }
        self.processed += outcomes.len();
        self.current_batch = batch_index + 1;
        self.percentage = Self::percentage_of(self.processed, self.total);
    }

    pub fn percentage_of(processed: usize, total: usize) -> f64 {
        if total > 0 {
            (processed as f64 * 100.0) / total as f64
        } else {
            0.0
        }
    }

    pub fn is_complete(&self) -> bool {
        self.processed >= self.total
    }
}

/// Progress payload emitted by streaming reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamProgress {
    /// Entries read or written so far
    pub processed: usize,
    /// Known total, when the caller supplied the full collection up front
    #[serde(default)]
    pub total: Option<usize>,
    /// Set on internal batch boundaries
    pub batch_completed: bool,
    /// Set exactly once, on the final update
    pub completed: bool,
}

impl StreamProgress {
    pub fn batch(processed: usize, total: Option<usize>) -> Self {
        Self {
            processed,
            total,
            batch_completed: true,
            completed: false,
        }
    }

    pub fn finished(processed: usize, total: Option<usize>) -> Self {
        Self {
            processed,
            total,
            batch_completed: false,
            completed: true,
        }
    }
}
