use serde::Serialize;
use crate::core::{ExecutionStatus, Outcome, ProgressSnapshot};

/// Final result of one executor pass.
///
/// `outcomes[i]` always belongs to input item `i`. After a cancellation the
/// vector holds only the resolved prefix; [`ExecutionResult::into_padded`]
/// restores input length with [`Outcome::Cancelled`] entries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult<R> {
    pub outcomes: Vec<Outcome<R>>,
    /// Number of input items
    pub total: usize,
    pub status: ExecutionStatus,
    pub progress: ProgressSnapshot,
    /// Batch width the pass ran with
    pub batch_size: usize,
}

impl<R> ExecutionResult<R> {
    pub fn is_completed(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == ExecutionStatus::Cancelled
    }

    /// Successful values in input order, `None` where the item did not succeed.
    pub fn values(&self) -> Vec<Option<&R>> {
        self.outcomes.iter().map(Outcome::value).collect()
    }

    /// Outcomes padded to input length, unresolved items marked cancelled.
    pub fn into_padded(self) -> Vec<Outcome<R>> {
        let mut outcomes = self.outcomes;
        outcomes.resize_with(self.total, || Outcome::Cancelled);
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_marks_unresolved_items_cancelled() {
        let result = ExecutionResult {
            outcomes: vec![Outcome::Success { value: 1 }, Outcome::Success { value: 2 }],
            total: 4,
            status: ExecutionStatus::Cancelled,
            progress: ProgressSnapshot::new(4, 2),
            batch_size: 2,
        };
        assert!(result.is_cancelled());
        assert_eq!(result.values(), vec![Some(&1), Some(&2)]);

        let padded = result.into_padded();
        assert_eq!(padded.len(), 4);
        assert_eq!(padded[2], Outcome::Cancelled);
        assert_eq!(padded[3], Outcome::Cancelled);
    }
}
