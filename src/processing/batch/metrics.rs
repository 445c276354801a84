use std::time::Duration;
use tracing::debug;
use crate::core::{Outcome, OutcomeStatus};

/// Memory pressure observed between batches.
#[derive(Debug, Clone, Default)]
pub struct BatchMemoryMetrics {
    pub initial_percentage: f64,
    pub avg_percentage: f64,
    pub peak_percentage: f64,
    /// Samples bucketed into 0-33%, 34-66% and 67-100%
    pub memory_distribution: [usize; 3],
    pub samples: usize,
}

impl BatchMemoryMetrics {
    pub fn new(initial_percentage: f64) -> Self {
        Self {
            initial_percentage,
            ..Self::default()
        }
    }

    pub fn record_usage(&mut self, percentage: f64, estimated: bool) {
        let percentage = if percentage.is_finite() { percentage.clamp(0.0, 100.0) } else { 0.0 };

        // Exponential moving average with alpha=0.2
        if self.samples == 0 {
            self.avg_percentage = percentage;
        } else {
            self.avg_percentage = percentage * 0.2 + self.avg_percentage * 0.8;
        }
        self.samples += 1;

        self.peak_percentage = self.peak_percentage.max(percentage);

        let index = (percentage / 33.34).min(2.0) as usize;
        self.memory_distribution[index] += 1;

        debug!(
            "Memory usage recorded - {:.1}%{}, EMA: {:.1}%, Bucket: {}",
            percentage,
            if estimated { " (estimated)" } else { "" },
            self.avg_percentage,
            index
        );
    }
}

/// Timing and outcome counters for one executed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecord {
    pub index: usize,
    pub width: usize,
    pub duration: Duration,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Counters accumulated over one executor pass.
#[derive(Debug, Clone, Default)]
pub struct RunMetrics {
    pub batch_size: usize,
    pub total_items: usize,
    pub batches: Vec<BatchRecord>,
    /// Extra attempts beyond each item's first
    pub retries: usize,
    pub total_duration: Duration,
    pub memory: Option<BatchMemoryMetrics>,
}

impl RunMetrics {
    pub fn new(total_items: usize, batch_size: usize) -> Self {
        Self {
            batch_size,
            total_items,
            ..Self::default()
        }
    }

    pub fn record_batch<R>(&mut self, index: usize, outcomes: &[Outcome<R>], duration: Duration) {
        let mut record = BatchRecord {
            index,
            width: outcomes.len(),
            duration,
            succeeded: 0,
            failed: 0,
            skipped: 0,
        };
        for outcome in outcomes {
            match outcome.status() {
                OutcomeStatus::Success => record.succeeded += 1,
                OutcomeStatus::Error => record.failed += 1,
                OutcomeStatus::Skipped => record.skipped += 1,
                OutcomeStatus::Cancelled => {}
            }
        }
        self.batches.push(record);
    }

    pub fn record_retries(&mut self, retries: usize) {
        self.retries += retries;
    }

    pub fn record_memory(&mut self, percentage: f64, estimated: bool) {
        self.memory
            .get_or_insert_with(|| BatchMemoryMetrics::new(percentage))
            .record_usage(percentage, estimated);
    }

    pub fn processed(&self) -> usize {
        self.batches.iter().map(|b| b.width).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.batches.iter().map(|b| b.succeeded).sum()
    }

    pub fn failed(&self) -> usize {
        self.batches.iter().map(|b| b.failed).sum()
    }

    pub fn skipped(&self) -> usize {
        self.batches.iter().map(|b| b.skipped).sum()
    }

    pub fn slowest_batch(&self) -> Option<&BatchRecord> {
        self.batches.iter().max_by_key(|b| b.duration)
    }

    /// Items per second over the whole pass; zero for an instant pass.
    pub fn throughput(&self) -> f64 {
        let secs = self.total_duration.as_secs_f64();
        if secs == 0.0 { 0.0 } else { self.processed() as f64 / secs }
    }
}
