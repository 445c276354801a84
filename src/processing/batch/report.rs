use std::fmt;
use std::time::Duration;
use super::metrics::RunMetrics;

/// Human-readable summary of one executor pass.
pub struct RunReport {
    metrics: RunMetrics,
}

impl RunReport {
    pub fn from_metrics(metrics: RunMetrics) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    fn safe_div(numerator: f64, denominator: f64) -> f64 {
        if denominator == 0.0 {
            0.0
        } else {
            numerator / denominator
        }
    }

    fn format_duration(duration: Duration) -> String {
        let secs = duration.as_secs_f64();
        if secs >= 60.0 {
            format!("{:.0}m {:.2}s", (secs / 60.0).floor(), secs % 60.0)
        } else if secs >= 1.0 {
            format!("{:.2}s", secs)
        } else {
            format!("{}ms", duration.as_millis())
        }
    }

    fn average_batch_duration(&self) -> Duration {
        let batches = self.metrics.batches.len() as u32;
        if batches == 0 {
            Duration::ZERO
        } else {
            self.metrics.batches.iter().map(|b| b.duration).sum::<Duration>() / batches
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let metrics = &self.metrics;
        writeln!(f, "=== Batch Run Report ===")?;
        writeln!(f)?;

        writeln!(f, "Outcomes:")?;
        writeln!(f, "- Processed: {}/{}", metrics.processed(), metrics.total_items)?;
        writeln!(f, "  └── Succeeded: {}", metrics.succeeded())?;
        writeln!(f, "  └── Failed: {}", metrics.failed())?;
        writeln!(f, "  └── Skipped: {}", metrics.skipped())?;
        writeln!(f, "- Retries: {}", metrics.retries)?;
        writeln!(
            f,
            "- Success Rate: {:.1}%",
            Self::safe_div(metrics.succeeded() as f64 * 100.0, metrics.processed() as f64)
        )?;
        writeln!(f)?;

        writeln!(f, "Timing:")?;
        writeln!(f, "- Total Duration: {}", Self::format_duration(metrics.total_duration))?;
        writeln!(f, "- Average Batch Duration: {}", Self::format_duration(self.average_batch_duration()))?;
        if let Some(slowest) = metrics.slowest_batch() {
            writeln!(
                f,
                "- Slowest Batch: #{} ({} items, {})",
                slowest.index + 1,
                slowest.width,
                Self::format_duration(slowest.duration)
            )?;
        }
        writeln!(f, "- Throughput: {:.2} items/s", metrics.throughput())?;
        writeln!(f)?;

        writeln!(f, "Batching:")?;
        writeln!(f, "- Batch Size: {}", metrics.batch_size)?;
        write!(f, "- Batches Run: {}", metrics.batches.len())?;

        if let Some(memory) = &metrics.memory {
            writeln!(f)?;
            writeln!(f)?;
            writeln!(f, "Memory Pressure:")?;
            writeln!(f, "- Initial: {:.1}%", memory.initial_percentage)?;
            writeln!(f, "- Average (EMA): {:.1}%", memory.avg_percentage)?;
            writeln!(f, "- Peak: {:.1}%", memory.peak_percentage)?;
            writeln!(f, "- Distribution:")?;
            writeln!(f, "  └── 0-33%: {}", memory.memory_distribution[0])?;
            writeln!(f, "  └── 34-66%: {}", memory.memory_distribution[1])?;
            write!(f, "  └── 67-100%: {}", memory.memory_distribution[2])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ItemError, Outcome};

    #[test]
    fn report_lists_counts_and_memory_section() {
        let mut metrics = RunMetrics::new(3, 2);
        let outcomes: Vec<Outcome<u8>> = vec![
            Outcome::Success { value: 1 },
            Outcome::Error { error: ItemError::new("bad", 2) },
        ];
        metrics.record_batch(0, &outcomes, Duration::from_millis(40));
        metrics.record_batch(1, &[Outcome::Success { value: 3u8 }], Duration::from_millis(10));
        metrics.record_memory(42.0, false);
        metrics.total_duration = Duration::from_millis(50);

        let report = RunReport::from_metrics(metrics).to_string();
        assert!(report.contains("Processed: 3/3"));
        assert!(report.contains("Failed: 1"));
        assert!(report.contains("Slowest Batch: #1 (2 items, 40ms)"));
        assert!(report.contains("Average Batch Duration: 25ms"));
        assert!(report.contains("Peak: 42.0%"));
    }

    #[test]
    fn empty_run_renders_without_dividing_by_zero() {
        let report = RunReport::from_metrics(RunMetrics::new(0, 10)).to_string();
        assert!(report.contains("Success Rate: 0.0%"));
        assert!(!report.contains("Memory Pressure"));
    }
}
