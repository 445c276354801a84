use std::sync::Arc;
use std::time::Instant;
use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use crate::core::{
    Checkpoint, ExecutionControl, ExecutionResult, ExecutionStatus, ItemError, Outcome,
    ProgressSnapshot,
};
use crate::processing::recommender::BatchSizeRecommender;
use crate::telemetry::TelemetryProbe;
use crate::utils::{invoke_guarded, validate_batch_size, BatchResult, ValidationError};
use crate::worker::{ErrorDecision, Worker};
use super::metrics::RunMetrics;
use super::options::BatchOptions;
use super::report::RunReport;

/// Splits `len` items into consecutive `[start, end)` ranges of at most `size`.
pub(crate) fn partition(len: usize, size: usize) -> impl Iterator<Item = (usize, usize)> {
    let size = size.max(1);
    (0..len).step_by(size).map(move |start| (start, (start + size).min(len)))
}

/// Runs work items in sequential batches with bounded concurrency.
///
/// All items of a batch are started together and awaited as a group before
/// the next batch begins. Pause and cancel requests made through
/// [`BatchExecutor::control`] are honoured at batch boundaries only.
pub struct BatchExecutor<R> {
    options: BatchOptions<R>,
    control: ExecutionControl,
    sizing: Option<(Arc<BatchSizeRecommender>, Arc<dyn TelemetryProbe>)>,
    last_metrics: Mutex<Option<RunMetrics>>,
}

impl<R> BatchExecutor<R> {
    pub fn new(options: BatchOptions<R>) -> Self {
        Self {
            options,
            control: ExecutionControl::new(),
            sizing: None,
            last_metrics: Mutex::new(None),
        }
    }

    /// Uses a caller-created control handle, for example one already captured
    /// by the option callbacks.
    pub fn with_control(mut self, control: ExecutionControl) -> Self {
        self.control = control;
        self
    }

    /// Derives the batch width from `recommender` and `probe` at the start of
    /// every pass instead of using the fixed option value.
    pub fn with_recommender(
        mut self,
        recommender: Arc<BatchSizeRecommender>,
        probe: Arc<dyn TelemetryProbe>,
    ) -> Self {
        self.sizing = Some((recommender, probe));
        self
    }

    /// Handle for pausing, resuming, cancelling and observing the current pass.
    pub fn control(&self) -> ExecutionControl {
        self.control.clone()
    }

    pub fn status(&self) -> ExecutionStatus {
        self.control.status()
    }

    pub fn options(&self) -> &BatchOptions<R> {
        &self.options
    }

    /// Metrics of the most recent finished pass.
    pub fn last_metrics(&self) -> Option<RunMetrics> {
        self.last_metrics.lock().clone()
    }

    fn resolve_batch_size(&self) -> Result<usize, ValidationError> {
        let batch_size = match &self.sizing {
            Some((recommender, probe)) => recommender.recommend_from(probe.as_ref()),
            None => self.options.batch_size,
        };
        validate_batch_size(batch_size)?;
        Ok(batch_size)
    }

    fn sample_memory(&self, metrics: &mut RunMetrics) {
        if let Some((_, probe)) = &self.sizing {
            if let Some(info) = probe.memory() {
                metrics.record_memory(info.percentage, info.estimated);
            }
        }
    }

    /// Processes `items` with `worker` and returns one outcome per resolved item,
    /// in input order.
    ///
    /// Per-item failures never fail the call; they are recorded as
    /// [`Outcome::Error`] or [`Outcome::Skipped`]. The call fails only for invalid
    /// options or when another pass is already active on this executor.
    /// After a cancellation the result holds the outcomes of the batches that
    /// finished, and `on_complete` is not invoked.
    pub async fn run<T, W>(&self, items: Vec<T>, worker: W) -> BatchResult<ExecutionResult<R>>
    where
        T: Clone,
        W: Worker<T, R>,
    {
        self.control.begin()?;
        let batch_size = match self.options.validate().and_then(|()| self.resolve_batch_size()) {
            Ok(batch_size) => batch_size,
            Err(e) => {
                warn!("Rejecting batch run: {}", e);
                self.control.set_status(ExecutionStatus::Errored);
                return Err(e.into());
            }
        };

        let started = Instant::now();
        let total = items.len();
        let total_batches = total.div_ceil(batch_size);
        info!(
            "Processing {} items in {} batches of up to {}",
            total, total_batches, batch_size
        );

        let mut outcomes: Vec<Outcome<R>> = Vec::with_capacity(total);
        let mut progress = ProgressSnapshot::new(total, total_batches);
        let mut metrics = RunMetrics::new(total, batch_size);
        self.sample_memory(&mut metrics);

        for (batch_index, (start, end)) in partition(total, batch_size).enumerate() {
            if self.control.checkpoint(batch_index).await == Checkpoint::Cancel {
                info!("Execution cancelled before batch {}/{}", batch_index + 1, total_batches);
                break;
            }

            // Only log at important milestones to reduce noise
            if batch_index == 0 || batch_index + 1 == total_batches || batch_index % 5 == 0 {
                debug!("Processing batch {}/{}", batch_index + 1, total_batches);
            }

            let batch_started = Instant::now();
            let batch = &items[start..end];
            let resolved = join_all(
                batch
                    .iter()
                    .enumerate()
                    .map(|(offset, item)| self.process_item(&worker, item, start + offset)),
            )
            .await;

            debug_assert_eq!(outcomes.len(), start);
            let mut retries = 0;
            for (outcome, item_retries) in resolved {
                outcomes.push(outcome);
                retries += item_retries;
            }
            let batch_outcomes = &outcomes[start..end];

            progress.record_batch(batch_outcomes, batch_index);
            metrics.record_batch(batch_index, batch_outcomes, batch_started.elapsed());
            metrics.record_retries(retries);
            self.sample_memory(&mut metrics);

            if let Some(callback) = &self.options.on_batch_complete {
                invoke_guarded("Batch complete", || callback(batch_outcomes, batch_index));
            }
            if let Some(callback) = &self.options.on_progress {
                invoke_guarded("Progress", || callback(&progress));
            }

            if end < total {
                if self.options.batch_delay.is_zero() {
                    self.options.scheduler.yield_now().await;
                } else {
                    self.options.scheduler.sleep(self.options.batch_delay).await;
                }
            }
        }

        metrics.total_duration = started.elapsed();
        let status = if self.control.is_cancel_requested() {
            ExecutionStatus::Cancelled
        } else {
            ExecutionStatus::Completed
        };

        if status == ExecutionStatus::Completed {
            debug_assert_eq!(outcomes.len(), total);
            if let Some(callback) = &self.options.on_complete {
                invoke_guarded("Completion", || callback(&outcomes));
            }
            if progress.failed > 0 || progress.skipped > 0 {
                warn!(
                    "Batch processing completed with {} failed and {} skipped items out of {}",
                    progress.failed, progress.skipped, total
                );
            } else {
                info!("Batch processing completed successfully: {} items processed", total);
            }
        } else {
            info!(
                "Batch processing cancelled after {} of {} items",
                outcomes.len(),
                total
            );
        }

        let report = RunReport::from_metrics(metrics);
        debug!("\n{}", report);
        *self.last_metrics.lock() = Some(report.metrics().clone());
        self.control.set_status(status);

        Ok(ExecutionResult {
            outcomes,
            total,
            status,
            progress,
            batch_size,
        })
    }

    /// Drives one item through its attempts and, if needed, the error handler.
    /// Returns the outcome and the number of attempts beyond the first.
    async fn process_item<T, W>(&self, worker: &W, item: &T, index: usize) -> (Outcome<R>, usize)
    where
        T: Clone,
        W: Worker<T, R>,
    {
        let max_attempts = self.options.max_attempts();
        let mut total_attempts = 0usize;

        loop {
            let mut attempts = 0u32;
            let error = loop {
                if total_attempts > 0 && !self.options.retry_delay.is_zero() {
                    self.options.scheduler.sleep(self.options.retry_delay).await;
                }
                attempts += 1;
                total_attempts += 1;

                match worker.process(item.clone(), index).await {
                    Ok(value) => return (Outcome::Success { value }, total_attempts - 1),
                    Err(e) if attempts < max_attempts => {
                        warn!(
                            "Item {} failed (attempt {}/{}): {:#}; retrying",
                            index, attempts, max_attempts, e
                        );
                    }
                    Err(e) => break ItemError::from_error(&e, attempts),
                }
            };

            let Some(handler) = &self.options.on_error else {
                warn!("Item {} failed permanently: {}", index, error);
                return (Outcome::Error { error }, total_attempts - 1);
            };

            match handler.decide(&error, index).await {
                ErrorDecision::Retry => {
                    debug!("Error handler requested another round for item {}", index);
                }
                ErrorDecision::Skip => {
                    debug!("Error handler skipped item {}: {}", index, error);
                    return (Outcome::Skipped { error }, total_attempts - 1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use anyhow::bail;
    use crate::worker::{ImmediateScheduler, Scheduler};

    fn options<R>() -> BatchOptions<R> {
        BatchOptions::new()
            .with_retry_delay(Duration::from_millis(100))
            .with_scheduler(Arc::new(ImmediateScheduler))
    }

    #[test]
    fn partition_covers_every_index_once() {
        let ranges: Vec<_> = partition(23, 10).collect();
        assert_eq!(ranges, vec![(0, 10), (10, 20), (20, 23)]);
        assert_eq!(partition(0, 10).count(), 0);
        assert_eq!(partition(4, 10).collect::<Vec<_>>(), vec![(0, 4)]);
    }

    #[tokio::test]
    async fn results_follow_input_order_despite_completion_order() {
        let executor = BatchExecutor::new(options().with_batch_size(4));
        let items: Vec<u64> = (0..10).collect();
        let result = executor
            .run(items, |n: u64, _index: usize| async move {
                // Later items finish first
                tokio::time::sleep(Duration::from_millis(10 - n)).await;
                anyhow::Ok(n * 10)
            })
            .await
            .unwrap();

        let values: Vec<u64> = result.outcomes.into_iter().filter_map(Outcome::into_value).collect();
        assert_eq!(values, (0..10).map(|n| n * 10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn batch_runs_all_items_concurrently() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let executor = BatchExecutor::new(options().with_batch_size(5));
        let (flight, high) = (Arc::clone(&in_flight), Arc::clone(&peak));
        executor
            .run((0..12).collect::<Vec<u32>>(), move |n: u32, _: usize| {
                let flight = Arc::clone(&flight);
                let high = Arc::clone(&high);
                async move {
                    let now = flight.fetch_add(1, Ordering::SeqCst) + 1;
                    high.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    flight.fetch_sub(1, Ordering::SeqCst);
                    anyhow::Ok(n)
                }
            })
            .await
            .unwrap();
        assert_eq!(peak.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn exhausted_item_without_handler_is_an_error_and_siblings_succeed() {
        let executor = BatchExecutor::new(options().with_batch_size(3).with_max_retries(2));
        let result = executor
            .run(vec![1u32, 2, 3], |n: u32, _: usize| async move {
                if n == 2 {
                    bail!("item {n} is cursed");
                }
                anyhow::Ok(n)
            })
            .await
            .unwrap();

        assert!(result.is_completed());
        assert!(result.outcomes[0].is_success());
        let error = result.outcomes[1].error().unwrap();
        assert_eq!(error.attempts, 3);
        assert!(error.message.contains("cursed"));
        assert!(result.outcomes[2].is_success());
        assert_eq!(result.progress.failed, 1);
        assert_eq!(executor.last_metrics().unwrap().retries, 2);
    }

    #[tokio::test]
    async fn retry_decision_resets_the_attempt_counter() {
        let calls = Arc::new(AtomicUsize::new(0));
        let decisions = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&decisions);
        let executor = BatchExecutor::new(
            options()
                .with_batch_size(1)
                .with_max_retries(1)
                .on_error(move |_: &ItemError, _: usize| {
                    let round = seen.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if round == 0 { ErrorDecision::Retry } else { ErrorDecision::Skip }
                    }
                }),
        );

        let counter = Arc::clone(&calls);
        let result = executor
            .run(vec!["x".to_string()], move |_: String, _: usize| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(anyhow::anyhow!("always")) }
            })
            .await
            .unwrap();

        // Two rounds of (1 + max_retries) attempts
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(decisions.load(Ordering::SeqCst), 2);
        let error = match &result.outcomes[0] {
            Outcome::Skipped { error } => error,
            other => panic!("expected skipped, got {other:?}"),
        };
        assert_eq!(error.attempts, 2);
        assert_eq!(result.progress.skipped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_delay_precedes_retries_only() {
        let executor = BatchExecutor::new(
            BatchOptions::new()
                .with_batch_size(1)
                .with_max_retries(2)
                .with_retry_delay(Duration::from_millis(500)),
        );
        let start = tokio::time::Instant::now();
        executor
            .run(vec![()], |_: (), _: usize| async { Err::<(), _>(anyhow::anyhow!("no")) })
            .await
            .unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1_000) && elapsed < Duration::from_millis(1_100));

        let start = tokio::time::Instant::now();
        executor
            .run(vec![()], |_: (), _: usize| async { anyhow::Ok(()) })
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn batch_delay_is_skipped_after_the_last_batch() {
        let executor = BatchExecutor::new(
            BatchOptions::new()
                .with_batch_size(2)
                .with_batch_delay(Duration::from_millis(300)),
        );
        let start = tokio::time::Instant::now();
        executor
            .run(vec![1, 2, 3, 4, 5], |n: i32, _: usize| async move { anyhow::Ok(n) })
            .await
            .unwrap();
        // Three batches, two gaps
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(600) && elapsed < Duration::from_millis(900));
    }

    #[derive(Default)]
    struct RecordingScheduler {
        waits: parking_lot::Mutex<Vec<Duration>>,
    }

    impl Scheduler for RecordingScheduler {
        fn sleep(&self, duration: Duration) -> futures::future::BoxFuture<'static, ()> {
            self.waits.lock().push(duration);
            Box::pin(std::future::ready(()))
        }
    }

    #[tokio::test]
    async fn zero_batch_delay_still_yields_between_batches() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let executor = BatchExecutor::new(
            BatchOptions::new()
                .with_batch_size(2)
                .with_scheduler(Arc::clone(&scheduler) as Arc<dyn Scheduler>),
        );
        executor
            .run(vec![1, 2, 3, 4, 5], |n: i32, _: usize| async move { anyhow::Ok(n) })
            .await
            .unwrap();
        assert_eq!(*scheduler.waits.lock(), vec![Duration::ZERO, Duration::ZERO]);
    }

    #[tokio::test]
    async fn invalid_options_fail_and_mark_the_state_errored() {
        let executor: BatchExecutor<u8> = BatchExecutor::new(options().with_batch_size(0));
        let err = executor
            .run(vec![1u8], |n: u8, _: usize| async move { anyhow::Ok(n) })
            .await
            .unwrap_err();
        assert!(matches!(err, crate::utils::BatchError::Validation(_)));
        assert_eq!(executor.status(), ExecutionStatus::Errored);
    }

    #[tokio::test]
    async fn zero_width_from_the_recommender_is_rejected() {
        use crate::config::RecommenderConfig;
        use crate::processing::recommender::RecommenderState;
        use crate::telemetry::{ConnectionClass, DeviceStats, NetworkSnapshot, StaticProbe};

        let config = RecommenderConfig {
            min_batch_size: 0,
            max_batch_size: 0,
            default_batch_size: 0,
            ..RecommenderConfig::default()
        };
        let recommender = Arc::new(BatchSizeRecommender::new(config, RecommenderState::new()));
        let probe = Arc::new(StaticProbe::new(
            DeviceStats::new(2048, 4),
            NetworkSnapshot::new(10.0, 100.0, ConnectionClass::Fast4G),
        ));
        let executor = BatchExecutor::new(options())
            .with_recommender(Arc::clone(&recommender), probe as Arc<dyn TelemetryProbe>);

        let err = executor
            .run(vec![1u8, 2], |n: u8, _: usize| async move { anyhow::Ok(n) })
            .await
            .unwrap_err();
        assert!(matches!(err, crate::utils::BatchError::Validation(ValidationError::BatchSize(0))));
        assert_eq!(executor.status(), ExecutionStatus::Errored);
        recommender.stop().await;
    }

    #[tokio::test]
    async fn panicking_callbacks_do_not_abort_the_run() {
        let executor = BatchExecutor::new(
            options()
                .with_batch_size(2)
                .on_progress(|_| panic!("sink exploded"))
                .on_batch_complete(|_, _: usize| panic!("sink exploded")),
        );
        let result = executor
            .run(vec![1, 2, 3], |n: i32, _: usize| async move { anyhow::Ok(n) })
            .await
            .unwrap();
        assert!(result.is_completed());
        assert_eq!(result.outcomes.len(), 3);
    }

    #[tokio::test]
    async fn empty_input_completes_immediately() {
        let completed = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&completed);
        let executor = BatchExecutor::new(options().on_complete(move |all: &[Outcome<u8>]| {
            assert!(all.is_empty());
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        let result = executor
            .run(Vec::<u8>::new(), |n: u8, _: usize| async move { anyhow::Ok(n) })
            .await
            .unwrap();
        assert!(result.is_completed());
        assert_eq!(result.progress.total_batches, 0);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }
}
