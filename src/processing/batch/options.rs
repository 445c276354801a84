use std::sync::Arc;
use std::time::Duration;
use crate::config::ExecutorConfig;
use crate::core::{Outcome, ProgressSnapshot};
use crate::utils::{validate_batch_size, ValidationError};
use crate::worker::{ErrorHandler, Scheduler, TokioScheduler};

pub type ProgressCallback = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;
pub type BatchCompleteCallback<R> = Arc<dyn Fn(&[Outcome<R>], usize) + Send + Sync>;
pub type CompleteCallback<R> = Arc<dyn Fn(&[Outcome<R>]) + Send + Sync>;

/// Knobs and callbacks for one [`BatchExecutor`](super::BatchExecutor).
///
/// Callbacks are external sinks: their panics are logged and swallowed, and the
/// executor never depends on what they do.
pub struct BatchOptions<R> {
    pub batch_size: usize,
    pub max_retries: u32,
    /// Wait before every retry attempt, never before an item's first attempt
    pub retry_delay: Duration,
    /// Wait between batches; skipped after the last batch
    pub batch_delay: Duration,
    pub(crate) on_progress: Option<ProgressCallback>,
    pub(crate) on_batch_complete: Option<BatchCompleteCallback<R>>,
    pub(crate) on_error: Option<Arc<dyn ErrorHandler>>,
    pub(crate) on_complete: Option<CompleteCallback<R>>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
}

// Manual impl: a derive would needlessly require `R: Clone`.
impl<R> Clone for BatchOptions<R> {
    fn clone(&self) -> Self {
        Self {
            batch_size: self.batch_size,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            batch_delay: self.batch_delay,
            on_progress: self.on_progress.clone(),
            on_batch_complete: self.on_batch_complete.clone(),
            on_error: self.on_error.clone(),
            on_complete: self.on_complete.clone(),
            scheduler: Arc::clone(&self.scheduler),
        }
    }
}

impl<R> std::fmt::Debug for BatchOptions<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOptions")
            .field("batch_size", &self.batch_size)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("batch_delay", &self.batch_delay)
            .field("on_error", &self.on_error.is_some())
            .finish_non_exhaustive()
    }
}

impl<R> Default for BatchOptions<R> {
    fn default() -> Self {
        Self::from(&ExecutorConfig::default())
    }
}

impl<R> From<&ExecutorConfig> for BatchOptions<R> {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            on_progress: None,
            on_batch_complete: None,
            on_error: None,
            on_complete: None,
            scheduler: Arc::new(TokioScheduler),
        }
    }
}

impl<R> BatchOptions<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(&ProgressSnapshot) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn on_batch_complete(
        mut self,
        callback: impl Fn(&[Outcome<R>], usize) + Send + Sync + 'static,
    ) -> Self {
        self.on_batch_complete = Some(Arc::new(callback));
        self
    }

    /// Installs the retry/skip decision for items whose retries ran out.
    /// Without one, such items end as [`Outcome::Error`].
    pub fn on_error(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Called once with the full result vector, only when a pass completes.
    pub fn on_complete(mut self, callback: impl Fn(&[Outcome<R>]) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(callback));
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_batch_size(self.batch_size)
    }

    pub(crate) fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}
