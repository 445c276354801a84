//! Injectable delay/yield operation used at every scheduled suspension point.
//!
//! The executor and the stream writer never call `tokio::time::sleep` directly:
//! inter-retry and inter-batch waits go through a [`Scheduler`] so tests can
//! swap in [`ImmediateScheduler`] and run whole batch sequences without wall-clock
//! delay.

use std::time::Duration;
use futures::future::BoxFuture;

pub trait Scheduler: Send + Sync {
    /// Suspends the caller for roughly `duration`.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;

    /// Gives other cooperative tasks a chance to run.
    fn yield_now(&self) -> BoxFuture<'static, ()> {
        self.sleep(Duration::ZERO)
    }
}

/// Production scheduler backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if duration.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(duration).await;
            }
        })
    }
}

/// Scheduler whose waits complete immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn sleep(&self, _duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(std::future::ready(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_waits_on_the_timer() {
        let start = tokio::time::Instant::now();
        TokioScheduler.sleep(Duration::from_millis(250)).await;
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_scheduler_does_not_advance_time() {
        let start = tokio::time::Instant::now();
        ImmediateScheduler.sleep(Duration::from_secs(60)).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
