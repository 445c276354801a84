//! Execution state machine and its control handle.
//!
//! One [`ExecutionControl`] backs one executor. Its status moves through
//! `Idle -> Running <-> Paused -> {Completed | Cancelled | Errored}` and is
//! published on a `watch` channel so callers can await transitions instead of
//! assuming `pause()`/`cancel()` take effect immediately: only batch boundaries
//! are interruptible.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, watch};
use tracing::{debug, info};
use crate::utils::{BatchError, BatchResult};

/// Lifecycle state of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Cancelled,
    Errored,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Errored)
    }

    fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

/// What the control loop should do at a batch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Checkpoint {
    Continue,
    Cancel,
}

struct ControlInner {
    status: watch::Sender<ExecutionStatus>,
    pause_requested: AtomicBool,
    cancel_requested: AtomicBool,
    wake: Notify,
}

/// Cloneable handle for requesting pause, resume and cancel.
#[derive(Clone)]
pub struct ExecutionControl {
    inner: Arc<ControlInner>,
}

impl Default for ExecutionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutionControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionControl")
            .field("status", &self.status())
            .field("pause_requested", &self.is_pause_requested())
            .field("cancel_requested", &self.is_cancel_requested())
            .finish()
    }
}

impl ExecutionControl {
    pub fn new() -> Self {
        let (status, _) = watch::channel(ExecutionStatus::Idle);
        Self {
            inner: Arc::new(ControlInner {
                status,
                pause_requested: AtomicBool::new(false),
                cancel_requested: AtomicBool::new(false),
                wake: Notify::new(),
            }),
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        *self.inner.status.borrow()
    }

    /// Subscribes to status transitions.
    pub fn subscribe(&self) -> watch::Receiver<ExecutionStatus> {
        self.inner.status.subscribe()
    }

    /// Requests a pause at the next batch boundary.
    pub fn pause(&self) {
        debug!("Pause requested (status: {:?})", self.status());
        self.inner.pause_requested.store(true, Ordering::SeqCst);
    }

    /// Clears a pending or active pause; the loop re-enters at the same batch index.
    pub fn resume(&self) {
        debug!("Resume requested (status: {:?})", self.status());
        self.inner.pause_requested.store(false, Ordering::SeqCst);
        self.inner.wake.notify_one();
    }

    /// Requests cancellation at the next batch boundary; also releases a paused loop.
    pub fn cancel(&self) {
        debug!("Cancel requested (status: {:?})", self.status());
        self.inner.cancel_requested.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();
    }

    pub fn is_pause_requested(&self) -> bool {
        self.inner.pause_requested.load(Ordering::SeqCst)
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.inner.cancel_requested.load(Ordering::SeqCst)
    }

    /// Waits until the status equals `target`.
    pub async fn wait_for(&self, target: ExecutionStatus) {
        let mut rx = self.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = rx.wait_for(|status| *status == target).await;
    }

    /// Waits until the execution reaches a terminal status and returns it.
    pub async fn wait_for_terminal(&self) -> ExecutionStatus {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|status| status.is_terminal()).await;
        self.status()
    }

    /// Claims the state for a new pass. Fails when a pass is already active.
    pub(crate) fn begin(&self) -> BatchResult<()> {
        let mut previous = ExecutionStatus::Idle;
        let claimed = self.inner.status.send_if_modified(|status| {
            previous = *status;
            if status.is_active() {
                false
            } else {
                *status = ExecutionStatus::Running;
                true
            }
        });
        if !claimed {
            return Err(BatchError::AlreadyRunning);
        }
        // Requests made against a finished pass must not leak into this one.
        if previous.is_terminal() {
            self.inner.pause_requested.store(false, Ordering::SeqCst);
            self.inner.cancel_requested.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    pub(crate) fn set_status(&self, status: ExecutionStatus) {
        self.inner.status.send_replace(status);
    }

    /// Batch-boundary checkpoint: honours cancel, and parks the loop while paused.
    pub(crate) async fn checkpoint(&self, batch_index: usize) -> Checkpoint {
        if self.is_cancel_requested() {
            return Checkpoint::Cancel;
        }
        if !self.is_pause_requested() {
            return Checkpoint::Continue;
        }

        info!("Execution paused before batch {}", batch_index + 1);
        self.set_status(ExecutionStatus::Paused);
        loop {
            let woken = self.inner.wake.notified();
            if !self.is_pause_requested() || self.is_cancel_requested() {
                break;
            }
            woken.await;
        }

        if self.is_cancel_requested() {
            return Checkpoint::Cancel;
        }
        info!("Execution resumed at batch {}", batch_index + 1);
        self.set_status(ExecutionStatus::Running);
        Checkpoint::Continue
    }
}
