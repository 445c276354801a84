use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use crate::config::DEFAULT_HISTORY_CAPACITY;
use crate::processing::batch::BatchSizeConfig;
use crate::telemetry::{DeviceStats, DeviceTier, DeviceTierProfile, NetworkSnapshot};
use super::tuning::{self, TierAdjustment};

/// One `recommend()` input pair, tagged with the tier it classified to.
#[derive(Debug, Clone)]
pub struct PerformanceSample {
    pub recorded_at: Instant,
    pub tier: DeviceTier,
    pub device: DeviceStats,
    pub network: NetworkSnapshot,
}

/// Bounded FIFO of performance samples; the oldest sample is evicted first.
#[derive(Debug, Clone)]
pub struct PerformanceHistory {
    samples: VecDeque<PerformanceSample>,
    capacity: usize,
}

impl PerformanceHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: PerformanceSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &PerformanceSample> {
        self.samples.iter()
    }

    pub fn for_tier(&self, tier: DeviceTier) -> impl Iterator<Item = &PerformanceSample> {
        self.samples.iter().filter(move |s| s.tier == tier)
    }
}

pub(crate) struct StateInner {
    pub(crate) profiles: [DeviceTierProfile; 4],
    pub(crate) history: PerformanceHistory,
}

struct TunerHandle {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Tier baselines and performance history shared by every recommender built
/// on the same state.
///
/// Cloning is cheap and yields a handle onto the same state. Construct one per
/// composition root (or per test) and pass it in; there is no global instance.
/// Reads and writes of a field always happen under one lock acquisition, so
/// concurrent `recommend()` callers never observe a half-applied update.
#[derive(Clone)]
pub struct RecommenderState {
    inner: Arc<Mutex<StateInner>>,
    tuner: Arc<Mutex<Option<TunerHandle>>>,
}

impl Default for RecommenderState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RecommenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("RecommenderState")
            .field("baselines", &inner.profiles.iter().map(|p| p.baseline_batch_size).collect::<Vec<_>>())
            .field("history_len", &inner.history.len())
            .field("tuning", &self.is_tuning())
            .finish()
    }
}

impl RecommenderState {
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StateInner {
                profiles: DeviceTierProfile::canonical_set(),
                history: PerformanceHistory::with_capacity(capacity),
            })),
            tuner: Arc::new(Mutex::new(None)),
        }
    }

    pub fn profile(&self, tier: DeviceTier) -> DeviceTierProfile {
        self.inner.lock().profiles[tier.index()].clone()
    }

    pub fn baseline(&self, tier: DeviceTier) -> usize {
        self.inner.lock().profiles[tier.index()].baseline_batch_size
    }

    /// Overrides a tier baseline, for seeding state from a previous session.
    pub fn set_baseline(&self, tier: DeviceTier, baseline: usize) {
        self.inner.lock().profiles[tier.index()].baseline_batch_size = baseline;
    }

    pub fn history_len(&self) -> usize {
        self.inner.lock().history.len()
    }

    /// Copy of the current history, oldest first.
    pub fn history(&self) -> Vec<PerformanceSample> {
        self.inner.lock().history.iter().cloned().collect()
    }

    pub fn record(&self, device: &DeviceStats, network: &NetworkSnapshot, tier: DeviceTier) {
        self.inner.lock().history.push(PerformanceSample {
            recorded_at: Instant::now(),
            tier,
            device: device.clone(),
            network: network.clone(),
        });
    }

    pub fn clear_history(&self) {
        self.inner.lock().history.clear();
    }

    /// Runs one self-tuning pass over the recorded history.
    pub fn retune(&self, bounds: &BatchSizeConfig) -> Vec<TierAdjustment> {
        let mut inner = self.inner.lock();
        tuning::retune(&mut inner, bounds)
    }

    pub fn is_tuning(&self) -> bool {
        self.tuner
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Starts the periodic self-tuning task unless it is already running.
    ///
    /// Returns `false` when no tokio runtime is available.
    pub(crate) fn start_tuner(&self, interval: Duration, bounds: BatchSizeConfig) -> bool {
        let mut tuner = self.tuner.lock();
        if tuner.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return true;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No tokio runtime; self-tuning not started");
            return false;
        };

        let interval = interval.max(Duration::from_millis(1));
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let state = self.clone_inner();
        info!("Batch size self-tuning started (every {:?})", interval);

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => {
                        debug!("Batch size self-tuning stopped");
                        break;
                    }

                    _ = ticker.tick() => {
                        let adjustments = tuning::retune(&mut state.lock(), &bounds);
                        for adjustment in adjustments.iter().filter(|a| a.committed && a.changed()) {
                            debug!(
                                "Tier {} baseline {} -> {}",
                                adjustment.tier, adjustment.previous, adjustment.proposed
                            );
                        }
                    }
                }
            }
        });

        *tuner = Some(TunerHandle { shutdown, handle });
        true
    }

    /// Halts the self-tuning task and waits for it to exit.
    pub(crate) async fn stop_tuner(&self) {
        let handle = self.tuner.lock().take();
        if let Some(TunerHandle { shutdown, handle }) = handle {
            shutdown.cancel();
            // A cancelled or panicked tuner is stopped either way.
            let _ = handle.await;
            info!("Batch size self-tuning halted");
        }
    }

    fn clone_inner(&self) -> Arc<Mutex<StateInner>> {
        Arc::clone(&self.inner)
    }
}
