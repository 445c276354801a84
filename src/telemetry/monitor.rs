//! Periodic memory-pressure sampler.
//!
//! The monitor polls a [`TelemetryProbe`] on a fixed interval, classifies the
//! reading into a [`PressureLevel`] and invokes every callback registered for
//! that level. Sampling runs in a background task that respects cancellation
//! for clean shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::config::MonitorConfig;
use crate::telemetry::{MemoryInfo, TelemetryProbe};
use crate::utils::invoke_guarded;

/// Default sampling interval (10 seconds).
pub const DEFAULT_INTERVAL_MS: u64 = 10_000;

/// Default usage ratio at which pressure becomes `Warning`.
pub const DEFAULT_WARNING_THRESHOLD: f64 = 0.70;

/// Default usage ratio at which pressure becomes `Danger`.
pub const DEFAULT_DANGER_THRESHOLD: f64 = 0.85;

/// Percentage assumed when neither a measurement nor a memory hint exists.
const FALLBACK_PERCENTAGE: f64 = 30.0;

/// Size of the throwaway allocation used as a reclaim nudge.
const RECLAIM_BUFFER_BYTES: usize = 4 * 1024 * 1024;

/// Memory pressure levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PressureLevel {
    Normal,
    Warning,
    Danger,
}

/// Subscriber invoked with the reading that produced its level.
pub type PressureCallback = Arc<dyn Fn(&MemoryInfo) + Send + Sync>;

/// Host-provided memory reclaim hook (for example an allocator purge).
pub type ReclaimHook = Arc<dyn Fn() + Send + Sync>;

/// Sampling options; thresholds are usage ratios in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorOptions {
    pub interval: Duration,
    pub warning_threshold: f64,
    pub danger_threshold: f64,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            danger_threshold: DEFAULT_DANGER_THRESHOLD,
        }
    }
}

impl From<&MonitorConfig> for MonitorOptions {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            warning_threshold: config.warning_threshold,
            danger_threshold: config.danger_threshold,
        }
    }
}

impl MonitorOptions {
    /// Classifies a usage ratio; danger wins over warning over normal.
    pub fn classify(&self, usage_ratio: f64) -> PressureLevel {
        if usage_ratio >= self.danger_threshold {
            PressureLevel::Danger
        } else if usage_ratio >= self.warning_threshold {
            PressureLevel::Warning
        } else {
            PressureLevel::Normal
        }
    }
}

struct Sampler {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Memory-pressure monitor with per-level subscribers.
pub struct ResourceMonitor {
    probe: Arc<dyn TelemetryProbe>,
    options: Mutex<MonitorOptions>,
    callbacks: Mutex<HashMap<PressureLevel, Vec<PressureCallback>>>,
    last_level: Mutex<Option<PressureLevel>>,
    reclaim_hook: Option<ReclaimHook>,
    sampler: Mutex<Option<Sampler>>,
}

impl ResourceMonitor {
    pub fn new(probe: Arc<dyn TelemetryProbe>) -> Self {
        Self {
            probe,
            options: Mutex::new(MonitorOptions::default()),
            callbacks: Mutex::new(HashMap::new()),
            last_level: Mutex::new(None),
            reclaim_hook: None,
            sampler: Mutex::new(None),
        }
    }

    /// Installs an explicit reclaim hook used by [`Self::suggest_garbage_collection`].
    pub fn with_reclaim_hook(mut self, hook: ReclaimHook) -> Self {
        self.reclaim_hook = Some(hook);
        self
    }

    /// Starts periodic sampling. Idempotent: returns `true` when sampling is
    /// active afterwards, whether it was started now or already running.
    ///
    /// Options are only applied when sampling actually starts. Returns `false`
    /// when called outside a tokio runtime.
    pub fn start_monitoring(self: &Arc<Self>, options: Option<MonitorOptions>) -> bool {
        let mut sampler = self.sampler.lock();
        if sampler.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            debug!("Resource monitoring already active");
            return true;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Resource monitoring requires a tokio runtime; not started");
            return false;
        };

        let options = options.unwrap_or_default();
        let interval = options.interval.max(Duration::from_millis(1));
        info!(
            interval_ms = interval.as_millis() as u64,
            warning = options.warning_threshold,
            danger = options.danger_threshold,
            "Resource monitoring starting"
        );
        *self.options.lock() = options;

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let monitor = Arc::downgrade(self);
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => {
                        debug!("Resource monitoring stopped");
                        break;
                    }

                    _ = ticker.tick() => {
                        let Some(monitor) = monitor.upgrade() else {
                            debug!("Resource monitor dropped; sampling ends");
                            break;
                        };
                        monitor.sample_once();
                    }
                }
            }
        });

        *sampler = Some(Sampler { shutdown, handle });
        true
    }

    /// Stops sampling. Safe to call when inactive.
    pub fn stop_monitoring(&self) {
        if let Some(sampler) = self.sampler.lock().take() {
            sampler.shutdown.cancel();
            info!("Resource monitoring stopping");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.sampler
            .lock()
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    /// Reads current memory usage without side effects.
    ///
    /// Without a precise reading the result is estimated: `100 - hint * 10`
    /// (clamped to `[0, 100]`) when a coarse memory hint in GB exists, else 30.
    pub fn get_memory_info(&self) -> MemoryInfo {
        if let Some(info) = self.probe.memory() {
            return info;
        }

        match self.probe.device_memory_hint_gb() {
            Some(hint_gb) if hint_gb.is_finite() && hint_gb > 0.0 => {
                let percentage = (100.0 - hint_gb * 10.0).clamp(0.0, 100.0);
                let total = (hint_gb * 1024.0 * 1024.0 * 1024.0) as u64;
                let used = (total as f64 * percentage / 100.0) as u64;
                MemoryInfo {
                    total,
                    used,
                    available: total.saturating_sub(used),
                    percentage,
                    estimated: true,
                }
            }
            _ => MemoryInfo {
                total: 0,
                used: 0,
                available: 0,
                percentage: FALLBACK_PERCENTAGE,
                estimated: true,
            },
        }
    }

    /// Registers `callback` for `level`. Registering the same callback twice is a no-op.
    pub fn add_callback(&self, level: PressureLevel, callback: PressureCallback) {
        let mut callbacks = self.callbacks.lock();
        let registered = callbacks.entry(level).or_default();
        if !registered.iter().any(|existing| Arc::ptr_eq(existing, &callback)) {
            registered.push(callback);
        }
    }

    pub fn remove_callback(&self, level: PressureLevel, callback: &PressureCallback) {
        if let Some(registered) = self.callbacks.lock().get_mut(&level) {
            registered.retain(|existing| !Arc::ptr_eq(existing, callback));
        }
    }

    pub fn callback_count(&self, level: PressureLevel) -> usize {
        self.callbacks.lock().get(&level).map_or(0, Vec::len)
    }

    /// Level observed by the most recent sample.
    pub fn last_level(&self) -> Option<PressureLevel> {
        *self.last_level.lock()
    }

    /// Takes one sample and notifies the subscribers of the matching level.
    ///
    /// A panicking subscriber is logged and does not stop the others.
    pub fn sample_once(&self) -> PressureLevel {
        let info = self.get_memory_info();
        let level = self.options.lock().classify(info.usage_ratio());

        let previous = self.last_level.lock().replace(level);
        if previous != Some(level) {
            debug!(
                "Memory pressure {:?} -> {:?} ({:.1}% used{})",
                previous,
                level,
                info.percentage,
                if info.estimated { ", estimated" } else { "" }
            );
        }

        // Snapshot the subscriber list so callbacks may (un)register freely.
        let subscribers = self.callbacks.lock().get(&level).cloned().unwrap_or_default();
        for callback in subscribers {
            invoke_guarded("Resource monitor", || callback(&info));
        }
        level
    }

    /// Best-effort hint to release memory. Never guaranteed to reclaim anything.
    ///
    /// Calls the host reclaim hook when one is installed and returns `true`;
    /// otherwise allocates and drops a throwaway buffer and returns `false`.
    pub fn suggest_garbage_collection(&self) -> bool {
        if let Some(hook) = &self.reclaim_hook {
            debug!("Invoking host reclaim hook");
            return invoke_guarded("Reclaim hook", || hook());
        }

        let buffer = vec![0u8; RECLAIM_BUFFER_BYTES];
        std::hint::black_box(&buffer);
        drop(buffer);
        debug!("No reclaim hook installed; released a throwaway buffer");
        false
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        if let Some(sampler) = self.sampler.get_mut().take() {
            sampler.shutdown.cancel();
        }
    }
}
