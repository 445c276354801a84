//! Adaptive batch width recommendation.
//!
//! [`BatchSizeRecommender::recommend`] turns a device/network snapshot pair
//! into a batch width. Each call also feeds the shared [`RecommenderState`]
//! history, which a periodic self-tuning pass uses to nudge per-tier baselines.

mod state;
mod tuning;

use std::time::Duration;
use tracing::debug;
use crate::config::RecommenderConfig;
use crate::processing::batch::BatchSizeConfig;
use crate::telemetry::{
    classify, DeviceStats, NetworkSnapshot, TelemetryProbe, ESTIMATED_BANDWIDTH_MBPS,
    ESTIMATED_LATENCY_MS,
};
use crate::utils::{sanitize_measure, sanitize_ratio, ValidationError};

pub use state::{PerformanceHistory, PerformanceSample, RecommenderState};
pub use tuning::{TierAdjustment, MAX_BASELINE_STEP, MIN_TIER_SAMPLES, MIN_TOTAL_SAMPLES};

const HIGH_LATENCY_MS: f64 = 200.0;
const LATENCY_PENALTY: f64 = 0.7;
const FAST_LINK_BANDWIDTH_MBPS: f64 = 50.0;
const FAST_LINK_LATENCY_MS: f64 = 50.0;
const FAST_LINK_BONUS: f64 = 1.2;
const MEMORY_FLOOR_FACTOR: f64 = 0.5;
const CPU_FLOOR_FACTOR: f64 = 0.6;
const IDLE_GROWTH: f64 = 1.1;

/// Recommends batch widths from device and network conditions.
#[derive(Debug, Clone)]
pub struct BatchSizeRecommender {
    config: RecommenderConfig,
    state: RecommenderState,
}

impl Default for BatchSizeRecommender {
    fn default() -> Self {
        Self::new(RecommenderConfig::default(), RecommenderState::new())
    }
}

impl BatchSizeRecommender {
    pub fn new(config: RecommenderConfig, state: RecommenderState) -> Self {
        Self { config, state }
    }

    /// Like [`Self::new`], but rejects an unusable batch size window.
    pub fn try_new(config: RecommenderConfig, state: RecommenderState) -> Result<Self, ValidationError> {
        config.bounds().validate()?;
        Ok(Self::new(config, state))
    }

    pub fn state(&self) -> &RecommenderState {
        &self.state
    }

    pub fn bounds(&self) -> BatchSizeConfig {
        self.config.bounds()
    }

    /// Recommends a batch width, always within `[min_batch_size, max_batch_size]`.
    ///
    /// Missing input yields the configured default. Otherwise the tier baseline
    /// is scaled by network conditions, capped by connection class, scaled by
    /// resource pressure, floored and clamped. The first call inside a tokio
    /// runtime also starts the self-tuning task.
    pub fn recommend(&self, device: Option<&DeviceStats>, network: Option<&NetworkSnapshot>) -> usize {
        let bounds = self.bounds();
        let (Some(device), Some(network)) = (device, network) else {
            debug!("Telemetry missing; using default batch size");
            return bounds.bounded_default();
        };

        let tier = classify(device);
        self.state.record(device, network, tier);
        let baseline = self.state.baseline(tier);

        let mut size = baseline as f64;
        size = self.adjust_for_network(size, network);
        size = self.adjust_for_pressure(size, device);

        let recommended = bounds.clamp(size.floor() as usize);
        debug!(
            "Recommended batch size {} (tier {}, baseline {}, raw {:.2}{})",
            recommended,
            tier,
            baseline,
            size,
            if device.resources.estimated || network.estimated { ", estimated telemetry" } else { "" }
        );

        self.state.start_tuner(
            Duration::from_millis(self.config.tuning_interval_ms),
            bounds,
        );
        recommended
    }

    /// Polls `probe` and recommends from its readings.
    pub fn recommend_from(&self, probe: &dyn TelemetryProbe) -> usize {
        let device = probe.device_stats();
        let network = probe.network();
        self.recommend(Some(&device), Some(&network))
    }

    /// Latency dominates bandwidth; the connection-class cap applies last.
    fn adjust_for_network(&self, size: f64, network: &NetworkSnapshot) -> f64 {
        let latency = sanitize_measure(network.latency_ms, ESTIMATED_LATENCY_MS);
        let bandwidth = sanitize_measure(network.bandwidth_mbps, ESTIMATED_BANDWIDTH_MBPS);

        let mut size = size;
        if latency > HIGH_LATENCY_MS {
            size *= LATENCY_PENALTY;
        } else if bandwidth > FAST_LINK_BANDWIDTH_MBPS && latency < FAST_LINK_LATENCY_MS {
            size *= FAST_LINK_BONUS;
        }
        match network.connection_class.batch_cap() {
            Some(cap) => size.min(cap),
            None => size,
        }
    }

    /// At most one pressure adjustment applies; memory takes precedence over CPU.
    /// An unreadable usage sits exactly at its threshold and triggers nothing.
    fn adjust_for_pressure(&self, size: f64, device: &DeviceStats) -> f64 {
        let memory_threshold = self.config.memory_threshold;
        let cpu_threshold = self.config.cpu_threshold;
        let memory = sanitize_ratio(device.resources.memory_usage_ratio, memory_threshold);
        let cpu = sanitize_ratio(device.resources.cpu_usage_ratio, cpu_threshold);

        if memory > memory_threshold {
            size * pressure_factor(memory, memory_threshold, MEMORY_FLOOR_FACTOR)
        } else if cpu > cpu_threshold {
            size * pressure_factor(cpu, cpu_threshold, CPU_FLOOR_FACTOR)
        } else if memory < memory_threshold * 0.5 && cpu < cpu_threshold * 0.5 {
            size * IDLE_GROWTH
        } else {
            size
        }
    }

    /// Runs one self-tuning pass immediately.
    pub fn retune(&self) -> Vec<TierAdjustment> {
        self.state.retune(&self.bounds())
    }

    pub fn is_tuning(&self) -> bool {
        self.state.is_tuning()
    }

    /// Halts self-tuning and clears the history. A later `recommend()` restarts tuning.
    pub async fn stop(&self) {
        self.state.stop_tuner().await;
        self.state.clear_history();
    }
}

/// Linear scale-down from 1 at the threshold toward 0 at full usage, floored.
fn pressure_factor(usage: f64, threshold: f64, floor: f64) -> f64 {
    let headroom = 1.0 - threshold;
    if headroom <= 0.0 {
        return floor;
    }
    (1.0 - (usage - threshold) / headroom).max(floor)
}
