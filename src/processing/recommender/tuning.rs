//! Feedback pass that nudges tier baselines toward observed conditions.

use serde::Serialize;
use crate::processing::batch::BatchSizeConfig;
use crate::telemetry::{DeviceTier, ESTIMATED_BANDWIDTH_MBPS, ESTIMATED_LATENCY_MS};
use crate::utils::{sanitize_measure, sanitize_ratio};
use super::state::StateInner;

/// Samples needed in the whole history before any tier is tuned.
pub const MIN_TOTAL_SAMPLES: usize = 10;
/// Samples a tier needs before its own baseline is tuned.
pub const MIN_TIER_SAMPLES: usize = 5;
/// Largest baseline change a single pass may commit.
pub const MAX_BASELINE_STEP: usize = 2;
/// Usage assumed for an unreadable sample; between the growth and shrink rules.
const NEUTRAL_USAGE: f64 = 0.5;

/// Proposed change to one tier baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierAdjustment {
    pub tier: DeviceTier,
    pub previous: usize,
    pub proposed: usize,
    /// False when the proposal swung too far and was discarded
    pub committed: bool,
}

impl TierAdjustment {
    pub fn changed(&self) -> bool {
        self.previous != self.proposed
    }
}

#[derive(Debug, Default)]
struct TierMeans {
    memory: f64,
    cpu: f64,
    latency: f64,
    bandwidth: f64,
}

pub(crate) fn retune(state: &mut StateInner, bounds: &BatchSizeConfig) -> Vec<TierAdjustment> {
    if state.history.len() < MIN_TOTAL_SAMPLES {
        return Vec::new();
    }

    let mut adjustments = Vec::new();
    for tier in DeviceTier::ALL {
        let Some(means) = tier_means(state, tier) else {
            continue;
        };

        let previous = state.profiles[tier.index()].baseline_batch_size;
        let mut delta: i64 = 0;
        if means.memory < 0.4 && means.cpu < 0.4 {
            delta += 1;
        }
        if means.memory > 0.6 || means.cpu > 0.7 {
            delta -= 1;
        }
        if means.latency > 150.0 {
            delta -= 1;
        }
        if means.bandwidth > 30.0 && means.latency < 80.0 {
            delta += 1;
        }

        let proposed = (previous as i64 + delta).max(0) as usize;
        let proposed = bounds.clamp(proposed);
        let committed = proposed.abs_diff(previous) <= MAX_BASELINE_STEP;
        if committed {
            state.profiles[tier.index()].baseline_batch_size = proposed;
        }
        adjustments.push(TierAdjustment {
            tier,
            previous,
            proposed,
            committed,
        });
    }
    adjustments
}

fn tier_means(state: &StateInner, tier: DeviceTier) -> Option<TierMeans> {
    let mut sums = TierMeans::default();
    let mut count = 0usize;
    for sample in state.history.for_tier(tier) {
        sums.memory += sanitize_ratio(sample.device.resources.memory_usage_ratio, NEUTRAL_USAGE);
        sums.cpu += sanitize_ratio(sample.device.resources.cpu_usage_ratio, NEUTRAL_USAGE);
        sums.latency += sanitize_measure(sample.network.latency_ms, ESTIMATED_LATENCY_MS);
        sums.bandwidth += sanitize_measure(sample.network.bandwidth_mbps, ESTIMATED_BANDWIDTH_MBPS);
        count += 1;
    }
    if count < MIN_TIER_SAMPLES {
        return None;
    }

    let n = count as f64;
    Some(TierMeans {
        memory: sums.memory / n,
        cpu: sums.cpu / n,
        latency: sums.latency / n,
        bandwidth: sums.bandwidth / n,
    })
}

#[cfg(test)]
mod tests {
    use crate::processing::batch::BatchSizeConfig;
    use crate::processing::recommender::RecommenderState;
    use crate::telemetry::{ConnectionClass, DeviceStats, DeviceTier, NetworkSnapshot};

    fn fill(state: &RecommenderState, tier: DeviceTier, n: usize, memory: f64, cpu: f64, net: NetworkSnapshot) {
        let device = DeviceStats::new(1024, 2).with_usage(memory, cpu);
        for _ in 0..n {
            state.record(&device, &net, tier);
        }
    }

    fn fast() -> NetworkSnapshot {
        NetworkSnapshot::new(100.0, 20.0, ConnectionClass::Fast4G)
    }

    fn neutral() -> NetworkSnapshot {
        NetworkSnapshot::new(10.0, 100.0, ConnectionClass::Fast4G)
    }

    #[test]
    fn needs_enough_samples() {
        let state = RecommenderState::new();
        let bounds = BatchSizeConfig::default();
        fill(&state, DeviceTier::LowEnd, 9, 0.1, 0.1, fast());
        assert!(state.retune(&bounds).is_empty());

        // Ten in total, but only four for mid-range: only low-end is tuned.
        fill(&state, DeviceTier::MidRange, 4, 0.1, 0.1, fast());
        let adjustments = state.retune(&bounds);
        assert_eq!(adjustments.len(), 1);
        assert_eq!(adjustments[0].tier, DeviceTier::LowEnd);
        assert_eq!(state.baseline(DeviceTier::MidRange), 20);
    }

    #[test]
    fn rules_stack_within_the_step_limit() {
        let state = RecommenderState::new();
        let bounds = BatchSizeConfig::default();
        // Idle and fast: +1 +1
        fill(&state, DeviceTier::LowEnd, 10, 0.1, 0.1, fast());
        let adjustments = state.retune(&bounds);
        assert_eq!(adjustments[0].previous, 10);
        assert_eq!(adjustments[0].proposed, 12);
        assert!(adjustments[0].committed);
        assert_eq!(state.baseline(DeviceTier::LowEnd), 12);
    }

    #[test]
    fn pressure_and_latency_pull_down() {
        let state = RecommenderState::new();
        let bounds = BatchSizeConfig::default();
        let slow = NetworkSnapshot::new(1.0, 300.0, ConnectionClass::ThreeG);
        fill(&state, DeviceTier::HighEnd, 10, 0.9, 0.9, slow);
        state.retune(&bounds);
        assert_eq!(state.baseline(DeviceTier::HighEnd), 33);
    }

    #[test]
    fn mixed_signals_cancel_out() {
        let state = RecommenderState::new();
        let bounds = BatchSizeConfig::default();
        // Idle (+1) but high latency (-1)
        let laggy = NetworkSnapshot::new(5.0, 200.0, ConnectionClass::Fast4G);
        fill(&state, DeviceTier::MidRange, 10, 0.2, 0.2, laggy);
        let adjustments = state.retune(&bounds);
        assert!(!adjustments[0].changed());
        assert_eq!(state.baseline(DeviceTier::MidRange), 20);
    }

    #[test]
    fn baseline_drifts_monotonically_and_converges_at_the_bound() {
        let state = RecommenderState::new();
        let bounds = BatchSizeConfig::default();
        fill(&state, DeviceTier::HighEnd, 20, 0.1, 0.1, fast());

        let mut previous = state.baseline(DeviceTier::HighEnd);
        let mut stable_cycles = 0;
        for _ in 0..40 {
            state.retune(&bounds);
            let current = state.baseline(DeviceTier::HighEnd);
            assert!(current.abs_diff(previous) <= 2);
            assert!(current >= previous);
            if current == previous {
                stable_cycles += 1;
            }
            previous = current;
        }
        assert_eq!(previous, 50);
        assert!(stable_cycles > 0);
    }

    #[test]
    fn neutral_history_leaves_baselines_alone() {
        let state = RecommenderState::new();
        let bounds = BatchSizeConfig::default();
        fill(&state, DeviceTier::LowEnd, 12, 0.5, 0.5, neutral());
        for _ in 0..5 {
            state.retune(&bounds);
        }
        assert_eq!(state.baseline(DeviceTier::LowEnd), 10);
    }

    #[test]
    fn oversized_swings_are_discarded() {
        let state = RecommenderState::new();
        // Baseline 5 sits far below a raised floor, so clamping would jump 15.
        let bounds = BatchSizeConfig { min_size: 20, max_size: 50, default_size: 20 };
        fill(&state, DeviceTier::UltraLowEnd, 10, 0.5, 0.5, neutral());
        let adjustments = state.retune(&bounds);
        assert_eq!(adjustments[0].proposed, 20);
        assert!(!adjustments[0].committed);
        assert_eq!(state.baseline(DeviceTier::UltraLowEnd), 5);
    }

    #[test]
    fn unreadable_samples_are_neutral_and_infinite_ones_saturate() {
        let state = RecommenderState::new();
        let bounds = BatchSizeConfig::default();
        let unknown = NetworkSnapshot::new(f64::NAN, f64::NAN, ConnectionClass::Unknown);
        fill(&state, DeviceTier::LowEnd, 10, f64::NAN, f64::NAN, unknown);
        state.retune(&bounds);
        assert_eq!(state.baseline(DeviceTier::LowEnd), 10);

        let stalled = NetworkSnapshot::new(100.0, f64::INFINITY, ConnectionClass::Fast4G);
        fill(&state, DeviceTier::HighEnd, 10, f64::INFINITY, 0.1, stalled);
        state.retune(&bounds);
        // Saturated memory (-1) and unbounded latency (-1)
        assert_eq!(state.baseline(DeviceTier::HighEnd), 33);
    }
}
