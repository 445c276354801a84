//! Device capability classification.
//!
//! [`classify`] maps raw device stats onto one of four capability tiers. The
//! mapping itself never changes at runtime; only the per-tier baselines held by
//! the recommender drift.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::telemetry::ConnectionClass;
use crate::utils::ValidationError;

/// Capability tier, ordered from least to most capable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceTier {
    UltraLowEnd,
    LowEnd,
    MidRange,
    HighEnd,
}

impl DeviceTier {
    pub const ALL: [DeviceTier; 4] = [
        DeviceTier::UltraLowEnd,
        DeviceTier::LowEnd,
        DeviceTier::MidRange,
        DeviceTier::HighEnd,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UltraLowEnd => "ultraLowEnd",
            Self::LowEnd => "lowEnd",
            Self::MidRange => "midRange",
            Self::HighEnd => "highEnd",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DeviceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceTier {
    type Err = ValidationError;

    /// Accepts `ultraLowEnd`, `ultra_low_end`, `ultra-low-end` and so on.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "ultralowend" => Ok(Self::UltraLowEnd),
            "lowend" => Ok(Self::LowEnd),
            "midrange" => Ok(Self::MidRange),
            "highend" => Ok(Self::HighEnd),
            _ => Err(ValidationError::settings(format!("Unknown device tier: {s}"))),
        }
    }
}

/// Current memory/CPU pressure, both ratios in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceSnapshot {
    pub memory_usage_ratio: f64,
    pub cpu_usage_ratio: f64,
    /// True when the ratios are a fallback guess rather than a measurement
    pub estimated: bool,
}

impl ResourceSnapshot {
    pub fn new(memory_usage_ratio: f64, cpu_usage_ratio: f64) -> Self {
        Self {
            memory_usage_ratio,
            cpu_usage_ratio,
            estimated: false,
        }
    }
}

/// Raw device statistics as reported by the host.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceStats {
    /// Installed memory in megabytes
    pub memory_mb: Option<u64>,
    pub cpu_cores: Option<u32>,
    /// Explicit tier hint; wins over the thresholds when it names a known tier
    pub device_tier: Option<String>,
    pub resources: ResourceSnapshot,
}

impl DeviceStats {
    pub fn new(memory_mb: u64, cpu_cores: u32) -> Self {
        Self {
            memory_mb: Some(memory_mb),
            cpu_cores: Some(cpu_cores),
            ..Self::default()
        }
    }

    pub fn with_usage(mut self, memory_usage_ratio: f64, cpu_usage_ratio: f64) -> Self {
        self.resources = ResourceSnapshot::new(memory_usage_ratio, cpu_usage_ratio);
        self
    }

    pub fn with_tier_hint(mut self, tier: impl Into<String>) -> Self {
        self.device_tier = Some(tier.into());
        self
    }
}

/// Per-tier profile; `baseline_batch_size` is the only field that drifts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTierProfile {
    pub tier: DeviceTier,
    pub baseline_batch_size: usize,
    pub memory_limit_mb: u64,
    pub cpu_cores: u32,
    pub network_tier: ConnectionClass,
}

impl DeviceTierProfile {
    /// Profile a tier starts from before any self-tuning.
    pub fn canonical(tier: DeviceTier) -> Self {
        let (baseline_batch_size, memory_limit_mb, cpu_cores, network_tier) = match tier {
            DeviceTier::UltraLowEnd => (5, 512, 1, ConnectionClass::TwoG),
            DeviceTier::LowEnd => (10, 1024, 2, ConnectionClass::ThreeG),
            DeviceTier::MidRange => (20, 2048, 4, ConnectionClass::Slow4G),
            DeviceTier::HighEnd => (35, 4096, 8, ConnectionClass::Fast4G),
        };
        Self {
            tier,
            baseline_batch_size,
            memory_limit_mb,
            cpu_cores,
            network_tier,
        }
    }

    pub fn canonical_set() -> [DeviceTierProfile; 4] {
        DeviceTier::ALL.map(Self::canonical)
    }
}

/// Maps device stats to a tier, most capable first. An explicit, recognised
/// tier hint is returned unchanged.
pub fn classify(stats: &DeviceStats) -> DeviceTier {
    if let Some(tier) = stats.device_tier.as_deref().and_then(|hint| hint.parse().ok()) {
        return tier;
    }

    let memory_mb = stats.memory_mb.unwrap_or(0);
    let cores = stats.cpu_cores.unwrap_or(0);
    if memory_mb >= 4000 && cores >= 8 {
        DeviceTier::HighEnd
    } else if memory_mb >= 2000 && cores >= 4 {
        DeviceTier::MidRange
    } else if memory_mb >= 1000 && cores >= 2 {
        DeviceTier::LowEnd
    } else {
        DeviceTier::UltraLowEnd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_pick_the_most_capable_matching_tier() {
        assert_eq!(classify(&DeviceStats::new(8192, 8)), DeviceTier::HighEnd);
        assert_eq!(classify(&DeviceStats::new(8192, 6)), DeviceTier::MidRange);
        assert_eq!(classify(&DeviceStats::new(2000, 4)), DeviceTier::MidRange);
        assert_eq!(classify(&DeviceStats::new(1500, 2)), DeviceTier::LowEnd);
        assert_eq!(classify(&DeviceStats::new(1000, 1)), DeviceTier::UltraLowEnd);
        assert_eq!(classify(&DeviceStats::new(500, 1)), DeviceTier::UltraLowEnd);
    }

    #[test]
    fn recognised_hint_wins_and_unknown_hint_is_ignored() {
        let hinted = DeviceStats::new(500, 1).with_tier_hint("highEnd");
        assert_eq!(classify(&hinted), DeviceTier::HighEnd);

        let hinted = DeviceStats::new(500, 1).with_tier_hint("mid_range");
        assert_eq!(classify(&hinted), DeviceTier::MidRange);

        let bogus = DeviceStats::new(8192, 8).with_tier_hint("potato");
        assert_eq!(classify(&bogus), DeviceTier::HighEnd);
    }

    #[test]
    fn missing_stats_classify_as_least_capable() {
        assert_eq!(classify(&DeviceStats::default()), DeviceTier::UltraLowEnd);
    }

    #[test]
    fn canonical_baselines_grow_with_capability() {
        let profiles = DeviceTierProfile::canonical_set();
        assert_eq!(profiles[DeviceTier::UltraLowEnd.index()].baseline_batch_size, 5);
        assert!(profiles.windows(2).all(|w| w[0].baseline_batch_size < w[1].baseline_batch_size));
    }
}
