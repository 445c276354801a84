//! Telemetry sources.
//!
//! Probes are polled, never pushed. Each accessor returns `None` (or an
//! `estimated` value) when the host cannot report the signal, and the callers
//! fall back to documented heuristics rather than failing.

use std::time::Instant;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tracing::debug;
use crate::telemetry::{DeviceStats, NetworkSnapshot, ResourceSnapshot};

/// Memory reading in bytes plus a 0-100 usage percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryInfo {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub percentage: f64,
    /// True when derived from the fallback heuristic
    pub estimated: bool,
}

impl MemoryInfo {
    pub fn measured(total: u64, used: u64) -> Self {
        let used = used.min(total);
        let percentage = if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total,
            used,
            available: total - used,
            percentage,
            estimated: false,
        }
    }

    pub fn usage_ratio(&self) -> f64 {
        self.percentage / 100.0
    }
}

/// Source of device, memory and network signals.
pub trait TelemetryProbe: Send + Sync {
    /// Precise memory reading, or `None` when the host exposes none.
    fn memory(&self) -> Option<MemoryInfo>;

    /// Coarse installed-memory hint in gigabytes, if the host offers one.
    fn device_memory_hint_gb(&self) -> Option<f64> {
        None
    }

    /// Device stats including current resource pressure.
    fn device_stats(&self) -> DeviceStats;

    /// Live network conditions.
    fn network(&self) -> NetworkSnapshot {
        NetworkSnapshot::estimated()
    }
}

/// Probe backed by the operating system through `sysinfo`.
///
/// There is no portable network information source, so [`TelemetryProbe::network`]
/// reports the estimated default.
///
/// CPU usage needs two refreshes at least [`MINIMUM_CPU_UPDATE_INTERVAL`] apart.
/// Until then the CPU ratio is reported as NaN with `estimated` set, which the
/// recommender reads as neutral.
pub struct HostProbe {
    sys: Mutex<System>,
    cpu_ready_at: Instant,
    memory_hint_gb: Option<f64>,
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe {
    pub fn new() -> Self {
        // Creation takes the first CPU reading.
        let sys = System::new_with_specifics(
            RefreshKind::new()
                .with_memory(MemoryRefreshKind::everything())
                .with_cpu(CpuRefreshKind::new().with_cpu_usage()),
        );
        debug!(
            "Host probe initialised: {}MB memory, {} logical cores",
            sys.total_memory() / (1024 * 1024),
            num_cpus::get()
        );
        Self {
            sys: Mutex::new(sys),
            cpu_ready_at: Instant::now() + MINIMUM_CPU_UPDATE_INTERVAL,
            memory_hint_gb: None,
        }
    }

    /// Coarse memory hint reported when the precise reading is unavailable.
    pub fn with_memory_hint_gb(mut self, hint: Option<f64>) -> Self {
        self.memory_hint_gb = hint;
        self
    }
}

impl TelemetryProbe for HostProbe {
    fn memory(&self) -> Option<MemoryInfo> {
        let mut sys = self.sys.lock();
        sys.refresh_memory();
        let total = sys.total_memory();
        // Zero means the platform gave us nothing usable.
        if total == 0 {
            return None;
        }
        Some(MemoryInfo::measured(total, sys.used_memory()))
    }

    fn device_memory_hint_gb(&self) -> Option<f64> {
        self.memory_hint_gb
    }

    fn device_stats(&self) -> DeviceStats {
        let mut sys = self.sys.lock();
        sys.refresh_memory();
        sys.refresh_cpu_usage();

        let total = sys.total_memory();
        let memory_usage = if total > 0 {
            sys.used_memory() as f64 / total as f64
        } else {
            0.0
        };
        let cpu_ready = Instant::now() >= self.cpu_ready_at;
        let cpu_usage = if cpu_ready {
            f64::from(sys.global_cpu_usage()) / 100.0
        } else {
            f64::NAN
        };

        DeviceStats {
            memory_mb: (total > 0).then(|| total / (1024 * 1024)),
            cpu_cores: u32::try_from(num_cpus::get()).ok(),
            device_tier: None,
            resources: ResourceSnapshot {
                memory_usage_ratio: memory_usage,
                cpu_usage_ratio: cpu_usage,
                estimated: total == 0 || !cpu_ready,
            },
        }
    }
}

/// Probe returning fixed, caller-controlled values. Values can be changed
/// between polls, which makes it the probe of choice for tests and demos.
pub struct StaticProbe {
    memory: Mutex<Option<MemoryInfo>>,
    memory_hint_gb: Mutex<Option<f64>>,
    device: Mutex<DeviceStats>,
    network: Mutex<NetworkSnapshot>,
}

impl StaticProbe {
    pub fn new(device: DeviceStats, network: NetworkSnapshot) -> Self {
        Self {
            memory: Mutex::new(None),
            memory_hint_gb: Mutex::new(None),
            device: Mutex::new(device),
            network: Mutex::new(network),
        }
    }

    /// Probe with no precise memory source, so readings use the fallback.
    pub fn unavailable() -> Self {
        Self::new(DeviceStats::default(), NetworkSnapshot::estimated())
    }

    pub fn set_memory(&self, memory: Option<MemoryInfo>) {
        *self.memory.lock() = memory;
    }

    /// Sets a measured memory reading with the given usage percentage (0-100).
    pub fn set_memory_percentage(&self, percentage: f64) {
        const TOTAL: u64 = 8 * 1024 * 1024 * 1024;
        let used = (TOTAL as f64 * (percentage / 100.0).clamp(0.0, 1.0)) as u64;
        self.set_memory(Some(MemoryInfo::measured(TOTAL, used)));
    }

    pub fn set_memory_hint_gb(&self, hint: Option<f64>) {
        *self.memory_hint_gb.lock() = hint;
    }

    pub fn set_device(&self, device: DeviceStats) {
        *self.device.lock() = device;
    }

    pub fn set_network(&self, network: NetworkSnapshot) {
        *self.network.lock() = network;
    }
}

impl TelemetryProbe for StaticProbe {
    fn memory(&self) -> Option<MemoryInfo> {
        self.memory.lock().clone()
    }

    fn device_memory_hint_gb(&self) -> Option<f64> {
        *self.memory_hint_gb.lock()
    }

    fn device_stats(&self) -> DeviceStats {
        self.device.lock().clone()
    }

    fn network(&self) -> NetworkSnapshot {
        self.network.lock().clone()
    }
}
