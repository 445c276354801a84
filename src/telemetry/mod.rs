mod device;
mod monitor;
mod network;
mod probe;

pub use device::{classify, DeviceStats, DeviceTier, DeviceTierProfile, ResourceSnapshot};
pub use monitor::{
    MonitorOptions, PressureCallback, PressureLevel, ReclaimHook, ResourceMonitor,
    DEFAULT_DANGER_THRESHOLD, DEFAULT_INTERVAL_MS, DEFAULT_WARNING_THRESHOLD,
};
pub use network::{ConnectionClass, NetworkSnapshot, ESTIMATED_BANDWIDTH_MBPS, ESTIMATED_LATENCY_MS};
pub use probe::{HostProbe, MemoryInfo, StaticProbe, TelemetryProbe};
