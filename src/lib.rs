// Module declarations in dependency order
pub mod utils;
pub mod core;
pub mod config;
pub mod logging;
pub mod telemetry;
pub mod worker;
pub mod processing;

// Public exports for external consumers
pub use config::BatchConfig;
pub use core::{
    ExecutionControl, ExecutionResult, ExecutionStatus, ItemError, Outcome, ProgressSnapshot,
    StreamProgress,
};
pub use processing::{
    stream_read, stream_write, BatchExecutor, BatchOptions, BatchSizeRecommender, Entry,
    KeyValueStore, MemoryStore, ReadOptions, RecommenderState, StreamIoProcessor, WriteOptions,
};
pub use telemetry::{
    classify, DeviceStats, DeviceTier, HostProbe, MemoryInfo, NetworkSnapshot, PressureLevel,
    ResourceMonitor, StaticProbe, TelemetryProbe,
};
pub use utils::{BatchError, BatchResult, StoreError, ValidationError};
pub use worker::{ErrorDecision, ErrorHandler, ImmediateScheduler, Scheduler, TokioScheduler, Worker};

// This library file is used as a public API for consuming this crate as a library.
// The demo entry point is in main.rs.
