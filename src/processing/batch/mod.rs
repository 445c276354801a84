mod config;
mod executor;
mod metrics;
mod options;
mod report;

pub use config::BatchSizeConfig;
pub use executor::BatchExecutor;
pub(crate) use executor::partition;
pub use metrics::{BatchMemoryMetrics, BatchRecord, RunMetrics};
pub use options::{BatchCompleteCallback, BatchOptions, CompleteCallback, ProgressCallback};
pub use report::RunReport;
