// Demo driver for the adaptive batch pipeline.
// The lib.rs file serves as the public API; this binary only exercises it end to end.

use std::sync::Arc;
use anyhow::{bail, Context};
use tracing::{debug, info, warn};
use adaptive_batch_lib::config::BatchConfig;
use adaptive_batch_lib::logging::init_logging;
use adaptive_batch_lib::processing::{
    BatchExecutor, BatchOptions, BatchSizeRecommender, Entry, MemoryStore, RecommenderState,
    StreamIoProcessor,
};
use adaptive_batch_lib::telemetry::{
    HostProbe, MemoryInfo, MonitorOptions, PressureLevel, ResourceMonitor, TelemetryProbe,
};
use adaptive_batch_lib::worker::ErrorDecision;
use adaptive_batch_lib::ItemError;

const COLLECTION: &str = "results";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => BatchConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => BatchConfig::default(),
    };
    init_logging(&config.logging)?;

    info!("=== Adaptive Batch Demo Starting ===");

    let probe: Arc<dyn TelemetryProbe> =
        Arc::new(HostProbe::new().with_memory_hint_gb(config.monitor.device_memory_hint_gb));

    let monitor = Arc::new(ResourceMonitor::new(Arc::clone(&probe)));
    monitor.add_callback(
        PressureLevel::Danger,
        Arc::new(|info: &MemoryInfo| warn!("Memory pressure critical: {:.1}% used", info.percentage)),
    );
    monitor.add_callback(
        PressureLevel::Warning,
        Arc::new(|info: &MemoryInfo| info!("Memory pressure elevated: {:.1}% used", info.percentage)),
    );
    monitor.start_monitoring(Some(MonitorOptions::from(&config.monitor)));
    let memory = monitor.get_memory_info();
    debug!(
        "Memory at start: {:.1}% used{}",
        memory.percentage,
        if memory.estimated { " (estimated)" } else { "" }
    );

    let recommender = Arc::new(BatchSizeRecommender::new(
        config.recommender.clone(),
        RecommenderState::with_history_capacity(config.recommender.history_capacity),
    ));

    let options = BatchOptions::from(&config.executor)
        .on_progress(|p| {
            debug!(
                "Progress {:.0}% ({}/{}, batch {}/{})",
                p.percentage, p.processed, p.total, p.current_batch, p.total_batches
            )
        })
        .on_error(|error: &ItemError, index: usize| {
            warn!("Skipping item {}: {}", index, error);
            async { ErrorDecision::Skip }
        });
    let executor = BatchExecutor::new(options).with_recommender(Arc::clone(&recommender), Arc::clone(&probe));

    let items: Vec<u64> = (1..=200).collect();
    let result = executor
        .run(items, |n: u64, _index: usize| async move {
            if n % 37 == 0 {
                bail!("{n} is divisible by 37");
            }
            anyhow::Ok(n * n)
        })
        .await?;
    info!(
        "Executor finished: {:?}, {} succeeded, {} skipped (batch size {})",
        result.status, result.progress.succeeded, result.progress.skipped, result.batch_size
    );

    let store = Arc::new(MemoryStore::<u64, u64>::new().with_collection(COLLECTION));
    let stream = StreamIoProcessor::with_config(Arc::clone(&store), config.stream.clone());
    let entries: Vec<_> = result
        .outcomes
        .iter()
        .enumerate()
        .filter_map(|(i, outcome)| outcome.value().map(|v| Entry::new(i as u64, *v)))
        .collect();
    stream.stream_write(COLLECTION, entries, &stream.write_options()).await?;

    let read_back = stream
        .stream_read(COLLECTION, &stream.read_options().with_limit(10))
        .await?;
    info!("Read back {} of {} stored entries", read_back.len(), store.len(COLLECTION));

    monitor.stop_monitoring();
    recommender.stop().await;
    if monitor.suggest_garbage_collection() {
        debug!("Host reclaim hook invoked");
    }

    info!("=== Adaptive Batch Demo Finished ===");
    Ok(())
}
