//! Batched streaming reads and writes against a [`KeyValueStore`].
//!
//! Writes commit one store transaction per batch. A failed batch surfaces the
//! store error and leaves the earlier batches committed. Reads walk an ordered
//! cursor and either return the whole requested window or fail: an aborted
//! read never yields a partial list.

mod store;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::config::StreamConfig;
use crate::core::StreamProgress;
use crate::processing::batch::partition;
use crate::utils::{invoke_guarded, validate_batch_size, BatchError, BatchResult};
use crate::worker::{Scheduler, TokioScheduler};

pub use store::{
    CursorDirection, Entry, KeyRange, KeyValueStore, MemoryCursor, MemoryStore, StoreCursor,
};

pub type StreamProgressCallback = Arc<dyn Fn(&StreamProgress) + Send + Sync>;

/// Options for [`stream_read`].
pub struct ReadOptions<K> {
    pub batch_size: usize,
    /// Entries to skip before collecting
    pub offset: usize,
    /// Maximum entries to return; zero means unbounded
    pub limit: usize,
    pub direction: CursorDirection,
    pub range: Option<KeyRange<K>>,
    pub on_progress: Option<StreamProgressCallback>,
    pub abort: Option<CancellationToken>,
}

impl<K> Default for ReadOptions<K> {
    fn default() -> Self {
        Self::from(&StreamConfig::default())
    }
}

impl<K> From<&StreamConfig> for ReadOptions<K> {
    fn from(config: &StreamConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            offset: 0,
            limit: 0,
            direction: CursorDirection::Next,
            range: None,
            on_progress: None,
            abort: None,
        }
    }
}

impl<K> ReadOptions<K> {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_direction(mut self, direction: CursorDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_range(mut self, range: KeyRange<K>) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_abort(mut self, token: CancellationToken) -> Self {
        self.abort = Some(token);
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(&StreamProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }
}

/// Options for [`stream_write`].
#[derive(Clone)]
pub struct WriteOptions {
    pub batch_size: usize,
    /// Wait between batches; skipped after the last batch
    pub delay: Duration,
    pub on_progress: Option<StreamProgressCallback>,
    pub abort: Option<CancellationToken>,
    pub scheduler: Arc<dyn Scheduler>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self::from(&StreamConfig::default())
    }
}

impl From<&StreamConfig> for WriteOptions {
    fn from(config: &StreamConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            delay: Duration::from_millis(config.delay_ms),
            on_progress: None,
            abort: None,
            scheduler: Arc::new(TokioScheduler),
        }
    }
}

impl WriteOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_abort(mut self, token: CancellationToken) -> Self {
        self.abort = Some(token);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(&StreamProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }
}

fn is_aborted(token: Option<&CancellationToken>) -> bool {
    token.is_some_and(CancellationToken::is_cancelled)
}

fn emit(callback: Option<&StreamProgressCallback>, progress: StreamProgress) {
    if let Some(callback) = callback {
        invoke_guarded("Stream progress", || callback(&progress));
    }
}

/// Writes `entries` into `collection`, one transaction per batch.
///
/// Returns `Ok(true)` once every batch is committed. The abort token is checked
/// before each batch and also interrupts a batch still in flight; a failed or
/// aborted batch leaves earlier batches committed.
pub async fn stream_write<S: KeyValueStore>(
    store: &S,
    collection: &str,
    entries: Vec<Entry<S::Key, S::Value>>,
    options: &WriteOptions,
) -> BatchResult<bool> {
    validate_batch_size(options.batch_size)?;
    let callback = options.on_progress.as_ref();
    let abort = options.abort.as_ref();
    let total = entries.len();

    if total == 0 {
        emit(callback, StreamProgress::finished(0, Some(0)));
        return Ok(true);
    }

    let total_batches = total.div_ceil(options.batch_size);
    debug!(
        "Writing {} entries to `{}` in {} batches",
        total, collection, total_batches
    );

    let mut pending = entries.into_iter();
    for (batch_index, (start, end)) in partition(total, options.batch_size).enumerate() {
        if is_aborted(abort) {
            warn!("Write to `{}` aborted after {} of {} entries", collection, start, total);
            return Err(BatchError::Aborted);
        }

        let batch: Vec<_> = pending.by_ref().take(end - start).collect();
        let write = store.write_batch(collection, batch);
        let committed = match abort {
            Some(token) => tokio::select! {
                biased;

                _ = token.cancelled() => {
                    warn!("Write to `{}` aborted during batch {}", collection, batch_index + 1);
                    return Err(BatchError::Aborted);
                }
                result = write => result,
            },
            None => write.await,
        };
        if let Err(e) = committed {
            warn!(
                "Batch {}/{} to `{}` failed; {} entries remain committed: {}",
                batch_index + 1, total_batches, collection, start, e
            );
            return Err(e.into());
        }

        if end == total {
            emit(callback, StreamProgress::finished(end, Some(total)));
        } else {
            emit(callback, StreamProgress::batch(end, Some(total)));
            if options.delay.is_zero() {
                options.scheduler.yield_now().await;
            } else {
                options.scheduler.sleep(options.delay).await;
            }
        }
    }

    info!("Wrote {} entries to `{}`", total, collection);
    Ok(true)
}

/// Reads entries from `collection` in cursor order.
///
/// Skips `offset` entries, stops at `limit` (zero = unbounded) and reports
/// progress at every `batch_size` boundary plus exactly one final
/// `completed` update. An abort fails the call and aborts the cursor.
pub async fn stream_read<S: KeyValueStore>(
    store: &S,
    collection: &str,
    options: &ReadOptions<S::Key>,
) -> BatchResult<Vec<Entry<S::Key, S::Value>>> {
    validate_batch_size(options.batch_size)?;
    let callback = options.on_progress.as_ref();
    let abort = options.abort.as_ref();

    if is_aborted(abort) {
        return Err(BatchError::Aborted);
    }
    let mut cursor = store
        .open_cursor(collection, options.range.as_ref(), options.direction)
        .await?;

    if options.offset > 0 {
        if let Err(e) = cursor.advance(options.offset).await {
            cursor.abort();
            return Err(e.into());
        }
    }

    let mut results = Vec::new();
    loop {
        if is_aborted(abort) {
            cursor.abort();
            warn!("Read from `{}` aborted after {} entries", collection, results.len());
            return Err(BatchError::Aborted);
        }
        if options.limit > 0 && results.len() >= options.limit {
            break;
        }

        match cursor.next_entry().await {
            Ok(Some(entry)) => {
                results.push(entry);
                if results.len() % options.batch_size == 0 {
                    emit(callback, StreamProgress::batch(results.len(), None));
                }
            }
            Ok(None) => break,
            Err(e) => {
                cursor.abort();
                return Err(e.into());
            }
        }
    }

    emit(callback, StreamProgress::finished(results.len(), None));
    debug!("Read {} entries from `{}`", results.len(), collection);
    Ok(results)
}

/// Store handle bundled with stream defaults.
pub struct StreamIoProcessor<S> {
    store: Arc<S>,
    config: StreamConfig,
}

impl<S: KeyValueStore> StreamIoProcessor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, StreamConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: StreamConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Read options seeded from this processor's config.
    pub fn read_options(&self) -> ReadOptions<S::Key> {
        ReadOptions::from(&self.config)
    }

    /// Write options seeded from this processor's config.
    pub fn write_options(&self) -> WriteOptions {
        WriteOptions::from(&self.config)
    }

    pub async fn stream_write(
        &self,
        collection: &str,
        entries: Vec<Entry<S::Key, S::Value>>,
        options: &WriteOptions,
    ) -> BatchResult<bool> {
        stream_write(self.store.as_ref(), collection, entries, options).await
    }

    pub async fn stream_read(
        &self,
        collection: &str,
        options: &ReadOptions<S::Key>,
    ) -> BatchResult<Vec<Entry<S::Key, S::Value>>> {
        stream_read(self.store.as_ref(), collection, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use crate::worker::ImmediateScheduler;

    fn seeded(n: u32) -> MemoryStore<u32, u32> {
        let store = MemoryStore::new().with_collection("rows");
        for key in 0..n {
            store.insert("rows", key, key * 10).unwrap();
        }
        store
    }

    fn recorder() -> (Arc<Mutex<Vec<StreamProgress>>>, impl Fn(&StreamProgress) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |p: &StreamProgress| sink.lock().push(p.clone()))
    }

    #[tokio::test]
    async fn read_honours_offset_direction_and_range() {
        let store = seeded(20);
        let options = ReadOptions::default()
            .with_offset(2)
            .with_limit(3)
            .with_direction(CursorDirection::Prev)
            .with_range(KeyRange::between(5, 15));
        let keys: Vec<u32> = stream_read(&store, "rows", &options)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec![13, 12, 11]);
    }

    #[tokio::test]
    async fn read_reports_batches_then_one_completion() {
        let store = seeded(10);
        let (seen, sink) = recorder();
        let options = ReadOptions::default().with_batch_size(4).on_progress(sink);
        let entries = stream_read(&store, "rows", &options).await.unwrap();
        assert_eq!(entries.len(), 10);

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert_eq!((seen[0].processed, seen[0].batch_completed), (4, true));
        assert_eq!((seen[1].processed, seen[1].batch_completed), (8, true));
        assert!(seen[2].completed);
        assert_eq!(seen[2].processed, 10);
    }

    #[tokio::test]
    async fn aborted_read_fails_instead_of_returning_a_prefix() {
        let store = seeded(10);
        let token = CancellationToken::new();
        let trigger = token.clone();
        let options = ReadOptions::default()
            .with_batch_size(3)
            .with_abort(token)
            .on_progress(move |p: &StreamProgress| {
                if p.batch_completed {
                    trigger.cancel();
                }
            });
        let err = stream_read(&store, "rows", &options).await.unwrap_err();
        assert!(matches!(err, BatchError::Aborted));
    }

    #[tokio::test]
    async fn unknown_collection_fails_the_read() {
        let store = seeded(1);
        let err = stream_read(&store, "nope", &ReadOptions::default()).await.unwrap_err();
        assert!(matches!(err, BatchError::Store(_)));
    }

    #[tokio::test]
    async fn write_commits_per_batch_and_flags_the_last_update() {
        let store = seeded(0);
        let (seen, sink) = recorder();
        let entries: Vec<_> = (0..7).map(|k| Entry::new(k, k + 100)).collect();
        let options = WriteOptions::default()
            .with_batch_size(3)
            .with_scheduler(Arc::new(ImmediateScheduler))
            .on_progress(sink);

        assert!(stream_write(&store, "rows", entries, &options).await.unwrap());
        assert_eq!(store.len("rows"), 7);

        let processed: Vec<_> = seen.lock().iter().map(|p| (p.processed, p.completed)).collect();
        assert_eq!(processed, vec![(3, false), (6, false), (7, true)]);
    }

    #[tokio::test]
    async fn empty_write_completes_immediately() {
        let store = seeded(0);
        let (seen, sink) = recorder();
        let options = WriteOptions::default().on_progress(sink);
        assert!(stream_write(&store, "rows", Vec::new(), &options).await.unwrap());
        assert_eq!(seen.lock().len(), 1);
        assert!(seen.lock()[0].completed);
    }

    #[tokio::test]
    async fn pre_aborted_write_touches_nothing() {
        let store = seeded(0);
        let token = CancellationToken::new();
        token.cancel();
        let options = WriteOptions::default().with_abort(token);
        let entries = vec![Entry::new(1, 1)];
        assert!(matches!(
            stream_write(&store, "rows", entries, &options).await,
            Err(BatchError::Aborted)
        ));
        assert!(store.is_empty("rows"));
    }

    #[tokio::test]
    async fn processor_uses_its_config_defaults() {
        let store = Arc::new(seeded(0));
        let processor = StreamIoProcessor::with_config(
            Arc::clone(&store),
            StreamConfig { batch_size: 2, delay_ms: 0 },
        );
        assert_eq!(processor.write_options().batch_size, 2);

        let entries: Vec<_> = (0..5).map(|k| Entry::new(k, k)).collect();
        processor
            .stream_write("rows", entries, &processor.write_options())
            .await
            .unwrap();
        let read = processor.stream_read("rows", &processor.read_options()).await.unwrap();
        assert_eq!(read.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn write_delay_is_skipped_after_the_last_batch() {
        let store: MemoryStore<u32, u32> = MemoryStore::new().with_collection("rows");
        let entries: Vec<_> = (0..25).map(|k| Entry::new(k, k)).collect();
        let options = WriteOptions::default()
            .with_batch_size(10)
            .with_delay(Duration::from_millis(300));

        let start = tokio::time::Instant::now();
        assert!(stream_write(&store, "rows", entries, &options).await.unwrap());
        // Three batches, two gaps
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(600) && elapsed < Duration::from_millis(900));
        assert_eq!(store.len("rows"), 25);

        let single: Vec<_> = (100..105).map(|k| Entry::new(k, k)).collect();
        let start = tokio::time::Instant::now();
        stream_write(&store, "rows", single, &options).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(300));
    }
}
