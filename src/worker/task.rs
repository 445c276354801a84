use std::future::Future;

/// Caller-supplied processing function for one work item.
///
/// The item is handed over by value on every attempt (retries clone it again),
/// together with its original 0-based index in the input collection. Any error
/// is treated as an item-level failure and fed to the retry/skip machinery.
///
/// Implemented for every `Fn(T, usize) -> impl Future<Output = anyhow::Result<R>>`,
/// so plain async closures work:
///
/// ```
/// use adaptive_batch_lib::worker::Worker;
///
/// fn assert_worker<W: Worker<u32, u32>>(_: W) {}
/// assert_worker(|n: u32, _index: usize| async move { anyhow::Ok(n * 2) });
/// ```
pub trait Worker<T, R> {
    type Future: Future<Output = anyhow::Result<R>>;

    fn process(&self, item: T, index: usize) -> Self::Future;
}

impl<T, R, F, Fut> Worker<T, R> for F
where
    F: Fn(T, usize) -> Fut,
    Fut: Future<Output = anyhow::Result<R>>,
{
    type Future = Fut;

    fn process(&self, item: T, index: usize) -> Fut {
        self(item, index)
    }
}
