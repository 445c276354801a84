use std::future::Future;
use futures::future::BoxFuture;
use crate::core::ItemError;

/// Caller's verdict for an item whose retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDecision {
    /// Reset the attempt counter and run the retry loop again for this item only
    Retry,
    /// Record the item as skipped and stop retrying it
    Skip,
}

/// Decides what happens to an item after `1 + max_retries` failed attempts.
///
/// The decision is awaited, so a handler may consult a user or another service
/// before answering. Siblings in the same batch keep running meanwhile.
pub trait ErrorHandler: Send + Sync {
    fn decide(&self, error: &ItemError, index: usize) -> BoxFuture<'static, ErrorDecision>;
}

impl<F, Fut> ErrorHandler for F
where
    F: Fn(&ItemError, usize) -> Fut + Send + Sync,
    Fut: Future<Output = ErrorDecision> + Send + 'static,
{
    fn decide(&self, error: &ItemError, index: usize) -> BoxFuture<'static, ErrorDecision> {
        Box::pin(self(error, index))
    }
}
