pub mod error;
pub mod validation;

use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::error;

pub use error::{BatchError, BatchResult, StoreError, ValidationError};
pub use validation::{
    sanitize_measure,
    sanitize_ratio,
    validate_batch_size,
    validate_bounds,
    validate_ratio,
};

/// Runs a caller-supplied callback, logging instead of propagating a panic.
///
/// Subscribers and progress sinks are external collaborators; one misbehaving
/// callback must not take down the sampler or the batch loop. Returns `false`
/// when the callback panicked.
pub(crate) fn invoke_guarded<F: FnOnce()>(label: &str, callback: F) -> bool {
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(()) => true,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            error!("{} callback panicked: {}", label, message);
            false
        }
    }
}
