mod error;
mod scheduler;
mod task;

pub use error::{ErrorDecision, ErrorHandler};
pub use scheduler::{ImmediateScheduler, Scheduler, TokioScheduler};
pub use task::Worker;
