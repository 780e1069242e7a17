//! Error types for the wake scheduler.

use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The fire channel is closed; the delivery side has shut down.
    #[error("scheduler is shutting down, wake for id {0} not registered")]
    ShuttingDown(i64),
}
