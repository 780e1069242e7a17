//! Error types for the record store.

use thiserror::Error;

/// Errors that can occur in store operations.
///
/// Callers treat any of these as "the operation had no durable effect"
/// and continue on the in-memory path; a store failure is never fatal
/// to reminder delivery.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying file I/O failed.
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Store file contents could not be parsed.
    #[error("store file is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}
