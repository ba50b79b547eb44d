//! Error types for checkpoint operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CheckpointError>;

#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Optimistic version check failed on `put`.
    ///
    /// `expected` is the version the writer based its update on, `found` is the
    /// version currently stored (`0` when the thread has no checkpoint).
    #[error("Version conflict on thread '{thread_id}': expected version {expected}, found {found}")]
    VersionConflict {
        thread_id: String,
        expected: u64,
        found: u64,
    },

    /// Another invocation currently holds the lease for this thread.
    #[error("Thread '{0}' is already being executed")]
    ThreadBusy(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid checkpoint: {0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckpointError {
    /// Returns true for errors caused by two writers racing on the same thread.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            CheckpointError::VersionConflict { .. } | CheckpointError::ThreadBusy(_)
        )
    }
}
