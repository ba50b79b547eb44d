//! Checkpoint storage trait for pluggable backends
//!
//! [`CheckpointSaver`] is the only shared mutable resource of the workflow
//! engine. Implementations keep exactly one [`Checkpoint`] per thread and must
//! provide two guarantees:
//!
//! - **Optimistic versioning**: [`put`](CheckpointSaver::put) accepts a
//!   checkpoint only if its `version` is exactly one more than the stored
//!   version (or `1` for a thread with no checkpoint). Anything else fails
//!   with [`CheckpointError::VersionConflict`](crate::CheckpointError::VersionConflict)
//!   and leaves the stored checkpoint untouched.
//! - **Leases**: [`try_lease`](CheckpointSaver::try_lease) hands out at most
//!   one live [`ThreadLease`] per thread id.
//!
//! Together these make concurrent invocations of one thread fail loudly rather
//! than interleave their updates.
//!
//! # Implementing a backend
//!
//! ```rust,ignore
//! use colloquy_checkpoint::{Checkpoint, CheckpointSaver, Result, ThreadLease, ThreadLocks};
//! use async_trait::async_trait;
//!
//! pub struct RedisCheckpointer {
//!     client: redis::Client,
//!     locks: ThreadLocks,
//! }
//!
//! #[async_trait]
//! impl CheckpointSaver for RedisCheckpointer {
//!     async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
//!         // GET checkpoint:{thread_id} and deserialize
//!     }
//!
//!     async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
//!         // WATCH + compare stored version, then SET in a MULTI block
//!     }
//!
//!     async fn delete_thread(&self, thread_id: &str) -> Result<()> {
//!         // DEL checkpoint:{thread_id}
//!     }
//!
//!     async fn list_threads(&self) -> Result<Vec<String>> {
//!         // SCAN checkpoint:*
//!     }
//!
//!     fn try_lease(&self, thread_id: &str) -> Result<ThreadLease> {
//!         self.locks.try_acquire(thread_id)
//!     }
//! }
//! ```

use crate::{checkpoint::Checkpoint, error::Result, lease::ThreadLease};
use async_trait::async_trait;

#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Latest checkpoint of a thread, or `None` if the thread is unknown or expired.
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// Replace the thread's checkpoint, enforcing the version sequence.
    async fn put(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Remove a thread's checkpoint. Removing an unknown thread is not an error.
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    /// Ids of all threads with a live checkpoint.
    async fn list_threads(&self) -> Result<Vec<String>>;

    /// Acquire the exclusive execution lease of a thread.
    fn try_lease(&self, thread_id: &str) -> Result<ThreadLease>;
}

/// Shared version check used by the bundled stores.
pub(crate) fn check_version(
    stored: Option<&Checkpoint>,
    incoming: &Checkpoint,
) -> Result<()> {
    let found = stored.map(|c| c.version).unwrap_or(0);
    if incoming.version != found + 1 {
        return Err(crate::CheckpointError::VersionConflict {
            thread_id: incoming.thread_id.clone(),
            expected: incoming.version.saturating_sub(1),
            found,
        });
    }
    Ok(())
}
