//! Per-thread execution leases
//!
//! Only one invocation may drive a given thread at a time. Stores hand out a
//! [`ThreadLease`] through [`CheckpointSaver::try_lease`](crate::CheckpointSaver::try_lease);
//! a second attempt while the first lease is alive fails immediately with
//! [`CheckpointError::ThreadBusy`]. Leases release themselves on drop, so a
//! cancelled or panicking run never leaves a thread locked.
//!
//! Distinct threads never contend: the registry lock is held only for the
//! insert/remove of one id.
//!
//! Stores shared between processes back a lease with an exclusive lock on an
//! open file instead of the registry. The operating system drops that lock
//! when the file is closed, including when the holding process dies.

use crate::error::{CheckpointError, Result};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::File;
use std::sync::Arc;

/// Registry of threads that currently have a live lease.
#[derive(Debug, Clone, Default)]
pub struct ThreadLocks {
    active: Arc<Mutex<HashSet<String>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lease for `thread_id`, or fail if it is already held.
    pub fn try_acquire(&self, thread_id: &str) -> Result<ThreadLease> {
        let mut active = self.active.lock();
        if !active.insert(thread_id.to_string()) {
            tracing::debug!(thread_id, "lease rejected, thread busy");
            return Err(CheckpointError::ThreadBusy(thread_id.to_string()));
        }

        Ok(ThreadLease {
            thread_id: thread_id.to_string(),
            held: Held::Registry(self.active.clone()),
        })
    }

    pub fn is_held(&self, thread_id: &str) -> bool {
        self.active.lock().contains(thread_id)
    }

    pub fn held_count(&self) -> usize {
        self.active.lock().len()
    }
}

/// Exclusive right to execute one thread. Released on drop.
#[derive(Debug)]
pub struct ThreadLease {
    thread_id: String,
    held: Held,
}

#[derive(Debug)]
enum Held {
    Registry(Arc<Mutex<HashSet<String>>>),
    /// Closing the file releases its lock.
    File(#[allow(dead_code)] File),
}

impl ThreadLease {
    /// Lease backed by an exclusive lock the caller already holds on `file`.
    pub fn file_locked(thread_id: impl Into<String>, file: File) -> Self {
        Self {
            thread_id: thread_id.into(),
            held: Held::File(file),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }
}

impl Drop for ThreadLease {
    fn drop(&mut self) {
        if let Held::Registry(locks) = &self.held {
            locks.lock().remove(&self.thread_id);
        }
    }
}
