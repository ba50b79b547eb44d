//! In-memory checkpoint store
//!
//! Keeps one checkpoint per thread in a `HashMap` behind a tokio `RwLock`.
//! Suitable for single-process deployments and tests; everything is lost when
//! the process exits. Optionally expires threads whose last write is older
//! than a configured TTL.

use crate::{
    checkpoint::Checkpoint,
    error::Result,
    lease::{ThreadLease, ThreadLocks},
    traits::{check_version, CheckpointSaver},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

type CheckpointStorage = Arc<RwLock<HashMap<String, Checkpoint>>>;

#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointSaver {
    storage: CheckpointStorage,
    locks: ThreadLocks,
    ttl: Option<Duration>,
}

impl InMemoryCheckpointSaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire threads whose last checkpoint is older than `ttl`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.len()
    }

    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }

    /// Drop every expired thread, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let now = chrono::Utc::now();
        let mut storage = self.storage.write().await;
        let before = storage.len();
        storage.retain(|_, checkpoint| !checkpoint.is_expired(ttl, now));
        let removed = before - storage.len();
        if removed > 0 {
            tracing::debug!(removed, "purged expired threads");
        }
        removed
    }

    fn live<'a>(&self, checkpoint: Option<&'a Checkpoint>) -> Option<&'a Checkpoint> {
        match (checkpoint, self.ttl) {
            (Some(c), Some(ttl)) if c.is_expired(ttl, chrono::Utc::now()) => None,
            (c, _) => c,
        }
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(self.live(storage.get(thread_id)).cloned())
    }

    async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut storage = self.storage.write().await;
        let stored = self.live(storage.get(&checkpoint.thread_id));
        check_version(stored, &checkpoint)?;

        tracing::trace!(
            thread_id = %checkpoint.thread_id,
            version = checkpoint.version,
            status = %checkpoint.status,
            "checkpoint stored"
        );
        storage.insert(checkpoint.thread_id.clone(), checkpoint);
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.storage.write().await.remove(thread_id);
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<String>> {
        let storage = self.storage.read().await;
        let mut threads: Vec<String> = storage
            .iter()
            .filter(|(_, c)| self.live(Some(c)).is_some())
            .map(|(id, _)| id.clone())
            .collect();
        threads.sort();
        Ok(threads)
    }

    fn try_lease(&self, thread_id: &str) -> Result<ThreadLease> {
        self.locks.try_acquire(thread_id)
    }
}
