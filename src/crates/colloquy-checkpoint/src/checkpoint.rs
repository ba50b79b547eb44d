//! The per-thread checkpoint record
//!
//! A [`Checkpoint`] is the last persisted `(state, next node)` pair of one
//! thread. Exactly one checkpoint exists per thread; every write replaces the
//! previous one and bumps [`Checkpoint::version`], which doubles as the
//! optimistic concurrency token checked by every
//! [`CheckpointSaver`](crate::CheckpointSaver).
//!
//! # Lifecycle
//!
//! ```text
//!  first invoke ──► Running(next = entry)          source = input
//!        │
//!        ▼ node completes
//!  Running(next = successor) ────────────────────  source = loop
//!        │
//!        ├──► Paused(next = interrupt node) ─────  source = interrupt
//!        │        │ caller supplies selection
//!        │        ▼
//!        │    Running ...                          source = update / input
//!        ▼
//!  Done(next = None) ────────────────────────────  source = done
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier of one checkpoint write.
pub type CheckpointId = String;

/// Field name → node name that last wrote the field.
pub type FieldOwners = HashMap<String, String>;

/// Execution status of a thread as seen from its checkpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    /// A next node is pending; invoking the thread continues from it.
    #[default]
    Running,
    /// Halted before an interrupt node, waiting for external input.
    Paused,
    /// Reached a terminal node. The state is read-only from now on.
    Done,
}

impl ThreadStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, ThreadStatus::Done)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, ThreadStatus::Paused)
    }
}

impl std::fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ThreadStatus::Running => "running",
            ThreadStatus::Paused => "paused",
            ThreadStatus::Done => "done",
        };
        f.write_str(s)
    }
}

/// What caused a checkpoint to be written.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Caller input merged before any node ran.
    Input,
    /// A node completed and execution continues.
    Loop,
    /// Execution halted before an interrupt node.
    Interrupt,
    /// State edited out-of-band through `update_state`.
    Update,
    /// The workflow reached a terminal node.
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,

    /// Node whose completion produced this checkpoint, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CheckpointMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Persisted snapshot of one thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// Format version of this record.
    pub v: i32,

    pub id: CheckpointId,

    pub thread_id: String,

    /// Monotonic per-thread write counter, starting at 1.
    pub version: u64,

    pub ts: DateTime<Utc>,

    /// Number of node runs committed so far on this thread.
    pub step: u64,

    /// The thread's state object.
    pub values: serde_json::Map<String, serde_json::Value>,

    /// Node to run on resume; `None` once the thread is done.
    pub next: Option<String>,

    pub status: ThreadStatus,

    #[serde(default)]
    pub written_by: FieldOwners,

    #[serde(default)]
    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    pub const CURRENT_VERSION: i32 = 1;

    /// First checkpoint of a thread, built from the caller's input.
    pub fn initial(
        thread_id: impl Into<String>,
        values: serde_json::Map<String, serde_json::Value>,
        entry: impl Into<String>,
    ) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            version: 1,
            ts: Utc::now(),
            step: 0,
            values,
            next: Some(entry.into()),
            status: ThreadStatus::Running,
            written_by: FieldOwners::new(),
            metadata: CheckpointMetadata::new().with_source(CheckpointSource::Input),
        }
    }

    /// Derive the next write of this thread.
    ///
    /// The successor gets a fresh id, a current timestamp and `version + 1`;
    /// everything else is copied and then adjusted by the caller.
    pub fn successor(&self) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: Uuid::new_v4().to_string(),
            thread_id: self.thread_id.clone(),
            version: self.version + 1,
            ts: Utc::now(),
            step: self.step,
            values: self.values.clone(),
            next: self.next.clone(),
            status: self.status,
            written_by: self.written_by.clone(),
            metadata: CheckpointMetadata::new(),
        }
    }

    /// Whether the checkpoint is older than `ttl` relative to `now`.
    pub fn is_expired(&self, ttl: std::time::Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => self.ts + ttl <= now,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values() -> serde_json::Map<String, serde_json::Value> {
        json!({"query": "X"}).as_object().cloned().unwrap()
    }

    #[test]
    fn test_initial_checkpoint() {
        let checkpoint = Checkpoint::initial("thread-1", values(), "reporter");
        assert_eq!(checkpoint.v, Checkpoint::CURRENT_VERSION);
        assert_eq!(checkpoint.version, 1);
        assert_eq!(checkpoint.step, 0);
        assert_eq!(checkpoint.next.as_deref(), Some("reporter"));
        assert_eq!(checkpoint.status, ThreadStatus::Running);
        assert_eq!(checkpoint.metadata.source, Some(CheckpointSource::Input));
    }

    #[test]
    fn test_successor_bumps_version_and_id() {
        let first = Checkpoint::initial("thread-1", values(), "reporter");
        let second = first.successor();

        assert_eq!(second.version, 2);
        assert_ne!(second.id, first.id);
        assert_eq!(second.thread_id, "thread-1");
        assert_eq!(second.values, first.values);
        assert!(second.metadata.source.is_none());
    }

    #[test]
    fn test_checkpoint_metadata() {
        let metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Loop)
            .with_node("critic")
            .with_extra("passes", json!(2));

        assert_eq!(metadata.source, Some(CheckpointSource::Loop));
        assert_eq!(metadata.node.as_deref(), Some("critic"));
        assert_eq!(metadata.extra.get("passes"), Some(&json!(2)));
    }

    #[test]
    fn test_expiry() {
        let checkpoint = Checkpoint::initial("thread-1", values(), "reporter");
        let later = checkpoint.ts + chrono::Duration::seconds(120);

        assert!(checkpoint.is_expired(std::time::Duration::from_secs(60), later));
        assert!(!checkpoint.is_expired(std::time::Duration::from_secs(600), later));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let encoded = serde_json::to_value(ThreadStatus::Paused).unwrap();
        assert_eq!(encoded, json!("paused"));
        assert_eq!(ThreadStatus::Done.to_string(), "done");
    }
}
