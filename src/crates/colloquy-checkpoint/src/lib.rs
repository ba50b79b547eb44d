//! # colloquy-checkpoint - Per-thread persistence for workflow runs
//!
//! Every workflow thread owns exactly one [`Checkpoint`]: the last persisted
//! state, the node to run on resume and the thread's [`ThreadStatus`]. The
//! execution engine in `colloquy-core` writes a new checkpoint after every
//! completed node, at every interrupt pause and at completion, and reads it
//! back to resume.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              colloquy-core (Execution Engine)           │
//! │  • try_lease() before running a thread                  │
//! │  • get() to resume, put() after each node               │
//! └────────────────────┬────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │              CheckpointSaver trait (this crate)         │
//! │  • one checkpoint per thread, optimistic `version`      │
//! │  • at most one live ThreadLease per thread              │
//! └────────────────────┬────────────────────────────────────┘
//!            ┌─────────┴──────────┐
//!            ▼                    ▼
//!  ┌──────────────────┐  ┌──────────────────┐
//!  │ InMemory         │  │ File             │
//!  │ (default, tests) │  │ (JSON per thread)│
//!  └──────────────────┘  └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use colloquy_checkpoint::{Checkpoint, CheckpointSaver, InMemoryCheckpointSaver};
//! use serde_json::json;
//!
//! # async fn demo() -> colloquy_checkpoint::Result<()> {
//! let saver = InMemoryCheckpointSaver::new();
//! let values = json!({"query": "photosynthesis"}).as_object().cloned().unwrap_or_default();
//!
//! let _lease = saver.try_lease("thread-1")?;
//! let first = Checkpoint::initial("thread-1", values, "reporter");
//! saver.put(first.clone()).await?;
//!
//! // A second write must build on the stored version.
//! saver.put(first.successor()).await?;
//! assert_eq!(saver.get("thread-1").await?.map(|c| c.version), Some(2));
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`checkpoint`] - [`Checkpoint`], [`CheckpointMetadata`], [`ThreadStatus`]
//! - [`traits`] - the [`CheckpointSaver`] trait
//! - [`memory`] - [`InMemoryCheckpointSaver`]
//! - [`file`] - [`FileCheckpointSaver`]
//! - [`lease`] - [`ThreadLocks`] and [`ThreadLease`]
//! - [`serializer`] - [`SerializerProtocol`] and [`JsonSerializer`]
//! - [`error`] - [`CheckpointError`]

pub mod checkpoint;
pub mod error;
pub mod file;
pub mod lease;
pub mod memory;
pub mod serializer;
pub mod traits;

pub use checkpoint::{
    Checkpoint, CheckpointId, CheckpointMetadata, CheckpointSource, FieldOwners, ThreadStatus,
};
pub use error::{CheckpointError, Result};
pub use file::FileCheckpointSaver;
pub use lease::{ThreadLease, ThreadLocks};
pub use memory::InMemoryCheckpointSaver;
pub use serializer::{JsonSerializer, SerializerProtocol};
pub use traits::CheckpointSaver;
