//! Type definitions for compiled graph execution

use crate::error::Result;
use crate::graph::NodeId;
use crate::state::State;
use crate::stream::StreamEvent;
use chrono::{DateTime, Utc};
use colloquy_checkpoint::{Checkpoint, ThreadStatus};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Events of one streamed run, in production order.
///
/// An `Err` item is the last item of the stream.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// A thread's persisted state as seen by callers.
///
/// # Example
///
/// ```rust,no_run
/// # use colloquy_core::CompiledGraph;
/// # async fn example(graph: CompiledGraph) -> colloquy_core::Result<()> {
/// let snapshot = graph.get_state("thread-1").await?;
/// if snapshot.is_paused() {
///     println!("waiting before {:?}", snapshot.next);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub thread_id: String,

    pub values: State,

    /// Node that runs when the thread is next invoked; `None` once done.
    pub next: Option<NodeId>,

    pub status: ThreadStatus,

    /// Checkpoint write counter of the thread.
    pub version: u64,

    /// Node runs committed so far.
    pub step: u64,

    /// Node that wrote each field last.
    pub written_by: std::collections::HashMap<String, NodeId>,

    pub updated_at: DateTime<Utc>,
}

impl StateSnapshot {
    pub fn is_paused(&self) -> bool {
        self.status.is_paused()
    }

    pub fn is_done(&self) -> bool {
        self.status.is_done()
    }
}

impl From<Checkpoint> for StateSnapshot {
    fn from(checkpoint: Checkpoint) -> Self {
        Self {
            thread_id: checkpoint.thread_id,
            values: checkpoint.values,
            next: checkpoint.next,
            status: checkpoint.status,
            version: checkpoint.version,
            step: checkpoint.step,
            written_by: checkpoint.written_by,
            updated_at: checkpoint.ts,
        }
    }
}

/// Outcome of driving a thread until it halts.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RunOutcome {
    /// Halted before `node`, an interrupt point.
    Interrupted { node: NodeId, state: State },
    Complete { state: State },
}

impl RunOutcome {
    pub(crate) fn into_state(self) -> State {
        match self {
            RunOutcome::Interrupted { state, .. } | RunOutcome::Complete { state } => state,
        }
    }

    pub(crate) fn into_event(self) -> StreamEvent {
        match self {
            RunOutcome::Interrupted { node, state } => StreamEvent::Interrupted { node, state },
            RunOutcome::Complete { state } => StreamEvent::Complete { state },
        }
    }
}
