//! # colloquy-core - Resumable Workflow Graphs
//!
//! `colloquy-core` executes workflows built from named nodes over a shared
//! JSON state. Each workflow instance is a *thread*, identified by a caller
//! chosen id; its state is checkpointed after every node, so a thread can
//! pause for human input, survive failures and continue in a later process.
//!
//! ## Core Concepts
//!
//! - **Nodes** are async functions from the state to a partial update
//!   ([`StateUpdate`]). Streaming nodes yield increments and finish with one
//!   final update.
//! - **Edges** name each node's successor, either directly or through a
//!   router over the state. Execution is linear: one node at a time.
//! - **Interrupts** halt a thread before chosen nodes. The caller supplies
//!   the missing input and invokes the thread again.
//! - **Checkpoints** hold one versioned snapshot per thread in a
//!   [`CheckpointSaver`](colloquy_checkpoint::CheckpointSaver).
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐ compile ┌───────────────┐ invoke/stream ┌──────────────────┐
//! │ StateGraph │────────►│ CompiledGraph │──────────────►│ CheckpointSaver  │
//! │  (builder) │         │  (executor)   │◄──────────────│ (memory / files) │
//! └────────────┘         └───────────────┘  load / put   └──────────────────┘
//!                               │
//!                               ▼
//!                        StreamEvent stream
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use colloquy_core::{state, StateGraph, StateUpdate, END};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = StateGraph::new();
//! graph.add_node("reporter", |s| async move {
//!     let mut update = StateUpdate::new();
//!     update.insert("reporter_content".into(), json!(format!("On {}", s["query"])));
//!     Ok(update)
//! })?;
//! graph.add_node("human", |_s| async move { Ok(StateUpdate::new()) })?;
//! graph.set_entry_point("reporter");
//! graph.add_edge("reporter", "human")?;
//! graph.add_edge("human", END)?;
//! graph.mark_interrupt_before(["human"]);
//! let compiled = graph.compile()?;
//!
//! // Runs reporter, then pauses before human.
//! compiled.invoke("t1", Some(state::from_value(json!({"query": "tariffs"}))?)).await?;
//! // Supplies the selection and finishes.
//! let done = compiled
//!     .invoke("t1", Some(state::from_value(json!({"human_selection": {"point": 0}}))?))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod compiled;
pub mod config;
pub mod error;
pub mod graph;
pub mod interrupt;
pub mod report;
pub mod routing;
pub mod state;
pub mod stream;
pub mod visualization;

pub use builder::StateGraph;
pub use compiled::{CompiledGraph, EventStream, StateSnapshot};
pub use config::EngineConfig;
pub use error::{ErrorKind, GraphError, NodeError, Result};
pub use graph::{NodeId, NodeResult, UpdateStream, END};
pub use interrupt::InterruptConfig;
pub use report::{Report, ReportError, ReportTree};
pub use state::{State, StateExt, StateUpdate};
pub use stream::{text_stream_node, DeltaStream, StreamEvent, StreamUpdate, TextAccumulator};
pub use visualization::{VisualizationFormat, VisualizationOptions};

pub use colloquy_checkpoint::ThreadStatus;
