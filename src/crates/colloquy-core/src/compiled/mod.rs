//! CompiledGraph execution engine for running resumable workflows
//!
//! Once a graph is built with [`StateGraph`](crate::StateGraph) and compiled,
//! it becomes a [`CompiledGraph`] that executes any number of independent
//! threads. Each thread's state lives in the checkpoint store, versioned and
//! written once per completed node, so a thread survives interrupts,
//! failures and process restarts.
//!
//! # Operations
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | [`invoke`](CompiledGraph::invoke) | Run a thread until it completes or pauses |
//! | [`stream`](CompiledGraph::stream) | Same, yielding events as they happen |
//! | [`get_state`](CompiledGraph::get_state) | Read a thread's snapshot |
//! | [`update_state`](CompiledGraph::update_state) | Merge values into a paused thread |
//! | [`clear_thread`](CompiledGraph::clear_thread) | Forget a thread |
//! | [`describe`](CompiledGraph::describe) | Render the graph as Mermaid |
//!
//! # Concurrency
//!
//! Runs of different threads are independent. A thread admits one run at a
//! time: the run leases the thread from the store, and a second caller gets
//! [`GraphError::ConcurrentInvocation`](crate::GraphError::ConcurrentInvocation)
//! instead of waiting.

mod execution;
mod graph;
mod state;
mod streaming;
mod types;

pub use graph::CompiledGraph;
pub use types::{EventStream, StateSnapshot};
