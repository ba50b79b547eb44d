//! CompiledGraph struct and builder methods

use crate::config::EngineConfig;
use crate::graph::Graph;
use crate::interrupt::InterruptConfig;
use crate::visualization::{visualize, VisualizationOptions};
use colloquy_checkpoint::{CheckpointSaver, InMemoryCheckpointSaver};
use std::sync::Arc;

/// Executable workflow produced by [`StateGraph::compile`](crate::StateGraph::compile).
///
/// Cloning is cheap: the graph definition and the checkpoint store are
/// shared. Every operation is keyed by a thread id, and all state lives in
/// the store, so one `CompiledGraph` serves any number of threads.
#[derive(Clone)]
pub struct CompiledGraph {
    pub(crate) graph: Arc<Graph>,
    pub(crate) interrupts: Arc<InterruptConfig>,
    pub(crate) saver: Arc<dyn CheckpointSaver>,
    pub(crate) config: EngineConfig,
}

impl CompiledGraph {
    pub(crate) fn new(graph: Graph, interrupts: InterruptConfig) -> Self {
        Self {
            graph: Arc::new(graph),
            interrupts: Arc::new(interrupts),
            saver: Arc::new(InMemoryCheckpointSaver::new()),
            config: EngineConfig::default(),
        }
    }

    /// Use `saver` for checkpoints instead of the default in-memory store.
    pub fn with_checkpointer(mut self, saver: Arc<dyn CheckpointSaver>) -> Self {
        self.saver = saver;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn interrupt_config(&self) -> &InterruptConfig {
        &self.interrupts
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn checkpointer(&self) -> Arc<dyn CheckpointSaver> {
        Arc::clone(&self.saver)
    }

    /// Node names in registration order.
    pub fn node_names(&self) -> Vec<&str> {
        self.graph.order.iter().map(String::as_str).collect()
    }

    /// Render the workflow as a Mermaid flowchart.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use colloquy_core::CompiledGraph;
    /// # fn example(graph: &CompiledGraph) {
    /// println!("{}", graph.describe());
    /// # }
    /// ```
    pub fn describe(&self) -> String {
        self.visualize(&VisualizationOptions::mermaid())
    }

    pub fn visualize(&self, options: &VisualizationOptions) -> String {
        visualize(&self.graph, &self.interrupts, options)
    }
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("nodes", &self.graph.order)
            .field("entry", &self.graph.entry)
            .field("interrupts", &self.interrupts.interrupt_before)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
