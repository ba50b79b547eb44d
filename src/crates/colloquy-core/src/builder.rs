//! StateGraph builder API for defining workflows
//!
//! [`StateGraph`] registers named nodes, wires them with direct or
//! conditional edges, marks interrupt points and compiles into an executable
//! [`CompiledGraph`]. All structural mistakes are reported as configuration
//! errors, either immediately (duplicate names, duplicate edges, unknown
//! endpoints) or by [`compile`](StateGraph::compile) (missing entry, unknown
//! conditional targets, unreachable nodes), so nothing is discovered at run time except a router
//! answering with a name it did not declare.
//!
//! ```text
//!  ┌──────────┐   ┌────────┐   route   ┌──────────┐        ┌───────┐
//!  │ reporter │──►│ critic │──────────►│ ta_review│──┐     │ human │ (interrupt)
//!  └──────────┘   └────────┘           └──────────┘  │     └───────┘
//!                     ▲         route                │         │
//!                     └──────────────────────────────┘         ▼
//!                                                              END
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use colloquy_core::{StateGraph, StateUpdate, END};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = StateGraph::new();
//!
//! graph.add_node("reporter", |state| async move {
//!     let query = state.get("query").and_then(|v| v.as_str()).unwrap_or_default();
//!     let mut update = StateUpdate::new();
//!     update.insert("reporter_content".into(), json!(format!("Report on {query}")));
//!     Ok(update)
//! })?;
//! graph.add_node("human", |_state| async move { Ok(StateUpdate::new()) })?;
//!
//! graph.set_entry_point("reporter");
//! graph.add_edge("reporter", "human")?;
//! graph.add_edge("human", END)?;
//! graph.mark_interrupt_before(["human"]);
//!
//! let compiled = graph.compile()?;
//! let input = json!({"query": "tariffs"}).as_object().cloned().unwrap_or_default();
//! let paused = compiled.invoke("thread-1", Some(input)).await?;
//! # Ok(())
//! # }
//! ```

use crate::compiled::CompiledGraph;
use crate::error::{GraphError, NodeError, Result};
use crate::graph::{
    Edge, Graph, NodeId, NodeKind, NodeResult, NodeSpec, StreamingHandler, UnaryHandler,
    UpdateStream, END,
};
use crate::interrupt::InterruptConfig;
use crate::state::{State, StateUpdate};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;

/// Builder for workflows over a shared [`State`].
#[derive(Debug, Default)]
pub struct StateGraph {
    graph: Graph,
    interrupts: InterruptConfig,
}

impl StateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unary node: an async function from the state to a partial
    /// update.
    ///
    /// # Errors
    ///
    /// [`GraphError::DuplicateNode`] if the name is taken or is [`END`].
    pub fn add_node<F, Fut>(&mut self, name: impl Into<NodeId>, handler: F) -> Result<&mut Self>
    where
        F: Fn(State) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<StateUpdate, NodeError>> + Send + 'static,
    {
        let handler: UnaryHandler =
            Arc::new(move |state: State| -> BoxFuture<'static, NodeResult> {
                handler(state).boxed()
            });
        self.insert(name.into(), NodeKind::Unary(handler))
    }

    /// Register a streaming node: a function from the state to a stream of
    /// increments ending with exactly one final update.
    ///
    /// # Errors
    ///
    /// [`GraphError::DuplicateNode`] if the name is taken or is [`END`].
    pub fn add_streaming_node<F>(&mut self, name: impl Into<NodeId>, handler: F) -> Result<&mut Self>
    where
        F: Fn(State) -> UpdateStream + Send + Sync + 'static,
    {
        let handler: StreamingHandler = Arc::new(handler);
        self.insert(name.into(), NodeKind::Streaming(handler))
    }

    fn insert(&mut self, name: NodeId, kind: NodeKind) -> Result<&mut Self> {
        if name == END || self.graph.contains(&name) {
            return Err(GraphError::DuplicateNode(name));
        }
        self.graph.order.push(name.clone());
        self.graph.nodes.insert(name.clone(), NodeSpec { name, kind });
        Ok(self)
    }

    /// Route `from` unconditionally to `to` (a node or [`END`]).
    ///
    /// # Errors
    ///
    /// [`GraphError::UnknownNode`] if either endpoint is not registered and
    /// [`GraphError::DuplicateEdge`] if `from` already has an outgoing edge.
    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> Result<&mut Self> {
        let to = to.into();
        if !self.graph.is_target(&to) {
            return Err(GraphError::UnknownNode(to));
        }
        self.set_edge(from.into(), Edge::Direct(to))
    }

    /// Route `from` with `router`, which must answer with one of `targets`.
    ///
    /// The router runs on the state after `from` has merged its update. An
    /// answer outside `targets` fails the run with
    /// [`GraphError::UnknownRoutingTarget`]; that includes [`END`] unless it
    /// is declared.
    pub fn add_conditional_edge<F, I, S>(
        &mut self,
        from: impl Into<NodeId>,
        router: F,
        targets: I,
    ) -> Result<&mut Self>
    where
        F: Fn(&State) -> NodeId + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        let targets: Vec<NodeId> = targets.into_iter().map(Into::into).collect();
        if targets.is_empty() {
            return Err(GraphError::Configuration(
                "conditional edge needs at least one target".to_string(),
            ));
        }
        self.set_edge(
            from.into(),
            Edge::Conditional {
                router: Arc::new(router),
                targets,
            },
        )
    }

    fn set_edge(&mut self, from: NodeId, edge: Edge) -> Result<&mut Self> {
        if !self.graph.contains(&from) {
            return Err(GraphError::UnknownNode(from));
        }
        if self.graph.edges.contains_key(&from) {
            return Err(GraphError::DuplicateEdge(from));
        }
        self.graph.edges.insert(from, edge);
        Ok(self)
    }

    pub fn set_entry_point(&mut self, name: impl Into<NodeId>) -> &mut Self {
        self.graph.entry = Some(name.into());
        self
    }

    /// Halt before each of `names` until the caller supplies input.
    pub fn mark_interrupt_before<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.interrupts = std::mem::take(&mut self.interrupts).with_interrupt_before(names);
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Validate the structure and produce an executable graph backed by an
    /// in-memory checkpoint store.
    ///
    /// # Errors
    ///
    /// [`GraphError::NoEntryPoint`], [`GraphError::UnknownNode`] for an
    /// unknown entry point, edge target or interrupt node, and
    /// [`GraphError::UnreachableNode`].
    pub fn compile(self) -> Result<CompiledGraph> {
        self.graph.validate()?;
        if let Some(unknown) = self
            .interrupts
            .interrupt_before
            .iter()
            .find(|n| !self.graph.contains(n))
        {
            return Err(GraphError::UnknownNode(unknown.clone()));
        }

        tracing::debug!(
            nodes = self.graph.order.len(),
            interrupts = ?self.interrupts.interrupt_before,
            "compiled graph"
        );
        Ok(CompiledGraph::new(self.graph, self.interrupts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop(_state: State) -> BoxFuture<'static, NodeResult> {
        Box::pin(async { Ok(StateUpdate::new()) })
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut graph = StateGraph::new();
        graph.add_node("reporter", noop).unwrap();

        let err = graph.add_node("reporter", noop).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateNode(n) if n == "reporter"));

        let err = graph.add_node(END, noop).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateNode(_)));
    }

    #[test]
    fn test_edges_require_known_source_and_single_successor() {
        let mut graph = StateGraph::new();
        graph.add_node("reporter", noop).unwrap();
        graph.add_node("critic", noop).unwrap();

        assert!(matches!(
            graph.add_edge("ghost", "critic"),
            Err(GraphError::UnknownNode(n)) if n == "ghost"
        ));
        assert!(matches!(
            graph.add_edge("reporter", "ghost"),
            Err(GraphError::UnknownNode(n)) if n == "ghost"
        ));
        graph.add_edge("reporter", "critic").unwrap();
        assert!(matches!(
            graph.add_edge("reporter", END),
            Err(GraphError::DuplicateEdge(n)) if n == "reporter"
        ));
        assert!(matches!(
            graph.add_conditional_edge("reporter", |_: &State| END.to_string(), [END]),
            Err(GraphError::DuplicateEdge(_))
        ));
    }

    #[test]
    fn test_conditional_edge_needs_targets() {
        let mut graph = StateGraph::new();
        graph.add_node("critic", noop).unwrap();
        let err = graph
            .add_conditional_edge("critic", |_: &State| END.to_string(), Vec::<String>::new())
            .unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));
    }

    #[test]
    fn test_compile_checks_structure() {
        let mut graph = StateGraph::new();
        graph.add_node("reporter", noop).unwrap();
        assert!(matches!(graph.compile(), Err(GraphError::NoEntryPoint)));

        let mut graph = StateGraph::new();
        graph.add_node("reporter", noop).unwrap();
        graph.add_node("orphan", noop).unwrap();
        graph.set_entry_point("reporter");
        graph.add_edge("reporter", END).unwrap();
        assert!(matches!(graph.compile(), Err(GraphError::UnreachableNode(n)) if n == "orphan"));

        let mut graph = StateGraph::new();
        graph.add_node("reporter", noop).unwrap();
        graph.set_entry_point("critic");
        assert!(matches!(graph.compile(), Err(GraphError::UnknownNode(n)) if n == "critic"));

        let mut graph = StateGraph::new();
        graph.add_node("reporter", noop).unwrap();
        graph.set_entry_point("reporter");
        graph
            .add_conditional_edge("reporter", |_: &State| END.to_string(), ["ghost", END])
            .unwrap();
        assert!(matches!(graph.compile(), Err(GraphError::UnknownNode(n)) if n == "ghost"));
    }

    #[test]
    fn test_interrupt_on_unknown_node_rejected() {
        let mut graph = StateGraph::new();
        graph.add_node("reporter", noop).unwrap();
        graph.set_entry_point("reporter");
        graph.add_edge("reporter", END).unwrap();
        graph.mark_interrupt_before(["human"]);

        assert!(matches!(graph.compile(), Err(GraphError::UnknownNode(n)) if n == "human"));
    }

    #[test]
    fn test_closure_nodes_and_chaining() {
        let mut graph = StateGraph::new();
        graph
            .add_node("reporter", |state: State| async move {
                let mut update = StateUpdate::new();
                update.insert("echo".into(), json!(state.len()));
                Ok(update)
            })
            .unwrap()
            .set_entry_point("reporter")
            .add_edge("reporter", END)
            .unwrap();

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.node_names(), vec!["reporter"]);
    }
}
