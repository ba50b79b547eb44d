//! Graph data structures: nodes, edges and the node registry
//!
//! A [`Graph`] is a registry of named nodes plus at most one outgoing
//! [`Edge`] per node. Execution is linear: after a node completes, its edge
//! names exactly one successor (or [`END`]). Nodes come in two closed kinds:
//!
//! ```text
//!              ┌──────────────────────────────┐
//!   State ───► │ NodeKind::Unary              │ ───► StateUpdate
//!              └──────────────────────────────┘
//!              ┌──────────────────────────────┐      StreamUpdate (partial)
//!   State ───► │ NodeKind::Streaming          │ ───► StreamUpdate (partial)
//!              └──────────────────────────────┘      StreamUpdate (final)
//! ```
//!
//! Edges are either direct or conditional. A conditional edge carries a pure
//! router over the state plus the finite set of names it may return; the set
//! feeds the compile-time reachability check, and the router's actual answer
//! is validated again at run time.
//!
//! Graphs are built with [`StateGraph`](crate::StateGraph); this module only
//! holds the data and the structural checks used by `compile`.

use crate::error::{GraphError, NodeError, Result};
use crate::state::{State, StateUpdate};
use crate::stream::StreamUpdate;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Node identifier, unique within a graph.
pub type NodeId = String;

/// Reserved target meaning "the workflow is finished".
pub const END: &str = "__end__";

/// Result of one unary node run.
pub type NodeResult = std::result::Result<StateUpdate, NodeError>;

/// Stream of increments produced by a streaming node.
pub type UpdateStream = BoxStream<'static, std::result::Result<StreamUpdate, NodeError>>;

pub type UnaryHandler = Arc<dyn Fn(State) -> BoxFuture<'static, NodeResult> + Send + Sync>;

pub type StreamingHandler = Arc<dyn Fn(State) -> UpdateStream + Send + Sync>;

/// Pure function of the state naming the next node (or [`END`]).
pub type Router = Arc<dyn Fn(&State) -> NodeId + Send + Sync>;

/// How a node produces its update.
#[derive(Clone)]
pub enum NodeKind {
    /// Returns one partial update.
    Unary(UnaryHandler),
    /// Yields partial updates and finishes with exactly one final update.
    Streaming(StreamingHandler),
}

impl NodeKind {
    pub fn is_streaming(&self) -> bool {
        matches!(self, NodeKind::Streaming(_))
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Unary(_) => f.write_str("Unary"),
            NodeKind::Streaming(_) => f.write_str("Streaming"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub name: NodeId,
    pub kind: NodeKind,
}

#[derive(Clone)]
pub enum Edge {
    Direct(NodeId),
    Conditional {
        router: Router,
        /// Every name the router may return.
        targets: Vec<NodeId>,
    },
}

impl Edge {
    /// Names this edge can lead to, as far as the graph structure knows.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Direct(to) => vec![to.as_str()],
            Edge::Conditional { targets, .. } => targets.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Direct(to) => f.debug_tuple("Direct").field(to).finish(),
            Edge::Conditional { targets, .. } => f
                .debug_struct("Conditional")
                .field("targets", targets)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: HashMap<NodeId, NodeSpec>,
    pub edges: HashMap<NodeId, Edge>,
    pub entry: Option<NodeId>,
    /// Registration order, for stable diagnostics and rendering.
    pub order: Vec<NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.get(name)
    }

    pub fn edge(&self, from: &str) -> Option<&Edge> {
        self.edges.get(from)
    }

    /// Whether `name` may appear as an edge target.
    pub fn is_target(&self, name: &str) -> bool {
        name == END || self.contains(name)
    }

    /// Check entry point, edge targets and reachability.
    pub fn validate(&self) -> Result<()> {
        let entry = self.entry.as_deref().ok_or(GraphError::NoEntryPoint)?;
        if !self.contains(entry) {
            return Err(GraphError::UnknownNode(entry.to_string()));
        }

        for from in &self.order {
            if let Some(edge) = self.edges.get(from) {
                if let Some(missing) = edge.targets().into_iter().find(|t| !self.is_target(t)) {
                    return Err(GraphError::UnknownNode(missing.to_string()));
                }
            }
        }

        let reachable = self.reachable_from(entry);
        if let Some(orphan) = self.order.iter().find(|n| !reachable.contains(n.as_str())) {
            return Err(GraphError::UnreachableNode(orphan.clone()));
        }

        Ok(())
    }

    /// Nodes reachable from `start` through direct edges and declared
    /// conditional targets.
    pub fn reachable_from<'a>(&'a self, start: &'a str) -> HashSet<&'a str> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            if node == END || !seen.insert(node) {
                continue;
            }
            if let Some(edge) = self.edges.get(node) {
                queue.extend(edge.targets());
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unary() -> NodeKind {
        let handler: UnaryHandler =
            Arc::new(|_state: State| -> BoxFuture<'static, NodeResult> {
                Box::pin(async { Ok(StateUpdate::new()) })
            });
        NodeKind::Unary(handler)
    }

    fn graph(nodes: &[&str], edges: &[(&str, Edge)], entry: Option<&str>) -> Graph {
        let mut graph = Graph::new();
        for name in nodes {
            graph.nodes.insert(
                name.to_string(),
                NodeSpec {
                    name: name.to_string(),
                    kind: unary(),
                },
            );
            graph.order.push(name.to_string());
        }
        for (from, edge) in edges {
            graph.edges.insert(from.to_string(), edge.clone());
        }
        graph.entry = entry.map(str::to_string);
        graph
    }

    fn direct(to: &str) -> Edge {
        Edge::Direct(to.to_string())
    }

    fn conditional(targets: &[&str]) -> Edge {
        let first = targets[0].to_string();
        Edge::Conditional {
            router: Arc::new(move |_: &State| first.clone()),
            targets: targets.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_valid_linear_graph() {
        let g = graph(
            &["reporter", "critic"],
            &[("reporter", direct("critic")), ("critic", direct(END))],
            Some("reporter"),
        );
        assert!(g.validate().is_ok());
    }

    #[test]
    fn test_missing_entry_point() {
        let g = graph(&["reporter"], &[], None);
        assert!(matches!(g.validate(), Err(GraphError::NoEntryPoint)));

        let g = graph(&["reporter"], &[], Some("nobody"));
        assert!(matches!(g.validate(), Err(GraphError::UnknownNode(n)) if n == "nobody"));
    }

    #[test]
    fn test_unreachable_node() {
        let g = graph(
            &["reporter", "critic", "orphan"],
            &[("reporter", direct("critic"))],
            Some("reporter"),
        );
        assert!(matches!(g.validate(), Err(GraphError::UnreachableNode(n)) if n == "orphan"));
    }

    #[test]
    fn test_conditional_targets_count_for_reachability() {
        let g = graph(
            &["critic", "revise", "human"],
            &[
                ("critic", conditional(&["revise", "human"])),
                ("revise", direct("critic")),
            ],
            Some("critic"),
        );
        assert!(g.validate().is_ok());
        assert_eq!(g.reachable_from("critic").len(), 3);
    }

    #[test]
    fn test_unknown_conditional_target() {
        let g = graph(
            &["critic"],
            &[("critic", conditional(&["ghost", END]))],
            Some("critic"),
        );
        assert!(matches!(g.validate(), Err(GraphError::UnknownNode(n)) if n == "ghost"));
    }

    #[test]
    fn test_debug_output_hides_handlers() {
        let rendered = format!("{:?}", conditional(&["a", "b"]));
        assert!(rendered.starts_with("Conditional"));
        assert!(rendered.contains("\"a\""));
        assert_eq!(format!("{:?}", unary()), "Unary");
    }
}
