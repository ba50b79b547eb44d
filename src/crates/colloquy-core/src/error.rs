//! Error types for graph construction and execution
//!
//! Every failure of the engine is a [`GraphError`]. Variants fall into five
//! kinds (see [`ErrorKind`]), and each carries enough context (thread id, node
//! name) for a caller to decide whether to retry, restart or abandon a thread.
//!
//! ```text
//! GraphError
//! ├── Configuration   DuplicateNode, UnknownNode, DuplicateEdge,
//! │                   NoEntryPoint, UnreachableNode, Configuration
//! ├── Routing         UnknownRoutingTarget
//! ├── Thread          UnknownThread, ConcurrentInvocation, StaleOverwrite
//! ├── Node            NodeExecution, Timeout, Cancelled
//! └── Persistence     Checkpoint, Serialization
//! ```
//!
//! No error leaves a thread in a state it cannot be resumed from: node
//! failures, routing failures and cancellations never touch the checkpoint,
//! and thread errors are raised before anything is written.
//!
//! ```rust
//! use colloquy_core::{ErrorKind, GraphError};
//!
//! fn should_retry(err: &GraphError) -> bool {
//!     match err.kind() {
//!         ErrorKind::Configuration => false,
//!         _ => err.is_retryable(),
//!     }
//! }
//! ```

use colloquy_checkpoint::CheckpointError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

/// Error type returned by node handlers.
pub type NodeError = Box<dyn std::error::Error + Send + Sync>;

/// Coarse classification of a [`GraphError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid graph definition. Raised before any execution.
    Configuration,
    /// A conditional edge produced a name that is not a node.
    Routing,
    /// Caller-correctable problem with the thread or its input.
    Thread,
    /// A node failed, timed out or was abandoned.
    Node,
    /// The checkpoint store failed.
    Persistence,
}

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Node '{0}' is already registered")]
    DuplicateNode(String),

    #[error("Unknown node '{0}'")]
    UnknownNode(String),

    /// Execution is linear, so a node has at most one outgoing edge.
    #[error("Node '{0}' already has an outgoing edge")]
    DuplicateEdge(String),

    #[error("No entry point set")]
    NoEntryPoint,

    #[error("Node '{0}' is not reachable from the entry point")]
    UnreachableNode(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Router after '{node}' on thread '{thread_id}' returned unknown target '{target}'")]
    UnknownRoutingTarget {
        thread_id: String,
        node: String,
        target: String,
    },

    #[error("Thread '{0}' has no checkpoint")]
    UnknownThread(String),

    #[error("Thread '{0}' is already being executed")]
    ConcurrentInvocation(String),

    /// Input tried to change a field that an executed node already produced.
    #[error("Input for thread '{thread_id}' would overwrite field '{field}'")]
    StaleOverwrite { thread_id: String, field: String },

    #[error("Node '{node}' failed on thread '{thread_id}'")]
    NodeExecution {
        thread_id: String,
        node: String,
        #[source]
        error: NodeError,
    },

    #[error("Node '{node}' on thread '{thread_id}' timed out after {duration_ms}ms")]
    Timeout {
        thread_id: String,
        node: String,
        duration_ms: u64,
    },

    /// The consumer of a stream went away while the run was in progress.
    #[error("Run of thread '{thread_id}' was cancelled at node '{node}'")]
    Cancelled { thread_id: String, node: String },

    #[error("Checkpoint error: {0}")]
    Checkpoint(CheckpointError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<CheckpointError> for GraphError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::ThreadBusy(thread_id) => GraphError::ConcurrentInvocation(thread_id),
            CheckpointError::VersionConflict { thread_id, .. } => {
                GraphError::ConcurrentInvocation(thread_id)
            }
            other => GraphError::Checkpoint(other),
        }
    }
}

impl GraphError {
    pub fn node_execution(
        thread_id: impl Into<String>,
        node: impl Into<String>,
        error: impl Into<NodeError>,
    ) -> Self {
        Self::NodeExecution {
            thread_id: thread_id.into(),
            node: node.into(),
            error: error.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::DuplicateNode(_)
            | GraphError::UnknownNode(_)
            | GraphError::DuplicateEdge(_)
            | GraphError::NoEntryPoint
            | GraphError::UnreachableNode(_)
            | GraphError::Configuration(_) => ErrorKind::Configuration,
            GraphError::UnknownRoutingTarget { .. } => ErrorKind::Routing,
            GraphError::UnknownThread(_)
            | GraphError::ConcurrentInvocation(_)
            | GraphError::StaleOverwrite { .. } => ErrorKind::Thread,
            GraphError::NodeExecution { .. }
            | GraphError::Timeout { .. }
            | GraphError::Cancelled { .. } => ErrorKind::Node,
            GraphError::Checkpoint(_) | GraphError::Serialization(_) => ErrorKind::Persistence,
        }
    }

    /// Whether invoking the same thread again may succeed without changing
    /// the graph or the input.
    pub fn is_retryable(&self) -> bool {
        match self {
            GraphError::NodeExecution { .. }
            | GraphError::Timeout { .. }
            | GraphError::Cancelled { .. }
            | GraphError::ConcurrentInvocation(_) => true,
            GraphError::Checkpoint(e) => matches!(
                e,
                CheckpointError::Io(_) | CheckpointError::Storage(_)
            ),
            _ => false,
        }
    }

    /// Thread the error refers to, if any.
    pub fn thread_id(&self) -> Option<&str> {
        match self {
            GraphError::UnknownRoutingTarget { thread_id, .. }
            | GraphError::StaleOverwrite { thread_id, .. }
            | GraphError::NodeExecution { thread_id, .. }
            | GraphError::Timeout { thread_id, .. }
            | GraphError::Cancelled { thread_id, .. } => Some(thread_id),
            GraphError::UnknownThread(thread_id) | GraphError::ConcurrentInvocation(thread_id) => {
                Some(thread_id)
            }
            _ => None,
        }
    }

    /// Node the error refers to, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            GraphError::UnknownRoutingTarget { node, .. }
            | GraphError::NodeExecution { node, .. }
            | GraphError::Timeout { node, .. }
            | GraphError::Cancelled { node, .. } => Some(node),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_contention_maps_to_concurrent_invocation() {
        let busy: GraphError = CheckpointError::ThreadBusy("t1".into()).into();
        assert!(matches!(busy, GraphError::ConcurrentInvocation(ref t) if t == "t1"));

        let conflict: GraphError = CheckpointError::VersionConflict {
            thread_id: "t1".into(),
            expected: 3,
            found: 4,
        }
        .into();
        assert!(matches!(conflict, GraphError::ConcurrentInvocation(_)));
        assert_eq!(conflict.kind(), ErrorKind::Thread);

        let io: GraphError = CheckpointError::Storage("disk full".into()).into();
        assert_eq!(io.kind(), ErrorKind::Persistence);
        assert!(io.is_retryable());
    }

    #[test]
    fn test_node_execution_context() {
        let err = GraphError::node_execution("t1", "critic", "model unavailable");
        assert_eq!(err.kind(), ErrorKind::Node);
        assert!(err.is_retryable());
        assert_eq!(err.thread_id(), Some("t1"));
        assert_eq!(err.node(), Some("critic"));
        assert_eq!(err.to_string(), "Node 'critic' failed on thread 't1'");
        assert_eq!(
            std::error::Error::source(&err).map(ToString::to_string).as_deref(),
            Some("model unavailable")
        );
    }

    #[test]
    fn test_configuration_errors_are_not_retryable() {
        for err in [
            GraphError::DuplicateNode("a".into()),
            GraphError::NoEntryPoint,
            GraphError::UnreachableNode("b".into()),
        ] {
            assert_eq!(err.kind(), ErrorKind::Configuration);
            assert!(!err.is_retryable());
        }
    }
}
