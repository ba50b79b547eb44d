//! Interrupt points and the human-in-the-loop input protocol
//!
//! A node marked interrupt-before is never run as part of the invocation that
//! reaches it. The engine persists a `Paused` checkpoint whose `next` is that
//! node and returns. The caller supplies the missing field(s) and resumes:
//!
//! ```text
//!            invoke(T, {query})
//!  RUNNING ──────────────────────► reporter ► critic ─┐
//!                                                     │ next = human (interrupt)
//!  PAUSED  ◄──────────────────────────────────────────┘
//!     │
//!     │  invoke(T, {human_selection})           one call
//!     │  ── or ──
//!     │  update_state(T, {human_selection})     two calls
//!     │  invoke(T, None)
//!     ▼
//!  RUNNING ► human ► check ──► DONE
//! ```
//!
//! Both calling conventions go through [`check_input`]. Input may set fields
//! no node has produced yet (selections, new fields) and may re-send values
//! unchanged. Changing a field an executed node already produced, or the
//! original `query`, would retroactively alter output the workflow has
//! already acted on; it is rejected with [`GraphError::StaleOverwrite`]. A
//! `Done` thread rejects every change.

use crate::error::{GraphError, Result};
use crate::graph::NodeId;
use crate::state::{fields, State};
use colloquy_checkpoint::Checkpoint;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptConfig {
    /// Nodes to halt before.
    pub interrupt_before: Vec<NodeId>,
}

impl InterruptConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interrupt_before<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        for node in nodes {
            let node = node.into();
            if !self.interrupt_before.contains(&node) {
                self.interrupt_before.push(node);
            }
        }
        self
    }

    pub fn should_interrupt_before(&self, node: &str) -> bool {
        self.interrupt_before.iter().any(|n| n == node)
    }

    pub fn is_empty(&self) -> bool {
        self.interrupt_before.is_empty()
    }
}

/// Validate caller input against a thread's checkpoint.
///
/// Returns whether merging `input` would change the stored state.
pub fn check_input(checkpoint: &Checkpoint, input: &State) -> Result<bool> {
    let mut changes = false;

    for (field, value) in input {
        let current = checkpoint.values.get(field);
        if current == Some(value) {
            continue;
        }

        let produced = checkpoint.written_by.contains_key(field);
        let fixed_query =
            field == fields::QUERY && current.is_some_and(|v| !v.is_null());
        if checkpoint.status.is_done() || produced || fixed_query {
            tracing::debug!(
                thread_id = %checkpoint.thread_id,
                field = %field,
                status = %checkpoint.status,
                owner = checkpoint.written_by.get(field).map(String::as_str),
                "rejecting stale overwrite"
            );
            return Err(GraphError::StaleOverwrite {
                thread_id: checkpoint.thread_id.clone(),
                field: field.clone(),
            });
        }
        changes = true;
    }

    Ok(changes)
}

/// The node a paused checkpoint is waiting in front of.
pub fn pending_interrupt(checkpoint: &Checkpoint) -> Option<&str> {
    if checkpoint.status.is_paused() {
        checkpoint.next.as_deref()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_checkpoint::ThreadStatus;
    use serde_json::json;

    fn obj(value: serde_json::Value) -> State {
        value.as_object().cloned().unwrap()
    }

    fn paused() -> Checkpoint {
        let mut checkpoint = Checkpoint::initial(
            "t1",
            obj(json!({
                "query": "X",
                "reporter_content": "draft",
                "critic_content": {"points": []},
                "current_role": "critic"
            })),
            "reporter",
        );
        for (field, node) in [
            ("reporter_content", "reporter"),
            ("critic_content", "critic"),
            ("current_role", "critic"),
        ] {
            checkpoint.written_by.insert(field.into(), node.into());
        }
        checkpoint.status = ThreadStatus::Paused;
        checkpoint.next = Some("human".into());
        checkpoint
    }

    #[test]
    fn test_interrupt_config() {
        let config = InterruptConfig::new().with_interrupt_before(["human", "explore", "human"]);
        assert_eq!(config.interrupt_before, vec!["human", "explore"]);
        assert!(config.should_interrupt_before("human"));
        assert!(!config.should_interrupt_before("critic"));
        assert!(InterruptConfig::default().is_empty());
    }

    #[test]
    fn test_selection_is_accepted() {
        let input = obj(json!({"human_selection": {"point": 0, "case": 1}}));
        assert!(check_input(&paused(), &input).unwrap());
    }

    #[test]
    fn test_resending_full_state_is_accepted() {
        let checkpoint = paused();
        let mut input = checkpoint.values.clone();
        input.insert("human_selection".into(), json!({"point": 0, "case": 0}));
        assert!(check_input(&checkpoint, &input).unwrap());

        assert!(!check_input(&checkpoint, &checkpoint.values).unwrap());
    }

    #[test]
    fn test_changing_node_output_is_rejected() {
        let input = obj(json!({"reporter_content": "rewritten"}));
        let err = check_input(&paused(), &input).unwrap_err();
        assert!(matches!(err, GraphError::StaleOverwrite { ref field, .. } if field == "reporter_content"));
    }

    #[test]
    fn test_query_is_immutable_once_set() {
        let err = check_input(&paused(), &obj(json!({"query": "Y"}))).unwrap_err();
        assert!(matches!(err, GraphError::StaleOverwrite { ref field, .. } if field == "query"));

        let mut blank = paused();
        blank.values.insert("query".into(), serde_json::Value::Null);
        assert!(check_input(&blank, &obj(json!({"query": "Y"}))).unwrap());
    }

    #[test]
    fn test_done_thread_rejects_any_change() {
        let mut done = paused();
        done.status = ThreadStatus::Done;
        done.next = None;

        assert!(!check_input(&done, &obj(json!({"query": "X"}))).unwrap());
        let err = check_input(&done, &obj(json!({"human_selection": {"point": 1}}))).unwrap_err();
        assert!(matches!(err, GraphError::StaleOverwrite { .. }));
    }

    #[test]
    fn test_pending_interrupt() {
        let checkpoint = paused();
        assert_eq!(pending_interrupt(&checkpoint), Some("human"));

        let mut running = checkpoint;
        running.status = ThreadStatus::Running;
        assert_eq!(pending_interrupt(&running), None);
    }
}
