//! Streaming increments, run events and the text accumulator
//!
//! A streaming node yields [`StreamUpdate`]s. Every increment except the
//! last is tagged `is_final = false` and is only forwarded to the caller; the
//! single `is_final = true` update is the node's result and the only one that
//! reaches the state and the checkpoint.
//!
//! ```text
//!  node                engine                       caller
//!   │ partial "The "    │ Update{is_final:false}      │
//!   ├──────────────────►├────────────────────────────►│
//!   │ partial "report"  │ Update{is_final:false}      │
//!   ├──────────────────►├────────────────────────────►│
//!   │ final "The report"│ Update{is_final:true}       │
//!   ├──────────────────►├──── merge + checkpoint ────►│
//! ```
//!
//! [`TextAccumulator`] builds such a sequence from text deltas without any
//! state captured by closures: it is passed into each increment and handed
//! back with the update for that increment.

use crate::error::NodeError;
use crate::graph::{NodeId, UpdateStream};
use crate::state::{State, StateUpdate};
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One increment of a streaming node.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamUpdate {
    pub update: StateUpdate,
    pub is_final: bool,
}

impl StreamUpdate {
    pub fn partial(update: StateUpdate) -> Self {
        Self {
            update,
            is_final: false,
        }
    }

    pub fn final_update(update: StateUpdate) -> Self {
        Self {
            update,
            is_final: true,
        }
    }
}

/// Event observed by a consumer of [`CompiledGraph::stream`](crate::CompiledGraph::stream).
///
/// Events of one invocation arrive in production order. Unary nodes produce
/// a single `Update` with `is_final = true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    NodeStart {
        node: NodeId,
    },
    Update {
        node: NodeId,
        update: StateUpdate,
        is_final: bool,
    },
    /// The run halted before `node`, which waits for external input.
    Interrupted {
        node: NodeId,
        state: State,
    },
    Complete {
        state: State,
    },
}

impl StreamEvent {
    pub fn node(&self) -> Option<&str> {
        match self {
            StreamEvent::NodeStart { node }
            | StreamEvent::Update { node, .. }
            | StreamEvent::Interrupted { node, .. } => Some(node),
            StreamEvent::Complete { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Interrupted { .. } | StreamEvent::Complete { .. }
        )
    }
}

/// Accumulates text deltas for one state field.
///
/// Each [`push`](Self::push) returns the accumulator together with a partial
/// update holding just that delta; [`finish`](Self::finish) returns the final
/// update holding the concatenation of every delta.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextAccumulator {
    field: String,
    text: String,
    increments: usize,
}

impl TextAccumulator {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            text: String::new(),
            increments: 0,
        }
    }

    pub fn push(mut self, delta: impl AsRef<str>) -> (Self, StreamUpdate) {
        let delta = delta.as_ref();
        self.text.push_str(delta);
        self.increments += 1;
        let update = single(&self.field, Value::String(delta.to_string()));
        (self, StreamUpdate::partial(update))
    }

    pub fn finish(self) -> StreamUpdate {
        StreamUpdate::final_update(single(&self.field, Value::String(self.text)))
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn increments(&self) -> usize {
        self.increments
    }
}

fn single(field: &str, value: Value) -> StateUpdate {
    let mut update = StateUpdate::new();
    update.insert(field.to_string(), value);
    update
}

/// Source of text deltas for [`text_stream_node`].
pub type DeltaStream = BoxStream<'static, std::result::Result<String, NodeError>>;

/// Adapt a producer of text deltas into a streaming node handler writing
/// `field`.
///
/// The first delta error ends the node with that error; otherwise the final
/// update carries the full text.
pub fn text_stream_node<F>(
    field: impl Into<String>,
    deltas: F,
) -> impl Fn(State) -> UpdateStream + Send + Sync + 'static
where
    F: Fn(State) -> DeltaStream + Send + Sync + 'static,
{
    let field = field.into();
    move |state: State| -> UpdateStream {
        let mut deltas = deltas(state);
        let acc = TextAccumulator::new(field.clone());
        Box::pin(async_stream::stream! {
            let mut acc = acc;
            while let Some(delta) = deltas.next().await {
                match delta {
                    Ok(delta) => {
                        let (next, update) = acc.push(delta);
                        acc = next;
                        yield Ok(update);
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
            yield Ok(acc.finish());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_accumulator_threads_text_through_increments() {
        let acc = TextAccumulator::new("reporter_content");
        let (acc, first) = acc.push("The ");
        let (acc, second) = acc.push("report");

        assert!(!first.is_final);
        assert_eq!(first.update["reporter_content"], json!("The "));
        assert_eq!(second.update["reporter_content"], json!("report"));
        assert_eq!(acc.increments(), 2);
        assert_eq!(acc.text(), "The report");

        let last = acc.finish();
        assert!(last.is_final);
        assert_eq!(last.update["reporter_content"], json!("The report"));
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = StreamEvent::Update {
            node: "reporter".into(),
            update: single("reporter_content", json!("x")),
            is_final: false,
        };
        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["event"], json!("update"));
        assert_eq!(encoded["node"], json!("reporter"));
        assert_eq!(event.node(), Some("reporter"));
        assert!(!event.is_terminal());
    }

    #[tokio::test]
    async fn test_text_stream_node_yields_partials_then_final() {
        let handler = text_stream_node("reporter_content", |_state| {
            stream::iter(vec![Ok("a".to_string()), Ok("b".to_string())]).boxed()
        });

        let updates: Vec<_> = handler(State::new())
            .map(|u| u.unwrap())
            .collect()
            .await;

        assert_eq!(updates.len(), 3);
        assert!(updates[..2].iter().all(|u| !u.is_final));
        assert!(updates[2].is_final);
        assert_eq!(updates[2].update["reporter_content"], json!("ab"));
    }

    #[tokio::test]
    async fn test_text_stream_node_stops_at_first_error() {
        let handler = text_stream_node("reporter_content", |_state| {
            let items: Vec<std::result::Result<String, NodeError>> =
                vec![Ok("a".into()), Err("model dropped".into()), Ok("b".into())];
            stream::iter(items).boxed()
        });

        let updates: Vec<_> = handler(State::new()).collect().await;
        assert_eq!(updates.len(), 2);
        assert!(updates[0].is_ok());
        assert!(updates[1].is_err());
    }

    proptest! {
        #[test]
        fn prop_partials_concatenate_to_final(deltas in prop::collection::vec(".{0,8}", 0..16)) {
            let mut acc = TextAccumulator::new("f");
            let mut seen = String::new();
            for delta in &deltas {
                let (next, update) = acc.push(delta);
                acc = next;
                prop_assert!(!update.is_final);
                seen.push_str(update.update["f"].as_str().unwrap());
            }
            let last = acc.finish();
            prop_assert!(last.is_final);
            prop_assert_eq!(last.update["f"].as_str().unwrap(), seen.as_str());
            prop_assert_eq!(seen, deltas.concat());
        }
    }
}
