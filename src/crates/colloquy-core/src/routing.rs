//! Router helpers for conditional edges
//!
//! Routers are pure functions of the state. The engine puts no limit on how
//! often a conditional loop runs; a loop that must terminate bounds itself,
//! typically by counting passes in a state field and wrapping its router with
//! [`bounded`].
//!
//! ```rust
//! use colloquy_core::routing::{bounded, route_on_field};
//!
//! // Revise while the TA has not given feedback; give up after 3 passes.
//! let router = bounded(
//!     route_on_field("ta_feedback", "ta_review", "human"),
//!     "critic_passes",
//!     3,
//!     "human",
//! );
//! ```

use crate::graph::NodeId;
use crate::state::State;
use serde_json::Value;

/// Whether a field value counts as "not yet provided".
///
/// Missing, `null`, `""`, `[]` and `{}` are empty; everything else,
/// including `0` and `false`, is a value.
pub fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        Some(_) => false,
    }
}

/// Route to `when_empty` while `field` is empty, to `when_filled` afterwards.
pub fn route_on_field(
    field: impl Into<String>,
    when_empty: impl Into<NodeId>,
    when_filled: impl Into<NodeId>,
) -> impl Fn(&State) -> NodeId + Send + Sync + Clone + 'static {
    let field = field.into();
    let when_empty = when_empty.into();
    let when_filled = when_filled.into();
    move |state: &State| {
        if is_empty_value(state.get(&field)) {
            when_empty.clone()
        } else {
            when_filled.clone()
        }
    }
}

/// Wrap `router` so it returns `exit` once the numeric `counter_field`
/// reaches `max`.
pub fn bounded<R>(
    router: R,
    counter_field: impl Into<String>,
    max: u64,
    exit: impl Into<NodeId>,
) -> impl Fn(&State) -> NodeId + Send + Sync + Clone + 'static
where
    R: Fn(&State) -> NodeId + Send + Sync + Clone + 'static,
{
    let counter_field = counter_field.into();
    let exit = exit.into();
    move |state: &State| {
        let count = state.get(&counter_field).and_then(Value::as_u64).unwrap_or(0);
        if count >= max {
            exit.clone()
        } else {
            router(state)
        }
    }
}
