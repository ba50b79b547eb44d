//! The state object threaded through a workflow
//!
//! A thread's [`State`] is a JSON object of named fields. Nodes never mutate
//! it in place: each node receives a copy and returns a [`StateUpdate`] holding
//! only the fields it wants to set. The engine folds updates into the state
//! with [`merge`], which is field-level last-write-wins:
//!
//! ```text
//! state   { query: "X", reporter_content: "draft" }
//! update  {             reporter_content: "draft v2", critic_content: {...} }
//! result  { query: "X", reporter_content: "draft v2", critic_content: {...} }
//! ```
//!
//! Fields absent from an update are left alone, so nodes writing disjoint
//! fields compose in any order, and a node re-entered through a feedback loop
//! replaces its own earlier output.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// The shared state of one thread.
pub type State = serde_json::Map<String, Value>;

/// Partial state produced by one node run.
pub type StateUpdate = serde_json::Map<String, Value>;

/// Field names with engine-level meaning.
pub mod fields {
    /// The original request. Immutable once set.
    pub const QUERY: &str = "query";

    /// Name of the node that most recently wrote to the state.
    pub const CURRENT_ROLE: &str = "current_role";
}

/// Merge `update` into `state`, returning the names of the fields written.
pub fn merge(state: &mut State, update: StateUpdate) -> Vec<String> {
    let mut written = Vec::with_capacity(update.len());
    for (field, value) in update {
        written.push(field.clone());
        state.insert(field, value);
    }
    written
}

/// Build a state from a JSON value, which must be an object.
pub fn from_value(value: Value) -> crate::error::Result<State> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(crate::error::GraphError::Configuration(format!(
            "state must be a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Convenience accessors on [`State`].
pub trait StateExt {
    /// String value of `field`, if present and a string.
    fn str_field(&self, field: &str) -> Option<&str>;

    /// Deserialize `field` into `T`. `Ok(None)` if the field is absent or null.
    fn typed_field<T: DeserializeOwned>(&self, field: &str) -> serde_json::Result<Option<T>>;
}

impl StateExt for State {
    fn str_field(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    fn typed_field<T: DeserializeOwned>(&self, field: &str) -> serde_json::Result<Option<T>> {
        match self.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn obj(value: Value) -> State {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_merge_is_field_level() {
        let mut state = obj(json!({"query": "X", "reporter_content": "draft"}));
        let mut written = merge(
            &mut state,
            obj(json!({"reporter_content": "draft v2", "critic_content": {"points": []}})),
        );
        written.sort();

        assert_eq!(written, vec!["critic_content", "reporter_content"]);
        assert_eq!(state["query"], json!("X"));
        assert_eq!(state["reporter_content"], json!("draft v2"));
        assert_eq!(state["critic_content"], json!({"points": []}));
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(from_value(json!({"query": "X"})).is_ok());
        let err = from_value(json!(["query"])).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_typed_field() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Selection {
            point: usize,
            case: usize,
        }

        let state = obj(json!({
            "human_selection": {"point": 1, "case": 0},
            "empty": null,
            "bad": "nope"
        }));
        assert_eq!(
            state.typed_field::<Selection>("human_selection").unwrap(),
            Some(Selection { point: 1, case: 0 })
        );
        assert_eq!(state.typed_field::<Selection>("empty").unwrap(), None);
        assert_eq!(state.typed_field::<Selection>("missing").unwrap(), None);
        assert!(state.typed_field::<Selection>("bad").is_err());
        assert_eq!(state.str_field("bad"), Some("nope"));
    }

    fn small_state() -> impl Strategy<Value = State> {
        prop::collection::btree_map("[a-d]", any::<i32>(), 0..4)
            .prop_map(|m| m.into_iter().map(|(k, v)| (k, json!(v))).collect())
    }

    proptest! {
        #[test]
        fn prop_disjoint_updates_commute(base in small_state(), a in small_state(), b in small_state()) {
            let b: State = b.into_iter().filter(|(k, _)| !a.contains_key(k)).collect();

            let mut ab = base.clone();
            merge(&mut ab, a.clone());
            merge(&mut ab, b.clone());

            let mut ba = base;
            merge(&mut ba, b);
            merge(&mut ba, a);

            prop_assert_eq!(ab, ba);
        }

        #[test]
        fn prop_last_write_wins(base in small_state(), a in small_state(), b in small_state()) {
            let mut state = base.clone();
            merge(&mut state, a.clone());
            merge(&mut state, b.clone());

            for (field, value) in &state {
                let expected = b.get(field).or_else(|| a.get(field)).or_else(|| base.get(field));
                prop_assert_eq!(Some(value), expected);
            }
        }
    }
}
