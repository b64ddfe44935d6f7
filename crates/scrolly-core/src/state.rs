//! Shared narrative state threaded through event and step handlers

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Map, Value};

/// A JSON object shared by reference. Cloning yields another handle to the
/// same object.
#[derive(Debug, Clone)]
pub struct NarrativeState(Rc<RefCell<Value>>);

impl NarrativeState {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(Value::Object(Map::new()))))
    }

    pub fn from_value(value: Value) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    /// Snapshot of the whole state
    pub fn get(&self) -> Value {
        self.0.borrow().clone()
    }

    pub fn field(&self, key: &str) -> Option<Value> {
        self.0.borrow().get(key).cloned()
    }

    /// Shallow merge: object fields of `patch` overwrite fields of the
    /// current object. A non-object on either side replaces the state.
    pub fn set_state(&self, patch: Value) {
        let mut state = self.0.borrow_mut();
        match patch {
            Value::Object(fields) if state.is_object() => {
                if let Some(current) = state.as_object_mut() {
                    current.extend(fields);
                }
            }
            other => *state = other,
        }
    }

    /// Run `f` against the live value
    pub fn with<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.0.borrow())
    }

    /// Whether two handles point at the same object
    pub fn same_as(&self, other: &NarrativeState) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for NarrativeState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_state_merges_shallowly() {
        let state = NarrativeState::new();
        state.set_state(json!({"step": 1, "nested": {"a": 1}}));
        state.set_state(json!({"nested": {"b": 2}, "seen": true}));
        assert_eq!(state.get(), json!({"step": 1, "nested": {"b": 2}, "seen": true}));
    }

    #[test]
    fn test_clones_share_the_object() {
        let state = NarrativeState::new();
        let other = state.clone();
        other.set_state(json!({"color": "red"}));
        assert_eq!(state.field("color"), Some(json!("red")));
        assert!(state.same_as(&other));
    }

    #[test]
    fn test_non_object_patch_replaces() {
        let state = NarrativeState::new();
        state.set_state(json!(5));
        assert_eq!(state.get(), json!(5));
        state.set_state(json!({"a": 1}));
        assert_eq!(state.get(), json!({"a": 1}));
    }
}
