//! Snapshot: immutable view of a read result or event payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw snapshot as delivered by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotPayload {
    pub key: Option<String>,
    pub value: Value,
    pub exists: Option<bool>,
    pub priority: Option<Value>,
    pub has_children: bool,
    pub children_count: usize,
    pub child_keys: Vec<String>,
}

/// Read-only result handed to callbacks and returned by one-shot reads.
///
/// Child iteration re-derives from the stored key order on every call, so
/// repeated iterations yield the same sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    key: Option<String>,
    value: Value,
    exists: bool,
    priority: Option<Value>,
    has_children: bool,
    children_count: usize,
    child_keys: Vec<String>,
}

impl Snapshot {
    pub fn new(payload: SnapshotPayload) -> Self {
        let exists = payload.exists.unwrap_or(!payload.value.is_null());
        Self {
            key: payload.key,
            value: payload.value,
            exists,
            priority: payload.priority,
            has_children: payload.has_children,
            children_count: payload.children_count,
            child_keys: payload.child_keys,
        }
    }

    /// Last path segment of the location read, `None` for the root.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn val(&self) -> &Value {
        &self.value
    }

    pub fn into_val(self) -> Value {
        self.value
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn priority(&self) -> Option<&Value> {
        self.priority.as_ref()
    }

    pub fn has_children(&self) -> bool {
        self.has_children
    }

    pub fn children_count(&self) -> usize {
        self.children_count
    }

    /// Child keys in the order supplied by the backend.
    pub fn child_keys(&self) -> &[String] {
        &self.child_keys
    }

    /// Value of the named child, if the value is an object holding it.
    pub fn child(&self, key: &str) -> Option<&Value> {
        self.value.as_object().and_then(|obj| obj.get(key))
    }

    pub fn has_child(&self, key: &str) -> bool {
        self.child(key).is_some()
    }

    /// Call `f` with `(key, value)` for each child in `child_keys` order.
    ///
    /// Keys listed by the backend but missing from the value yield `null`.
    pub fn for_each(&self, mut f: impl FnMut(&str, &Value)) {
        for key in &self.child_keys {
            f(key, self.child(key).unwrap_or(&Value::Null));
        }
    }

    pub fn map<T>(&self, mut f: impl FnMut(&str, &Value) -> T) -> Vec<T> {
        let mut out = Vec::with_capacity(self.child_keys.len());
        self.for_each(|key, value| out.push(f(key, value)));
        out
    }

    pub fn reverse_map<T>(&self, f: impl FnMut(&str, &Value) -> T) -> Vec<T> {
        let mut out = self.map(f);
        out.reverse();
        out
    }
}

impl From<SnapshotPayload> for Snapshot {
    fn from(payload: SnapshotPayload) -> Self {
        Self::new(payload)
    }
}
