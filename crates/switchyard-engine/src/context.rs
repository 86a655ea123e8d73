use std::collections::HashMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Results of the nodes executed so far, keyed by node id.
///
/// Owned by a single run. Iteration follows execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    entries: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node_id: &str) -> Option<&Value> {
        self.index.get(node_id).map(|&i| &self.entries[i].1)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.index.contains_key(node_id)
    }

    /// Store a node's result. A re-run overwrites in place.
    pub fn set(&mut self, node_id: impl Into<String>, result: Value) {
        let node_id = node_id.into();
        match self.index.get(&node_id) {
            Some(&i) => self.entries[i].1 = result,
            None => {
                self.index.insert(node_id.clone(), self.entries.len());
                self.entries.push((node_id, result));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Node ids in execution order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Snapshot as a JSON object. Use `Serialize` when order matters.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl Serialize for ExecutionContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
