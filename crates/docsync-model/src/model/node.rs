//! Arena storage of nodes and the node factory.
//!
//! The arena is a flat map from id to [`NodeEntry`]. Parents are referenced
//! by id, and containers keep an id → position map next to their child list
//! so a child's path never needs a scan of its siblings.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value;

use crate::data_value::{number_to_json, DataContent, DataValue, DataValueType, NodeId};
use crate::error::{ModelResult, ValidationError};

use super::{Model, Origin};

#[derive(Debug, Clone)]
pub(crate) struct NodeEntry {
    pub parent: Option<NodeId>,
    /// Session and user that created the node.
    pub session_id: String,
    pub username: String,
    pub data: NodeData,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeData {
    Object {
        children: IndexMap<String, NodeId>,
        keys: HashMap<NodeId, String>,
    },
    Array {
        children: Vec<NodeId>,
        positions: HashMap<NodeId, usize>,
    },
    String(String),
    Number(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Null,
    Undefined,
}

impl NodeData {
    pub fn node_type(&self) -> DataValueType {
        match self {
            NodeData::Object { .. } => DataValueType::Object,
            NodeData::Array { .. } => DataValueType::Array,
            NodeData::String(_) => DataValueType::String,
            NodeData::Number(_) => DataValueType::Number,
            NodeData::Boolean(_) => DataValueType::Boolean,
            NodeData::Date(_) => DataValueType::Date,
            NodeData::Null => DataValueType::Null,
            NodeData::Undefined => DataValueType::Undefined,
        }
    }

    pub fn child_ids(&self) -> Vec<NodeId> {
        match self {
            NodeData::Object { children, .. } => children.values().cloned().collect(),
            NodeData::Array { children, .. } => children.clone(),
            _ => Vec::new(),
        }
    }
}

/// Rewrites the id → index map for `children[from..]`.
pub(crate) fn reindex(children: &[NodeId], positions: &mut HashMap<NodeId, usize>, from: usize) {
    for (index, id) in children.iter().enumerate().skip(from) {
        positions.insert(id.clone(), index);
    }
}

impl Model {
    // ── Factory ───────────────────────────────────────────────────────────

    /// Rejects a value whose ids collide with the registry or with each other.
    /// Runs before any mutation so a failed insert leaves the tree untouched.
    pub(crate) fn check_new_ids<'a>(
        &self,
        values: impl IntoIterator<Item = &'a DataValue>,
    ) -> ModelResult<()> {
        let mut seen = HashSet::new();
        let mut duplicate = None;
        for value in values {
            value.walk(&mut |v| {
                if duplicate.is_none() && (self.nodes.contains_key(&v.id) || !seen.insert(&v.id)) {
                    duplicate = Some(v.id.clone());
                }
            });
        }
        match duplicate {
            Some(id) => Err(ValidationError::DuplicateId(id).into()),
            None => Ok(()),
        }
    }

    /// Builds the node subtree for `value` under `parent`. Ids must have
    /// been checked with [`Model::check_new_ids`].
    pub(crate) fn register_value(
        &mut self,
        value: &DataValue,
        parent: Option<&str>,
        origin: &Origin,
    ) -> NodeId {
        let data = match &value.content {
            DataContent::Object { children } => {
                let mut ids = IndexMap::with_capacity(children.len());
                let mut keys = HashMap::with_capacity(children.len());
                for (key, child) in children {
                    let child_id = self.register_value(child, Some(&value.id), origin);
                    keys.insert(child_id.clone(), key.clone());
                    ids.insert(key.clone(), child_id);
                }
                NodeData::Object {
                    children: ids,
                    keys,
                }
            }
            DataContent::Array { children } => {
                let ids: Vec<NodeId> = children
                    .iter()
                    .map(|child| self.register_value(child, Some(&value.id), origin))
                    .collect();
                let mut positions = HashMap::with_capacity(ids.len());
                reindex(&ids, &mut positions, 0);
                NodeData::Array {
                    children: ids,
                    positions,
                }
            }
            DataContent::String { value } => NodeData::String(value.clone()),
            DataContent::Number { value } => NodeData::Number(*value),
            DataContent::Boolean { value } => NodeData::Boolean(*value),
            DataContent::Date { value } => NodeData::Date(*value),
            DataContent::Null => NodeData::Null,
            DataContent::Undefined => NodeData::Undefined,
        };
        self.nodes.insert(
            value.id.clone(),
            NodeEntry {
                parent: parent.map(str::to_string),
                session_id: origin.session_id.clone(),
                username: origin.username.clone(),
                data,
            },
        );
        value.id.clone()
    }

    // ── Serialization ─────────────────────────────────────────────────────

    /// Serializes the subtree at `id` back into its wire form.
    pub(crate) fn data_value_of(&self, id: &str) -> Option<DataValue> {
        let entry = self.nodes.get(id)?;
        let content = match &entry.data {
            NodeData::Object { children, .. } => DataContent::Object {
                children: children
                    .iter()
                    .filter_map(|(key, child)| Some((key.clone(), self.data_value_of(child)?)))
                    .collect(),
            },
            NodeData::Array { children, .. } => DataContent::Array {
                children: children
                    .iter()
                    .filter_map(|child| self.data_value_of(child))
                    .collect(),
            },
            NodeData::String(value) => DataContent::String {
                value: value.clone(),
            },
            NodeData::Number(value) => DataContent::Number { value: *value },
            NodeData::Boolean(value) => DataContent::Boolean { value: *value },
            NodeData::Date(value) => DataContent::Date { value: *value },
            NodeData::Null => DataContent::Null,
            NodeData::Undefined => DataContent::Undefined,
        };
        Some(DataValue::new(id, content))
    }

    /// Plain JSON projection of the subtree at `id`.
    pub(crate) fn json_of(&self, id: &str) -> Value {
        let Some(entry) = self.nodes.get(id) else {
            return Value::Null;
        };
        match &entry.data {
            NodeData::Object { children, .. } => Value::Object(
                children
                    .iter()
                    .map(|(key, child)| (key.clone(), self.json_of(child)))
                    .collect(),
            ),
            NodeData::Array { children, .. } => {
                Value::Array(children.iter().map(|child| self.json_of(child)).collect())
            }
            NodeData::String(value) => Value::String(value.clone()),
            NodeData::Number(value) => number_to_json(*value),
            NodeData::Boolean(value) => Value::Bool(*value),
            NodeData::Date(value) => Value::from(value.timestamp_millis()),
            NodeData::Null | NodeData::Undefined => Value::Null,
        }
    }

    pub(crate) fn data_values_of(&self, ids: &[NodeId]) -> Vec<DataValue> {
        ids.iter().filter_map(|id| self.data_value_of(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reindex_only_touches_suffix() {
        let children: Vec<NodeId> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let mut positions = HashMap::new();
        positions.insert("a".to_string(), 7);
        reindex(&children, &mut positions, 1);
        assert_eq!(positions["a"], 7);
        assert_eq!(positions["b"], 1);
        assert_eq!(positions["c"], 2);
    }
}
