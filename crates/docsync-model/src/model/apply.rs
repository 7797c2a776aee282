//! Operation application, shared by the local and the remote path.
//!
//! Each arm validates first and mutates second, so a rejected operation
//! leaves no trace in the tree or the event queue.

use std::collections::HashMap;
use std::mem;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::data_value::{DataValue, DataValueType, NodeId};
use crate::error::{ModelError, ModelResult, ValidationError};
use crate::event::ModelEventKind;
use crate::operation::{
    ArrayOperation, BooleanOperation, DateOperation, NumberOperation, ObjectOperation, Operation,
    OperationKind, StringOperation,
};

use super::node::{reindex, NodeData};
use super::{Model, Origin};

impl Model {
    /// Validates and applies `operation`, then queues its events.
    pub(crate) fn apply_operation(&mut self, operation: &Operation, origin: &Origin) -> ModelResult<()> {
        let id = operation.id.as_str();
        let node_type = self.node_type(id).ok_or_else(|| ModelError::detached(id))?;
        if operation.kind.target_type() != node_type {
            return Err(ModelError::UnknownOperation {
                id: id.to_string(),
                node_type,
                operation: operation.type_name().to_string(),
            });
        }
        let kind = match &operation.kind {
            OperationKind::String(op) => self.apply_string(id, op)?,
            OperationKind::Number(op) => self.apply_number(id, op)?,
            OperationKind::Boolean(op) => self.apply_boolean(id, op)?,
            OperationKind::Date(op) => self.apply_date(id, op)?,
            OperationKind::Array(op) => self.apply_array(id, op, origin)?,
            OperationKind::Object(op) => self.apply_object(id, op, origin)?,
        };
        self.emit(id, kind, origin);
        Ok(())
    }

    fn data_mut(&mut self, id: &str) -> ModelResult<&mut NodeData> {
        self.nodes
            .get_mut(id)
            .map(|entry| &mut entry.data)
            .ok_or_else(|| ModelError::detached(id))
    }

    // ── Scalars ───────────────────────────────────────────────────────────

    fn apply_string(&mut self, id: &str, op: &StringOperation) -> ModelResult<ModelEventKind> {
        let NodeData::String(text) = self.data_mut(id)? else {
            return Err(mismatch(id, "string"));
        };
        let len = text.chars().count();
        match op {
            StringOperation::Insert { index, value } => {
                if *index > len {
                    return Err(ValidationError::IndexOutOfBounds { index: *index, len }.into());
                }
                let offset = byte_offset(text, *index);
                text.insert_str(offset, value);
                Ok(ModelEventKind::StringInsert {
                    index: *index,
                    value: value.clone(),
                })
            }
            StringOperation::Remove { index, value } => {
                let length = value.chars().count();
                let Some(end) = index.checked_add(length).filter(|end| *end <= len) else {
                    return Err(ValidationError::RangeOutOfBounds {
                        index: *index,
                        length,
                        len,
                    }
                    .into());
                };
                let start = byte_offset(text, *index);
                let end = byte_offset(text, end);
                let removed: String = text.drain(start..end).collect();
                Ok(ModelEventKind::StringRemove {
                    index: *index,
                    value: removed,
                })
            }
            StringOperation::SetValue { value } => {
                let old_value = mem::replace(text, value.clone());
                Ok(ModelEventKind::StringSetValue {
                    value: value.clone(),
                    old_value,
                })
            }
        }
    }

    fn apply_number(&mut self, id: &str, op: &NumberOperation) -> ModelResult<ModelEventKind> {
        let NodeData::Number(number) = self.data_mut(id)? else {
            return Err(mismatch(id, "number"));
        };
        match op {
            NumberOperation::Add { value } => {
                let next = *number + value;
                if value.is_nan() || next.is_nan() {
                    return Err(ValidationError::NotANumber.into());
                }
                *number = next;
                Ok(ModelEventKind::NumberAdd { value: *value })
            }
            NumberOperation::SetValue { value } => {
                if value.is_nan() {
                    return Err(ValidationError::NotANumber.into());
                }
                let old_value = mem::replace(number, *value);
                Ok(ModelEventKind::NumberSetValue {
                    value: *value,
                    old_value,
                })
            }
        }
    }

    fn apply_boolean(&mut self, id: &str, op: &BooleanOperation) -> ModelResult<ModelEventKind> {
        let NodeData::Boolean(flag) = self.data_mut(id)? else {
            return Err(mismatch(id, "boolean"));
        };
        let BooleanOperation::SetValue { value } = op;
        let old_value = mem::replace(flag, *value);
        Ok(ModelEventKind::BooleanSetValue {
            value: *value,
            old_value,
        })
    }

    fn apply_date(&mut self, id: &str, op: &DateOperation) -> ModelResult<ModelEventKind> {
        let NodeData::Date(date) = self.data_mut(id)? else {
            return Err(mismatch(id, "date"));
        };
        let DateOperation::SetValue { value } = op;
        let old_value: DateTime<Utc> = mem::replace(date, *value);
        Ok(ModelEventKind::DateSetValue {
            value: *value,
            old_value,
        })
    }

    // ── Arrays ────────────────────────────────────────────────────────────

    fn array_children(&self, id: &str) -> ModelResult<&[NodeId]> {
        match self.nodes.get(id).map(|entry| &entry.data) {
            Some(NodeData::Array { children, .. }) => Ok(children),
            Some(_) => Err(mismatch(id, "array")),
            None => Err(ModelError::detached(id)),
        }
    }

    fn array_parts(
        &mut self,
        id: &str,
    ) -> ModelResult<(&mut Vec<NodeId>, &mut HashMap<NodeId, usize>)> {
        match self.data_mut(id)? {
            NodeData::Array {
                children,
                positions,
            } => Ok((children, positions)),
            _ => Err(mismatch(id, "array")),
        }
    }

    fn apply_array(
        &mut self,
        id: &str,
        op: &ArrayOperation,
        origin: &Origin,
    ) -> ModelResult<ModelEventKind> {
        let len = self.array_children(id)?.len();
        match op {
            ArrayOperation::Insert { index, value } => {
                check_index(*index, len + 1, len)?;
                self.check_new_ids([value])?;
                let child = self.register_value(value, Some(id), origin);
                let (children, positions) = self.array_parts(id)?;
                children.insert(*index, child);
                reindex(children, positions, *index);
                Ok(ModelEventKind::ArrayInsert {
                    index: *index,
                    value: value.clone(),
                })
            }
            ArrayOperation::Remove { index } => {
                check_index(*index, len, len)?;
                let child = self.array_children(id)?[*index].clone();
                let old_value = self.snapshot(&child)?;
                let (children, positions) = self.array_parts(id)?;
                children.remove(*index);
                positions.remove(&child);
                reindex(children, positions, *index);
                self.detach(&child, origin);
                Ok(ModelEventKind::ArrayRemove {
                    index: *index,
                    old_value,
                })
            }
            ArrayOperation::Replace { index, value } => {
                check_index(*index, len, len)?;
                self.check_new_ids([value])?;
                let old = self.array_children(id)?[*index].clone();
                let old_value = self.snapshot(&old)?;
                self.detach(&old, origin);
                let child = self.register_value(value, Some(id), origin);
                let (children, positions) = self.array_parts(id)?;
                positions.remove(&old);
                children[*index] = child.clone();
                positions.insert(child, *index);
                Ok(ModelEventKind::ArraySet {
                    index: *index,
                    value: value.clone(),
                    old_value,
                })
            }
            ArrayOperation::Move {
                from_index,
                to_index,
            } => {
                check_index(*from_index, len, len)?;
                check_index(*to_index, len, len)?;
                let (children, positions) = self.array_parts(id)?;
                let child = children.remove(*from_index);
                children.insert(*to_index, child);
                reindex(children, positions, (*from_index).min(*to_index));
                Ok(ModelEventKind::ArrayReorder {
                    from_index: *from_index,
                    to_index: *to_index,
                })
            }
            ArrayOperation::SetValue { value } => {
                self.check_new_ids(value)?;
                let old_ids = self.array_children(id)?.to_vec();
                let old_value = self.data_values_of(&old_ids);
                for old in &old_ids {
                    self.detach(old, origin);
                }
                let ids: Vec<NodeId> = value
                    .iter()
                    .map(|child| self.register_value(child, Some(id), origin))
                    .collect();
                let (children, positions) = self.array_parts(id)?;
                positions.clear();
                *children = ids;
                reindex(children, positions, 0);
                Ok(ModelEventKind::ArraySetValue {
                    value: value.clone(),
                    old_value,
                })
            }
        }
    }

    // ── Objects ───────────────────────────────────────────────────────────

    fn object_child(&self, id: &str, key: &str) -> ModelResult<Option<NodeId>> {
        match self.nodes.get(id).map(|entry| &entry.data) {
            Some(NodeData::Object { children, .. }) => Ok(children.get(key).cloned()),
            Some(_) => Err(mismatch(id, "object")),
            None => Err(ModelError::detached(id)),
        }
    }

    fn object_parts(
        &mut self,
        id: &str,
    ) -> ModelResult<(
        &mut IndexMap<String, NodeId>,
        &mut HashMap<NodeId, String>,
    )> {
        match self.data_mut(id)? {
            NodeData::Object { children, keys } => Ok((children, keys)),
            _ => Err(mismatch(id, "object")),
        }
    }

    fn apply_object(
        &mut self,
        id: &str,
        op: &ObjectOperation,
        origin: &Origin,
    ) -> ModelResult<ModelEventKind> {
        match op {
            ObjectOperation::Add { prop, value } | ObjectOperation::Set { prop, value } => {
                check_key(prop)?;
                self.check_new_ids([value])?;
                let previous = self.object_child(id, prop)?;
                let old_value = match &previous {
                    Some(old) => {
                        let snapshot = self.snapshot(old)?;
                        self.detach(old, origin);
                        Some(snapshot)
                    }
                    None => None,
                };
                let child = self.register_value(value, Some(id), origin);
                let (children, keys) = self.object_parts(id)?;
                if let Some(old) = &previous {
                    keys.remove(old);
                }
                // Replacing keeps the key's position.
                children.insert(prop.clone(), child.clone());
                keys.insert(child, prop.clone());
                let (key, value) = (prop.clone(), value.clone());
                Ok(match op {
                    ObjectOperation::Add { .. } => ModelEventKind::ObjectAdd {
                        key,
                        value,
                        old_value,
                    },
                    _ => ModelEventKind::ObjectSet {
                        key,
                        value,
                        old_value,
                    },
                })
            }
            ObjectOperation::Remove { prop } => {
                check_key(prop)?;
                let old = self
                    .object_child(id, prop)?
                    .ok_or_else(|| ValidationError::UnknownKey(prop.clone()))?;
                let old_value = self.snapshot(&old)?;
                let (children, keys) = self.object_parts(id)?;
                children.shift_remove(prop);
                keys.remove(&old);
                self.detach(&old, origin);
                Ok(ModelEventKind::ObjectRemove {
                    key: prop.clone(),
                    old_value,
                })
            }
            ObjectOperation::SetValue { value } => {
                for key in value.keys() {
                    check_key(key)?;
                }
                self.check_new_ids(value.values())?;
                let (old_children, _) = self.object_parts(id)?;
                let old_children = old_children.clone();
                let old_value: IndexMap<String, DataValue> = old_children
                    .iter()
                    .filter_map(|(key, child)| Some((key.clone(), self.data_value_of(child)?)))
                    .collect();
                for old in old_children.values() {
                    self.detach(old, origin);
                }
                let mut next_children = IndexMap::with_capacity(value.len());
                let mut next_keys = HashMap::with_capacity(value.len());
                for (key, child) in value {
                    let child_id = self.register_value(child, Some(id), origin);
                    next_keys.insert(child_id.clone(), key.clone());
                    next_children.insert(key.clone(), child_id);
                }
                let (children, keys) = self.object_parts(id)?;
                *children = next_children;
                *keys = next_keys;
                Ok(ModelEventKind::ObjectSetValue {
                    value: value.clone(),
                    old_value,
                })
            }
        }
    }

    fn snapshot(&self, id: &str) -> ModelResult<DataValue> {
        self.data_value_of(id).ok_or_else(|| ModelError::detached(id))
    }
}

/// Byte offset of the `index`-th char, or the end of the string.
fn byte_offset(text: &str, index: usize) -> usize {
    text.char_indices()
        .nth(index)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len())
}

fn check_index(index: usize, bound: usize, len: usize) -> Result<(), ValidationError> {
    if index < bound {
        Ok(())
    } else {
        Err(ValidationError::IndexOutOfBounds { index, len })
    }
}

fn check_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty() {
        Err(ValidationError::EmptyKey)
    } else {
        Ok(())
    }
}

/// The arena disagrees with the type checked on entry. Reported like a
/// misaddressed operation.
fn mismatch(id: &str, expected: &str) -> ModelError {
    ModelError::UnknownOperation {
        id: id.to_string(),
        node_type: DataValueType::Undefined,
        operation: format!("{expected} operation"),
    }
}
