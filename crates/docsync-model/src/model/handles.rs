//! Typed handles for local mutation.
//!
//! A handle borrows the model mutably for as long as it lives and names its
//! node by id. Every mutating call builds an [`Operation`], applies it
//! through the same path remote operations take, records it in the model's
//! outbox and returns it.

use std::ops::{Deref, DerefMut};

use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::data_value::{DataValue, DataValueType, NodeId};
use crate::error::{ModelError, ModelResult, ValidationError};
use crate::operation::{
    ArrayOperation, BooleanOperation, DateOperation, NumberOperation, ObjectOperation, Operation,
    OperationKind, StringOperation,
};

use super::node::NodeData;
use super::{Model, NodeRef, PathElement};

pub struct NodeHandle<'a> {
    model: &'a mut Model,
    id: NodeId,
}

pub struct ObjectNode<'a> {
    inner: NodeHandle<'a>,
}

pub struct ArrayNode<'a> {
    inner: NodeHandle<'a>,
}

pub struct StringNode<'a> {
    inner: NodeHandle<'a>,
}

pub struct NumberNode<'a> {
    inner: NodeHandle<'a>,
}

pub struct BooleanNode<'a> {
    inner: NodeHandle<'a>,
}

pub struct DateNode<'a> {
    inner: NodeHandle<'a>,
}

impl<'a> NodeHandle<'a> {
    pub(crate) fn new(model: &'a mut Model, id: NodeId) -> Self {
        Self { model, id }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `Undefined` once detached.
    pub fn node_type(&self) -> DataValueType {
        self.model
            .node_type(&self.id)
            .unwrap_or(DataValueType::Undefined)
    }

    /// Current path from the root, or `None` once detached.
    pub fn path(&self) -> Option<Vec<PathElement>> {
        self.model.path_of(&self.id)
    }

    pub fn model(&self) -> &Model {
        self.model
    }

    pub fn is_detached(&self) -> bool {
        self.model.is_detached(&self.id)
    }

    pub fn data(&self) -> Value {
        self.model.json_of(&self.id)
    }

    pub fn data_value(&self) -> Option<DataValue> {
        self.model.data_value_of(&self.id)
    }

    /// Replaces the whole value with the kind's set-value operation.
    /// `value` must have the node's type; dates take epoch milliseconds.
    pub fn set_data(&mut self, value: Value) -> ModelResult<Operation> {
        let node_type = self.attached_type()?;
        let found = DataValueType::of_json(&value);
        let mismatch = || ValidationError::TypeMismatch {
            expected: node_type,
            found,
        };
        let kind: OperationKind = match (node_type, value) {
            (DataValueType::Object, Value::Object(map)) => ObjectOperation::SetValue {
                value: self.create_children(&map),
            }
            .into(),
            (DataValueType::Array, Value::Array(items)) => ArrayOperation::SetValue {
                value: items
                    .iter()
                    .map(|item| self.model.create_data_value(item))
                    .collect(),
            }
            .into(),
            (DataValueType::String, Value::String(value)) => {
                StringOperation::SetValue { value }.into()
            }
            (DataValueType::Number, Value::Number(n)) => NumberOperation::SetValue {
                value: n.as_f64().ok_or_else(mismatch)?,
            }
            .into(),
            (DataValueType::Boolean, Value::Bool(value)) => {
                BooleanOperation::SetValue { value }.into()
            }
            (DataValueType::Date, Value::Number(n)) => {
                let millis = n.as_i64().ok_or_else(mismatch)?;
                let value = Utc
                    .timestamp_millis_opt(millis)
                    .single()
                    .ok_or_else(mismatch)?;
                DateOperation::SetValue { value }.into()
            }
            (DataValueType::Null | DataValueType::Undefined, _) => {
                return Err(ModelError::UnknownOperation {
                    id: self.id.clone(),
                    node_type,
                    operation: "setValue".to_string(),
                })
            }
            _ => return Err(mismatch().into()),
        };
        self.submit_kind(kind)
    }

    /// Removes this node from its parent container.
    pub fn remove(self) -> ModelResult<Operation> {
        self.attached_type()?;
        let parent = self
            .model
            .nodes
            .get(&self.id)
            .and_then(|entry| entry.parent.clone())
            .ok_or(ValidationError::RootReplacement)?;
        let op = match self.model.position_in_parent(&self.id) {
            Some(PathElement::Index(index)) => {
                Operation::new(parent, ArrayOperation::Remove { index })
            }
            Some(PathElement::Key(prop)) => Operation::new(parent, ObjectOperation::Remove { prop }),
            None => return Err(ModelError::detached(&self.id)),
        };
        self.model.apply_local(op)
    }

    pub fn as_object(self) -> ModelResult<ObjectNode<'a>> {
        self.expect_type(DataValueType::Object)?;
        Ok(ObjectNode { inner: self })
    }

    pub fn as_array(self) -> ModelResult<ArrayNode<'a>> {
        self.expect_type(DataValueType::Array)?;
        Ok(ArrayNode { inner: self })
    }

    pub fn as_string(self) -> ModelResult<StringNode<'a>> {
        self.expect_type(DataValueType::String)?;
        Ok(StringNode { inner: self })
    }

    pub fn as_number(self) -> ModelResult<NumberNode<'a>> {
        self.expect_type(DataValueType::Number)?;
        Ok(NumberNode { inner: self })
    }

    pub fn as_boolean(self) -> ModelResult<BooleanNode<'a>> {
        self.expect_type(DataValueType::Boolean)?;
        Ok(BooleanNode { inner: self })
    }

    pub fn as_date(self) -> ModelResult<DateNode<'a>> {
        self.expect_type(DataValueType::Date)?;
        Ok(DateNode { inner: self })
    }

    fn expect_type(&self, expected: DataValueType) -> ModelResult<()> {
        let found = self.attached_type()?;
        if found != expected {
            return Err(ValidationError::TypeMismatch { expected, found }.into());
        }
        Ok(())
    }

    fn attached_type(&self) -> ModelResult<DataValueType> {
        self.model
            .node_type(&self.id)
            .ok_or_else(|| ModelError::detached(&self.id))
    }

    fn data_ref(&self) -> Option<&NodeData> {
        self.model.nodes.get(&self.id).map(|entry| &entry.data)
    }

    fn submit(&mut self, kind: impl Into<OperationKind>) -> ModelResult<Operation> {
        self.submit_kind(kind.into())
    }

    fn submit_kind(&mut self, kind: OperationKind) -> ModelResult<Operation> {
        self.attached_type()?;
        self.model.apply_local(Operation::new(self.id.clone(), kind))
    }

    fn create_children(&mut self, map: &Map<String, Value>) -> IndexMap<String, DataValue> {
        map.iter()
            .map(|(key, value)| (key.clone(), self.model.create_data_value(value)))
            .collect()
    }

    fn child(&mut self, id: NodeId) -> NodeHandle<'_> {
        NodeHandle::new(self.model, id)
    }
}

macro_rules! impl_deref_to_handle {
    ($($ty:ident),* $(,)?) => {
        $(
            impl<'a> Deref for $ty<'a> {
                type Target = NodeHandle<'a>;

                fn deref(&self) -> &Self::Target {
                    &self.inner
                }
            }

            impl<'a> DerefMut for $ty<'a> {
                fn deref_mut(&mut self) -> &mut Self::Target {
                    &mut self.inner
                }
            }

            impl<'a> $ty<'a> {
                pub fn into_handle(self) -> NodeHandle<'a> {
                    self.inner
                }
            }
        )*
    };
}

impl_deref_to_handle!(ObjectNode, ArrayNode, StringNode, NumberNode, BooleanNode, DateNode);

// ── ObjectNode ───────────────────────────────────────────────────────────

impl<'a> ObjectNode<'a> {
    pub(crate) fn new(inner: NodeHandle<'a>) -> Self {
        Self { inner }
    }

    fn children(&self) -> Option<&IndexMap<String, NodeId>> {
        match self.inner.data_ref()? {
            NodeData::Object { children, .. } => Some(children),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.children().map_or(0, IndexMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        self.children()
            .map(|children| children.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.children()
            .is_some_and(|children| children.contains_key(key))
    }

    /// JSON projection of the property, if present.
    pub fn get(&self, key: &str) -> Option<Value> {
        let id = self.children()?.get(key)?;
        Some(self.inner.model.json_of(id))
    }

    /// Read-only view of the property; undefined when absent.
    pub fn get_ref(&self, key: &str) -> NodeRef<'_> {
        let mut path = self.path().unwrap_or_default();
        path.push(PathElement::Key(key.to_string()));
        self.inner.model.value_at(&path)
    }

    /// Handle on the property's node.
    pub fn child(&mut self, key: &str) -> Option<NodeHandle<'_>> {
        let id = self.children()?.get(key)?.clone();
        Some(self.inner.child(id))
    }

    /// Writes `key`: `ObjectAdd` when absent, `ObjectSet` when present.
    pub fn set(&mut self, key: &str, value: Value) -> ModelResult<Operation> {
        let value = self.inner.model.create_data_value(&value);
        self.set_data_value(key, value)
    }

    /// Like [`ObjectNode::set`] for a prebuilt value, such as one from
    /// [`Model::create_date`].
    pub fn set_data_value(&mut self, key: &str, value: DataValue) -> ModelResult<Operation> {
        let prop = key.to_string();
        let op = if self.has_key(key) {
            ObjectOperation::Set { prop, value }
        } else {
            ObjectOperation::Add { prop, value }
        };
        self.inner.submit(op)
    }

    pub fn remove(&mut self, key: &str) -> ModelResult<Operation> {
        self.inner.submit(ObjectOperation::Remove {
            prop: key.to_string(),
        })
    }

    pub fn set_value(&mut self, value: Map<String, Value>) -> ModelResult<Operation> {
        let value = self.inner.create_children(&value);
        self.inner.submit(ObjectOperation::SetValue { value })
    }
}

// ── ArrayNode ────────────────────────────────────────────────────────────

impl<'a> ArrayNode<'a> {
    fn children(&self) -> &[NodeId] {
        match self.inner.data_ref() {
            Some(NodeData::Array { children, .. }) => children,
            _ => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.children().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children().is_empty()
    }

    /// JSON projection of the element, if present.
    pub fn get(&self, index: usize) -> Option<Value> {
        let id = self.children().get(index)?;
        Some(self.inner.model.json_of(id))
    }

    /// Current index of the child with `id`.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        match self.inner.data_ref()? {
            NodeData::Array { positions, .. } => positions.get(id).copied(),
            _ => None,
        }
    }

    pub fn for_each(&self, mut visit: impl FnMut(usize, NodeRef<'_>)) {
        let model: &Model = self.inner.model;
        for (index, id) in self.children().iter().enumerate() {
            visit(index, NodeRef::found(model, id.clone()));
        }
    }

    /// Handle on the element's node.
    pub fn child(&mut self, index: usize) -> Option<NodeHandle<'_>> {
        let id = self.children().get(index)?.clone();
        Some(self.inner.child(id))
    }

    pub fn insert(&mut self, index: usize, value: Value) -> ModelResult<Operation> {
        let value = self.inner.model.create_data_value(&value);
        self.insert_data_value(index, value)
    }

    pub fn insert_data_value(&mut self, index: usize, value: DataValue) -> ModelResult<Operation> {
        self.inner.submit(ArrayOperation::Insert { index, value })
    }

    pub fn push(&mut self, value: Value) -> ModelResult<Operation> {
        let index = self.len();
        self.insert(index, value)
    }

    pub fn unshift(&mut self, value: Value) -> ModelResult<Operation> {
        self.insert(0, value)
    }

    pub fn remove(&mut self, index: usize) -> ModelResult<Operation> {
        self.inner.submit(ArrayOperation::Remove { index })
    }

    /// Removes the last element. `None` when empty.
    pub fn pop(&mut self) -> ModelResult<Option<Operation>> {
        match self.len() {
            0 => Ok(None),
            len => self.remove(len - 1).map(Some),
        }
    }

    /// Removes the first element. `None` when empty.
    pub fn shift(&mut self) -> ModelResult<Option<Operation>> {
        if self.is_empty() {
            return Ok(None);
        }
        self.remove(0).map(Some)
    }

    /// Replaces the element at `index` with a new node.
    pub fn set(&mut self, index: usize, value: Value) -> ModelResult<Operation> {
        let value = self.inner.model.create_data_value(&value);
        self.inner.submit(ArrayOperation::Replace { index, value })
    }

    pub fn reorder(&mut self, from_index: usize, to_index: usize) -> ModelResult<Operation> {
        self.inner.submit(ArrayOperation::Move {
            from_index,
            to_index,
        })
    }

    pub fn set_value(&mut self, values: Vec<Value>) -> ModelResult<Operation> {
        let value = values
            .iter()
            .map(|value| self.inner.model.create_data_value(value))
            .collect();
        self.inner.submit(ArrayOperation::SetValue { value })
    }
}

// ── Scalars ──────────────────────────────────────────────────────────────

impl<'a> StringNode<'a> {
    pub fn value(&self) -> String {
        match self.inner.data_ref() {
            Some(NodeData::String(value)) => value.clone(),
            _ => String::new(),
        }
    }

    /// Length in chars.
    pub fn len(&self) -> usize {
        match self.inner.data_ref() {
            Some(NodeData::String(value)) => value.chars().count(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert(&mut self, index: usize, text: &str) -> ModelResult<Operation> {
        self.inner.submit(StringOperation::Insert {
            index,
            value: text.to_string(),
        })
    }

    /// Removes `length` chars starting at `index`.
    pub fn remove(&mut self, index: usize, length: usize) -> ModelResult<Operation> {
        let len = self.len();
        if index.checked_add(length).filter(|end| *end <= len).is_none() {
            return Err(ValidationError::RangeOutOfBounds { index, length, len }.into());
        }
        let value = self.value().chars().skip(index).take(length).collect();
        self.inner.submit(StringOperation::Remove { index, value })
    }

    pub fn set_value(&mut self, value: &str) -> ModelResult<Operation> {
        self.inner.submit(StringOperation::SetValue {
            value: value.to_string(),
        })
    }
}

impl<'a> NumberNode<'a> {
    pub fn value(&self) -> f64 {
        match self.inner.data_ref() {
            Some(NodeData::Number(value)) => *value,
            _ => f64::NAN,
        }
    }

    pub fn add(&mut self, delta: f64) -> ModelResult<Operation> {
        self.inner.submit(NumberOperation::Add { value: delta })
    }

    pub fn subtract(&mut self, delta: f64) -> ModelResult<Operation> {
        self.add(-delta)
    }

    pub fn increment(&mut self) -> ModelResult<Operation> {
        self.add(1.0)
    }

    pub fn decrement(&mut self) -> ModelResult<Operation> {
        self.add(-1.0)
    }

    pub fn set_value(&mut self, value: f64) -> ModelResult<Operation> {
        self.inner.submit(NumberOperation::SetValue { value })
    }
}

impl<'a> BooleanNode<'a> {
    pub fn value(&self) -> bool {
        matches!(self.inner.data_ref(), Some(NodeData::Boolean(true)))
    }

    pub fn set_value(&mut self, value: bool) -> ModelResult<Operation> {
        self.inner.submit(BooleanOperation::SetValue { value })
    }
}

impl<'a> DateNode<'a> {
    pub fn value(&self) -> Option<DateTime<Utc>> {
        match self.inner.data_ref() {
            Some(NodeData::Date(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn set_value(&mut self, value: DateTime<Utc>) -> ModelResult<Operation> {
        self.inner.submit(DateOperation::SetValue { value })
    }
}
