//! The closed operation vocabulary.
//!
//! An [`Operation`] is addressed to one node id and carries one
//! kind-specific body. On the wire the body is flattened next to the
//! envelope fields:
//!
//! ```json
//! {"id": "s1:4", "noOp": false, "type": "ArrayMove", "fromIndex": 0, "toIndex": 2}
//! ```
//!
//! `noOp = true` marks an operation whose effect was cancelled by a
//! transform. It is still sequenced and acknowledged but never applied.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data_value::{DataValue, DataValueType, NodeId};
use crate::error::{ModelError, ModelResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: NodeId,
    #[serde(default)]
    pub no_op: bool,
    #[serde(flatten)]
    pub kind: OperationKind,
}

impl Operation {
    pub fn new(id: impl Into<NodeId>, kind: impl Into<OperationKind>) -> Self {
        Self {
            id: id.into(),
            no_op: false,
            kind: kind.into(),
        }
    }

    /// The same operation with its effect cancelled.
    pub fn into_no_op(mut self) -> Self {
        self.no_op = true;
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Decodes a wire operation, reporting an unrecognised `type` as
    /// [`ModelError::UnknownOperation`] rather than a generic codec error.
    pub fn from_json(value: Value) -> ModelResult<Self> {
        check_operation_type(&value)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> ModelResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Fails with [`ModelError::UnknownOperation`] when the `type` tag of a wire
/// operation is not in [`OPERATION_TYPES`].
pub(crate) fn check_operation_type(value: &Value) -> ModelResult<()> {
    let type_name = value.get("type").and_then(Value::as_str).unwrap_or_default();
    if OPERATION_TYPES.contains(&type_name) {
        return Ok(());
    }
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Err(ModelError::UnknownOperation {
        id,
        node_type: DataValueType::Undefined,
        operation: type_name.to_string(),
    })
}

/// Every `type` tag the vocabulary defines.
pub const OPERATION_TYPES: &[&str] = &[
    "StringInsert",
    "StringRemove",
    "StringSet",
    "ArrayInsert",
    "ArrayRemove",
    "ArrayReplace",
    "ArrayMove",
    "ArraySet",
    "ObjectAdd",
    "ObjectSet",
    "ObjectRemove",
    "ObjectSetValue",
    "NumberAdd",
    "NumberSet",
    "BooleanSet",
    "DateSet",
];

/// Operation body grouped by the node kind it applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationKind {
    String(StringOperation),
    Array(ArrayOperation),
    Object(ObjectOperation),
    Number(NumberOperation),
    Boolean(BooleanOperation),
    Date(DateOperation),
}

impl OperationKind {
    /// The node type this operation can be applied to.
    pub fn target_type(&self) -> DataValueType {
        match self {
            OperationKind::String(_) => DataValueType::String,
            OperationKind::Array(_) => DataValueType::Array,
            OperationKind::Object(_) => DataValueType::Object,
            OperationKind::Number(_) => DataValueType::Number,
            OperationKind::Boolean(_) => DataValueType::Boolean,
            OperationKind::Date(_) => DataValueType::Date,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            OperationKind::String(op) => match op {
                StringOperation::Insert { .. } => "StringInsert",
                StringOperation::Remove { .. } => "StringRemove",
                StringOperation::SetValue { .. } => "StringSet",
            },
            OperationKind::Array(op) => match op {
                ArrayOperation::Insert { .. } => "ArrayInsert",
                ArrayOperation::Remove { .. } => "ArrayRemove",
                ArrayOperation::Replace { .. } => "ArrayReplace",
                ArrayOperation::Move { .. } => "ArrayMove",
                ArrayOperation::SetValue { .. } => "ArraySet",
            },
            OperationKind::Object(op) => match op {
                ObjectOperation::Add { .. } => "ObjectAdd",
                ObjectOperation::Set { .. } => "ObjectSet",
                ObjectOperation::Remove { .. } => "ObjectRemove",
                ObjectOperation::SetValue { .. } => "ObjectSetValue",
            },
            OperationKind::Number(op) => match op {
                NumberOperation::Add { .. } => "NumberAdd",
                NumberOperation::SetValue { .. } => "NumberSet",
            },
            OperationKind::Boolean(_) => "BooleanSet",
            OperationKind::Date(_) => "DateSet",
        }
    }
}

/// String edits. Indices and lengths count chars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StringOperation {
    #[serde(rename = "StringInsert")]
    Insert { index: usize, value: String },
    /// `value` is the removed text; its char count is the removed length.
    #[serde(rename = "StringRemove")]
    Remove { index: usize, value: String },
    #[serde(rename = "StringSet")]
    SetValue { value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ArrayOperation {
    #[serde(rename = "ArrayInsert")]
    Insert { index: usize, value: DataValue },
    #[serde(rename = "ArrayRemove")]
    Remove { index: usize },
    #[serde(rename = "ArrayReplace")]
    Replace { index: usize, value: DataValue },
    #[serde(rename = "ArrayMove")]
    Move {
        #[serde(rename = "fromIndex")]
        from_index: usize,
        #[serde(rename = "toIndex")]
        to_index: usize,
    },
    #[serde(rename = "ArraySet")]
    SetValue { value: Vec<DataValue> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ObjectOperation {
    /// Introduces a property that did not exist.
    #[serde(rename = "ObjectAdd")]
    Add { prop: String, value: DataValue },
    /// Replaces an existing property.
    #[serde(rename = "ObjectSet")]
    Set { prop: String, value: DataValue },
    #[serde(rename = "ObjectRemove")]
    Remove { prop: String },
    #[serde(rename = "ObjectSetValue")]
    SetValue { value: IndexMap<String, DataValue> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NumberOperation {
    /// Relative change.
    #[serde(rename = "NumberAdd")]
    Add { value: f64 },
    #[serde(rename = "NumberSet")]
    SetValue { value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BooleanOperation {
    #[serde(rename = "BooleanSet")]
    SetValue { value: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DateOperation {
    #[serde(rename = "DateSet")]
    SetValue {
        #[serde(with = "chrono::serde::ts_milliseconds")]
        value: DateTime<Utc>,
    },
}

macro_rules! impl_from_kind {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for OperationKind {
                fn from(op: $ty) -> Self {
                    OperationKind::$variant(op)
                }
            }
        )*
    };
}

impl_from_kind! {
    StringOperation => String,
    ArrayOperation => Array,
    ObjectOperation => Object,
    NumberOperation => Number,
    BooleanOperation => Boolean,
    DateOperation => Date,
}
