//! Wire representation of document values.
//!
//! A [`DataValue`] is the tagged union `{id, type, value | children}` that
//! travels inside operations and snapshots:
//!
//! ```json
//! {"id": "s1:3", "type": "array", "children": [{"id": "s1:4", "type": "string", "value": "a"}]}
//! ```
//!
//! It is pure data. The live, mutable form of a value is a node inside a
//! [`Model`](crate::Model).

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Globally unique id of one value within a document.
pub type NodeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataValueType {
    Object,
    Array,
    String,
    Number,
    Boolean,
    Date,
    Null,
    Undefined,
}

impl DataValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataValueType::Object => "object",
            DataValueType::Array => "array",
            DataValueType::String => "string",
            DataValueType::Number => "number",
            DataValueType::Boolean => "boolean",
            DataValueType::Date => "date",
            DataValueType::Null => "null",
            DataValueType::Undefined => "undefined",
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, DataValueType::Object | DataValueType::Array)
    }

    /// The type a plain JSON value maps to.
    pub fn of_json(value: &Value) -> Self {
        match value {
            Value::Null => DataValueType::Null,
            Value::Bool(_) => DataValueType::Boolean,
            Value::Number(_) => DataValueType::Number,
            Value::String(_) => DataValueType::String,
            Value::Array(_) => DataValueType::Array,
            Value::Object(_) => DataValueType::Object,
        }
    }
}

impl fmt::Display for DataValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One document value with its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    pub id: NodeId,
    #[serde(flatten)]
    pub content: DataContent,
}

/// The type-tagged payload of a [`DataValue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataContent {
    Object {
        children: IndexMap<String, DataValue>,
    },
    Array {
        children: Vec<DataValue>,
    },
    String {
        value: String,
    },
    Number {
        value: f64,
    },
    Boolean {
        value: bool,
    },
    Date {
        #[serde(with = "chrono::serde::ts_milliseconds")]
        value: DateTime<Utc>,
    },
    Null,
    Undefined,
}

impl DataValue {
    pub fn new(id: impl Into<NodeId>, content: DataContent) -> Self {
        Self {
            id: id.into(),
            content,
        }
    }

    pub fn object(id: impl Into<NodeId>, children: IndexMap<String, DataValue>) -> Self {
        Self::new(id, DataContent::Object { children })
    }

    pub fn array(id: impl Into<NodeId>, children: Vec<DataValue>) -> Self {
        Self::new(id, DataContent::Array { children })
    }

    pub fn string(id: impl Into<NodeId>, value: impl Into<String>) -> Self {
        Self::new(id, DataContent::String { value: value.into() })
    }

    pub fn number(id: impl Into<NodeId>, value: f64) -> Self {
        Self::new(id, DataContent::Number { value })
    }

    pub fn boolean(id: impl Into<NodeId>, value: bool) -> Self {
        Self::new(id, DataContent::Boolean { value })
    }

    pub fn date(id: impl Into<NodeId>, value: DateTime<Utc>) -> Self {
        Self::new(id, DataContent::Date { value })
    }

    pub fn null(id: impl Into<NodeId>) -> Self {
        Self::new(id, DataContent::Null)
    }

    pub fn undefined(id: impl Into<NodeId>) -> Self {
        Self::new(id, DataContent::Undefined)
    }

    pub fn value_type(&self) -> DataValueType {
        self.content.value_type()
    }

    /// Plain JSON projection. Dates become epoch milliseconds and
    /// `undefined` becomes `null`.
    pub fn to_json(&self) -> Value {
        match &self.content {
            DataContent::Object { children } => {
                let mut map = Map::new();
                for (key, child) in children {
                    map.insert(key.clone(), child.to_json());
                }
                Value::Object(map)
            }
            DataContent::Array { children } => {
                Value::Array(children.iter().map(DataValue::to_json).collect())
            }
            DataContent::String { value } => Value::String(value.clone()),
            DataContent::Number { value } => number_to_json(*value),
            DataContent::Boolean { value } => Value::Bool(*value),
            DataContent::Date { value } => Value::from(value.timestamp_millis()),
            DataContent::Null | DataContent::Undefined => Value::Null,
        }
    }

    /// Visits this value and every descendant, parents before children.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a DataValue)) {
        visit(self);
        match &self.content {
            DataContent::Object { children } => {
                for child in children.values() {
                    child.walk(visit);
                }
            }
            DataContent::Array { children } => {
                for child in children {
                    child.walk(visit);
                }
            }
            _ => {}
        }
    }
}

impl DataContent {
    pub fn value_type(&self) -> DataValueType {
        match self {
            DataContent::Object { .. } => DataValueType::Object,
            DataContent::Array { .. } => DataValueType::Array,
            DataContent::String { .. } => DataValueType::String,
            DataContent::Number { .. } => DataValueType::Number,
            DataContent::Boolean { .. } => DataValueType::Boolean,
            DataContent::Date { .. } => DataValueType::Date,
            DataContent::Null => DataValueType::Null,
            DataContent::Undefined => DataValueType::Undefined,
        }
    }
}

/// Integral floats are rendered as JSON integers so `10.0` reads back as `10`.
pub(crate) fn number_to_json(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.007_199_254_740_992e15 {
        Value::from(value as i64)
    } else {
        Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
    }
}

// ── DataValueFactory ──────────────────────────────────────────────────────

/// Allocates value ids and converts application values into [`DataValue`]s.
///
/// Ids have the form `"{prefix}:{counter}"` with the counter in base 36, so
/// two sessions with distinct prefixes never collide.
#[derive(Debug, Clone)]
pub struct DataValueFactory {
    prefix: String,
    counter: u64,
}

impl DataValueFactory {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: 0,
        }
    }

    pub fn next_id(&mut self) -> NodeId {
        let id = format!("{}:{}", self.prefix, to_base36(self.counter));
        self.counter += 1;
        id
    }

    /// Converts a JSON value, allocating a fresh id for every node.
    pub fn create_data_value(&mut self, value: &Value) -> DataValue {
        let id = self.next_id();
        let content = match value {
            Value::Null => DataContent::Null,
            Value::Bool(b) => DataContent::Boolean { value: *b },
            Value::Number(n) => DataContent::Number {
                value: n.as_f64().unwrap_or_default(),
            },
            Value::String(s) => DataContent::String { value: s.clone() },
            Value::Array(items) => DataContent::Array {
                children: items.iter().map(|v| self.create_data_value(v)).collect(),
            },
            Value::Object(map) => DataContent::Object {
                children: map
                    .iter()
                    .map(|(k, v)| (k.clone(), self.create_data_value(v)))
                    .collect(),
            },
        };
        DataValue { id, content }
    }

    pub fn create_date(&mut self, value: DateTime<Utc>) -> DataValue {
        DataValue::date(self.next_id(), value)
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
