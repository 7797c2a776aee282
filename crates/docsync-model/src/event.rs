//! Change notifications.
//!
//! Every applied operation, local or remote, queues one value event at the
//! target node followed by a [`ModelEventKind::NodeChanged`] event at the
//! node itself and at each ancestor up to the root. Nodes leaving the tree
//! queue one [`ModelEventKind::Detached`] event each. Nothing is delivered
//! implicitly: the host drains the queue or dispatches it to listeners.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::data_value::{DataValue, NodeId};
use crate::model::PathElement;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEvent {
    /// Id of the node the event is raised on.
    pub src: NodeId,
    pub local: bool,
    pub session_id: String,
    pub username: String,
    /// Sequencer version of the remote operation that caused the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub kind: ModelEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "name", rename_all_fields = "camelCase")]
pub enum ModelEventKind {
    ArrayInsert {
        index: usize,
        value: DataValue,
    },
    ArrayRemove {
        index: usize,
        old_value: DataValue,
    },
    ArraySet {
        index: usize,
        value: DataValue,
        old_value: DataValue,
    },
    ArrayReorder {
        from_index: usize,
        to_index: usize,
    },
    ArraySetValue {
        value: Vec<DataValue>,
        old_value: Vec<DataValue>,
    },
    /// `old_value` is only set when a concurrent write filled the key first.
    ObjectAdd {
        key: String,
        value: DataValue,
        #[serde(skip_serializing_if = "Option::is_none")]
        old_value: Option<DataValue>,
    },
    ObjectSet {
        key: String,
        value: DataValue,
        old_value: Option<DataValue>,
    },
    ObjectRemove {
        key: String,
        old_value: DataValue,
    },
    ObjectSetValue {
        value: IndexMap<String, DataValue>,
        old_value: IndexMap<String, DataValue>,
    },
    StringInsert {
        index: usize,
        value: String,
    },
    StringRemove {
        index: usize,
        value: String,
    },
    StringSetValue {
        value: String,
        old_value: String,
    },
    NumberAdd {
        value: f64,
    },
    NumberSetValue {
        value: f64,
        old_value: f64,
    },
    BooleanSetValue {
        value: bool,
        old_value: bool,
    },
    DateSetValue {
        #[serde(with = "chrono::serde::ts_milliseconds")]
        value: DateTime<Utc>,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        old_value: DateTime<Utc>,
    },
    /// Raised on the changed node and every ancestor. `relative_path` leads
    /// from `src` down to the node the value event was raised on.
    NodeChanged {
        relative_path: Vec<PathElement>,
        child_event: Box<ModelEvent>,
    },
    Detached,
}

impl ModelEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModelEventKind::ArrayInsert { .. } => "ArrayInsert",
            ModelEventKind::ArrayRemove { .. } => "ArrayRemove",
            ModelEventKind::ArraySet { .. } => "ArraySet",
            ModelEventKind::ArrayReorder { .. } => "ArrayReorder",
            ModelEventKind::ArraySetValue { .. } => "ArraySetValue",
            ModelEventKind::ObjectAdd { .. } => "ObjectAdd",
            ModelEventKind::ObjectSet { .. } => "ObjectSet",
            ModelEventKind::ObjectRemove { .. } => "ObjectRemove",
            ModelEventKind::ObjectSetValue { .. } => "ObjectSetValue",
            ModelEventKind::StringInsert { .. } => "StringInsert",
            ModelEventKind::StringRemove { .. } => "StringRemove",
            ModelEventKind::StringSetValue { .. } => "StringSetValue",
            ModelEventKind::NumberAdd { .. } => "NumberAdd",
            ModelEventKind::NumberSetValue { .. } => "NumberSetValue",
            ModelEventKind::BooleanSetValue { .. } => "BooleanSetValue",
            ModelEventKind::DateSetValue { .. } => "DateSetValue",
            ModelEventKind::NodeChanged { .. } => "NodeChanged",
            ModelEventKind::Detached => "Detached",
        }
    }
}

impl ModelEvent {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

type Listener = Box<dyn FnMut(&ModelEvent) + Send + Sync>;

/// Queued events plus the callbacks they are dispatched to.
#[derive(Default)]
pub(crate) struct EventQueue {
    queued: Vec<ModelEvent>,
    next_listener_id: u64,
    listeners: BTreeMap<u64, Listener>,
}

impl EventQueue {
    pub(crate) fn push(&mut self, event: ModelEvent) {
        self.queued.push(event);
    }

    pub(crate) fn drain(&mut self) -> Vec<ModelEvent> {
        std::mem::take(&mut self.queued)
    }

    pub(crate) fn len(&self) -> usize {
        self.queued.len()
    }

    pub(crate) fn on<F>(&mut self, listener: F) -> u64
    where
        F: FnMut(&ModelEvent) + Send + Sync + 'static,
    {
        self.next_listener_id = self.next_listener_id.saturating_add(1);
        let id = self.next_listener_id;
        self.listeners.insert(id, Box::new(listener));
        id
    }

    pub(crate) fn off(&mut self, listener_id: u64) -> bool {
        self.listeners.remove(&listener_id).is_some()
    }

    /// Delivers every queued event to every listener in registration order
    /// and returns the number of events delivered.
    pub(crate) fn dispatch(&mut self) -> usize {
        let events = self.drain();
        for event in &events {
            for listener in self.listeners.values_mut() {
                listener(event);
            }
        }
        events.len()
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("queued", &self.queued.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
