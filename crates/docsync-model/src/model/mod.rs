//! The replicated document.
//!
//! A [`Model`] owns every node of one document in an arena keyed by node id.
//! The root is always an object. Local edits go through the typed handles in
//! `handles`; confirmed operations from the sequencer go through
//! [`Model::handle_model_operation_event`]. Both paths run
//! the same `apply_operation` so state and events never depend on origin.

mod apply;
mod handles;
mod node;
mod path;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::ModelOptions;
use crate::data_value::{DataValue, DataValueFactory, DataValueType, NodeId};
use crate::error::{ModelError, ModelResult, ValidationError};
use crate::event::{EventQueue, ModelEvent, ModelEventKind};
use crate::operation::{check_operation_type, Operation};

pub use handles::{
    ArrayNode, BooleanNode, DateNode, NodeHandle, NumberNode, ObjectNode, StringNode,
};
pub use path::{to_pointer, PathElement};

use node::{NodeData, NodeEntry};

/// Who caused a mutation. Stamped on new nodes and on queued events.
#[derive(Debug, Clone)]
pub(crate) struct Origin {
    pub local: bool,
    pub session_id: String,
    pub username: String,
    pub version: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Origin {
    fn event(&self, src: &str, kind: ModelEventKind) -> ModelEvent {
        ModelEvent {
            src: src.to_string(),
            local: self.local,
            session_id: self.session_id.clone(),
            username: self.username.clone(),
            version: self.version,
            timestamp: self.timestamp,
            kind,
        }
    }
}

/// A sequencer-confirmed operation addressed to this model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOperationEvent {
    pub session_id: String,
    pub username: String,
    pub version: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub operation: Operation,
}

impl ModelOperationEvent {
    /// Decodes an inbound event, reporting an unrecognised operation `type`
    /// as [`ModelError::UnknownOperation`].
    pub fn from_json(value: Value) -> ModelResult<Self> {
        if let Some(operation) = value.get("operation") {
            check_operation_type(operation)?;
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Outcome of [`Model::handle_model_operation_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    /// The operation was cancelled by a transform.
    NoOp,
    /// The target node was removed concurrently.
    Dropped,
}

pub struct Model {
    options: ModelOptions,
    root: NodeId,
    nodes: HashMap<NodeId, NodeEntry>,
    factory: DataValueFactory,
    events: EventQueue,
    outbox: Vec<Operation>,
}

impl Model {
    /// Opens a model over an existing document. The root must be an object.
    pub fn new(options: ModelOptions, root: DataValue) -> ModelResult<Self> {
        if root.value_type() != DataValueType::Object {
            return Err(ValidationError::TypeMismatch {
                expected: DataValueType::Object,
                found: root.value_type(),
            }
            .into());
        }
        let factory = DataValueFactory::new(options.effective_id_prefix());
        let mut model = Self {
            options,
            root: root.id.clone(),
            nodes: HashMap::new(),
            factory,
            events: EventQueue::default(),
            outbox: Vec::new(),
        };
        model.check_new_ids([&root])?;
        // Loaded nodes predate this session, so no creator is recorded.
        let origin = Origin {
            local: true,
            session_id: String::new(),
            username: String::new(),
            version: None,
            timestamp: None,
        };
        model.register_value(&root, None, &origin);
        Ok(model)
    }

    /// Opens a model over an empty root object.
    pub fn empty(options: ModelOptions) -> Self {
        let mut factory = DataValueFactory::new(options.effective_id_prefix());
        let root = factory.create_data_value(&Value::Object(Default::default()));
        let mut model = Self {
            options,
            root: root.id.clone(),
            nodes: HashMap::new(),
            factory,
            events: EventQueue::default(),
            outbox: Vec::new(),
        };
        let origin = model.local_origin();
        model.register_value(&root, None, &origin);
        model
    }

    /// Opens a model over a JSON document, allocating ids from this
    /// session's prefix.
    pub fn from_json(options: ModelOptions, value: &Value) -> ModelResult<Self> {
        let mut factory = DataValueFactory::new(options.effective_id_prefix());
        let root = factory.create_data_value(value);
        let mut model = Self::new(options, root)?;
        model.factory = factory;
        Ok(model)
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    pub fn session_id(&self) -> &str {
        &self.options.session_id
    }

    pub fn username(&self) -> &str {
        &self.options.username
    }

    pub fn root_id(&self) -> &str {
        &self.root
    }

    pub fn root(&mut self) -> ObjectNode<'_> {
        let id = self.root.clone();
        ObjectNode::new(NodeHandle::new(self, id))
    }

    /// A handle on a registered node.
    pub fn node(&mut self, id: &str) -> ModelResult<NodeHandle<'_>> {
        if !self.nodes.contains_key(id) {
            return Err(ModelError::detached(id));
        }
        Ok(NodeHandle::new(self, id.to_string()))
    }

    /// A handle on the node at `path`.
    pub fn at(&mut self, path: &[PathElement]) -> ModelResult<NodeHandle<'_>> {
        let id = self.value_at(path).require()?.id().to_string();
        Ok(NodeHandle::new(self, id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn is_detached(&self, id: &str) -> bool {
        !self.contains(id)
    }

    /// Number of registered nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_type(&self, id: &str) -> Option<DataValueType> {
        self.nodes.get(id).map(|entry| entry.data.node_type())
    }

    /// Session and username that created the node. `None` for unknown ids
    /// and for nodes loaded with the initial document.
    pub fn creator_of(&self, id: &str) -> Option<(&str, &str)> {
        self.nodes
            .get(id)
            .filter(|entry| !entry.session_id.is_empty())
            .map(|entry| (entry.session_id.as_str(), entry.username.as_str()))
    }

    pub fn data(&self) -> Value {
        self.json_of(&self.root)
    }

    pub fn data_value(&self) -> DataValue {
        self.data_value_of(&self.root)
            .unwrap_or_else(|| DataValue::undefined(self.root.clone()))
    }

    /// Allocates a date value with a fresh id, for inserting dates through
    /// [`ArrayNode::insert_data_value`] or [`ObjectNode::set_data_value`].
    pub fn create_date(&mut self, value: DateTime<Utc>) -> DataValue {
        self.factory.create_date(value)
    }

    pub(crate) fn create_data_value(&mut self, value: &Value) -> DataValue {
        self.factory.create_data_value(value)
    }

    // ── Paths ─────────────────────────────────────────────────────────────

    /// Path from the root to `id`, or `None` once detached.
    pub fn path_of(&self, id: &str) -> Option<Vec<PathElement>> {
        let entry = self.nodes.get(id)?;
        let Some(parent) = &entry.parent else {
            return Some(Vec::new());
        };
        let mut path = self.path_of(parent)?;
        path.push(self.position_in_parent(id)?);
        Some(path)
    }

    fn position_in_parent(&self, id: &str) -> Option<PathElement> {
        let parent = self.nodes.get(id)?.parent.as_ref()?;
        match &self.nodes.get(parent)?.data {
            NodeData::Object { keys, .. } => keys.get(id).cloned().map(PathElement::Key),
            NodeData::Array { positions, .. } => positions.get(id).copied().map(PathElement::Index),
            _ => None,
        }
    }

    /// Follows `path` from the root. A miss yields an undefined [`NodeRef`].
    pub fn value_at(&self, path: &[PathElement]) -> NodeRef<'_> {
        let mut current = self.root.clone();
        for step in path {
            match self.child_at(&current, step) {
                Some(next) => current = next,
                None => return NodeRef::missing(self, to_pointer(path)),
            }
        }
        NodeRef::found(self, current)
    }

    /// Like [`Model::value_at`] for an RFC 6901 pointer such as `/items/0`.
    /// Tokens are read as indices inside arrays and as keys inside objects.
    pub fn value_at_pointer(&self, pointer: &str) -> ModelResult<NodeRef<'_>> {
        let mut current = self.root.clone();
        for token in path::parse_pointer(pointer)? {
            let step = match self.nodes.get(&current).map(|entry| &entry.data) {
                Some(NodeData::Array { .. }) => match token.parse::<usize>() {
                    Ok(index) => PathElement::Index(index),
                    Err(_) => return Ok(NodeRef::missing(self, pointer.to_string())),
                },
                _ => PathElement::Key(token),
            };
            match self.child_at(&current, &step) {
                Some(next) => current = next,
                None => return Ok(NodeRef::missing(self, pointer.to_string())),
            }
        }
        Ok(NodeRef::found(self, current))
    }

    fn child_at(&self, id: &str, step: &PathElement) -> Option<NodeId> {
        match (&self.nodes.get(id)?.data, step) {
            (NodeData::Object { children, .. }, PathElement::Key(key)) => children.get(key).cloned(),
            (NodeData::Array { children, .. }, PathElement::Index(index)) => {
                children.get(*index).cloned()
            }
            _ => None,
        }
    }

    // ── Operations ────────────────────────────────────────────────────────

    /// Applies a sequencer-confirmed operation.
    ///
    /// Operations addressed to an id that is no longer registered are
    /// dropped: the target was removed by an operation ordered before this
    /// one, which is an expected outcome of concurrent editing.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(id = %event.operation.id, op = event.operation.type_name(), version = event.version)
    )]
    pub fn handle_model_operation_event(
        &mut self,
        event: &ModelOperationEvent,
    ) -> ModelResult<Delivery> {
        if event.operation.no_op {
            trace!("skipping noOp operation");
            return Ok(Delivery::NoOp);
        }
        if !self.nodes.contains_key(&event.operation.id) {
            debug!("dropping operation for unregistered node");
            return Ok(Delivery::Dropped);
        }
        let origin = Origin {
            local: false,
            session_id: event.session_id.clone(),
            username: event.username.clone(),
            version: Some(event.version),
            timestamp: Some(event.timestamp),
        };
        self.apply_operation(&event.operation, &origin)?;
        Ok(Delivery::Applied)
    }

    /// Applies a locally generated operation and records it in the outbox.
    pub(crate) fn apply_local(&mut self, operation: Operation) -> ModelResult<Operation> {
        let origin = self.local_origin();
        self.apply_operation(&operation, &origin)?;
        self.outbox.push(operation.clone());
        Ok(operation)
    }

    /// Takes the local operations applied since the last call, oldest first.
    pub fn take_outbox(&mut self) -> Vec<Operation> {
        std::mem::take(&mut self.outbox)
    }

    pub fn outbox_len(&self) -> usize {
        self.outbox.len()
    }

    fn local_origin(&self) -> Origin {
        Origin {
            local: true,
            session_id: self.options.session_id.clone(),
            username: self.options.username.clone(),
            version: None,
            timestamp: None,
        }
    }

    // ── Events ────────────────────────────────────────────────────────────

    pub fn drain_events(&mut self) -> Vec<ModelEvent> {
        self.events.drain()
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub fn on_event<F>(&mut self, listener: F) -> u64
    where
        F: FnMut(&ModelEvent) + Send + Sync + 'static,
    {
        self.events.on(listener)
    }

    pub fn off_event(&mut self, listener_id: u64) -> bool {
        self.events.off(listener_id)
    }

    /// Delivers queued events to the registered listeners.
    pub fn dispatch_events(&mut self) -> usize {
        self.events.dispatch()
    }

    /// Queues the value event at `src`, then `NodeChanged` at `src` and at
    /// each ancestor with the path leading back down to `src`.
    fn emit(&mut self, src: &str, kind: ModelEventKind, origin: &Origin) {
        if !self.options.emit_events {
            return;
        }
        let event = origin.event(src, kind);
        self.events.push(event.clone());

        let mut relative_path = Vec::new();
        let mut current = src.to_string();
        loop {
            let changed = ModelEventKind::NodeChanged {
                relative_path: relative_path.clone(),
                child_event: Box::new(event.clone()),
            };
            self.events.push(origin.event(&current, changed));

            let Some(parent) = self.nodes.get(&current).and_then(|e| e.parent.clone()) else {
                break;
            };
            match self.position_in_parent(&current) {
                Some(step) => relative_path.insert(0, step),
                None => break,
            }
            current = parent;
        }
    }

    /// Unregisters `id` and its subtree, children first. Each node queues
    /// one `Detached` event; detaching an unregistered id does nothing.
    pub(crate) fn detach(&mut self, id: &str, origin: &Origin) {
        let Some(entry) = self.nodes.remove(id) else {
            return;
        };
        for child in entry.data.child_ids() {
            self.detach(&child, origin);
        }
        trace!(id, "node detached");
        if self.options.emit_events {
            self.events.push(origin.event(id, ModelEventKind::Detached));
        }
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("session_id", &self.options.session_id)
            .field("root", &self.root)
            .field("nodes", &self.nodes.len())
            .field("events", &self.events)
            .field("outbox", &self.outbox.len())
            .finish()
    }
}

// ── NodeRef ──────────────────────────────────────────────────────────────

/// Read-only view of the result of a path lookup.
#[derive(Debug, Clone)]
pub struct NodeRef<'a> {
    model: &'a Model,
    target: Target<'a>,
}

#[derive(Debug, Clone)]
enum Target<'a> {
    Found(&'a str),
    /// Pointer of the path that did not resolve.
    Missing(String),
}

impl<'a> NodeRef<'a> {
    fn found(model: &'a Model, id: NodeId) -> Self {
        // Borrow the id from the arena so the ref does not own a copy.
        match model.nodes.get_key_value(&id) {
            Some((key, _)) => Self {
                model,
                target: Target::Found(key.as_str()),
            },
            None => Self::missing(model, id),
        }
    }

    fn missing(model: &'a Model, pointer: String) -> Self {
        Self {
            model,
            target: Target::Missing(pointer),
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self.target, Target::Found(_))
    }

    /// Node id, or `""` for a path miss.
    pub fn id(&self) -> &'a str {
        match self.target {
            Target::Found(id) => id,
            Target::Missing(_) => "",
        }
    }

    /// `Undefined` for a path miss.
    pub fn node_type(&self) -> DataValueType {
        match self.target {
            Target::Found(id) => self.model.node_type(id).unwrap_or(DataValueType::Undefined),
            Target::Missing(_) => DataValueType::Undefined,
        }
    }

    pub fn path(&self) -> Option<Vec<PathElement>> {
        match self.target {
            Target::Found(id) => self.model.path_of(id),
            Target::Missing(_) => None,
        }
    }

    pub fn data(&self) -> Value {
        match self.target {
            Target::Found(id) => self.model.json_of(id),
            Target::Missing(_) => Value::Null,
        }
    }

    pub fn data_value(&self) -> Option<DataValue> {
        match self.target {
            Target::Found(id) => self.model.data_value_of(id),
            Target::Missing(_) => None,
        }
    }

    /// Turns a path miss into [`ModelError::PathNotFound`].
    pub fn require(self) -> ModelResult<Self> {
        match self.target {
            Target::Found(_) => Ok(self),
            Target::Missing(pointer) => Err(ModelError::PathNotFound(pointer)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model(doc: Value) -> Model {
        Model::from_json(ModelOptions::new("s1", "ann"), &doc).unwrap()
    }

    #[test]
    fn root_must_be_an_object() {
        let err = Model::new(ModelOptions::default(), DataValue::string("x", "hi")).unwrap_err();
        assert!(matches!(
            err,
            ModelError::Validation(ValidationError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn duplicate_ids_in_initial_document_are_rejected() {
        let mut children = indexmap::IndexMap::new();
        children.insert("a".to_string(), DataValue::null("dup"));
        children.insert("b".to_string(), DataValue::null("dup"));
        let err = Model::new(ModelOptions::default(), DataValue::object("r", children)).unwrap_err();
        assert!(matches!(
            err,
            ModelError::Validation(ValidationError::DuplicateId(id)) if id == "dup"
        ));
    }

    #[test]
    fn value_at_follows_keys_and_indices() {
        let m = model(json!({"items": [{"name": "a"}, {"name": "b"}]}));
        let path = [PathElement::from("items"), PathElement::Index(1), PathElement::from("name")];
        let found = m.value_at(&path);
        assert_eq!(found.data(), json!("b"));
        assert_eq!(found.path().unwrap(), path);

        let missing = m.value_at(&[PathElement::from("items"), PathElement::Index(7)]);
        assert!(!missing.is_defined());
        assert_eq!(missing.node_type(), DataValueType::Undefined);
        match missing.require() {
            Err(ModelError::PathNotFound(pointer)) => assert_eq!(pointer, "/items/7"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pointer_lookup_reads_tokens_by_container() {
        let m = model(json!({"a/b": {"0": "key"}, "list": ["x", "y"]}));
        assert_eq!(m.value_at_pointer("/a~1b/0").unwrap().data(), json!("key"));
        assert_eq!(m.value_at_pointer("/list/1").unwrap().data(), json!("y"));
        assert!(!m.value_at_pointer("/list/x").unwrap().is_defined());
        assert_eq!(m.value_at_pointer("").unwrap().id(), m.root_id());
    }

    #[test]
    fn remove_detaches_subtree_children_first() {
        let mut m = model(json!({"list": [{"inner": [1]}]}));
        let list_id = m.value_at_pointer("/list").unwrap().id().to_string();
        let elem_id = m.value_at_pointer("/list/0").unwrap().id().to_string();
        let inner_id = m.value_at_pointer("/list/0/inner").unwrap().id().to_string();
        let leaf_id = m.value_at_pointer("/list/0/inner/0").unwrap().id().to_string();
        let before = m.node_count();

        m.node(&list_id).unwrap().as_array().unwrap().remove(0).unwrap();

        assert_eq!(m.node_count(), before - 3);
        for id in [&elem_id, &inner_id, &leaf_id] {
            assert!(m.is_detached(id));
            assert!(matches!(m.node(id), Err(ModelError::Detached { .. })));
        }
        let detached: Vec<String> = m
            .drain_events()
            .into_iter()
            .take_while(|ev| ev.kind == ModelEventKind::Detached)
            .map(|ev| ev.src)
            .collect();
        assert_eq!(detached, [leaf_id, inner_id, elem_id]);
    }

    #[test]
    fn second_detach_is_a_no_op() {
        let mut m = model(json!({"k": 1}));
        let id = m.value_at_pointer("/k").unwrap().id().to_string();
        let origin = m.local_origin();
        m.detach(&id, &origin);
        let count = m.node_count();
        m.detach(&id, &origin);
        assert_eq!(m.node_count(), count);
        assert_eq!(m.drain_events().len(), 1);
    }

    #[test]
    fn node_changed_bubbles_with_relative_path() {
        let mut m = model(json!({"doc": {"title": "hi"}}));
        let title = m.value_at_pointer("/doc/title").unwrap().id().to_string();
        m.node(&title).unwrap().as_string().unwrap().insert(2, "!").unwrap();

        let events = m.drain_events();
        let names: Vec<(&str, &str)> = events.iter().map(|e| (e.name(), e.src.as_str())).collect();
        let doc = m.value_at_pointer("/doc").unwrap().id().to_string();
        assert_eq!(
            names,
            [
                ("StringInsert", title.as_str()),
                ("NodeChanged", title.as_str()),
                ("NodeChanged", doc.as_str()),
                ("NodeChanged", m.root_id()),
            ]
        );
        let ModelEventKind::NodeChanged { relative_path, child_event } = &events[3].kind else {
            panic!("expected NodeChanged");
        };
        assert_eq!(relative_path, &[PathElement::from("doc"), PathElement::from("title")]);
        assert_eq!(child_event.name(), "StringInsert");
        assert!(events.iter().all(|e| e.local && e.session_id == "s1"));
    }

    #[test]
    fn events_can_be_disabled() {
        let mut m = Model::from_json(
            ModelOptions::new("s1", "ann").with_events(false),
            &json!({"n": 1}),
        )
        .unwrap();
        m.root().set("n", json!(2)).unwrap();
        assert_eq!(m.pending_events(), 0);
        assert_eq!(m.data(), json!({"n": 2}));
    }

    #[test]
    fn remote_operation_for_unregistered_node_is_dropped() {
        let mut m = model(json!({}));
        let event = ModelOperationEvent {
            session_id: "s2".into(),
            username: "bob".into(),
            version: 3,
            timestamp: Utc::now(),
            operation: Operation::new("gone", crate::operation::NumberOperation::Add { value: 1.0 }),
        };
        assert_eq!(m.handle_model_operation_event(&event).unwrap(), Delivery::Dropped);
        let no_op = ModelOperationEvent {
            operation: event.operation.clone().into_no_op(),
            ..event
        };
        assert_eq!(m.handle_model_operation_event(&no_op).unwrap(), Delivery::NoOp);
        assert_eq!(m.pending_events(), 0);
    }

    #[test]
    fn local_operations_land_in_outbox() {
        let mut m = model(json!({"n": 1}));
        let op = m.root().remove("n").unwrap();
        assert_eq!(m.take_outbox(), vec![op]);
        assert!(m.take_outbox().is_empty());
    }

    #[test]
    fn nodes_remember_their_creator() {
        let mut m = model(json!({}));
        m.root().set("k", json!("v")).unwrap();
        let id = m.value_at_pointer("/k").unwrap().id().to_string();
        assert_eq!(m.creator_of(&id), Some(("s1", "ann")));
    }

    #[test]
    fn seeded_nodes_have_no_creator() {
        let m = model(json!({"doc": {"n": 1}}));
        let id = m.value_at_pointer("/doc/n").unwrap().id().to_string();
        assert_eq!(m.creator_of(&id), None);
        assert_eq!(m.creator_of(m.root_id()), None);
        assert_eq!(m.creator_of("missing"), None);
    }

    #[test]
    fn overflowing_remote_remove_range_is_rejected() {
        let mut m = model(json!({"s": "abc"}));
        let id = m.value_at_pointer("/s").unwrap().id().to_string();
        let event = ModelOperationEvent::from_json(json!({
            "sessionId": "s2",
            "username": "bob",
            "version": 1,
            "timestamp": 1_700_000_000_000i64,
            "operation": {"id": id, "type": "StringRemove", "index": u64::MAX, "value": "a"}
        }))
        .unwrap();
        let err = m.handle_model_operation_event(&event).unwrap_err();
        assert!(matches!(
            err,
            ModelError::Validation(ValidationError::RangeOutOfBounds { length: 1, len: 3, .. })
        ));
        assert_eq!(m.data(), json!({"s": "abc"}));
        assert_eq!(m.pending_events(), 0);
    }

    #[test]
    fn overflowing_local_remove_range_is_rejected() {
        let mut m = model(json!({"s": "abc"}));
        let mut text = m.at(&[PathElement::from("s")]).unwrap().as_string().unwrap();
        let err = text.remove(1, usize::MAX).unwrap_err();
        assert!(matches!(
            err,
            ModelError::Validation(ValidationError::RangeOutOfBounds { index: 1, len: 3, .. })
        ));
        assert_eq!(m.data(), json!({"s": "abc"}));
        assert!(m.take_outbox().is_empty());
    }

    #[test]
    fn model_operation_event_with_unknown_type_is_an_unknown_operation() {
        let err = ModelOperationEvent::from_json(json!({
            "sessionId": "s2",
            "username": "bob",
            "version": 1,
            "timestamp": 1_700_000_000_000i64,
            "operation": {"id": "x", "type": "TreeGraft"}
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            ModelError::UnknownOperation { ref operation, .. } if operation == "TreeGraft"
        ));
    }
}
