//! Client-side concurrency control.
//!
//! Operations travel to and from the sequencer as [`SyncOperation`]s: a
//! single [`Operation`] or a [`CompoundOperation`] grouping a local batch.
//! [`ClientConcurrencyControl`] keeps the unconfirmed local history and
//! transforms incoming operations against it; [`RealtimeModel`] wires it to
//! a [`Model`](crate::Model).

mod control;
mod realtime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModelResult;
use crate::operation::{check_operation_type, Operation};
use crate::transform::transform;

pub use control::ClientConcurrencyControl;
pub use realtime::RealtimeModel;

/// Operations applied in order as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Compound")]
pub struct CompoundOperation {
    pub ops: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyncOperation {
    Compound(CompoundOperation),
    Discrete(Operation),
}

impl SyncOperation {
    /// Decodes a wire operation or compound. Any part naming an unknown
    /// `type` is reported as [`ModelError::UnknownOperation`](crate::ModelError::UnknownOperation).
    pub fn from_json(value: Value) -> ModelResult<Self> {
        check_sync_operation_types(&value)?;
        Ok(serde_json::from_value(value)?)
    }

    /// The discrete operations in application order.
    pub fn operations(&self) -> &[Operation] {
        match self {
            SyncOperation::Compound(compound) => &compound.ops,
            SyncOperation::Discrete(op) => std::slice::from_ref(op),
        }
    }

    /// Same shape as `self`, carrying `ops`.
    fn with_operations(&self, mut ops: Vec<Operation>) -> SyncOperation {
        match self {
            SyncOperation::Compound(_) => SyncOperation::Compound(CompoundOperation { ops }),
            SyncOperation::Discrete(op) => SyncOperation::Discrete(ops.pop().unwrap_or_else(|| op.clone())),
        }
    }
}

impl From<Operation> for SyncOperation {
    fn from(op: Operation) -> Self {
        SyncOperation::Discrete(op)
    }
}

impl From<CompoundOperation> for SyncOperation {
    fn from(op: CompoundOperation) -> Self {
        SyncOperation::Compound(op)
    }
}

/// Transforms a concurrent `(server, client)` pair of sync operations.
///
/// Compounds are handled element-wise: each server part is carried through
/// every client part in order, and the client parts are left transformed
/// against everything the server applied before them.
pub fn transform_sync(
    server: &SyncOperation,
    client: &SyncOperation,
) -> ModelResult<(SyncOperation, SyncOperation)> {
    let mut client_ops = client.operations().to_vec();
    let mut server_ops = Vec::with_capacity(server.operations().len());
    for server_op in server.operations() {
        let mut server_op = server_op.clone();
        for client_op in client_ops.iter_mut() {
            let (s, c) = transform(&server_op, client_op)?;
            server_op = s;
            *client_op = c;
        }
        server_ops.push(server_op);
    }
    Ok((
        server.with_operations(server_ops),
        client.with_operations(client_ops),
    ))
}

/// A local operation stamped for the sequencer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingOperation {
    /// Local sequence number echoed back in the acknowledgement.
    pub seq_no: u64,
    /// Number of confirmed operations this one was generated against.
    pub context_version: u64,
    pub operation: SyncOperation,
}

/// A confirmed operation from another session, as broadcast by the sequencer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOperation {
    pub session_id: String,
    pub username: String,
    /// Position of the operation in the sequencer's history.
    pub version: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub operation: SyncOperation,
}

impl RemoteOperation {
    /// Decodes an envelope from the session layer, checking every operation
    /// `type` before the rest of the envelope.
    pub fn from_json(value: Value) -> ModelResult<Self> {
        if let Some(operation) = value.get("operation") {
            check_sync_operation_types(operation)?;
        }
        Ok(serde_json::from_value(value)?)
    }
}

fn check_sync_operation_types(value: &Value) -> ModelResult<()> {
    if value.get("type").and_then(Value::as_str) != Some("Compound") {
        return check_operation_type(value);
    }
    match value.get("ops").and_then(Value::as_array) {
        Some(ops) => ops.iter().try_for_each(check_operation_type),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{NumberOperation, StringOperation};
    use serde_json::json;

    fn ins(index: usize, text: &str) -> Operation {
        Operation::new(
            "s",
            StringOperation::Insert {
                index,
                value: text.into(),
            },
        )
    }

    #[test]
    fn compound_serializes_with_type_tag() {
        let op = SyncOperation::Compound(CompoundOperation {
            ops: vec![Operation::new("n", NumberOperation::Add { value: 1.0 })],
        });
        let wire = serde_json::to_value(&op).unwrap();
        assert_eq!(
            wire,
            json!({"type": "Compound", "ops": [{"id": "n", "noOp": false, "type": "NumberAdd", "value": 1.0}]})
        );
        let back: SyncOperation = serde_json::from_value(wire).unwrap();
        assert_eq!(back, op);

        let single: SyncOperation =
            serde_json::from_value(json!({"id": "n", "type": "NumberSet", "value": 3})).unwrap();
        assert!(matches!(single, SyncOperation::Discrete(_)));
    }

    #[test]
    fn discrete_server_shifts_every_client_part() {
        let server = SyncOperation::from(ins(0, "ab"));
        let client = SyncOperation::Compound(CompoundOperation {
            ops: vec![ins(0, "x"), ins(1, "y")],
        });
        let (s, c) = transform_sync(&server, &client).unwrap();
        // The server insert lands first and pushes both client inserts right.
        assert_eq!(c.operations(), &[ins(2, "x"), ins(3, "y")]);
        assert_eq!(s.operations(), &[ins(0, "ab")]);
        assert!(matches!(s, SyncOperation::Discrete(_)));
    }

    #[test]
    fn compound_server_is_folded_part_by_part() {
        let server = SyncOperation::Compound(CompoundOperation {
            ops: vec![ins(0, "a"), ins(0, "b")],
        });
        let client = SyncOperation::from(ins(0, "z"));
        let (s, c) = transform_sync(&server, &client).unwrap();
        assert_eq!(c.operations(), &[ins(2, "z")]);
        assert_eq!(s.operations(), &[ins(0, "a"), ins(0, "b")]);
    }

    fn envelope(operation: Value) -> Value {
        json!({
            "sessionId": "s2",
            "username": "bob",
            "version": 4,
            "timestamp": 1_700_000_000_000i64,
            "operation": operation
        })
    }

    #[test]
    fn remote_envelope_with_unknown_type_is_an_unknown_operation() {
        let err = RemoteOperation::from_json(envelope(json!({"id": "t", "type": "TreeGraft"}))).unwrap_err();
        match err {
            crate::ModelError::UnknownOperation { id, operation, .. } => {
                assert_eq!(id, "t");
                assert_eq!(operation, "TreeGraft");
            }
            other => panic!("unexpected error {other:?}"),
        }

        let compound = json!({"type": "Compound", "ops": [
            {"id": "n", "type": "NumberAdd", "value": 1},
            {"id": "m", "type": "NumberMultiply", "value": 2}
        ]});
        let err = RemoteOperation::from_json(envelope(compound)).unwrap_err();
        assert!(matches!(
            err,
            crate::ModelError::UnknownOperation { ref operation, .. } if operation == "NumberMultiply"
        ));
    }

    #[test]
    fn remote_envelope_decodes_known_operations() {
        let remote = RemoteOperation::from_json(envelope(json!({"type": "Compound", "ops": [
            {"id": "n", "type": "NumberAdd", "value": 1},
            {"id": "s", "type": "StringInsert", "index": 0, "value": "x"}
        ]})))
        .unwrap();
        assert_eq!(remote.version, 4);
        assert_eq!(remote.operation.operations().len(), 2);

        let single = SyncOperation::from_json(json!({"id": "n", "type": "NumberSet", "value": 3})).unwrap();
        assert!(matches!(single, SyncOperation::Discrete(_)));

        // A malformed envelope with a known type is still a codec error.
        let err = RemoteOperation::from_json(json!({"operation": {"id": "n", "type": "NumberAdd", "value": 1}}))
            .unwrap_err();
        assert!(matches!(err, crate::ModelError::Codec(_)));
    }
}
