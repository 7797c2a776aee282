//! Pairwise operation transformation.
//!
//! [`transform`] takes two operations generated concurrently against the same
//! state of one node, `server` (already confirmed by the sequencer) and
//! `client` (still speculative), and returns `(server', client')` such that
//!
//! ```text
//! apply(apply(state, client), server') == apply(apply(state, server), client')
//! ```
//!
//! The table is split by node kind. Each per-kind function receives the two
//! bodies and returns `(Option<server'>, Option<client'>)`; `None` marks the
//! corresponding operation `noOp`. The server side wins every tie.
//!
//! Operations on different node ids never interact here. Structural
//! overlap across ids (an edit inside a subtree that was concurrently
//! removed) is resolved by the model dropping operations addressed to
//! unregistered ids.

mod array;
mod number;
mod object;
mod scalar;
mod string;

use tracing::trace;

use crate::error::{ModelResult, TransformError};
use crate::operation::{Operation, OperationKind};

/// Transforms a concurrent `(server, client)` pair.
pub fn transform(server: &Operation, client: &Operation) -> ModelResult<(Operation, Operation)> {
    if server.id != client.id || server.no_op || client.no_op {
        return Ok((server.clone(), client.clone()));
    }

    let (s, c) = match (&server.kind, &client.kind) {
        (OperationKind::String(s), OperationKind::String(c)) => lift(string::transform(s, c)),
        (OperationKind::Array(s), OperationKind::Array(c)) => lift(array::transform(s, c)),
        (OperationKind::Object(s), OperationKind::Object(c)) => lift(object::transform(s, c)),
        (OperationKind::Number(s), OperationKind::Number(c)) => lift(number::transform(s, c)),
        (OperationKind::Boolean(s), OperationKind::Boolean(c)) => {
            lift(scalar::transform_boolean(s, c))
        }
        (OperationKind::Date(s), OperationKind::Date(c)) => lift(scalar::transform_date(s, c)),
        (s, c) => {
            return Err(TransformError::KindMismatch {
                id: server.id.clone(),
                server: s.type_name(),
                client: c.type_name(),
            }
            .into())
        }
    };

    let server_out = rebuild(server, s);
    let client_out = rebuild(client, c);
    if server_out.no_op || client_out.no_op {
        trace!(
            id = %server.id,
            server = server.type_name(),
            client = client.type_name(),
            server_no_op = server_out.no_op,
            client_no_op = client_out.no_op,
            "transform cancelled an operation"
        );
    }
    Ok((server_out, client_out))
}

fn lift<T: Into<OperationKind>>(
    (s, c): (Option<T>, Option<T>),
) -> (Option<OperationKind>, Option<OperationKind>) {
    (s.map(Into::into), c.map(Into::into))
}

fn rebuild(original: &Operation, kind: Option<OperationKind>) -> Operation {
    match kind {
        Some(kind) => Operation {
            id: original.id.clone(),
            no_op: false,
            kind,
        },
        None => original.clone().into_no_op(),
    }
}
