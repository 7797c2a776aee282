//! Replicated document tree with operational-transformation concurrency control.
//!
//! A [`Model`] holds a JSON-like document as an arena of typed nodes addressed
//! by id. Local mutations go through typed handles ([`ArrayNode`],
//! [`ObjectNode`], [`StringNode`], ...), are applied optimistically and
//! recorded as [`Operation`]s for the sequencer. Operations confirmed by the
//! sequencer are applied through [`Model::handle_model_operation_event`] after
//! the [`sync::ClientConcurrencyControl`] has transformed them against the
//! local operations that are still unconfirmed.
//!
//! Module map:
//! - [`data_value`]: wire representation of values and the id allocator.
//! - [`model`]: the arena, node handles, node factory and path lookup.
//! - [`operation`]: the closed operation vocabulary per node kind.
//! - [`event`]: events queued by mutations and the listener registry.
//! - [`transform`]: the pairwise transformation table.
//! - [`sync`]: client-side concurrency control and the realtime facade.

pub mod config;
pub mod data_value;
pub mod error;
pub mod event;
pub mod model;
pub mod operation;
pub mod sync;
pub mod transform;

pub use config::ModelOptions;
pub use data_value::{DataContent, DataValue, DataValueFactory, DataValueType, NodeId};
pub use error::{ModelError, ModelResult, SyncError, TransformError, ValidationError};
pub use event::{ModelEvent, ModelEventKind};
pub use model::{
    ArrayNode, BooleanNode, DateNode, Delivery, Model, ModelOperationEvent, NodeHandle, NodeRef,
    NumberNode, ObjectNode, PathElement, StringNode,
};
pub use operation::{
    ArrayOperation, BooleanOperation, DateOperation, NumberOperation, ObjectOperation, Operation,
    OperationKind, StringOperation,
};
pub use sync::{
    ClientConcurrencyControl, CompoundOperation, OutgoingOperation, RealtimeModel,
    RemoteOperation, SyncOperation,
};

use rand::Rng;

/// Length of the random session ids produced by [`generate_session_id`].
pub const SESSION_ID_LENGTH: usize = 16;

/// Generates a random alphanumeric session id for hosts that are not handed
/// one by the session layer.
pub fn generate_session_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..SESSION_ID_LENGTH)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_session_ids_are_alphanumeric_and_distinct() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_eq!(a.len(), SESSION_ID_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
