use thiserror::Error;

use crate::data_value::{DataValueType, NodeId};

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("node {id} is detached from its model")]
    Detached { id: NodeId },
    #[error("node {id} of type {node_type} does not accept operation {operation}")]
    UnknownOperation {
        id: NodeId,
        node_type: DataValueType,
        operation: String,
    },
    #[error("path not found: {0}")]
    PathNotFound(String),
    #[error("wire decoding failed: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),
    #[error("concurrency control: {0}")]
    Sync(#[from] SyncError),
}

/// Rejected arguments. Nothing is applied and no event is queued.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("range {index}..{index}+{length} out of bounds for length {len}")]
    RangeOutOfBounds { index: usize, length: usize, len: usize },
    #[error("number must not be NaN")]
    NotANumber,
    #[error("expected a value of type {expected}, found {found}")]
    TypeMismatch {
        expected: DataValueType,
        found: DataValueType,
    },
    #[error("object keys must be non-empty strings")]
    EmptyKey,
    #[error("object has no key {0:?}")]
    UnknownKey(String),
    #[error("the root object cannot be replaced or removed")]
    RootReplacement,
    #[error("value id {0} is already registered")]
    DuplicateId(NodeId),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("operations on {id} target different node kinds ({server} vs {client})")]
    KindMismatch {
        id: NodeId,
        server: &'static str,
        client: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("acknowledgement for {received} does not match in-flight operation {expected:?}")]
    UnexpectedAcknowledgement { expected: Option<u64>, received: u64 },
    #[error("a batch is already in progress")]
    BatchAlreadyStarted,
    #[error("no batch in progress")]
    NoBatchInProgress,
}

impl ModelError {
    pub(crate) fn detached(id: &str) -> Self {
        ModelError::Detached { id: id.to_string() }
    }
}
