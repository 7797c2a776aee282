use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::error::{ModelResult, SyncError};
use crate::operation::Operation;

use super::{transform_sync, CompoundOperation, OutgoingOperation, RemoteOperation, SyncOperation};

#[derive(Debug, Clone)]
struct PendingOperation {
    /// Set once the operation has been sent.
    seq_no: Option<u64>,
    operation: SyncOperation,
}

/// Tracks the local operations the sequencer has not confirmed yet.
///
/// At most one operation is in flight: the head of `pending`. The rest wait
/// until the in-flight one is acknowledged, so each operation reaches the
/// sequencer already transformed against everything confirmed before its
/// context version.
#[derive(Debug, Clone, Default)]
pub struct ClientConcurrencyControl {
    context_version: u64,
    next_seq_no: u64,
    pending: VecDeque<PendingOperation>,
    batch: Option<Vec<Operation>>,
}

impl ClientConcurrencyControl {
    pub fn new(context_version: u64) -> Self {
        Self {
            context_version,
            ..Self::default()
        }
    }

    /// Confirmed operations seen so far.
    pub fn context_version(&self) -> u64 {
        self.context_version
    }

    /// Unconfirmed operations, the in-flight one included.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.pending.front().and_then(|p| p.seq_no)
    }

    pub fn has_batch(&self) -> bool {
        self.batch.is_some()
    }

    /// Queues a locally applied operation. Returns it stamped for sending
    /// when nothing else is in flight.
    pub fn process_outbound(&mut self, operation: Operation) -> Option<OutgoingOperation> {
        if let Some(batch) = &mut self.batch {
            batch.push(operation);
            return None;
        }
        self.enqueue(SyncOperation::Discrete(operation))
    }

    pub fn start_batch(&mut self) -> ModelResult<()> {
        if self.batch.is_some() {
            return Err(SyncError::BatchAlreadyStarted.into());
        }
        self.batch = Some(Vec::new());
        Ok(())
    }

    /// Closes the batch and queues it as one compound operation.
    pub fn complete_batch(&mut self) -> ModelResult<Option<OutgoingOperation>> {
        let ops = self.batch.take().ok_or(SyncError::NoBatchInProgress)?;
        if ops.is_empty() {
            return Ok(None);
        }
        Ok(self.enqueue(SyncOperation::Compound(CompoundOperation { ops })))
    }

    /// Transforms a confirmed remote operation against every unconfirmed
    /// local one and returns the version to apply locally.
    pub fn process_remote(&mut self, remote: &RemoteOperation) -> ModelResult<SyncOperation> {
        let mut incoming = remote.operation.clone();
        for pending in self.pending.iter_mut() {
            let (server, client) = transform_sync(&incoming, &pending.operation)?;
            incoming = server;
            pending.operation = client;
        }
        if let Some(batch) = &mut self.batch {
            let open = SyncOperation::Compound(CompoundOperation {
                ops: std::mem::take(batch),
            });
            let (server, client) = transform_sync(&incoming, &open)?;
            incoming = server;
            *batch = client.operations().to_vec();
        }
        self.context_version = remote.version + 1;
        trace!(
            version = remote.version,
            pending = self.pending.len(),
            "remote operation transformed"
        );
        Ok(incoming)
    }

    /// Confirms the in-flight operation and returns the next one to send.
    pub fn process_acknowledgement(
        &mut self,
        seq_no: u64,
        version: u64,
    ) -> ModelResult<Option<OutgoingOperation>> {
        let expected = self.in_flight();
        if expected != Some(seq_no) {
            return Err(SyncError::UnexpectedAcknowledgement {
                expected,
                received: seq_no,
            }
            .into());
        }
        self.pending.pop_front();
        self.context_version = version + 1;
        debug!(seq_no, version, "operation acknowledged");
        Ok(self.send_head())
    }

    fn enqueue(&mut self, operation: SyncOperation) -> Option<OutgoingOperation> {
        self.pending.push_back(PendingOperation {
            seq_no: None,
            operation,
        });
        if self.pending.len() == 1 {
            self.send_head()
        } else {
            None
        }
    }

    /// Stamps the head of the queue as the in-flight operation.
    fn send_head(&mut self) -> Option<OutgoingOperation> {
        let context_version = self.context_version;
        let seq_no = self.next_seq_no;
        let head = self.pending.front_mut()?;
        head.seq_no = Some(seq_no);
        self.next_seq_no += 1;
        Some(OutgoingOperation {
            seq_no,
            context_version,
            operation: head.operation.clone(),
        })
    }
}
