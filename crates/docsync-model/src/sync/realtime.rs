use tracing::warn;

use crate::error::ModelResult;
use crate::model::{Delivery, Model, ModelOperationEvent};

use super::{ClientConcurrencyControl, OutgoingOperation, RemoteOperation};

/// A [`Model`] bound to a [`ClientConcurrencyControl`].
///
/// Local edits are made through [`RealtimeModel::model_mut`] and collected
/// with [`RealtimeModel::flush`]. Messages from the sequencer are fed to
/// [`RealtimeModel::handle_remote`] and
/// [`RealtimeModel::handle_acknowledgement`] in the order they arrive.
#[derive(Debug)]
pub struct RealtimeModel {
    model: Model,
    control: ClientConcurrencyControl,
    outgoing: Vec<OutgoingOperation>,
}

impl RealtimeModel {
    /// `context_version` is the number of confirmed operations already
    /// reflected in `model`.
    pub fn new(model: Model, context_version: u64) -> Self {
        Self {
            model,
            control: ClientConcurrencyControl::new(context_version),
            outgoing: Vec::new(),
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn control(&self) -> &ClientConcurrencyControl {
        &self.control
    }

    pub fn into_model(self) -> Model {
        self.model
    }

    /// Queues local edits with the concurrency control and returns the
    /// operations ready to be sent.
    pub fn flush(&mut self) -> Vec<OutgoingOperation> {
        self.route_outbox();
        std::mem::take(&mut self.outgoing)
    }

    pub fn start_batch(&mut self) -> ModelResult<()> {
        self.route_outbox();
        self.control.start_batch()
    }

    pub fn complete_batch(&mut self) -> ModelResult<()> {
        self.route_outbox();
        if let Some(out) = self.control.complete_batch()? {
            self.outgoing.push(out);
        }
        Ok(())
    }

    /// Applies a confirmed operation from another session after
    /// transforming it against the local operations still unconfirmed.
    pub fn handle_remote(&mut self, remote: &RemoteOperation) -> ModelResult<Vec<Delivery>> {
        // Edits not yet flushed are already applied and must be transformed too.
        self.route_outbox();
        let transformed = self.control.process_remote(remote)?;
        let mut deliveries = Vec::with_capacity(transformed.operations().len());
        for operation in transformed.operations() {
            let event = ModelOperationEvent {
                session_id: remote.session_id.clone(),
                username: remote.username.clone(),
                version: remote.version,
                timestamp: remote.timestamp,
                operation: operation.clone(),
            };
            deliveries.push(self.model.handle_model_operation_event(&event)?);
        }
        Ok(deliveries)
    }

    /// Confirms the in-flight local operation. The next buffered operation,
    /// if any, becomes available from [`RealtimeModel::flush`].
    pub fn handle_acknowledgement(&mut self, seq_no: u64, version: u64) -> ModelResult<()> {
        match self.control.process_acknowledgement(seq_no, version) {
            Ok(next) => {
                self.outgoing.extend(next);
                Ok(())
            }
            Err(err) => {
                warn!(seq_no, version, %err, "rejected acknowledgement");
                Err(err)
            }
        }
    }

    fn route_outbox(&mut self) {
        for operation in self.model.take_outbox() {
            if let Some(out) = self.control.process_outbound(operation) {
                self.outgoing.push(out);
            }
        }
    }
}
