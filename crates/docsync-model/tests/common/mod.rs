#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Once;

use chrono::{TimeZone, Utc};
use docsync_model::sync::transform_sync;
use docsync_model::{
    DataValue, DataValueFactory, Model, ModelOptions, OutgoingOperation, RealtimeModel,
    RemoteOperation, SyncOperation,
};
use serde_json::Value;

static INIT: Once = Once::new();

/// Installs a fmt subscriber filtered by `RUST_LOG`. Safe to call from
/// every test.
pub fn setup_test_log() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Shared starting document: every replica must see the same ids.
pub fn seed(doc: &Value) -> DataValue {
    DataValueFactory::new("seed").create_data_value(doc)
}

pub fn replica(session: &str, seed: &DataValue) -> RealtimeModel {
    let options = ModelOptions::new(session, format!("user-{session}"));
    let model = Model::new(options, seed.clone()).expect("seed document must load");
    RealtimeModel::new(model, 0)
}

/// Minimal central sequencer: every incoming operation is transformed
/// against the history it has not seen and appended.
#[derive(Debug, Default)]
pub struct Sequencer {
    history: Vec<SyncOperation>,
}

impl Sequencer {
    pub fn submit(&mut self, out: &OutgoingOperation) -> (u64, SyncOperation) {
        let mut op = out.operation.clone();
        let start = out.context_version as usize;
        for confirmed in &self.history[start..] {
            let (_, client) = transform_sync(confirmed, &op).expect("transform must succeed");
            op = client;
        }
        let version = self.history.len() as u64;
        self.history.push(op.clone());
        (version, op)
    }

    pub fn version(&self) -> u64 {
        self.history.len() as u64
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    Remote(RemoteOperation),
    Ack { seq_no: u64, version: u64 },
}

/// Replicas connected to one sequencer with an in-order inbox each.
pub struct Network {
    pub sequencer: Sequencer,
    pub clients: Vec<RealtimeModel>,
    inboxes: Vec<VecDeque<Message>>,
}

impl Network {
    pub fn new(doc: &Value, sessions: &[&str]) -> Self {
        Self::from_seed(&seed(doc), sessions)
    }

    /// Starts every replica from the same prebuilt document.
    pub fn from_seed(seed: &DataValue, sessions: &[&str]) -> Self {
        Self {
            sequencer: Sequencer::default(),
            clients: sessions.iter().map(|s| replica(s, seed)).collect(),
            inboxes: sessions.iter().map(|_| VecDeque::new()).collect(),
        }
    }

    pub fn model(&mut self, client: usize) -> &mut Model {
        self.clients[client].model_mut()
    }

    /// Sends whatever `client` has ready to the sequencer.
    pub fn send(&mut self, client: usize) {
        for out in self.clients[client].flush() {
            let (version, operation) = self.sequencer.submit(&out);
            let session_id = self.clients[client].model().session_id().to_string();
            let username = self.clients[client].model().username().to_string();
            for (other, inbox) in self.inboxes.iter_mut().enumerate() {
                if other == client {
                    inbox.push_back(Message::Ack {
                        seq_no: out.seq_no,
                        version,
                    });
                } else {
                    inbox.push_back(Message::Remote(RemoteOperation {
                        session_id: session_id.clone(),
                        username: username.clone(),
                        version,
                        timestamp: Utc
                            .timestamp_millis_opt(1_700_000_000_000 + version as i64)
                            .unwrap(),
                        operation: operation.clone(),
                    }));
                }
            }
        }
    }

    /// Delivers the oldest message queued for `client`.
    pub fn deliver(&mut self, client: usize) -> bool {
        let Some(message) = self.inboxes[client].pop_front() else {
            return false;
        };
        let rt = &mut self.clients[client];
        match message {
            Message::Remote(remote) => {
                rt.handle_remote(&remote).expect("remote operation must apply");
            }
            Message::Ack { seq_no, version } => {
                rt.handle_acknowledgement(seq_no, version)
                    .expect("acknowledgement must match");
            }
        }
        true
    }

    /// Runs until every operation is confirmed and delivered everywhere.
    pub fn settle(&mut self) {
        loop {
            for client in 0..self.clients.len() {
                self.send(client);
            }
            let mut progressed = false;
            for client in 0..self.clients.len() {
                while self.deliver(client) {
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
    }

    pub fn views(&self) -> Vec<Value> {
        self.clients.iter().map(|c| c.model().data()).collect()
    }

    pub fn assert_converged(&self) -> Value {
        let views = self.views();
        for (i, view) in views.iter().enumerate().skip(1) {
            assert_eq!(&views[0], view, "replica {i} diverged from replica 0");
        }
        views[0].clone()
    }
}
