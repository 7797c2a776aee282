//! Per-model configuration.

use serde::{Deserialize, Serialize};

/// Options a host supplies when it opens a [`Model`](crate::Model).
///
/// The session id and username are stamped on every node created locally
/// and on every event produced by a local mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelOptions {
    pub session_id: String,
    pub username: String,
    /// Prefix for locally allocated value ids. Falls back to the session id.
    pub id_prefix: Option<String>,
    /// When `false`, mutations do not feed the event queue.
    pub emit_events: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            username: String::new(),
            id_prefix: None,
            emit_events: true,
        }
    }
}

impl ModelOptions {
    pub fn new(session_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = Some(prefix.into());
        self
    }

    pub fn with_events(mut self, emit_events: bool) -> Self {
        self.emit_events = emit_events;
        self
    }

    /// The prefix used for value ids allocated by this session.
    pub fn effective_id_prefix(&self) -> &str {
        self.id_prefix.as_deref().unwrap_or(&self.session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: ModelOptions =
            serde_json::from_value(json!({"sessionId": "s1", "username": "ann"})).unwrap();
        assert_eq!(opts.session_id, "s1");
        assert!(opts.emit_events);
        assert_eq!(opts.effective_id_prefix(), "s1");
    }

    #[test]
    fn explicit_prefix_wins_over_session_id() {
        let opts = ModelOptions::new("s1", "ann").with_id_prefix("p");
        assert_eq!(opts.effective_id_prefix(), "p");
    }
}
