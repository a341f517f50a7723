//! Pub/Sub push envelope.
//!
//! Push subscriptions wrap the log entry as base64 data inside a message.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;

use crate::{AuditError, LogEntry};

/// The body of a Pub/Sub push request.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEnvelope {
    pub message: PubSubMessage,

    #[serde(default)]
    pub subscription: String,
}

/// A single Pub/Sub message.
#[derive(Debug, Clone, Deserialize)]
pub struct PubSubMessage {
    /// Base64-encoded message data.
    #[serde(default)]
    pub data: String,

    #[serde(rename = "messageId", alias = "id", default)]
    pub message_id: String,
}

impl PushEnvelope {
    /// Decode a push envelope from its JSON encoding.
    pub fn from_json(bytes: &[u8]) -> Result<Self, AuditError> {
        serde_json::from_slice(bytes).map_err(|e| AuditError::InvalidEnvelope(e.to_string()))
    }

    /// Decode the log entry carried in the message data.
    pub fn log_entry(&self) -> Result<LogEntry, AuditError> {
        let data = STANDARD
            .decode(self.message.data.as_bytes())
            .map_err(|e| AuditError::InvalidData(e.to_string()))?;
        LogEntry::from_json(&data)
    }
}
