//! Log entry and audit log payload types.
//!
//! These mirror the JSON encoding of a Cloud Logging `LogEntry` whose
//! `protoPayload` may carry a `google.cloud.audit.AuditLog`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer};

use crate::AuditError;

/// Type URL of the only payload subtype the pipeline understands.
pub const AUDIT_LOG_TYPE_URL: &str = "type.googleapis.com/google.cloud.audit.AuditLog";

/// A single decoded log entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Unique identifier of the entry.
    #[serde(default)]
    pub insert_id: String,

    /// When the logged event occurred.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Resource name of the log the entry was written to.
    #[serde(default)]
    pub log_name: Option<String>,

    /// Operation this entry is part of, if any.
    #[serde(default)]
    pub operation: Option<Operation>,

    /// The monitored resource that produced the entry.
    #[serde(default)]
    pub resource: MonitoredResource,

    /// Structured payload.
    #[serde(default)]
    pub proto_payload: Option<Payload>,
}

impl LogEntry {
    /// Decode a log entry from its JSON encoding.
    pub fn from_json(bytes: &[u8]) -> Result<Self, AuditError> {
        serde_json::from_slice(bytes).map_err(|e| AuditError::InvalidLogEntry(e.to_string()))
    }

    /// Returns true if this entry is the first of its operation.
    ///
    /// An entry without operation information is never considered first.
    pub fn is_first_of_operation(&self) -> bool {
        self.operation.as_ref().is_some_and(|op| op.first)
    }
}

/// Operation grouping for multi-entry operations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub producer: Option<String>,

    /// Set on the first entry of the operation.
    #[serde(default)]
    pub first: bool,

    /// Set on the last entry of the operation.
    #[serde(default)]
    pub last: bool,
}

/// The resource an entry describes, with its location labels.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitoredResource {
    #[serde(rename = "type", default)]
    pub resource_type: Option<String>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl MonitoredResource {
    /// Look up a label by key.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// The payload of a log entry.
///
/// Only [`AuditLog`] payloads are decoded; anything else is kept as its type URL.
#[derive(Debug, Clone)]
pub enum Payload {
    AuditLog(Box<AuditLog>),
    Other { type_url: Option<String> },
}

impl Payload {
    /// The `@type` URL of the payload, if known.
    pub fn type_url(&self) -> Option<&str> {
        match self {
            Payload::AuditLog(_) => Some(AUDIT_LOG_TYPE_URL),
            Payload::Other { type_url } => type_url.as_deref(),
        }
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let type_url = value
            .get("@type")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        match type_url.as_deref() {
            Some(AUDIT_LOG_TYPE_URL) => {
                let audit_log: AuditLog =
                    serde_json::from_value(value).map_err(de::Error::custom)?;
                Ok(Payload::AuditLog(Box::new(audit_log)))
            }
            _ => Ok(Payload::Other { type_url }),
        }
    }
}

/// An audit log payload.
///
/// `request` and `response` are free-form structs whose shape depends on the
/// audited method, so they are kept as JSON values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    #[serde(default)]
    pub service_name: Option<String>,

    #[serde(default)]
    pub method_name: Option<String>,

    #[serde(default)]
    pub resource_name: Option<String>,

    #[serde(default)]
    pub request: Option<serde_json::Value>,

    #[serde(default)]
    pub response: Option<serde_json::Value>,
}

impl AuditLog {
    /// Read a string field from the response struct.
    pub fn response_str(&self, field: &str) -> Option<&str> {
        self.response
            .as_ref()
            .and_then(|r| r.get(field))
            .and_then(serde_json::Value::as_str)
    }
}
