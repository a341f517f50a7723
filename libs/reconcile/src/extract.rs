//! Descriptor extraction from instance creation audit records.
//!
//! An instance insert usually produces two entries for one operation: the
//! first carries the request as submitted, the last carries the result. Only
//! the first is authoritative for the tags requested at creation time.

use securetag_audit::{AuditLog, LogEntry, Payload};
use serde_json::Value;
use tracing::debug;

use crate::{ExtractError, VmDescriptor, INSTANCE_TEMPLATE_METADATA_KEY};

/// Result of a successful extraction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// The record describes a new VM.
    Accepted(VmDescriptor),

    /// The record is irrelevant and must be acknowledged without retry.
    Skip(SkipReason),
}

/// Why a record was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The payload is missing or not an audit log.
    UnexpectedPayload { type_url: Option<String> },

    /// The record is not the first entry of its operation.
    NotFirstOfOperation,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::UnexpectedPayload { type_url: Some(url) } => {
                write!(f, "unexpected payload type {url}")
            }
            SkipReason::UnexpectedPayload { type_url: None } => write!(f, "missing payload"),
            SkipReason::NotFirstOfOperation => write!(f, "not first of operation"),
        }
    }
}

/// Extract a [`VmDescriptor`] from a decoded log entry.
pub fn extract(entry: &LogEntry) -> Result<Extraction, ExtractError> {
    let audit_log = match &entry.proto_payload {
        Some(Payload::AuditLog(audit_log)) => audit_log,
        Some(Payload::Other { type_url }) => {
            return Ok(Extraction::Skip(SkipReason::UnexpectedPayload {
                type_url: type_url.clone(),
            }))
        }
        None => {
            return Ok(Extraction::Skip(SkipReason::UnexpectedPayload {
                type_url: None,
            }))
        }
    };

    if !entry.is_first_of_operation() {
        return Ok(Extraction::Skip(SkipReason::NotFirstOfOperation));
    }

    let required_label = |key: &'static str| {
        entry
            .resource
            .label(key)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ExtractError::MissingLabel {
                insert_id: entry.insert_id.clone(),
                label: key,
            })
    };

    let instance_id = required_label("instance_id")?;
    let zone = required_label("zone")?;
    let project_id = required_label("project_id")?;

    let request = audit_log.request.as_ref();
    let template = find_metadata_value(&entry.insert_id, request, INSTANCE_TEMPLATE_METADATA_KEY)?;
    let network_tags = network_tags(&entry.insert_id, request)?;

    Ok(Extraction::Accepted(VmDescriptor {
        event_id: entry.insert_id.clone(),
        target_link: target_link(audit_log),
        instance_id,
        zone,
        project_id,
        template,
        network_tags,
    }))
}

fn target_link(audit_log: &AuditLog) -> String {
    audit_log
        .response_str("targetLink")
        .unwrap_or_default()
        .to_string()
}

/// Scan `request.metadata.items[]` for the first item with the given key.
fn find_metadata_value(
    insert_id: &str,
    request: Option<&Value>,
    key: &str,
) -> Result<Option<String>, ExtractError> {
    let Some(items) = request
        .and_then(|r| r.get("metadata"))
        .and_then(|m| m.get("items"))
    else {
        return Ok(None);
    };

    let items = items.as_array().ok_or_else(|| malformed(insert_id, "metadata.items"))?;

    let value = items
        .iter()
        .find(|item| item.get("key").and_then(Value::as_str) == Some(key))
        .and_then(|item| item.get("value"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(value)
}

/// Collect the VM's network tags.
///
/// The audit request encodes the tags message either as `tags.items` (REST
/// shape) or `tags.tags` (proto field name); both are accepted. Entries that
/// are not strings cannot name a tag value and are dropped.
fn network_tags(insert_id: &str, request: Option<&Value>) -> Result<Vec<String>, ExtractError> {
    let Some(tags) = request.and_then(|r| r.get("tags")) else {
        return Ok(Vec::new());
    };

    let Some(list) = tags.get("items").or_else(|| tags.get("tags")) else {
        return Ok(Vec::new());
    };

    let tags = list
        .as_array()
        .ok_or_else(|| malformed(insert_id, "tags"))?
        .iter()
        .filter_map(|tag| {
            let name = tag.as_str();
            if name.is_none() {
                debug!(insert_id = %insert_id, tag = %tag, "Ignoring non-string network tag");
            }
            name.map(str::to_string)
        })
        .collect();

    Ok(tags)
}

fn malformed(insert_id: &str, field: &'static str) -> ExtractError {
    ExtractError::MalformedRequest {
        insert_id: insert_id.to_string(),
        field,
    }
}
