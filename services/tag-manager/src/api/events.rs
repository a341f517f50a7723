//! Instance insert event endpoints.
//!
//! Two delivery paths feed the same pipeline:
//! - `POST /v1/compute/instances`: the audit log entry pushed directly by an
//!   Eventarc audit log trigger (same-project only).
//! - `POST /v1/compute/instances_pubsub`: a Pub/Sub push envelope whose
//!   message data is the base64-encoded log entry (cross-project triggers).
//!
//! Skipped events and events whose bindings failed are both answered with
//! 200 so the transport does not redeliver them. Only undecodable input is
//! rejected, as a non-retryable client error.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use securetag_audit::{AuditError, LogEntry, PushEnvelope};
use serde::Serialize;
use tracing::{info, warn};

use super::error::ApiError;
use crate::binder::BindingSummary;
use crate::driver::Outcome;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/compute/instances", post(handle_audit_log))
        .route("/compute/instances_pubsub", post(handle_pubsub))
}

/// Response body for a handled event.
#[derive(Debug, Serialize)]
pub struct EventResponse {
    /// "accepted", "skipped" or "failed".
    pub status: String,
    pub insert_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<BindingSummary>,
}

async fn handle_audit_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EventResponse>, ApiError> {
    let event_id = cloud_event_id(&headers);
    log_delivery("audit_log", &headers);

    let entry = LogEntry::from_json(&body).map_err(|e| decode_error(e, event_id))?;
    process(&state, entry).await
}

async fn handle_pubsub(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EventResponse>, ApiError> {
    let event_id = cloud_event_id(&headers);
    log_delivery("pubsub", &headers);

    let envelope = PushEnvelope::from_json(&body).map_err(|e| decode_error(e, event_id.clone()))?;
    info!(
        message_id = %envelope.message.message_id,
        subscription = %envelope.subscription,
        "Received push message"
    );

    let entry = envelope
        .log_entry()
        .map_err(|e| decode_error(e, event_id))?;
    process(&state, entry).await
}

async fn process(state: &AppState, entry: LogEntry) -> Result<Json<EventResponse>, ApiError> {
    let outcome = state.driver().handle(&entry).await;
    let acknowledged = outcome.is_acknowledged();

    let mut response = EventResponse {
        status: String::new(),
        insert_id: entry.insert_id.clone(),
        resource_name: outcome.report().map(|r| r.resource_name.to_string()),
        detail: None,
        bindings: outcome.report().map(|r| r.summary()).unwrap_or_default(),
    };

    match outcome {
        Outcome::Accepted(_) => {
            response.status = "accepted".to_string();
        }
        Outcome::Skipped(reason) => {
            response.status = "skipped".to_string();
            response.detail = Some(reason.to_string());
        }
        Outcome::Failed(err) if !acknowledged => {
            return Err(ApiError::bad_request("malformed_audit_log", err.to_string())
                .with_instance(entry.insert_id));
        }
        Outcome::Failed(err) => {
            response.status = "failed".to_string();
            response.detail = Some(err.to_string());
        }
    }

    Ok(Json(response))
}

fn cloud_event_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("ce-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn log_delivery(path: &str, headers: &HeaderMap) {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("");
    info!(
        path = path,
        ce_id = header("ce-id"),
        ce_time = header("ce-time"),
        "Received instance insert event"
    );
}

fn decode_error(err: AuditError, event_id: Option<String>) -> ApiError {
    warn!(error = %err, "Rejecting undecodable event");
    let code = match err {
        AuditError::InvalidLogEntry(_) => "invalid_log_entry",
        AuditError::InvalidEnvelope(_) => "invalid_push_envelope",
        AuditError::InvalidData(_) => "invalid_message_data",
    };

    let api_error = ApiError::bad_request(code, err.to_string());
    match event_id {
        Some(id) => api_error.with_instance(id),
        None => api_error,
    }
}
