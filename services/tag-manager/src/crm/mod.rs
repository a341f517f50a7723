//! Cloud Resource Manager tagging API.
//!
//! Secure tag bindings on zonal resources must be created through the
//! zone's own endpoint (`{zone}-cloudresourcemanager.googleapis.com`), so
//! every client is bound to exactly one zone.

mod http;
pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use securetag_reconcile::{ResourceName, TagValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::{HttpZoneClient, HttpZoneClientFactory};

/// Default zonal endpoint template; `{zone}` is replaced with the zone name.
pub const DEFAULT_ENDPOINT_TEMPLATE: &str = "https://{zone}-cloudresourcemanager.googleapis.com";

/// Errors from the tagging API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TagApiError {
    /// The zone name cannot form an endpoint.
    #[error("invalid zone: {0:?}")]
    InvalidZone(String),

    /// The client for a zone could not be set up.
    #[error("failed to create tagging client in {zone}: {message}")]
    ClientSetup { zone: String, message: String },

    /// No access token could be obtained.
    #[error("failed to obtain access token: {0}")]
    Token(String),

    /// The binding already exists.
    #[error("tag binding already exists: {0}")]
    AlreadyExists(String),

    /// The API returned an error status.
    #[error("tagging API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The request did not complete.
    #[error("tagging API transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("failed to decode tagging API response: {0}")]
    Decode(String),

    /// The binding operation completed with an error status.
    #[error("tag binding operation failed with code {code}: {message}")]
    Operation { code: i32, message: String },
}

/// `google.rpc.Code` for an entity that already exists.
pub const RPC_CODE_ALREADY_EXISTS: i32 = 6;

/// Long-running operation handle returned by binding creation.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Operation {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub done: bool,

    /// Set when the operation finished unsuccessfully.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationStatus>,
}

/// Error status of a finished operation (`google.rpc.Status`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct OperationStatus {
    #[serde(default)]
    pub code: i32,

    #[serde(default)]
    pub message: String,
}

impl Operation {
    /// Turn a finished operation carrying an error status into an error.
    ///
    /// `ALREADY_EXISTS` maps to [`TagApiError::AlreadyExists`] like the
    /// synchronous `409` answer.
    pub fn into_result(self) -> Result<Self, TagApiError> {
        match self.error {
            Some(status) if self.done => Err(if status.code == RPC_CODE_ALREADY_EXISTS {
                TagApiError::AlreadyExists(status.message)
            } else {
                TagApiError::Operation {
                    code: status.code,
                    message: status.message,
                }
            }),
            _ => Ok(self),
        }
    }
}

/// A tag in effect on a resource, directly bound or inherited.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveTag {
    pub tag_value: String,

    #[serde(default)]
    pub namespaced_tag_value: Option<String>,

    #[serde(default)]
    pub tag_key: Option<String>,

    #[serde(default)]
    pub namespaced_tag_key: Option<String>,

    #[serde(default)]
    pub inherited: bool,
}

/// Tagging API client bound to one zone.
#[async_trait]
pub trait ZoneClient: Send + Sync {
    /// The zone this client is bound to.
    fn zone(&self) -> &str;

    /// Bind a tag value to a resource.
    async fn create_tag_binding(
        &self,
        parent: &ResourceName,
        tag_value: &TagValue,
    ) -> Result<Operation, TagApiError>;

    /// List the tags in effect on a resource.
    async fn list_effective_tags(
        &self,
        parent: &ResourceName,
    ) -> Result<Vec<EffectiveTag>, TagApiError>;
}

/// Creates zone clients.
#[async_trait]
pub trait ZoneClientFactory: Send + Sync {
    async fn connect(&self, zone: &str) -> Result<Arc<dyn ZoneClient>, TagApiError>;
}

/// Check that a zone name is safe to splice into a hostname.
pub fn validate_zone(zone: &str) -> Result<(), TagApiError> {
    let valid = !zone.is_empty()
        && !zone.starts_with('-')
        && !zone.ends_with('-')
        && zone
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if valid {
        Ok(())
    } else {
        Err(TagApiError::InvalidZone(zone.to_string()))
    }
}
