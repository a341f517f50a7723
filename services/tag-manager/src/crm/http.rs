//! HTTP implementation of the zonal tagging API (Resource Manager v3).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use securetag_reconcile::{ResourceName, TagValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{validate_zone, EffectiveTag, Operation, TagApiError, ZoneClient, ZoneClientFactory};
use crate::auth::TokenSource;

const EFFECTIVE_TAGS_PAGE_SIZE: &str = "100";
const EFFECTIVE_TAGS_MAX_PAGES: usize = 100;

/// Builds [`HttpZoneClient`]s from an endpoint template.
pub struct HttpZoneClientFactory {
    endpoint_template: String,
    token_source: Arc<dyn TokenSource>,
    request_timeout: Duration,
}

impl HttpZoneClientFactory {
    pub fn new(
        endpoint_template: impl Into<String>,
        token_source: Arc<dyn TokenSource>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            endpoint_template: endpoint_template.into(),
            token_source,
            request_timeout,
        }
    }

    /// The base URL of a zone's endpoint, always ending in `/`.
    pub fn endpoint_for(&self, zone: &str) -> Result<Url, TagApiError> {
        validate_zone(zone)?;

        let mut endpoint = self.endpoint_template.replace("{zone}", zone);
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }

        Url::parse(&endpoint).map_err(|e| TagApiError::ClientSetup {
            zone: zone.to_string(),
            message: format!("invalid endpoint {endpoint}: {e}"),
        })
    }
}

#[async_trait]
impl ZoneClientFactory for HttpZoneClientFactory {
    async fn connect(&self, zone: &str) -> Result<Arc<dyn ZoneClient>, TagApiError> {
        let endpoint = self.endpoint_for(zone)?;

        let http = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| TagApiError::ClientSetup {
                zone: zone.to_string(),
                message: e.to_string(),
            })?;

        info!(zone = %zone, endpoint = %endpoint, "Created zonal tagging client");

        Ok(Arc::new(HttpZoneClient {
            zone: zone.to_string(),
            endpoint,
            http,
            token_source: Arc::clone(&self.token_source),
        }))
    }
}

/// Tagging API client for one zonal endpoint.
pub struct HttpZoneClient {
    zone: String,
    endpoint: Url,
    http: reqwest::Client,
    token_source: Arc<dyn TokenSource>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TagBindingRequest<'a> {
    parent: &'a str,
    tag_value: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEffectiveTagsResponse {
    #[serde(default)]
    effective_tags: Vec<EffectiveTag>,

    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,

    #[serde(default)]
    status: String,
}

impl HttpZoneClient {
    fn url(&self, path: &str) -> Result<Url, TagApiError> {
        self.endpoint.join(path).map_err(|e| TagApiError::ClientSetup {
            zone: self.zone.clone(),
            message: e.to_string(),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, TagApiError> {
        let token = self.token_source.token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| TagApiError::Transport(e.to_string()))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(api_error(status, &body))
    }
}

/// Map a non-success response to an error.
///
/// Creating a binding that already exists is answered with `409` and status
/// `ALREADY_EXISTS`; both are mapped to [`TagApiError::AlreadyExists`].
fn api_error(status: StatusCode, body: &str) -> TagApiError {
    let parsed = serde_json::from_str::<GoogleErrorBody>(body).ok();
    let message = parsed
        .as_ref()
        .map(|b| b.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string());
    let already_exists = parsed
        .as_ref()
        .is_some_and(|b| b.error.status == "ALREADY_EXISTS");

    if status == StatusCode::CONFLICT || already_exists {
        TagApiError::AlreadyExists(message)
    } else {
        TagApiError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl ZoneClient for HttpZoneClient {
    fn zone(&self) -> &str {
        &self.zone
    }

    async fn create_tag_binding(
        &self,
        parent: &ResourceName,
        tag_value: &TagValue,
    ) -> Result<Operation, TagApiError> {
        let url = self.url("v3/tagBindings")?;
        debug!(url = %url, parent = %parent, tag_value = %tag_value, "Creating tag binding");

        let body = TagBindingRequest {
            parent: parent.as_str(),
            tag_value: tag_value.as_str(),
        };

        let response = self.send(self.http.post(url).json(&body)).await?;
        response
            .json::<Operation>()
            .await
            .map_err(|e| TagApiError::Decode(e.to_string()))
    }

    async fn list_effective_tags(
        &self,
        parent: &ResourceName,
    ) -> Result<Vec<EffectiveTag>, TagApiError> {
        let url = self.url("v3/effectiveTags")?;
        let mut tags = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();

        for _ in 0..EFFECTIVE_TAGS_MAX_PAGES {
            let mut query = vec![
                ("parent", parent.as_str()),
                ("pageSize", EFFECTIVE_TAGS_PAGE_SIZE),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let response = self.send(self.http.get(url.clone()).query(&query)).await?;
            let page: ListEffectiveTagsResponse = response.json().await.map_err(|e| {
                error!(parent = %parent, error = %e, "Failed to decode effective tags");
                TagApiError::Decode(e.to_string())
            })?;

            tags.extend(page.effective_tags);
            let Some(next) = page.next_page_token.filter(|t| !t.is_empty()) else {
                return Ok(tags);
            };
            if !seen_tokens.insert(next.clone()) {
                warn!(parent = %parent, page_token = %next, "Effective tags page token repeated");
                return Err(TagApiError::Decode(format!(
                    "effective tags page token {next:?} repeated"
                )));
            }
            page_token = Some(next);
        }

        warn!(parent = %parent, pages = EFFECTIVE_TAGS_MAX_PAGES, "Effective tags page limit reached");
        Err(TagApiError::Decode(format!(
            "effective tags exceeded {EFFECTIVE_TAGS_MAX_PAGES} pages"
        )))
    }
}
