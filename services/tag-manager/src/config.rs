//! Tag manager configuration (env-driven).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use securetag_reconcile::{
    CompositeResolver, NetworkTagResolver, TagValue, TemplateResolver, DEFAULT_NETWORK_TAG_PREFIX,
};

use crate::auth::DEFAULT_METADATA_TOKEN_URL;
use crate::crm::DEFAULT_ENDPOINT_TEMPLATE;

#[derive(Debug, Clone)]
pub struct Config {
    /// Address to serve the event endpoints on.
    pub listen_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Zonal tagging endpoint template with a `{zone}` placeholder.
    pub endpoint_template: String,

    /// Network tag prefix that encodes a tag value id.
    pub network_tag_prefix: String,

    /// Instance template prefix rules, in declaration order.
    pub template_tags: Vec<(String, TagValue)>,

    /// Static access token; the metadata server is used when unset.
    pub access_token: Option<String>,

    /// Metadata server token URL.
    pub metadata_token_url: String,

    /// Timeout for each tagging API request.
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Cloud Run injects PORT; an explicit listen address wins.
        let listen_addr: SocketAddr = match std::env::var("SECURETAG_LISTEN_ADDR") {
            Ok(addr) => addr,
            Err(_) => {
                let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
                format!("0.0.0.0:{port}")
            }
        }
        .parse()
        .context("SECURETAG_LISTEN_ADDR (or PORT) must form a socket address.")?;

        let log_level = std::env::var("SECURETAG_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let endpoint_template = std::env::var("SECURETAG_ENDPOINT_TEMPLATE")
            .unwrap_or_else(|_| DEFAULT_ENDPOINT_TEMPLATE.to_string());
        if !endpoint_template.contains("{zone}") {
            bail!("SECURETAG_ENDPOINT_TEMPLATE must contain a {{zone}} placeholder.");
        }

        let network_tag_prefix = std::env::var("SECURETAG_NETWORK_TAG_PREFIX")
            .unwrap_or_else(|_| DEFAULT_NETWORK_TAG_PREFIX.to_string());

        let template_tags = match std::env::var("SECURETAG_TEMPLATE_TAGS") {
            Ok(raw) => parse_template_tags(&raw).context("Invalid SECURETAG_TEMPLATE_TAGS.")?,
            Err(_) => Vec::new(),
        };

        let access_token = std::env::var("SECURETAG_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        let metadata_token_url = std::env::var("SECURETAG_METADATA_URL")
            .unwrap_or_else(|_| DEFAULT_METADATA_TOKEN_URL.to_string());

        let request_timeout_ms: u64 = std::env::var("SECURETAG_REQUEST_TIMEOUT_MS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("SECURETAG_REQUEST_TIMEOUT_MS must be an integer (milliseconds).")?
            .unwrap_or(30_000);
        let request_timeout = Duration::from_millis(request_timeout_ms.max(100));

        Ok(Self {
            listen_addr,
            log_level,
            endpoint_template,
            network_tag_prefix,
            template_tags,
            access_token,
            metadata_token_url,
            request_timeout,
        })
    }

    /// Build the tag resolver for this configuration.
    pub fn tag_resolver(&self) -> CompositeResolver {
        let resolver =
            CompositeResolver::new().with(NetworkTagResolver::new(self.network_tag_prefix.clone()));

        if self.template_tags.is_empty() {
            resolver
        } else {
            resolver.with(TemplateResolver::new(self.template_tags.clone()))
        }
    }
}

/// Parse `prefix=tagValues/N` pairs separated by commas.
pub fn parse_template_tags(raw: &str) -> Result<Vec<(String, TagValue)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| -> Result<(String, TagValue)> {
            let (prefix, value) = pair
                .split_once('=')
                .with_context(|| format!("expected prefix=tagValues/N, got {pair:?}"))?;
            let prefix = prefix.trim();
            if prefix.is_empty() {
                bail!("empty template prefix in {pair:?}");
            }
            let value = TagValue::parse(value.trim())
                .with_context(|| format!("invalid tag value in {pair:?}"))?;
            Ok((prefix.to_string(), value))
        })
        .collect()
}
