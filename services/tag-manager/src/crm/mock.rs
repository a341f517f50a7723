//! In-memory tagging API for testing and development.
//!
//! The mock keeps a set of bound tag values per resource, so a repeated
//! binding is answered with `AlreadyExists` like the real API.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use securetag_reconcile::{ResourceName, TagValue};
use tokio::sync::Mutex;
use tracing::info;

use super::{
    validate_zone, EffectiveTag, Operation, OperationStatus, TagApiError, ZoneClient,
    ZoneClientFactory,
};

/// Mock zone client.
pub struct MockZoneClient {
    zone: String,
    bound: Mutex<HashMap<ResourceName, BTreeSet<TagValue>>>,
    failing: Mutex<HashMap<TagValue, TagApiError>>,
    failing_ops: Mutex<HashMap<TagValue, OperationStatus>>,
    create_calls: AtomicUsize,
    op_counter: AtomicU64,
}

impl MockZoneClient {
    pub fn new(zone: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            bound: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashMap::new()),
            failing_ops: Mutex::new(HashMap::new()),
            create_calls: AtomicUsize::new(0),
            op_counter: AtomicU64::new(0),
        }
    }

    /// Make every binding of `tag_value` fail with `error`.
    pub async fn fail_tag(&self, tag_value: TagValue, error: TagApiError) {
        self.failing.lock().await.insert(tag_value, error);
    }

    /// Accept bindings of `tag_value` but finish the operation with `status`.
    pub async fn fail_operation(&self, tag_value: TagValue, status: OperationStatus) {
        self.failing_ops.lock().await.insert(tag_value, status);
    }

    /// Number of binding requests received, including failed ones.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Tag values currently bound to a resource.
    pub async fn bound(&self, parent: &ResourceName) -> BTreeSet<TagValue> {
        self.bound
            .lock()
            .await
            .get(parent)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ZoneClient for MockZoneClient {
    fn zone(&self) -> &str {
        &self.zone
    }

    async fn create_tag_binding(
        &self,
        parent: &ResourceName,
        tag_value: &TagValue,
    ) -> Result<Operation, TagApiError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.failing.lock().await.get(tag_value) {
            return Err(error.clone());
        }

        let n = self.op_counter.fetch_add(1, Ordering::SeqCst);
        let name = format!("operations/rctb.{}.{n:016x}", self.zone);

        if let Some(status) = self.failing_ops.lock().await.get(tag_value) {
            return Ok(Operation {
                name,
                done: true,
                error: Some(status.clone()),
            });
        }

        let mut bound = self.bound.lock().await;
        if !bound.entry(parent.clone()).or_default().insert(tag_value.clone()) {
            return Err(TagApiError::AlreadyExists(format!(
                "{tag_value} is already bound to {parent}"
            )));
        }

        info!(parent = %parent, tag_value = %tag_value, "[MOCK] Tag binding created");
        Ok(Operation {
            name,
            done: true,
            error: None,
        })
    }

    async fn list_effective_tags(
        &self,
        parent: &ResourceName,
    ) -> Result<Vec<EffectiveTag>, TagApiError> {
        Ok(self
            .bound(parent)
            .await
            .into_iter()
            .map(|value| EffectiveTag {
                tag_value: value.to_string(),
                namespaced_tag_value: None,
                tag_key: None,
                namespaced_tag_key: None,
                inherited: false,
            })
            .collect())
    }
}

/// Factory handing out one [`MockZoneClient`] per zone.
#[derive(Default)]
pub struct MockZoneClientFactory {
    clients: Mutex<HashMap<String, Arc<MockZoneClient>>>,
    connects: AtomicUsize,
    failing_zones: Mutex<BTreeSet<String>>,
}

impl MockZoneClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make connecting to `zone` fail until [`Self::heal_zone`] is called.
    pub async fn fail_zone(&self, zone: &str) {
        self.failing_zones.lock().await.insert(zone.to_string());
    }

    pub async fn heal_zone(&self, zone: &str) {
        self.failing_zones.lock().await.remove(zone);
    }

    /// Number of connection attempts, successful or not.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// The mock client for a zone, created on first use.
    pub async fn client(&self, zone: &str) -> Arc<MockZoneClient> {
        Arc::clone(
            self.clients
                .lock()
                .await
                .entry(zone.to_string())
                .or_insert_with(|| Arc::new(MockZoneClient::new(zone))),
        )
    }
}

#[async_trait]
impl ZoneClientFactory for MockZoneClientFactory {
    async fn connect(&self, zone: &str) -> Result<Arc<dyn ZoneClient>, TagApiError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        validate_zone(zone)?;

        if self.failing_zones.lock().await.contains(zone) {
            return Err(TagApiError::ClientSetup {
                zone: zone.to_string(),
                message: "[MOCK] zone configured to fail".to_string(),
            });
        }

        // Simulate endpoint setup latency so concurrent callers overlap.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let client: Arc<dyn ZoneClient> = self.client(zone).await;
        Ok(client)
    }
}
