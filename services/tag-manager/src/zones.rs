//! Per-zone tagging client cache.
//!
//! Clients are created lazily on first use and kept for the life of the
//! process. Each zone has its own once-cell, so concurrent callers for one
//! zone share a single construction while other zones proceed independently.
//! A failed construction removes the empty cell so the next caller retries
//! and rejected zones never accumulate in the map.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::crm::{validate_zone, TagApiError, ZoneClient, ZoneClientFactory};

type ZoneCell = Arc<OnceCell<Arc<dyn ZoneClient>>>;

/// Lazily populated zone to client mapping.
pub struct ZoneClientCache {
    factory: Arc<dyn ZoneClientFactory>,
    cells: Mutex<HashMap<String, ZoneCell>>,
}

impl ZoneClientCache {
    pub fn new(factory: Arc<dyn ZoneClientFactory>) -> Self {
        Self {
            factory,
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Get the client for a zone, creating it on first use.
    pub async fn get_client(&self, zone: &str) -> Result<Arc<dyn ZoneClient>, TagApiError> {
        validate_zone(zone)?;

        // The map lock only covers the check-then-insert of the cell.
        let cell = Arc::clone(self.cells.lock().await.entry(zone.to_string()).or_default());

        let result = cell
            .get_or_try_init(|| async {
                debug!(zone = %zone, "Creating zone client");
                self.factory.connect(zone).await.inspect_err(|e| {
                    warn!(zone = %zone, error = %e, "Failed to create zone client");
                })
            })
            .await
            .map(Arc::clone);

        if result.is_err() {
            self.evict_empty(zone, &cell).await;
        }

        result
    }

    /// Drop the cell for `zone` if it is still ours and was never filled.
    async fn evict_empty(&self, zone: &str, cell: &ZoneCell) {
        let mut cells = self.cells.lock().await;
        let stale = cells
            .get(zone)
            .is_some_and(|current| Arc::ptr_eq(current, cell) && !current.initialized());
        if stale {
            cells.remove(zone);
        }
    }

    /// Number of zones with a ready client.
    pub async fn len(&self) -> usize {
        self.cells
            .lock()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
