//! Application state shared across request handlers.

use std::sync::Arc;

use crate::driver::ReconciliationDriver;
use crate::zones::ZoneClientCache;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    driver: ReconciliationDriver,
    zones: Arc<ZoneClientCache>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// `zones` must be the cache the driver binds through.
    pub fn new(driver: ReconciliationDriver, zones: Arc<ZoneClientCache>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { driver, zones }),
        }
    }

    pub fn driver(&self) -> &ReconciliationDriver {
        &self.inner.driver
    }

    pub fn zones(&self) -> &ZoneClientCache {
        &self.inner.zones
    }
}
