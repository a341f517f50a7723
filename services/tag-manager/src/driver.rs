//! Event reconciliation: extract, resolve, bind.
//!
//! The driver holds no per-event state and is safe to call concurrently and
//! repeatedly for the same event. Idempotence comes from the components it
//! calls: extraction and resolution are pure, and rebinding an existing tag
//! is recorded as success.

use std::sync::Arc;

use securetag_audit::LogEntry;
use securetag_reconcile::{extract, ExtractError, Extraction, SkipReason, TagResolver};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::binder::{BindReport, TagBinder};
use crate::crm::TagApiError;

/// Reconciliation errors.
#[derive(Debug, Error, Clone)]
pub enum ReconcileError {
    /// The record has the audit log shape but cannot be interpreted.
    #[error("malformed record: {0}")]
    Malformed(#[from] ExtractError),

    /// The zone client could not be acquired; nothing was attempted.
    #[error("zone client unavailable: {0}")]
    ClientUnavailable(#[source] TagApiError),

    /// At least one binding failed. Carries the full report.
    #[error("{failed} of {attempted} tag bindings failed: {last}")]
    Binding {
        failed: usize,
        attempted: usize,
        last: TagApiError,
        report: BindReport,
    },
}

/// Outcome of handling one event.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Every desired tag is bound.
    Accepted(BindReport),

    /// The event is irrelevant.
    Skipped(SkipReason),

    /// The event could not be fully reconciled.
    Failed(ReconcileError),
}

impl Outcome {
    /// Whether the transport should acknowledge the event.
    ///
    /// Everything except malformed input is acknowledged; binding failures
    /// are logged and left to redelivery policy outside this service.
    pub fn is_acknowledged(&self) -> bool {
        !matches!(self, Outcome::Failed(ReconcileError::Malformed(_)))
    }

    /// The bind report, if binding was attempted.
    pub fn report(&self) -> Option<&BindReport> {
        match self {
            Outcome::Accepted(report) => Some(report),
            Outcome::Failed(ReconcileError::Binding { report, .. }) => Some(report),
            _ => None,
        }
    }
}

/// Orchestrates reconciliation for inbound audit events.
#[derive(Clone)]
pub struct ReconciliationDriver {
    resolver: Arc<dyn TagResolver>,
    binder: TagBinder,
}

impl ReconciliationDriver {
    pub fn new(resolver: Arc<dyn TagResolver>, binder: TagBinder) -> Self {
        Self { resolver, binder }
    }

    /// Handle one decoded audit event.
    pub async fn handle(&self, entry: &LogEntry) -> Outcome {
        let vm = match extract(entry) {
            Ok(Extraction::Accepted(vm)) => vm,
            Ok(Extraction::Skip(reason)) => {
                debug!(insert_id = %entry.insert_id, reason = %reason, "Skipping record");
                return Outcome::Skipped(reason);
            }
            Err(e) => {
                warn!(insert_id = %entry.insert_id, error = %e, "Malformed record");
                return Outcome::Failed(e.into());
            }
        };

        let desired = self.resolver.resolve(&vm);
        info!(
            insert_id = %vm.event_id,
            target_link = %vm.target_link,
            zone = %vm.zone,
            template = vm.template.as_deref().unwrap_or(""),
            network_tags = ?vm.network_tags,
            desired = ?desired,
            "Processing first record of instance insert"
        );

        let report = match self.binder.bind(&vm, &desired).await {
            Ok(report) => report,
            Err(e) => {
                error!(insert_id = %vm.event_id, zone = %vm.zone, error = %e, "Zone client unavailable");
                return Outcome::Failed(ReconcileError::ClientUnavailable(e));
            }
        };

        match report.last_error().cloned() {
            None => {
                info!(
                    insert_id = %vm.event_id,
                    resource_name = %report.resource_name,
                    bindings = report.len(),
                    "Reconciliation complete"
                );
                Outcome::Accepted(report)
            }
            Some(last) => {
                let err = ReconcileError::Binding {
                    failed: report.failed_count(),
                    attempted: report.len(),
                    last,
                    report,
                };
                error!(insert_id = %vm.event_id, error = %err, "Reconciliation incomplete");
                Outcome::Failed(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::mock::MockZoneClientFactory;
    use crate::zones::ZoneClientCache;
    use securetag_audit::AUDIT_LOG_TYPE_URL;
    use securetag_reconcile::{NetworkTagResolver, TagValue};

    fn entry(first: bool, zone: &str, tags: serde_json::Value) -> LogEntry {
        serde_json::from_value(serde_json::json!({
            "insertId": "-evt1",
            "operation": {"id": "op-1", "first": first},
            "resource": {
                "type": "gce_instance",
                "labels": {"instance_id": "42", "project_id": "my-project", "zone": zone}
            },
            "protoPayload": {
                "@type": AUDIT_LOG_TYPE_URL,
                "request": {"tags": {"items": tags}},
                "response": {"targetLink": "https://example/instances/vm-1"}
            }
        }))
        .unwrap()
    }

    fn driver(factory: &Arc<MockZoneClientFactory>) -> ReconciliationDriver {
        let zones = Arc::new(ZoneClientCache::new(factory.clone()));
        ReconciliationDriver::new(
            Arc::new(NetworkTagResolver::default()),
            TagBinder::new(zones),
        )
    }

    #[tokio::test]
    async fn test_accepts_and_binds() {
        let factory = Arc::new(MockZoneClientFactory::new());
        let outcome = driver(&factory)
            .handle(&entry(true, "us-west1-a", serde_json::json!(["stv-642676120853", "env-prod"])))
            .await;

        let Outcome::Accepted(report) = &outcome else {
            panic!("expected accepted, got {outcome:?}");
        };
        assert_eq!(report.len(), 1);
        assert_eq!(report.records[0].tag_value, TagValue::from_id("642676120853"));
    }

    #[tokio::test]
    async fn test_skips_non_first() {
        let factory = Arc::new(MockZoneClientFactory::new());
        let outcome = driver(&factory)
            .handle(&entry(false, "us-west1-a", serde_json::json!(["stv-1"])))
            .await;

        assert!(matches!(outcome, Outcome::Skipped(SkipReason::NotFirstOfOperation)));
        assert!(outcome.is_acknowledged());
        assert_eq!(factory.connects(), 0);
    }

    #[tokio::test]
    async fn test_malformed_is_not_acknowledged() {
        let factory = Arc::new(MockZoneClientFactory::new());
        let mut record = entry(true, "us-west1-a", serde_json::json!([]));
        record.resource.labels.clear();

        let outcome = driver(&factory).handle(&record).await;
        assert!(matches!(outcome, Outcome::Failed(ReconcileError::Malformed(_))));
        assert!(!outcome.is_acknowledged());
    }

    #[tokio::test]
    async fn test_binding_failure_is_acknowledged() {
        let factory = Arc::new(MockZoneClientFactory::new());
        factory
            .client("us-west1-a")
            .await
            .fail_tag(
                TagValue::from_id("2"),
                TagApiError::Transport("reset".to_string()),
            )
            .await;

        let outcome = driver(&factory)
            .handle(&entry(true, "us-west1-a", serde_json::json!(["stv-1", "stv-2", "stv-3"])))
            .await;

        assert!(outcome.is_acknowledged());
        let Outcome::Failed(ReconcileError::Binding {
            report, last, failed, ..
        }) = &outcome
        else {
            panic!("expected binding failure, got {outcome:?}");
        };
        assert_eq!(report.len(), 3);
        assert_eq!(*failed, 1);
        assert_eq!(last, &TagApiError::Transport("reset".to_string()));
        assert!(outcome.report().is_some());
    }

    #[tokio::test]
    async fn test_client_unavailable() {
        let factory = Arc::new(MockZoneClientFactory::new());
        factory.fail_zone("us-east1-b").await;

        let outcome = driver(&factory)
            .handle(&entry(true, "us-east1-b", serde_json::json!(["stv-1"])))
            .await;

        assert!(matches!(
            outcome,
            Outcome::Failed(ReconcileError::ClientUnavailable(_))
        ));
        assert!(outcome.is_acknowledged());
    }

    #[tokio::test]
    async fn test_redelivery_converges() {
        let factory = Arc::new(MockZoneClientFactory::new());
        let driver = driver(&factory);
        let record = entry(true, "us-west1-a", serde_json::json!(["stv-7"]));

        let first = driver.handle(&record).await;
        let second = driver.handle(&record).await;

        let (Outcome::Accepted(a), Outcome::Accepted(b)) = (&first, &second) else {
            panic!("expected both accepted: {first:?} {second:?}");
        };
        assert_eq!(a.resource_name, b.resource_name);
        assert_eq!(a.records[0].tag_value, b.records[0].tag_value);
        assert_eq!(
            b.records[0].outcome,
            crate::binder::BindingOutcome::AlreadyBound
        );
    }
}
