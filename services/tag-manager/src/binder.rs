//! Tag binding for a single VM.
//!
//! Every desired tag is attempted independently. A failure on one tag never
//! stops the remaining attempts, and there is no rollback of tags already
//! bound. Each attempt is recorded in the [`BindReport`].

use std::collections::BTreeSet;
use std::sync::Arc;

use securetag_reconcile::{ResourceName, TagValue, VmDescriptor};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::crm::{Operation, TagApiError};
use crate::zones::ZoneClientCache;

/// Result of one binding attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingOutcome {
    /// The binding was accepted.
    Bound { operation: String },

    /// The tag was already bound; equivalent to success.
    AlreadyBound,

    /// The binding failed.
    Failed { error: TagApiError },
}

impl BindingOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, BindingOutcome::Failed { .. })
    }
}

/// A binding attempt for one tag value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRecord {
    pub tag_value: TagValue,
    pub outcome: BindingOutcome,
}

/// Ordered outcomes of a batch of binding attempts for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindReport {
    pub resource_name: ResourceName,
    pub records: Vec<BindingRecord>,
}

impl BindReport {
    fn new(resource_name: ResourceName) -> Self {
        Self {
            resource_name,
            records: Vec::new(),
        }
    }

    /// True if no attempt failed.
    pub fn is_success(&self) -> bool {
        self.records.iter().all(|r| r.outcome.is_success())
    }

    /// The last failure encountered, if any.
    pub fn last_error(&self) -> Option<&TagApiError> {
        self.records.iter().rev().find_map(|r| match &r.outcome {
            BindingOutcome::Failed { error } => Some(error),
            _ => None,
        })
    }

    pub fn failed_count(&self) -> usize {
        self.records.iter().filter(|r| !r.outcome.is_success()).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A serializable summary of each attempt.
    pub fn summary(&self) -> Vec<BindingSummary> {
        self.records
            .iter()
            .map(|r| {
                let (outcome, operation, error) = match &r.outcome {
                    BindingOutcome::Bound { operation } => ("bound", Some(operation.clone()), None),
                    BindingOutcome::AlreadyBound => ("already_bound", None, None),
                    BindingOutcome::Failed { error } => ("failed", None, Some(error.to_string())),
                };
                BindingSummary {
                    tag_value: r.tag_value.to_string(),
                    outcome,
                    operation,
                    error,
                }
            })
            .collect()
    }
}

/// Serializable view of a [`BindingRecord`].
#[derive(Debug, Clone, Serialize)]
pub struct BindingSummary {
    pub tag_value: String,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Applies desired tags to VMs through their zone's client.
#[derive(Clone)]
pub struct TagBinder {
    zones: Arc<ZoneClientCache>,
}

impl TagBinder {
    pub fn new(zones: Arc<ZoneClientCache>) -> Self {
        Self { zones }
    }

    /// Bind every tag in `desired` to the VM.
    ///
    /// Returns an error only if the zone client cannot be acquired, in which
    /// case no binding is attempted. Per-tag failures are in the report.
    pub async fn bind(
        &self,
        vm: &VmDescriptor,
        desired: &BTreeSet<TagValue>,
    ) -> Result<BindReport, TagApiError> {
        let mut report = BindReport::new(vm.resource_name());

        if desired.is_empty() {
            debug!(resource_name = %report.resource_name, "No desired tags");
            return Ok(report);
        }

        let client = self.zones.get_client(&vm.zone).await?;

        for tag_value in desired {
            let outcome = match client
                .create_tag_binding(&report.resource_name, tag_value)
                .await
                .and_then(Operation::into_result)
            {
                Ok(op) => {
                    info!(
                        resource_name = %report.resource_name,
                        tag_value = %tag_value,
                        operation = %op.name,
                        "Tag binding created"
                    );
                    BindingOutcome::Bound { operation: op.name }
                }
                Err(TagApiError::AlreadyExists(message)) => {
                    info!(
                        resource_name = %report.resource_name,
                        tag_value = %tag_value,
                        message = %message,
                        "Tag already bound"
                    );
                    BindingOutcome::AlreadyBound
                }
                Err(error) => {
                    warn!(
                        resource_name = %report.resource_name,
                        tag_value = %tag_value,
                        error = %error,
                        "Tag binding failed"
                    );
                    BindingOutcome::Failed { error }
                }
            };

            report.records.push(BindingRecord {
                tag_value: tag_value.clone(),
                outcome,
            });
        }

        Ok(report)
    }
}
