//! VM descriptor and the identifiers derived from it.

use serde::Serialize;

use crate::TAG_VALUE_PREFIX;

/// Normalized view of a newly created VM.
///
/// Built once per accepted record and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmDescriptor {
    /// Insert id of the record the descriptor was built from.
    pub event_id: String,

    /// Self link of the created instance, empty when the response lacks one.
    pub target_link: String,

    pub instance_id: String,
    pub zone: String,
    pub project_id: String,

    /// Instance template name, set for MIG and GKE node pool instances.
    pub template: Option<String>,

    /// Network tags in request order.
    pub network_tags: Vec<String>,
}

impl VmDescriptor {
    /// The canonical resource name of the VM.
    pub fn resource_name(&self) -> ResourceName {
        ResourceName::for_instance(&self.project_id, &self.zone, &self.instance_id)
    }
}

/// Full resource name of a compute instance.
///
/// Example: `//compute.googleapis.com/projects/my-project/zones/us-west1-a/instances/689579460943534750`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ResourceName(String);

impl ResourceName {
    pub fn for_instance(project_id: &str, zone: &str, instance_id: &str) -> Self {
        Self(format!(
            "//compute.googleapis.com/projects/{project_id}/zones/{zone}/instances/{instance_id}"
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tag value identifier (`tagValues/<id>`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TagValue(String);

impl TagValue {
    /// Build a tag value from its numeric id.
    pub fn from_id(id: &str) -> Self {
        Self(format!("{TAG_VALUE_PREFIX}{id}"))
    }

    /// Parse a full identifier, returning `None` if it lacks the namespace
    /// prefix or the id part is empty.
    pub fn parse(value: &str) -> Option<Self> {
        match value.strip_prefix(TAG_VALUE_PREFIX) {
            Some(id) if !id.is_empty() => Some(Self(value.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
