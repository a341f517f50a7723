//! Desired tag resolution.
//!
//! Resolvers map a [`VmDescriptor`] to the set of tag values it should carry.
//! They never fail: a descriptor with no matching attributes resolves to an
//! empty set.

use std::collections::BTreeSet;

use crate::{TagValue, VmDescriptor, DEFAULT_NETWORK_TAG_PREFIX};

/// Strategy for deriving desired tags from a descriptor.
///
/// Implementations must be deterministic and order-independent, since the
/// same event may be delivered more than once.
pub trait TagResolver: Send + Sync {
    fn resolve(&self, vm: &VmDescriptor) -> BTreeSet<TagValue>;
}

/// Resolves tag values encoded in network tags.
///
/// A network tag `stv-642676120853` resolves to `tagValues/642676120853`.
#[derive(Debug, Clone)]
pub struct NetworkTagResolver {
    prefix: String,
}

impl NetworkTagResolver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for NetworkTagResolver {
    fn default() -> Self {
        Self::new(DEFAULT_NETWORK_TAG_PREFIX)
    }
}

impl TagResolver for NetworkTagResolver {
    fn resolve(&self, vm: &VmDescriptor) -> BTreeSet<TagValue> {
        vm.network_tags
            .iter()
            .filter_map(|tag| tag.strip_prefix(self.prefix.as_str()))
            .filter(|id| !id.is_empty())
            .map(TagValue::from_id)
            .collect()
    }
}

/// Resolves tag values from the instance template name.
///
/// Rules match on the template's final path segment by prefix, so
/// `web-` covers `projects/1/global/instanceTemplates/web-v3`.
#[derive(Debug, Clone, Default)]
pub struct TemplateResolver {
    rules: Vec<(String, TagValue)>,
}

impl TemplateResolver {
    pub fn new(rules: Vec<(String, TagValue)>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl TagResolver for TemplateResolver {
    fn resolve(&self, vm: &VmDescriptor) -> BTreeSet<TagValue> {
        let Some(template) = vm.template.as_deref() else {
            return BTreeSet::new();
        };
        let name = template.rsplit('/').next().unwrap_or(template);

        self.rules
            .iter()
            .filter(|(prefix, _)| name.starts_with(prefix.as_str()))
            .map(|(_, value)| value.clone())
            .collect()
    }
}

/// Union of several resolvers.
#[derive(Default)]
pub struct CompositeResolver {
    resolvers: Vec<Box<dyn TagResolver>>,
}

impl CompositeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resolver: impl TagResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }
}

impl TagResolver for CompositeResolver {
    fn resolve(&self, vm: &VmDescriptor) -> BTreeSet<TagValue> {
        self.resolvers
            .iter()
            .flat_map(|resolver| resolver.resolve(vm))
            .collect()
    }
}
