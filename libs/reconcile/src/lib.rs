//! Reconciliation primitives for secure tag bindings.
//!
//! This library turns a decoded instance creation audit record into the set
//! of tag values the instance should carry. Key concepts:
//!
//! - **Descriptor**: the normalized view of a newly created VM ([`VmDescriptor`]).
//! - **Desired tags**: the tag values derived from the descriptor ([`TagResolver`]).
//! - **Resource name**: the canonical address tag bindings are attached to.
//!
//! # Invariants
//!
//! - All operations are pure and deterministic given the same inputs
//! - Records that are not the first of their operation are always skipped
//! - Resolution is order-independent and duplicate-tolerant, so redelivered
//!   events converge on the same desired set

mod descriptor;
mod error;
pub mod extract;
pub mod resolve;

pub use descriptor::{ResourceName, TagValue, VmDescriptor};
pub use error::ExtractError;
pub use extract::{extract, Extraction, SkipReason};
pub use resolve::{CompositeResolver, NetworkTagResolver, TagResolver, TemplateResolver};

/// Namespace prefix of tag value identifiers.
pub const TAG_VALUE_PREFIX: &str = "tagValues/";

/// Default network tag prefix that marks a tag value id.
pub const DEFAULT_NETWORK_TAG_PREFIX: &str = "stv-";

/// Instance metadata key carrying the instance template used by a MIG.
pub const INSTANCE_TEMPLATE_METADATA_KEY: &str = "instance-template";
