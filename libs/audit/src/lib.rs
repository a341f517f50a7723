//! # securetag-audit
//!
//! Decoded audit log records for compute instance creation events.
//!
//! ## Design Principles
//!
//! - Records are immutable once decoded
//! - The payload is a sum type: only the audit log subtype is understood,
//!   every other payload is kept as an opaque type URL
//! - Decoding works on the JSON encoding of a log entry; the outer Pub/Sub
//!   push envelope is unwrapped by [`PushEnvelope`]

mod entry;
mod error;
mod pubsub;

pub use entry::*;
pub use error::AuditError;
pub use pubsub::*;
