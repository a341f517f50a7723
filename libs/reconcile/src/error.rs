//! Error types for descriptor extraction.

use thiserror::Error;

/// Errors for records that have the expected shape but cannot be interpreted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// A resource location label is missing or empty.
    #[error("record {insert_id} is missing resource label {label}")]
    MissingLabel {
        insert_id: String,
        label: &'static str,
    },

    /// A request field has an unexpected type.
    #[error("record {insert_id} has malformed request field {field}")]
    MalformedRequest {
        insert_id: String,
        field: &'static str,
    },
}
