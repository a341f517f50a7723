//! Error types for audit record decoding.

use thiserror::Error;

/// Errors that can occur when decoding audit records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditError {
    /// The log entry JSON could not be decoded.
    #[error("invalid log entry: {0}")]
    InvalidLogEntry(String),

    /// The push envelope JSON could not be decoded.
    #[error("invalid push envelope: {0}")]
    InvalidEnvelope(String),

    /// The envelope message data is not valid base64.
    #[error("invalid message data: {0}")]
    InvalidData(String),
}
