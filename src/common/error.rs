//! Error types for tournd

use thiserror::Error;

use crate::common::wire;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Store Errors ===
    #[error("Store could not process the write, node rolled back: {0}")]
    StoreError(String),

    #[error("Connection to the coordination store has been lost")]
    StoreUnavailable,

    #[error("No such node: {0}")]
    NoSuchNode(String),

    #[error("Node already exists: {0}")]
    NodeExists(String),

    #[error("Lock on {0} could not be acquired within {1:?}")]
    LockTimeout(String, std::time::Duration),

    // === Validation Errors ===
    #[error("Invalid character in classification string: {0:?}")]
    ClassificationValue(char),

    #[error("Invalid length for classification string: expected {expected}, got {actual}")]
    ClassificationLength { expected: usize, actual: usize },

    // === Gate Errors ===
    #[error("Password does not match")]
    PasswordMismatch,

    #[error("Version of the data does not match: expected {expected}, stored {stored}")]
    VersionMismatch { expected: u64, stored: u64 },

    // === Wire Errors ===
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("No endpoints available")]
    NoEndpoints,

    #[error("No reply within {0:?}")]
    ReplyTimeout(std::time::Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic ===
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this worth retrying against a different endpoint?
    ///
    /// Connection-level failures and store unavailability are transient from
    /// the client's point of view; everything else is an authoritative answer.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::ReplyTimeout(_) | Error::StoreUnavailable
        )
    }

    /// Convert to the numeric code carried in the response envelope.
    pub fn wire_code(&self) -> i32 {
        match self {
            Error::StoreUnavailable => wire::CODE_UNAVAILABLE,
            Error::MalformedRequest(_) | Error::NoEndpoints => wire::CODE_MALFORMED,
            _ => wire::CODE_OP_FAILED,
        }
    }
}

// Implement From for common error types
impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_code_mapping() {
        assert_eq!(Error::StoreUnavailable.wire_code(), -2);
        assert_eq!(Error::MalformedRequest("bad".into()).wire_code(), -1);
        assert_eq!(Error::NoEndpoints.wire_code(), -1);
        assert_eq!(Error::PasswordMismatch.wire_code(), -3);
        assert_eq!(
            Error::VersionMismatch {
                expected: 1,
                stored: 2
            }
            .wire_code(),
            -3
        );
        assert_eq!(
            Error::LockTimeout("/t".into(), std::time::Duration::from_millis(500)).wire_code(),
            -3
        );
    }

    #[test]
    fn test_retryable() {
        assert!(Error::StoreUnavailable.is_retryable());
        assert!(Error::ReplyTimeout(std::time::Duration::from_millis(750)).is_retryable());
        assert!(!Error::PasswordMismatch.is_retryable());
        assert!(!Error::NoEndpoints.is_retryable());
    }
}
