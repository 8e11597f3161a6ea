//! Errors reported by the injected collaborators.

use thiserror::Error;

/// Transport failure: no response was received
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Connection could not be established or was dropped
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The transport gave up waiting for a response
    #[error("Request timed out")]
    Timeout,

    /// A response arrived but its body was not valid JSON
    #[error("Invalid response body: {0}")]
    InvalidBody(String),
}

/// Persistent storage failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The medium is not available in this session (quota, permissions)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A read or write failed
    #[error("Storage I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self::Unavailable(error.to_string()),
            _ => Self::Io(error.to_string()),
        }
    }
}
