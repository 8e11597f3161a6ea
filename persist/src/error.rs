//! Persistence errors.
//!
//! These never escape the reconciler's observer path: a failed write
//! degrades persistence and a bad payload falls back to the default. They
//! are returned by the explicit operations ([`purge`]) and used in logs.
//!
//! [`purge`]: crate::PersistenceReconciler::purge

use marquee_core::error::StorageError;
use thiserror::Error;

/// Persistence failure
#[derive(Error, Debug)]
pub enum PersistError {
    /// The payload is not valid JSON, or does not fit the state type
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The storage medium failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The record was written by an incompatible schema version
    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Version this build writes
        expected: u32,
        /// Version found in the record
        found: u32,
    },
}
