//! Storefront errors.

use marquee_persist::PersistError;
use marquee_query::QueryError;
use marquee_runtime::StoreError;
use thiserror::Error;

/// Errors surfaced by [`crate::Storefront`]
#[derive(Error, Debug)]
pub enum StorefrontError {
    /// A query or mutation failed
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The store rejected an action
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Removing persisted state failed
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// A response did not have the expected shape
    #[error("Unexpected response from {endpoint}: {source}")]
    Decode {
        /// Endpoint that answered
        endpoint: &'static str,
        /// Decoding failure
        #[source]
        source: serde_json::Error,
    },
}
