//! Cache entries as seen by subscribers.

use crate::error::QueryError;
use crate::key::CacheKey;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

/// Lifecycle of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    /// Known, never fetched
    Idle,
    /// First fetch (or a retry after a failure) in flight
    Pending,
    /// Has a successful result; a background refetch may be in flight
    Fulfilled,
    /// Last fetch failed
    Rejected,
}

/// Snapshot of one cache entry
///
/// `data` is shared: two snapshots taken without an intervening change hold
/// the same `Arc`, so selectors can compare by identity.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Entry identity
    pub key: CacheKey,
    /// Arguments the entry was requested with
    pub args: Arc<Value>,
    /// Lifecycle status
    pub status: QueryStatus,
    /// Last result, including any pending optimistic patches
    pub data: Option<Arc<Value>>,
    /// Failure of the last fetch, set exactly when `status` is `Rejected`
    pub error: Option<QueryError>,
    /// When the last successful fetch landed
    pub fulfilled_at: Option<DateTime<Utc>>,
    /// End of the freshness window
    pub expires_at: Option<DateTime<Utc>>,
    /// Marked stale by a tag invalidation
    pub invalidated: bool,
    /// A fetch for this key is in flight
    pub fetching: bool,
    /// `data` includes patches the server has not confirmed yet
    pub optimistic: bool,
    /// Live subscriptions
    pub subscribers: usize,
}

impl CacheEntry {
    pub(crate) fn new(key: CacheKey, args: Arc<Value>) -> Self {
        Self {
            key,
            args,
            status: QueryStatus::Idle,
            data: None,
            error: None,
            fulfilled_at: None,
            expires_at: None,
            invalidated: false,
            fetching: false,
            optimistic: false,
            subscribers: 0,
        }
    }

    /// Stale entries are refetched on the next request
    ///
    /// An entry is stale once more than its freshness window has passed or a tag it
    /// provides was invalidated. Entries without a result are never stale;
    /// they have nothing to serve.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.status == QueryStatus::Fulfilled
            && (self.invalidated || self.expires_at.is_none_or(|expires| now > expires))
    }

    /// True for `Fulfilled`
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Fulfilled
    }

    /// True while nothing can be shown yet
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.fetching
    }

    /// Deserialize the result into a typed value
    ///
    /// # Errors
    ///
    /// Returns the serde error if the data does not match `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.data
            .as_deref()
            .map(|data| serde_json::from_value(data.clone()))
    }
}
