//! # Marquee Query
//!
//! Client-side cache of remote query results for the Marquee storefront.
//!
//! - [`QueryCache`] stores one entry per `(endpoint, canonical args)`,
//!   coalesces concurrent fetches, serves stale data while revalidating and
//!   evicts entries nobody has used for their retention window.
//! - [`TagGraph`] tracks which entries provide which [`Tag`]s, so a
//!   confirmed mutation can mark exactly the affected entries stale.
//! - [`QueryCache::mutate`] applies optimistic [`Patch`]es and rolls them
//!   back when the server rejects the write.
//!
//! ## Example
//!
//! ```ignore
//! use marquee_query::{Api, Endpoint, QueryCache, QueryEnvironment, RequestOptions};
//! use marquee_query::tag::list_tags;
//!
//! let api = Api::new().endpoint(
//!     Endpoint::query("getEvents", "/events")
//!         .provides(|result, _| list_tags("EventList", "Event", result)),
//! );
//! let cache = QueryCache::new(api, QueryEnvironment::new(http));
//!
//! let mut handle = cache.request("getEvents", &json!({ "city": "lisbon" }), RequestOptions::default())?;
//! let entry = handle.resolve().await;
//! ```

/// Entry store, subscriptions and fetch lifecycle
pub mod cache;

/// Endpoint definitions and registry
pub mod endpoint;

/// Entry snapshots and status
pub mod entry;

/// Query and mutation errors
pub mod error;

/// Tag ↔ key index
pub mod graph;

/// `reqwest` HTTP collaborator
pub mod http;

/// Canonical cache keys
pub mod key;

/// Optimistic mutations
pub mod mutation;

/// Optimistic patches
pub mod patch;

/// Invalidation tags
pub mod tag;

pub use cache::{QueryCache, QueryEnvironment, QueryHandle, RequestOptions};
pub use endpoint::{Api, CacheConfig, Endpoint, EndpointKind};
pub use entry::{CacheEntry, QueryStatus};
pub use error::QueryError;
pub use graph::TagGraph;
pub use http::ReqwestHttpClient;
pub use key::CacheKey;
pub use mutation::OptimisticUpdate;
pub use patch::Patch;
pub use tag::Tag;
