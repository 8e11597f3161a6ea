//! # Marquee Persist
//!
//! Keeps a whitelisted subset of the application state across sessions.
//!
//! The [`PersistenceReconciler`] observes the application store and writes
//! each whitelisted slice to [`PersistentStorage`] under
//! `<root_key>:<slice>`, wrapped in a versioned envelope. On startup it
//! rebuilds the initial state by merging stored slices over the current
//! defaults ([`merge::merge_level2`]), discarding anything that no longer
//! fits. Query cache contents are never persisted.
//!
//! Storage failures never reach the application: the reconciler logs them
//! and carries on in memory for the rest of the session.
//!
//! [`PersistentStorage`]: marquee_core::environment::PersistentStorage
//!
//! ## Example
//!
//! ```ignore
//! let reconciler = PersistenceReconciler::<AppState>::new(
//!     PersistConfig::new(["cities"]),
//!     Arc::new(FileStorage::new(".marquee")),
//! );
//! let store = Store::new(reconciler.rehydrate().await, AppReducer::new(), ());
//! store.observe(Arc::new(reconciler.clone())).await;
//! ```

/// Persistence configuration and record envelope
pub mod config;

/// Persistence errors
pub mod error;

/// Two-level state merge
pub mod merge;

/// Store observer writing and restoring slices
pub mod reconciler;

/// File-backed storage
pub mod storage;

pub use config::PersistConfig;
pub use error::PersistError;
pub use reconciler::PersistenceReconciler;
pub use storage::FileStorage;
