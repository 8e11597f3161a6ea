//! # Marquee Storefront
//!
//! Client-side state of the event-ticketing storefront: the events and
//! cities slices, the storefront API catalogue, and the [`Storefront`]
//! that wires the query cache, the application store and persistence
//! together.
//!
//! ## Example
//!
//! ```ignore
//! let config = StorefrontConfig::from_env()?;
//! let http = Arc::new(ReqwestHttpClient::new(&config.api_base_url, config.http_timeout)?);
//! let storage = Arc::new(FileStorage::new(&config.storage_dir));
//!
//! let storefront = Storefront::start(&config, StorefrontEnvironment::new(http, storage)).await;
//! storefront.select_city("lisbon").await?;
//! let page = storefront.visible_events().await?;
//! ```

/// Endpoint catalogue
pub mod api;

/// Storefront wiring
pub mod app;

/// Environment configuration
pub mod config;

/// Storefront errors
pub mod error;

/// Derived views
pub mod selectors;

/// Domain slices
pub mod slices;

pub use app::{Storefront, StorefrontEnvironment};
pub use config::{ConfigError, StorefrontConfig};
pub use error::StorefrontError;
pub use selectors::{VisibleEvents, VisibleEventsSelector};
pub use slices::{AppAction, AppReducer, AppState};
