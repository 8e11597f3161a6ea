//! # Marquee Testing
//!
//! Testing utilities and helpers for the Marquee storefront state layer.
//!
//! This crate provides:
//! - Mock implementations of the collaborator traits (clock, HTTP, storage, token)
//! - A Given-When-Then harness for slice reducers
//! - Property-based testing strategies for JSON arguments and state
//!
//! ## Example
//!
//! ```ignore
//! use marquee_testing::{test_clock, MockHttpClient};
//! use marquee_core::http::{HttpResponse, Method};
//!
//! #[tokio::test]
//! async fn events_are_fetched_once() {
//!     let http = MockHttpClient::new();
//!     http.respond(Method::Get, "/events", HttpResponse::ok(json!([])));
//!
//!     let cache = QueryCache::new(api(), environment(http.clone(), test_clock()));
//!     let _ = cache.fetch("getEvents", &json!({}), RequestOptions::default()).await;
//!
//!     assert_eq!(http.call_count(Method::Get, "/events"), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use marquee_core::environment::{Clock, TokenSupplier};

/// Scripted HTTP collaborator
pub mod http_mocks;

/// In-memory persistent storage with failure injection
pub mod storage_mocks;


/// Mock implementations of the clock and token collaborators.
pub mod mocks {
    use super::{Clock, DateTime, TokenSupplier, Utc};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use marquee_testing::mocks::FixedClock;
    /// use marquee_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Clock that only moves when the test advances it
    ///
    /// Clones share the same time, so a test can keep one handle and give
    /// another to the cache.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Start at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Start at the same instant as [`test_clock`]
        #[must_use]
        pub fn starting_at_test_epoch() -> Self {
            Self::new(test_clock().now())
        }

        /// Move the clock forward
        ///
        /// # Panics
        ///
        /// Panics if `by` does not fit a `chrono::Duration`.
        #[allow(clippy::expect_used)]
        pub fn advance(&self, by: Duration) {
            let delta = chrono::Duration::from_std(by).expect("advance fits a chrono duration");
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += delta;
        }

        /// Jump to an absolute time
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Token supplier returning a fixed value
    #[derive(Debug, Clone, Default)]
    pub struct StaticToken(Option<String>);

    impl StaticToken {
        /// Signed-in session with `token`
        #[must_use]
        pub fn signed_in(token: impl Into<String>) -> Self {
            Self(Some(token.into()))
        }

        /// Anonymous session
        #[must_use]
        pub const fn anonymous() -> Self {
            Self(None)
        }
    }

    impl TokenSupplier for StaticToken {
        fn token(&self) -> Option<String> {
            self.0.clone()
        }
    }
}

/// Test helpers and utilities.
pub mod helpers {
    /// Install a `tracing` subscriber that writes through the test harness
    ///
    /// Safe to call from every test; only the first call installs anything.
    /// Honors `RUST_LOG`, defaulting to `marquee=debug`.
    pub fn init_tracing() {
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("marquee=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::collection::{btree_map, vec};
    use proptest::prelude::*;
    use serde_json::{Map, Value};

    /// Scalar JSON values (null, bools, integers, short strings)
    pub fn arb_json_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 _-]{0,12}".prop_map(Value::String),
        ]
    }

    /// Arbitrary JSON values nested up to three levels
    pub fn arb_json() -> impl Strategy<Value = Value> {
        arb_json_scalar().prop_recursive(3, 48, 6, |inner| {
            prop_oneof![
                vec(inner.clone(), 0..5).prop_map(Value::Array),
                btree_map("[a-z]{1,6}", inner, 0..5)
                    .prop_map(|fields| Value::Object(fields.into_iter().collect::<Map<_, _>>())),
            ]
        })
    }

    /// Arbitrary JSON objects, the shape of query arguments and slice state
    pub fn arb_json_object() -> impl Strategy<Value = Value> {
        btree_map("[a-z]{1,6}", arb_json(), 0..6)
            .prop_map(|fields| Value::Object(fields.into_iter().collect::<Map<_, _>>()))
    }
}

// Re-export commonly used items
pub use http_mocks::MockHttpClient;
pub use mocks::{FixedClock, ManualClock, StaticToken, test_clock};
pub use reducer_test::ReducerTest;
pub use storage_mocks::InMemoryStorage;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn test_manual_clock_advances_all_clones() {
        let clock = ManualClock::starting_at_test_epoch();
        let shared = clock.clone();
        let start = clock.now();

        shared.advance(Duration::from_secs(90));

        assert_eq!(clock.now() - start, chrono::Duration::seconds(90));
    }

    #[test]
    fn test_static_token() {
        assert_eq!(StaticToken::signed_in("t-1").token().as_deref(), Some("t-1"));
        assert_eq!(StaticToken::anonymous().token(), None);
    }
}
