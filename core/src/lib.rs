//! # Marquee Core
//!
//! Core traits and types for the Marquee storefront state layer.
//!
//! This crate provides the abstractions every other Marquee crate builds on:
//! the Reducer pattern for synchronous domain state, effect descriptions, and
//! the collaborator traits (HTTP, persisted storage, bearer token, clock) that
//! are injected into the query cache and the persistence reconciler.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for a slice (search text, selected city, page)
//! - **Action**: All named transitions a slice accepts
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies via traits
//!
//! ## Example
//!
//! ```ignore
//! use marquee_core::*;
//!
//! #[derive(Clone, Debug, Default)]
//! struct CitiesState {
//!     selected: Option<String>,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum CitiesAction {
//!     SelectCity(String),
//! }
//!
//! impl Reducer for CitiesReducer {
//!     type State = CitiesState;
//!     type Action = CitiesAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut CitiesState,
//!         action: CitiesAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<CitiesAction>; 4]> {
//!         match action {
//!             CitiesAction::SelectCity(city) => state.selected = Some(city),
//!         }
//!         smallvec![Effect::None]
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{smallvec, SmallVec};

/// Reducer composition (`combine_reducers`, `scope_reducer`)
pub mod composition;

/// Collaborator error types
pub mod error;

/// HTTP wire types shared by the query cache and its HTTP collaborator
pub mod http;

/// Memoized derived-state selectors
pub mod selector;

/// Reducer module - The core trait for domain slices
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all slice logic and are deterministic and testable. A reducer
/// never performs I/O itself; a follow-up action it wants later is described
/// by an [`Effect`](crate::effect::Effect) and scheduled by the runtime.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for slice logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The slice state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution) and are composable.
pub mod effect {
    use std::time::Duration;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime. Reducers never
    /// perform I/O; the only deferred work a slice may ask for is a timer that
    /// feeds an action back.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Delayed action
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },
    }

    impl<Action> Effect<Action> {
        /// True for `Effect::None`
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }

        /// Convert the action this effect may produce
        ///
        /// Used when a slice reducer is scoped into the application reducer:
        /// actions fed back by the slice's effects must be wrapped into the
        /// application action type.
        #[must_use]
        pub fn map<B, F>(self, f: F) -> Effect<B>
        where
            F: FnOnce(Action) -> B,
        {
            match self {
                Effect::None => Effect::None,
                Effect::Delay { duration, action } => Effect::Delay {
                    duration,
                    action: Box::new(f(*action)),
                },
            }
        }
    }
}

/// Environment module - Collaborator traits
///
/// All external dependencies are abstracted behind traits and injected into
/// explicitly constructed stores. There are no ambient singletons: a test
/// builds its own clock, HTTP mock and storage and gets an isolated instance.
///
/// The async traits return boxed futures instead of using `async fn` so they
/// stay dyn-compatible (`Arc<dyn HttpClient>`).
pub mod environment {
    use crate::error::{NetworkError, StorageError};
    use crate::http::{HttpRequest, HttpResponse};
    use chrono::{DateTime, Utc};
    use futures::future::BoxFuture;

    /// Clock trait - abstracts time operations for testability
    ///
    /// Used for TTL staleness checks and retention deadlines.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock implementation backed by `Utc::now()`
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// HTTP collaborator used by the query cache and the mutation executor
    ///
    /// A response with a failure status is still `Ok`; only transport failures
    /// (no response at all) are reported as [`NetworkError`].
    pub trait HttpClient: Send + Sync {
        /// Perform one request
        ///
        /// # Errors
        ///
        /// Returns [`NetworkError`] when no response was received.
        fn fetch(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, NetworkError>>;
    }

    /// Persisted key/value storage used by the persistence reconciler
    pub trait PersistentStorage: Send + Sync {
        /// Read the value stored under `key`
        ///
        /// # Errors
        ///
        /// Returns [`StorageError`] when the medium cannot be read.
        fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StorageError>>;

        /// Store `value` under `key`, replacing any previous value
        ///
        /// # Errors
        ///
        /// Returns [`StorageError`] when the medium cannot be written.
        fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<(), StorageError>>;

        /// Delete `key`; deleting a missing key is not an error
        ///
        /// # Errors
        ///
        /// Returns [`StorageError`] when the medium cannot be written.
        fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StorageError>>;
    }

    /// Supplies the current user's bearer credential
    ///
    /// `None` means the request goes out unauthenticated.
    pub trait TokenSupplier: Send + Sync {
        /// Current bearer token, if the user is signed in
        fn token(&self) -> Option<String>;
    }

    impl<F> TokenSupplier for F
    where
        F: Fn() -> Option<String> + Send + Sync,
    {
        fn token(&self) -> Option<String> {
            self()
        }
    }

    /// Token supplier for anonymous sessions
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Anonymous;

    impl TokenSupplier for Anonymous {
        fn token(&self) -> Option<String> {
            None
        }
    }
}
