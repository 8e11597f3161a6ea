//! # Marquee Runtime
//!
//! Runtime for the Marquee storefront state layer.
//!
//! This crate provides the Store that owns application state, runs slice
//! reducers and executes the effects they describe.
//!
//! ## Core Components
//!
//! - **Store**: The runtime that manages state and executes effects
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to reducers
//! - **State Observers**: Synchronous change notifications, delivered in
//!   state-version order (the persistence reconciler is one)
//!
//! ## Example
//!
//! ```ignore
//! use marquee_runtime::Store;
//!
//! let store = Store::new(AppState::default(), AppReducer::new(), AppEnvironment);
//!
//! store.send(AppAction::Cities(CitiesAction::SelectCity("sf".into()))).await?;
//!
//! let selected = store.state(|s| s.cities.selected.clone()).await;
//! ```

use marquee_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};

/// Prometheus metrics for observability
pub mod metrics;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Effects of one action did not finish in time
        #[error("Timed out waiting for effects")]
        Timeout,
    }
}

pub use error::StoreError;

/// Receives every committed state, synchronously, in version order
///
/// Observers run while the Store still holds its write lock, so a
/// notification for version N+1 can never overtake the one for version N.
/// Implementations must not block: copy what they need and hand any I/O to a
/// background task.
pub trait StateObserver<S>: Send + Sync {
    /// Called after each reducer run with the new state version
    fn state_changed(&self, version: u64, state: &S);
}

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for effects to complete.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(Action::Start).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// // All effects from Action::Start are now complete
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Wait until every effect started by the action has finished
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires before all effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: effect counter shared by one action's effects
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Counter reached zero, notify waiters
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements effect counter on drop
///
/// Ensures the effect counter is always decremented, even if the effect panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

type Observers<S> = Arc<std::sync::RwLock<Vec<Arc<dyn StateObserver<S>>>>>;

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicU64, AtomicUsize, DecrementGuard, Duration,
        Effect, EffectHandle, EffectTracking, Observers, Ordering, Reducer, RwLock,
        StateObserver, StoreError,
    };

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (slice logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    /// 5. State observers, notified once per committed version
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        version: Arc<AtomicU64>,
        observers: Observers<S>,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                version: Arc::new(AtomicU64::new(0)),
                observers: Arc::new(std::sync::RwLock::new(Vec::new())),
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Register a state observer
        ///
        /// The observer immediately receives the current state (so it can
        /// record a baseline) and then every subsequent version.
        pub async fn observe(&self, observer: Arc<dyn StateObserver<S>>) {
            let state = self.state.write().await;
            observer.state_changed(self.version.load(Ordering::Acquire), &state);
            self.observers
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(observer);
        }

        /// Current state version (number of reducer runs so far)
        #[must_use]
        pub fn version(&self) -> u64 {
            self.version.load(Ordering::Acquire)
        }

        /// Initiate graceful shutdown of the store
        ///
        /// Rejects new actions, then waits for running effects.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if effects are still
        /// running when `timeout` expires.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating store shutdown");
            self.shutdown.store(true, Ordering::Release);

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timed out");
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Notifies state observers with the new version
        /// 4. Schedules returned effects
        ///
        /// `send()` returns after scheduling effects, not completion;
        /// use the returned [`EffectHandle`] to wait.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError>
        where
            R: Clone,
            E: Clone,
        {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                return Err(StoreError::ShutdownInProgress);
            }

            Ok(self.dispatch(action).await)
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let page = store.state(|s| s.events.page).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&state)
        }

        /// Run the reducer and schedule its effects
        ///
        /// Actions fed back by effects come through here directly: an effect
        /// that was pending when shutdown began still lands its action.
        async fn dispatch(&self, action: A) -> EffectHandle
        where
            R: Clone,
            E: Clone,
        {
            crate::metrics::StoreMetrics::record_action();

            let (handle, tracking) = EffectHandle::new();

            let effects = {
                let mut state = self.state.write().await;

                let effects = self.reducer.reduce(&mut state, action, &self.environment);
                let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;

                let observers = self
                    .observers
                    .read()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                for observer in observers.iter() {
                    observer.state_changed(version, &state);
                }

                tracing::trace!(version, effects = effects.len(), "Reducer completed");
                effects
            };

            for effect in effects {
                self.execute_effect_internal(effect, &tracking);
            }

            handle
        }

        /// Execute an effect with tracking
        ///
        /// A panic in the fed-back reduction stays inside its spawned task;
        /// the guards keep the counters right either way.
        fn execute_effect_internal(&self, effect: Effect<A>, tracking: &EffectTracking)
        where
            R: Clone,
            E: Clone,
        {
            match effect {
                Effect::None => {},
                Effect::Delay { duration, action } => {
                    let (guards, store) = self.begin_effect(tracking);

                    tokio::spawn(async move {
                        let _guards = guards;

                        tokio::time::sleep(duration).await;
                        store.dispatch(*action).await;
                    });
                },
            }
        }

        fn begin_effect(&self, tracking: &EffectTracking) -> ((DecrementGuard, AtomicCounterGuard), Self)
        where
            R: Clone,
            E: Clone,
        {
            tracking.increment();
            self.pending_effects.fetch_add(1, Ordering::SeqCst);

            (
                (
                    DecrementGuard(tracking.clone()),
                    AtomicCounterGuard(Arc::clone(&self.pending_effects)),
                ),
                self.clone(),
            )
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                version: Arc::clone(&self.version),
                observers: Arc::clone(&self.observers),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_core::{smallvec, SmallVec};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct TestState {
        value: i32,
    }

    #[derive(Debug, Clone)]
    enum TestAction {
        Increment,
        Decrement,
        NoOp,
        ProduceDelayedAction,
        ProduceSlowAction,
        ProducePanickingAction,
        Panic,
    }

    #[derive(Debug, Clone)]
    struct TestEnv;

    #[derive(Debug, Clone)]
    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.value += 1;
                    smallvec![Effect::None]
                },
                TestAction::Decrement => {
                    state.value -= 1;
                    smallvec![Effect::None]
                },
                TestAction::NoOp => smallvec![Effect::None],
                TestAction::ProduceDelayedAction => smallvec![Effect::Delay {
                    duration: Duration::from_millis(10),
                    action: Box::new(TestAction::Increment),
                }],
                TestAction::ProduceSlowAction => smallvec![Effect::Delay {
                    duration: Duration::from_millis(200),
                    action: Box::new(TestAction::Increment),
                }],
                TestAction::ProducePanickingAction => smallvec![Effect::Delay {
                    duration: Duration::from_millis(1),
                    action: Box::new(TestAction::Panic),
                }],
                #[allow(clippy::panic)] // Intentional panic for testing isolation
                TestAction::Panic => panic!("Intentional panic in fed-back action"),
            }
        }
    }

    fn store() -> Store<TestState, TestAction, TestEnv, TestReducer> {
        Store::new(TestState { value: 0 }, TestReducer, TestEnv)
    }

    #[derive(Default)]
    struct RecordingObserver {
        seen: Mutex<Vec<(u64, i32)>>,
    }

    impl StateObserver<TestState> for RecordingObserver {
        fn state_changed(&self, version: u64, state: &TestState) {
            self.seen
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push((version, state.value));
        }
    }

    #[tokio::test]
    async fn test_send_action() {
        let store = store();

        let _ = store.send(TestAction::Increment).await;
        let _ = store.send(TestAction::Increment).await;
        let _ = store.send(TestAction::Decrement).await;
        let _ = store.send(TestAction::NoOp).await;

        assert_eq!(store.state(|s| s.value).await, 1);
        assert_eq!(store.version(), 4);
    }

    #[tokio::test]
    async fn test_effect_delay() {
        let store = store();

        let _ = store.send(TestAction::ProduceDelayedAction).await;
        assert_eq!(store.state(|s| s.value).await, 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test]
    async fn test_handle_waits_for_fed_back_action() -> Result<(), StoreError> {
        let store = store();

        let mut handle = store.send(TestAction::ProduceDelayedAction).await?;
        handle.wait_with_timeout(Duration::from_secs(1)).await?;

        assert_eq!(store.state(|s| s.value).await, 1);
        assert_eq!(store.version(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_handle_wait_times_out() -> Result<(), StoreError> {
        let store = store();

        let mut handle = store.send(TestAction::ProduceSlowAction).await?;
        let result = handle.wait_with_timeout(Duration::from_millis(20)).await;

        assert!(matches!(result, Err(StoreError::Timeout)));
        assert_eq!(store.state(|s| s.value).await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_completed_handle_does_not_wait() {
        let mut handle = EffectHandle::completed();
        assert!(handle.wait_with_timeout(Duration::from_millis(10)).await.is_ok());
    }

    #[tokio::test]
    async fn test_effect_panic_isolation() -> Result<(), StoreError> {
        let store = store();

        let mut handle = store.send(TestAction::ProducePanickingAction).await?;
        handle.wait_with_timeout(Duration::from_secs(1)).await?;

        let _ = store.send(TestAction::Increment).await?;
        assert_eq!(store.state(|s| s.value).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_observers_see_versions_in_order() {
        let store = store();
        let observer = Arc::new(RecordingObserver::default());
        store.observe(Arc::clone(&observer) as Arc<dyn StateObserver<TestState>>).await;

        let _ = store.send(TestAction::Increment).await;
        let _ = store.send(TestAction::Increment).await;
        let _ = store.send(TestAction::Decrement).await;

        let seen = observer
            .seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        assert_eq!(seen, vec![(0, 0), (1, 1), (2, 2), (3, 1)]);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_actions() -> Result<(), StoreError> {
        let store = store();

        store.shutdown(Duration::from_secs(1)).await?;
        let result = store.send(TestAction::Increment).await;

        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_drains_pending_delays() -> Result<(), StoreError> {
        let store = store();

        let _ = store.send(TestAction::ProduceSlowAction).await?;
        store.shutdown(Duration::from_secs(2)).await?;

        assert_eq!(store.state(|s| s.value).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_times_out_on_long_delays() {
        let store = store();

        let _ = store.send(TestAction::ProduceSlowAction).await;
        let result = store.shutdown(Duration::from_millis(20)).await;

        assert!(matches!(result, Err(StoreError::ShutdownTimeout(1))));
    }

    #[tokio::test]
    async fn test_store_clone_shares_state() {
        let first = store();
        let second = first.clone();

        let _ = first.send(TestAction::Increment).await;
        assert_eq!(second.state(|s| s.value).await, 1);
    }
}
