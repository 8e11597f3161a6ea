//! The query cache entry store.
//!
//! Entries are keyed by [`CacheKey`] and shared by every caller requesting
//! the same endpoint with structurally equal arguments. The cache guarantees:
//!
//! - at most one fetch in flight per key; concurrent requests join it
//! - stale entries keep serving their last result while a background
//!   refetch runs
//! - an entry with no subscribers is evicted once its retention window
//!   passes, unless an optimistic mutation still overrides it
//!
//! All transitions happen under one mutex that is never held across an
//! `.await`. Fetches run on spawned tasks and re-enter the cache when the
//! HTTP collaborator answers.

use crate::endpoint::{Api, CacheConfig, Endpoint, EndpointKind};
use crate::entry::{CacheEntry, QueryStatus};
use crate::error::QueryError;
use crate::graph::TagGraph;
use crate::key::CacheKey;
use crate::mutation::{self, PendingMutation};
use crate::tag::Tag;
use chrono::{DateTime, Utc};
use marquee_core::environment::{Anonymous, Clock, HttpClient, SystemClock, TokenSupplier};
use marquee_core::error::NetworkError;
use marquee_core::http::{HttpRequest, HttpResponse};
use marquee_runtime::metrics::QueryMetrics;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Collaborators injected into a [`QueryCache`]
#[derive(Clone)]
pub struct QueryEnvironment {
    /// Transport for queries and mutations
    pub http: Arc<dyn HttpClient>,
    /// Time source for freshness and retention deadlines
    pub clock: Arc<dyn Clock>,
    /// Bearer credential attached to every request
    pub token: Arc<dyn TokenSupplier>,
}

impl QueryEnvironment {
    /// System clock, anonymous session
    #[must_use]
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            clock: Arc::new(SystemClock),
            token: Arc::new(Anonymous),
        }
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the token supplier
    #[must_use]
    pub fn with_token(mut self, token: Arc<dyn TokenSupplier>) -> Self {
        self.token = token;
        self
    }
}

/// Per-request behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Refetch even if the cached result is fresh
    pub force_refetch: bool,
    /// Subscribe without fetching
    pub skip: bool,
    /// Make [`QueryHandle::resolve`] wait for an in-flight fetch even when a
    /// stale result is available
    pub wait_for_fresh: bool,
}

impl RequestOptions {
    /// Refetch even if fresh
    #[must_use]
    pub const fn force_refetch() -> Self {
        Self {
            force_refetch: true,
            skip: false,
            wait_for_fresh: false,
        }
    }

    /// Subscribe without fetching
    #[must_use]
    pub const fn skip() -> Self {
        Self {
            force_refetch: false,
            skip: true,
            wait_for_fresh: false,
        }
    }

    /// Wait for fresh data instead of serving a stale result
    #[must_use]
    pub const fn wait_for_fresh(mut self) -> Self {
        self.wait_for_fresh = true;
        self
    }
}

pub(crate) struct Slot {
    pub(crate) entry: CacheEntry,
    notifier: watch::Sender<CacheEntry>,
    endpoint: Arc<Endpoint>,
    fetch_id: Option<u64>,
    stale_on_land: bool,
    release_epoch: u64,
    released_at: Option<DateTime<Utc>>,
}

impl Slot {
    fn new(key: CacheKey, args: Arc<Value>, endpoint: Arc<Endpoint>) -> Self {
        let entry = CacheEntry::new(key, args);
        let (notifier, _) = watch::channel(entry.clone());
        Self {
            entry,
            notifier,
            endpoint,
            fetch_id: None,
            stale_on_land: false,
            release_epoch: 0,
            released_at: None,
        }
    }

    /// Push the current entry to every subscriber
    pub(crate) fn publish(&self) {
        self.notifier.send_replace(self.entry.clone());
    }

    /// Start the retention window of an entry that just lost its last subscriber
    pub(crate) fn arm_retention(&mut self, now: DateTime<Utc>, config: &CacheConfig) -> RetentionTimer {
        self.release_epoch += 1;
        self.released_at = Some(now);
        RetentionTimer {
            key: self.entry.key.clone(),
            epoch: self.release_epoch,
            after: self.endpoint.retention(config),
        }
    }

    fn retention_elapsed(&self, now: DateTime<Utc>, config: &CacheConfig) -> bool {
        self.released_at
            .is_some_and(|released| now >= deadline(released, self.endpoint.retention(config)))
    }
}

pub(crate) struct RetentionTimer {
    key: CacheKey,
    epoch: u64,
    after: Duration,
}

#[derive(Default)]
pub(crate) struct CacheState {
    pub(crate) entries: HashMap<CacheKey, Slot>,
    pub(crate) graph: TagGraph,
    pub(crate) mutations: HashMap<CacheKey, Vec<PendingMutation>>,
    next_id: u64,
}

impl CacheState {
    pub(crate) fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

struct FetchJob {
    key: CacheKey,
    id: u64,
    endpoint: Arc<Endpoint>,
    request: HttpRequest,
}

struct Inner {
    api: Api,
    env: QueryEnvironment,
    state: Mutex<CacheState>,
}

/// Shared query cache
///
/// Cheap to clone; clones share entries. Methods that start fetches spawn
/// Tokio tasks and must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("endpoints", &self.inner.api.names())
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl QueryCache {
    /// Create an empty cache over `api`
    #[must_use]
    pub fn new(api: Api, env: QueryEnvironment) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                env,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Endpoint registry
    #[must_use]
    pub fn api(&self) -> &Api {
        &self.inner.api
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, CacheState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn env(&self) -> &QueryEnvironment {
        &self.inner.env
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.inner.env.clock.now()
    }

    /// Subscribe to `endpoint(args)`, fetching when needed
    ///
    /// - no entry, or a rejected one: fetch
    /// - a fetch already in flight: join it
    /// - fresh result: served from cache
    /// - stale result: served from cache while a background refetch runs
    ///
    /// Every call adds one subscriber; dropping the returned handle removes it.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownEndpoint`] or
    /// [`QueryError::WrongEndpointKind`] for a bad endpoint name, and
    /// [`QueryError::InvalidArguments`] when `args` cannot build a request.
    #[tracing::instrument(skip(self, args, options), name = "query_request")]
    pub fn request(&self, endpoint: &str, args: &Value, options: RequestOptions) -> Result<QueryHandle, QueryError> {
        let definition = self.inner.api.get(endpoint, EndpointKind::Query)?;
        definition.request(args)?;

        let key = CacheKey::new(endpoint, args);
        let now = self.now();

        let mut guard = self.state();
        let state = &mut *guard;
        let created = !state.entries.contains_key(&key);
        let slot = state
            .entries
            .entry(key.clone())
            .or_insert_with(|| Slot::new(key.clone(), Arc::new(args.clone()), definition));

        slot.entry.subscribers += 1;
        slot.release_epoch += 1;
        slot.released_at = None;

        let needs_fetch = if options.skip {
            false
        } else if slot.entry.fetching {
            tracing::debug!(key = %key, "Joining in-flight fetch");
            QueryMetrics::record_coalesced(endpoint);
            false
        } else {
            match slot.entry.status {
                QueryStatus::Idle | QueryStatus::Pending | QueryStatus::Rejected => true,
                QueryStatus::Fulfilled if options.force_refetch || slot.entry.is_stale(now) => true,
                QueryStatus::Fulfilled => {
                    tracing::trace!(key = %key, "Serving fresh entry from cache");
                    QueryMetrics::record_hit(endpoint);
                    false
                },
            }
        };

        slot.publish();
        let receiver = slot.notifier.subscribe();
        let job = if needs_fetch {
            self.start_fetch(state, &key)
        } else {
            None
        };
        if created {
            QueryMetrics::record_entries(state.entries.len());
        }
        drop(guard);

        if let Some(job) = job {
            self.spawn_fetch(job);
        }

        Ok(QueryHandle {
            cache: self.clone(),
            key,
            receiver,
            wait_for_fresh: options.wait_for_fresh,
            released: false,
        })
    }

    /// Request, wait for a usable result and release the subscription
    ///
    /// The returned entry is `Fulfilled` (possibly stale, unless
    /// `wait_for_fresh` is set) or `Rejected` with its error.
    ///
    /// # Errors
    ///
    /// Same as [`QueryCache::request`].
    pub async fn fetch(&self, endpoint: &str, args: &Value, options: RequestOptions) -> Result<CacheEntry, QueryError> {
        let mut handle = self.request(endpoint, args, options)?;
        Ok(handle.resolve().await)
    }

    /// Drop one subscription to `key`
    ///
    /// When the last subscriber leaves, the entry's retention window starts.
    pub fn release(&self, key: &CacheKey) {
        let now = self.now();
        let mut guard = self.state();
        let Some(slot) = guard.entries.get_mut(key) else {
            return;
        };
        if slot.entry.subscribers == 0 {
            tracing::warn!(key = %key, "Release without a matching request");
            return;
        }

        slot.entry.subscribers -= 1;
        slot.publish();
        if slot.entry.subscribers > 0 {
            return;
        }

        let timer = slot.arm_retention(now, self.inner.api.config());
        drop(guard);
        tracing::debug!(key = %key, retention = ?timer.after, "Last subscriber released");
        self.spawn_retention(timer);
    }

    /// Current snapshot of `key`
    #[must_use]
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.state().entries.get(key).map(|slot| slot.entry.clone())
    }

    /// Current snapshot of `endpoint(args)`
    #[must_use]
    pub fn entry(&self, endpoint: &str, args: &Value) -> Option<CacheEntry> {
        self.peek(&CacheKey::new(endpoint, args))
    }

    /// Keys of every entry held
    #[must_use]
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.state().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of entries held
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    /// True when no entry is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }

    /// Tags currently provided by `key`
    #[must_use]
    pub fn tags_of(&self, key: &CacheKey) -> BTreeSet<Tag> {
        self.state().graph.tags_of(key)
    }

    /// Unsettled mutations patching `key`
    #[must_use]
    pub fn pending_mutations(&self, key: &CacheKey) -> usize {
        self.state().mutations.get(key).map_or(0, Vec::len)
    }

    /// Mark every entry providing any of `tags` stale
    ///
    /// Each dependent entry is marked once, even when it provides several of
    /// the tags. Entries with subscribers are refetched; an entry whose fetch
    /// is already in flight is refetched again when that fetch lands, since
    /// its result may predate the change. Returns the affected keys.
    #[tracing::instrument(skip(self, tags), name = "query_invalidate")]
    pub fn invalidate(&self, tags: &[Tag]) -> Vec<CacheKey> {
        let mut guard = self.state();
        let state = &mut *guard;
        let keys = state.graph.dependents(tags);
        let mut jobs = Vec::new();

        for key in &keys {
            let Some(slot) = state.entries.get_mut(key) else {
                continue;
            };
            slot.entry.invalidated = true;
            let refetch_now = slot.entry.subscribers > 0 && !slot.entry.fetching;
            if slot.entry.fetching {
                slot.stale_on_land = true;
            }
            slot.publish();

            if refetch_now {
                jobs.extend(self.start_fetch(state, key));
            }
        }
        drop(guard);

        if !keys.is_empty() {
            tracing::info!(
                tags = %tags.iter().map(ToString::to_string).collect::<Vec<_>>().join(","),
                entries = keys.len(),
                refetching = jobs.len(),
                "Invalidated tags"
            );
            QueryMetrics::record_invalidated(keys.len());
        }
        for job in jobs {
            self.spawn_fetch(job);
        }
        keys.into_iter().collect()
    }

    /// Evict every unsubscribed entry whose retention window has passed
    ///
    /// Uses the injected clock, so it works without Tokio timers. Entries
    /// with unsettled optimistic mutations are kept. Returns evicted keys.
    pub fn collect_garbage(&self) -> Vec<CacheKey> {
        let now = self.now();
        let config = self.inner.api.config();
        let mut guard = self.state();
        let state = &mut *guard;

        let expired: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(key, slot)| {
                slot.entry.subscribers == 0
                    && !state.mutations.contains_key(*key)
                    && slot.retention_elapsed(now, config)
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            Self::evict(state, key);
        }
        expired
    }

    /// Drop every entry, tag edge and pending mutation
    ///
    /// Handles still alive see their entry disappear; in-flight fetches and
    /// mutations settle into nothing.
    pub fn reset(&self) {
        let mut state = self.state();
        let dropped = state.entries.len();
        let tags = state.graph.tag_count();
        *state = CacheState {
            next_id: state.next_id,
            ..CacheState::default()
        };
        drop(state);
        QueryMetrics::record_entries(0);
        tracing::info!(entries = dropped, tags, "Query cache reset");
    }

    /// Mark `key` fetching and build its request
    ///
    /// Returns `None` when the entry is gone or its arguments cannot build a
    /// request (the entry is rejected instead).
    fn start_fetch(&self, state: &mut CacheState, key: &CacheKey) -> Option<FetchJob> {
        let id = state.next_id();
        let slot = state.entries.get_mut(key)?;

        let request = match slot.endpoint.request(&slot.entry.args) {
            Ok(request) => request.with_bearer(self.inner.env.token.token()),
            Err(error) => {
                slot.entry.status = QueryStatus::Rejected;
                slot.entry.error = Some(error);
                slot.publish();
                return None;
            },
        };

        slot.fetch_id = Some(id);
        slot.entry.fetching = true;
        if slot.entry.status != QueryStatus::Fulfilled {
            slot.entry.status = QueryStatus::Pending;
            slot.entry.error = None;
        }
        slot.publish();

        QueryMetrics::record_fetch(slot.endpoint.name());
        tracing::debug!(key = %key, fetch = id, "Fetch started");
        Some(FetchJob {
            key: key.clone(),
            id,
            endpoint: Arc::clone(&slot.endpoint),
            request,
        })
    }

    fn spawn_fetch(&self, job: FetchJob) {
        let cache = self.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let FetchJob {
                key,
                id,
                endpoint,
                request,
            } = job;
            let result = cache.inner.env.http.fetch(request).await;
            cache.complete_fetch(&key, id, &endpoint, result, started.elapsed());
        });
    }

    fn complete_fetch(
        &self,
        key: &CacheKey,
        id: u64,
        endpoint: &Endpoint,
        result: Result<HttpResponse, NetworkError>,
        elapsed: Duration,
    ) {
        let outcome = match result {
            Ok(response) if response.is_success() => Ok(response.data),
            Ok(response) => Err(QueryError::from_response(&response)),
            Err(error) => Err(QueryError::from(error)),
        };
        QueryMetrics::record_fetch_completed(endpoint.name(), elapsed, outcome.is_ok());

        let now = self.now();
        let mut guard = self.state();
        let state = &mut *guard;
        let Some(slot) = state.entries.get_mut(key) else {
            tracing::debug!(key = %key, "Fetch landed after its entry was dropped");
            return;
        };
        if slot.fetch_id != Some(id) {
            tracing::debug!(key = %key, fetch = id, "Ignoring superseded fetch");
            return;
        }
        slot.fetch_id = None;
        slot.entry.fetching = false;

        let succeeded = outcome.is_ok();
        match outcome {
            Ok(data) => {
                state.graph.replace_tags(key, endpoint.tags(&data, &slot.entry.args));

                let base = Arc::new(data);
                let (data, optimistic) = match state.mutations.get_mut(key) {
                    Some(pending) => mutation::rebase(pending, base),
                    None => (base, false),
                };
                if state.mutations.get(key).is_some_and(Vec::is_empty) {
                    state.mutations.remove(key);
                }

                slot.entry.status = QueryStatus::Fulfilled;
                slot.entry.data = Some(data);
                slot.entry.error = None;
                slot.entry.fulfilled_at = Some(now);
                slot.entry.expires_at = Some(deadline(now, endpoint.ttl(self.inner.api.config())));
                slot.entry.invalidated = false;
                slot.entry.optimistic = optimistic;
                tracing::debug!(key = %key, fetch = id, "Fetch fulfilled");
            },
            Err(error) => {
                tracing::warn!(key = %key, fetch = id, error = %error, "Fetch rejected");
                slot.entry.status = QueryStatus::Rejected;
                slot.entry.error = Some(error);
            },
        }

        let stale = std::mem::take(&mut slot.stale_on_land);
        if stale && succeeded {
            // The landed result may predate the invalidation
            slot.entry.invalidated = true;
        }
        let refetch = stale && slot.entry.subscribers > 0;
        slot.publish();

        let job = if refetch {
            self.start_fetch(state, key)
        } else {
            None
        };
        drop(guard);

        if let Some(job) = job {
            self.spawn_fetch(job);
        }
    }

    pub(crate) fn spawn_retention(&self, timer: RetentionTimer) {
        // Without a runtime (a handle dropped during shutdown) only
        // `collect_garbage` can evict the entry
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let cache: Weak<Inner> = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            tokio::time::sleep(timer.after).await;
            if let Some(inner) = cache.upgrade() {
                QueryCache { inner }.evict_if_unused(&timer.key, timer.epoch);
            }
        });
    }

    fn evict_if_unused(&self, key: &CacheKey, epoch: u64) {
        let mut guard = self.state();
        let state = &mut *guard;
        let eligible = state.entries.get(key).is_some_and(|slot| {
            slot.entry.subscribers == 0 && slot.release_epoch == epoch && !state.mutations.contains_key(key)
        });
        if eligible {
            Self::evict(state, key);
        }
    }

    fn evict(state: &mut CacheState, key: &CacheKey) {
        if state.entries.remove(key).is_some() {
            state.graph.remove_key(key);
            tracing::debug!(key = %key, "Evicted unused entry");
            QueryMetrics::record_eviction();
            QueryMetrics::record_entries(state.entries.len());
        }
    }
}

fn deadline(from: DateTime<Utc>, after: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(after)
        .ok()
        .and_then(|after| from.checked_add_signed(after))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// One subscription to a cache entry
///
/// Dropping the handle releases the subscription.
pub struct QueryHandle {
    cache: QueryCache,
    key: CacheKey,
    receiver: watch::Receiver<CacheEntry>,
    wait_for_fresh: bool,
    released: bool,
}

impl fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandle")
            .field("key", &self.key)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl QueryHandle {
    /// Key of the subscribed entry
    #[must_use]
    pub const fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Latest snapshot
    #[must_use]
    pub fn current(&self) -> CacheEntry {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change; `None` once the entry has been dropped
    pub async fn changed(&mut self) -> Option<CacheEntry> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait until no fetch is in flight
    pub async fn settled(&mut self) -> CacheEntry {
        loop {
            let entry = self.receiver.borrow_and_update().clone();
            if !entry.fetching {
                return entry;
            }
            if self.receiver.changed().await.is_err() {
                return self.receiver.borrow().clone();
            }
        }
    }

    /// The result the caller should show
    ///
    /// Returns immediately when the entry has data (stale or not), unless the
    /// request asked to wait for fresh data; otherwise waits for the fetch.
    pub async fn resolve(&mut self) -> CacheEntry {
        let current = self.current();
        if !current.fetching || (current.data.is_some() && !self.wait_for_fresh) {
            return current;
        }
        self.settled().await
    }

    /// Release the subscription now
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.cache.release(&self.key);
        }
    }
}

impl Drop for QueryHandle {
    fn drop(&mut self) {
        self.release_once();
    }
}
