//! Mutation executor with optimistic updates.
//!
//! A mutation runs in two phases:
//!
//! 1. **Synchronously**, before the request is sent: each optimistic update
//!    whose target entry has data is applied, and the pre-patch value is
//!    kept as a snapshot. Subscribers see the patched data immediately.
//! 2. **When the server answers**: on success the patch is committed and the
//!    endpoint's tags are invalidated; on failure the snapshot is restored.
//!
//! Several mutations may patch the same entry concurrently. They are kept in
//! issue order per key, and every settle re-derives the entry from the
//! oldest snapshot by replaying the surviving patches. Rolling back one
//! mutation therefore never discards the patches of mutations issued after
//! it, and a fetch landing mid-mutation becomes the new base that pending
//! patches are re-applied to.

use crate::cache::{CacheState, QueryCache};
use crate::endpoint::{Endpoint, EndpointKind};
use crate::error::QueryError;
use crate::key::CacheKey;
use crate::patch::Patch;
use marquee_core::http::HttpRequest;
use marquee_runtime::metrics::MutationMetrics;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Patch applied to one cache entry while a mutation is in flight
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticUpdate {
    /// Entry to patch
    pub target: CacheKey,
    /// Edit to apply
    pub patch: Patch,
}

impl OptimisticUpdate {
    /// Patch the entry for `endpoint(args)`
    #[must_use]
    pub fn new(endpoint: &str, args: &Value, patch: Patch) -> Self {
        Self {
            target: CacheKey::new(endpoint, args),
            patch,
        }
    }
}

/// Where a patching mutation is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MutationPhase {
    /// Patch applied, server has not answered
    Applied,
    /// Server confirmed; kept until every earlier mutation on the key settles
    Committed,
}

/// One optimistic patch on one entry
#[derive(Debug, Clone)]
pub(crate) struct PendingMutation {
    pub(crate) id: u64,
    pub(crate) pre_snapshot: Arc<Value>,
    pub(crate) patch: Patch,
    pub(crate) phase: MutationPhase,
}

/// Re-apply pending patches over freshly fetched data
///
/// Confirmed patches are dropped: the server result already contains them.
/// Returns the derived data and whether it is still optimistic.
pub(crate) fn rebase(pending: &mut Vec<PendingMutation>, base: Arc<Value>) -> (Arc<Value>, bool) {
    pending.retain(|mutation| mutation.phase == MutationPhase::Applied);
    let data = replay(pending, base);
    (data, !pending.is_empty())
}

fn replay(pending: &mut [PendingMutation], base: Arc<Value>) -> Arc<Value> {
    pending.iter_mut().fold(base, |data, mutation| {
        let patched = Arc::new(mutation.patch.apply(&data));
        mutation.pre_snapshot = data;
        patched
    })
}

fn drain_confirmed_head(pending: &mut Vec<PendingMutation>) {
    let confirmed = pending
        .iter()
        .take_while(|mutation| mutation.phase == MutationPhase::Committed)
        .count();
    pending.drain(..confirmed);
}

fn commit(state: &mut CacheState, key: &CacheKey, id: u64) {
    let Some(pending) = state.mutations.get_mut(key) else {
        return;
    };
    if let Some(mutation) = pending.iter_mut().find(|mutation| mutation.id == id) {
        mutation.phase = MutationPhase::Committed;
    }
    drain_confirmed_head(pending);
}

fn rollback(state: &mut CacheState, key: &CacheKey, id: u64) {
    let Some(pending) = state.mutations.get_mut(key) else {
        return;
    };
    let Some(index) = pending.iter().position(|mutation| mutation.id == id) else {
        return;
    };

    let failed = pending.remove(index);
    let data = replay(&mut pending[index..], failed.pre_snapshot);
    drain_confirmed_head(pending);

    if let Some(slot) = state.entries.get_mut(key) {
        slot.entry.data = Some(data);
    }
}

impl QueryCache {
    /// Issue a mutation
    ///
    /// The optimistic updates are applied before this function returns;
    /// updates whose target has no cached data are skipped. The returned
    /// future sends the request and settles the mutation: on success it
    /// resolves to the server's response body after invalidating the
    /// endpoint's tags; on failure every optimistic update is undone.
    ///
    /// The future owns everything it needs, so it can be spawned.
    pub fn mutate(
        &self,
        endpoint: &str,
        args: &Value,
        updates: Vec<OptimisticUpdate>,
    ) -> impl Future<Output = Result<Value, QueryError>> + Send + 'static {
        let issued = self.begin_mutation(endpoint, args, updates);
        let cache = self.clone();
        let args = args.clone();

        async move {
            let (definition, request, applied) = issued?;
            let outcome = match cache.env().http.fetch(request).await {
                Ok(response) if response.is_success() => Ok(response.data),
                Ok(response) => Err(QueryError::from_response(&response)),
                Err(error) => Err(QueryError::from(error)),
            };
            cache.settle_mutation(&definition, &args, &applied, outcome)
        }
    }

    #[tracing::instrument(skip(self, args, updates), name = "mutation_issue")]
    fn begin_mutation(
        &self,
        endpoint: &str,
        args: &Value,
        updates: Vec<OptimisticUpdate>,
    ) -> Result<(Arc<Endpoint>, HttpRequest, Vec<(CacheKey, u64)>), QueryError> {
        let definition = self.api().get(endpoint, EndpointKind::Mutation)?;
        let request = definition
            .request(args)?
            .with_bearer(self.env().token.token());

        let mut applied = Vec::with_capacity(updates.len());
        let mut guard = self.state();
        let state = &mut *guard;
        for OptimisticUpdate { target, patch } in updates {
            let id = state.next_id();
            let Some(slot) = state.entries.get_mut(&target) else {
                tracing::debug!(key = %target, "No cached entry to patch optimistically");
                continue;
            };
            let Some(pre_snapshot) = slot.entry.data.clone() else {
                tracing::debug!(key = %target, "Entry has no data to patch optimistically");
                continue;
            };

            slot.entry.data = Some(Arc::new(patch.apply(&pre_snapshot)));
            slot.entry.optimistic = true;
            slot.publish();

            state.mutations.entry(target.clone()).or_default().push(PendingMutation {
                id,
                pre_snapshot,
                patch,
                phase: MutationPhase::Applied,
            });
            applied.push((target, id));
        }
        drop(guard);

        MutationMetrics::record_started(endpoint, !applied.is_empty());
        tracing::debug!(patched = applied.len(), "Mutation issued");
        Ok((definition, request, applied))
    }

    fn settle_mutation(
        &self,
        endpoint: &Endpoint,
        args: &Value,
        applied: &[(CacheKey, u64)],
        outcome: Result<Value, QueryError>,
    ) -> Result<Value, QueryError> {
        let now = self.now();
        let mut timers = Vec::new();
        let mut guard = self.state();
        let state = &mut *guard;

        for (key, id) in applied {
            if outcome.is_ok() {
                commit(state, key, *id);
            } else {
                rollback(state, key, *id);
            }

            let optimistic = state.mutations.get(key).is_some_and(|pending| {
                pending
                    .iter()
                    .any(|mutation| mutation.phase == MutationPhase::Applied)
            });
            if state.mutations.get(key).is_some_and(Vec::is_empty) {
                state.mutations.remove(key);
            }
            let overridden = state.mutations.contains_key(key);

            if let Some(slot) = state.entries.get_mut(key) {
                slot.entry.optimistic = optimistic;
                slot.publish();
                // An unsubscribed entry was kept alive by the override
                if !overridden && slot.entry.subscribers == 0 {
                    timers.push(slot.arm_retention(now, self.api().config()));
                }
            }
        }
        drop(guard);

        for timer in timers {
            self.spawn_retention(timer);
        }

        match outcome {
            Ok(data) => {
                MutationMetrics::record_committed(endpoint.name());
                tracing::info!(endpoint = endpoint.name(), "Mutation committed");
                let tags = endpoint.tags(&data, args);
                self.invalidate(&tags);
                Ok(data)
            },
            Err(error) => {
                if !applied.is_empty() {
                    MutationMetrics::record_rolled_back(endpoint.name());
                }
                tracing::warn!(endpoint = endpoint.name(), error = %error, "Mutation failed");
                Err(error)
            },
        }
    }
}
