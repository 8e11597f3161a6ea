//! The persistence reconciler.
//!
//! Observes the application store and writes whitelisted slices to
//! persistent storage, one record per slice. Each storage key has a single
//! writer task fed through a FIFO queue, so writes to a key land in state
//! version order and the stored record always converges to the latest
//! state. Observation never blocks the store: serialization happens inline,
//! the I/O on the writer tasks.
//!
//! At startup [`PersistenceReconciler::rehydrate`] rebuilds the initial state
//! from the stored records and the current defaults.

use crate::config::{self, PersistConfig};
use crate::error::PersistError;
use crate::merge::merge_level2;
use futures::future::join_all;
use marquee_core::environment::PersistentStorage;
use marquee_runtime::StateObserver;
use marquee_runtime::metrics::PersistMetrics;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};

enum WriteCommand {
    Write { version: u64, payload: String },
    Flush(oneshot::Sender<()>),
}

#[derive(Default)]
struct Writers {
    queues: HashMap<String, mpsc::UnboundedSender<WriteCommand>>,
    last_queued: HashMap<String, Value>,
}

struct Shared {
    config: PersistConfig,
    storage: Arc<dyn PersistentStorage>,
    degraded: AtomicBool,
    writers: Mutex<Writers>,
}

impl Shared {
    fn writers(&self) -> MutexGuard<'_, Writers> {
        self.writers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn degrade(&self, error: &PersistError) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            tracing::warn!(error = %error, "Persistent storage failed, continuing without persistence");
        }
    }
}

/// Writes whitelisted slices of `S` and restores them at startup
///
/// Cheap to clone; clones share writer tasks and the degraded flag.
pub struct PersistenceReconciler<S> {
    shared: Arc<Shared>,
    _state: PhantomData<fn() -> S>,
}

impl<S> Clone for PersistenceReconciler<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            _state: PhantomData,
        }
    }
}

impl<S> fmt::Debug for PersistenceReconciler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceReconciler")
            .field("config", &self.shared.config)
            .field("degraded", &self.shared.degraded.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<S> PersistenceReconciler<S>
where
    S: Serialize + DeserializeOwned + Default,
{
    /// Reconciler writing to `storage`
    #[must_use]
    pub fn new(config: PersistConfig, storage: Arc<dyn PersistentStorage>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                storage,
                degraded: AtomicBool::new(false),
                writers: Mutex::new(Writers::default()),
            }),
            _state: PhantomData,
        }
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &PersistConfig {
        &self.shared.config
    }

    /// True once storage has failed; nothing more is written this session
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.shared.degraded.load(Ordering::SeqCst)
    }

    /// Build the initial state from stored records and `S::default()`
    ///
    /// For each whitelisted slice: no record keeps the default; a record is
    /// merged over the default two levels deep. A record that cannot be
    /// read, carries another schema version or no longer fits `S` is
    /// discarded for that slice with a warning. Never fails.
    #[tracing::instrument(skip(self), name = "persist_rehydrate")]
    pub async fn rehydrate(&self) -> S {
        let default = S::default();
        let default_root = match serde_json::to_value(&default) {
            Ok(Value::Object(root)) => root,
            Ok(_) => {
                tracing::warn!("State does not serialize to an object, skipping rehydration");
                return default;
            },
            Err(error) => {
                tracing::warn!(error = %error, "State does not serialize, skipping rehydration");
                return default;
            },
        };

        let mut persisted = Map::new();
        for slice in &self.shared.config.whitelist {
            match self.read_slice(slice).await {
                Ok(Some(state)) => {
                    persisted.insert(slice.clone(), state);
                },
                Ok(None) => tracing::debug!(slice = %slice, "No stored record"),
                Err(PersistError::Storage(error)) => {
                    self.shared.degrade(&PersistError::Storage(error));
                    break;
                },
                Err(error) => {
                    tracing::warn!(slice = %slice, error = %error, "Discarding unreadable stored record");
                    PersistMetrics::record_rehydrate_fallback(slice);
                },
            }
        }

        let default_root = Value::Object(default_root);
        let merged = merge_level2(&default_root, &Value::Object(persisted.clone()));
        let mut accepted = default_root.clone();
        for slice in persisted.keys() {
            let Some(merged_slice) = merged.get(slice) else {
                continue;
            };
            let mut candidate = accepted.clone();
            set_field(&mut candidate, slice, merged_slice.clone());
            match serde_json::from_value::<S>(candidate.clone()) {
                Ok(_) => accepted = candidate,
                Err(error) => {
                    tracing::warn!(slice = %slice, error = %error, "Stored record no longer fits the state, using default");
                    PersistMetrics::record_rehydrate_fallback(slice);
                },
            }
        }

        serde_json::from_value(accepted).unwrap_or_else(|error| {
            tracing::warn!(error = %error, "Rehydrated state rejected, using default");
            default
        })
    }

    async fn read_slice(&self, slice: &str) -> Result<Option<Value>, PersistError> {
        let key = self.shared.config.storage_key(slice);
        let Some(text) = self.shared.storage.get(&key).await? else {
            return Ok(None);
        };
        config::open(self.shared.config.version, &text).map(Some)
    }

    /// Queue writes for every whitelisted slice of `state` that changed
    ///
    /// Called by the store on each state change; usable directly as well.
    pub fn record(&self, version: u64, state: &S) {
        if self.is_degraded() {
            return;
        }
        let root = match serde_json::to_value(state) {
            Ok(root) => root,
            Err(error) => {
                tracing::warn!(version, error = %error, "State does not serialize, skipping write");
                return;
            },
        };

        let mut writers = self.shared.writers();
        for slice in &self.shared.config.whitelist {
            let Some(value) = root.get(slice) else {
                continue;
            };
            if writers.last_queued.get(slice) == Some(value) {
                continue;
            }
            let payload = match config::seal(self.shared.config.version, value) {
                Ok(payload) => payload,
                Err(error) => {
                    tracing::warn!(slice = %slice, error = %error, "Slice does not serialize, skipping write");
                    continue;
                },
            };

            let Some(queue) = self.queue(&mut writers, slice) else {
                tracing::warn!(slice = %slice, "No runtime to write on, dropping write");
                continue;
            };
            if queue.send(WriteCommand::Write { version, payload }).is_ok() {
                writers.last_queued.insert(slice.clone(), value.clone());
            }
        }
    }

    /// Writer queue for `slice`, spawning its task on first use
    fn queue(&self, writers: &mut Writers, slice: &str) -> Option<mpsc::UnboundedSender<WriteCommand>> {
        if let Some(queue) = writers.queues.get(slice) {
            return Some(queue.clone());
        }
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let (queue, commands) = mpsc::unbounded_channel();
        runtime.spawn(run_writer(Arc::clone(&self.shared), slice.to_string(), commands));
        writers.queues.insert(slice.to_string(), queue.clone());
        Some(queue)
    }

    /// Wait until every write queued so far has been attempted
    pub async fn flush(&self) {
        let pending: Vec<oneshot::Receiver<()>> = {
            let writers = self.shared.writers();
            writers
                .queues
                .values()
                .filter_map(|queue| {
                    let (done, wait) = oneshot::channel();
                    queue.send(WriteCommand::Flush(done)).ok().map(|()| wait)
                })
                .collect()
        };
        join_all(pending).await;
    }

    /// Delete every whitelisted record (e.g. on sign-out)
    ///
    /// Queued writes are flushed first so none of them lands afterwards.
    ///
    /// # Errors
    ///
    /// Returns the first storage error; the remaining records are still
    /// attempted.
    #[tracing::instrument(skip(self), name = "persist_purge")]
    pub async fn purge(&self) -> Result<(), PersistError> {
        self.flush().await;
        self.shared.writers().last_queued.clear();

        let mut first_error = None;
        for slice in &self.shared.config.whitelist {
            let key = self.shared.config.storage_key(slice);
            if let Err(error) = self.shared.storage.remove(&key).await {
                tracing::warn!(slice = %slice, error = %error, "Failed to remove stored record");
                first_error.get_or_insert(PersistError::Storage(error));
            }
        }
        tracing::info!(slices = self.shared.config.whitelist.len(), "Purged stored state");
        first_error.map_or(Ok(()), Err)
    }
}

impl<S> StateObserver<S> for PersistenceReconciler<S>
where
    S: Serialize + DeserializeOwned + Default,
{
    fn state_changed(&self, version: u64, state: &S) {
        self.record(version, state);
    }
}

async fn run_writer(shared: Arc<Shared>, slice: String, mut commands: mpsc::UnboundedReceiver<WriteCommand>) {
    let key = shared.config.storage_key(&slice);
    while let Some(command) = commands.recv().await {
        match command {
            WriteCommand::Write { version, payload } => {
                if shared.degraded.load(Ordering::SeqCst) {
                    continue;
                }
                match shared.storage.set(&key, payload).await {
                    Ok(()) => {
                        tracing::trace!(slice = %slice, version, "Slice written");
                        PersistMetrics::record_write(&slice);
                    },
                    Err(error) => {
                        PersistMetrics::record_write_failure(&slice);
                        shared.degrade(&PersistError::Storage(error));
                    },
                }
            },
            WriteCommand::Flush(done) => {
                let _ = done.send(());
            },
        }
    }
}

fn set_field(root: &mut Value, field: &str, value: Value) {
    if let Value::Object(fields) = root {
        fields.insert(field.to_string(), value);
    }
}
