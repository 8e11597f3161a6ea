//! In-memory [`PersistentStorage`] for persistence tests.

use futures::future::BoxFuture;
use marquee_core::environment::PersistentStorage;
use marquee_core::error::StorageError;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct Contents {
    values: HashMap<String, String>,
    writes: Vec<(String, String)>,
    removed: Vec<String>,
    fail_reads: Option<StorageError>,
    fail_writes: Option<StorageError>,
    write_delays: VecDeque<Duration>,
}

/// Storage backed by a `HashMap`
///
/// Clones share the same contents. Completed writes are logged in
/// completion order, which lets tests check that later states win.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    contents: Arc<Mutex<Contents>>,
}

impl InMemoryStorage {
    /// Empty storage
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn contents(&self) -> std::sync::MutexGuard<'_, Contents> {
        self.contents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a value without logging a write
    pub fn insert(&self, key: &str, value: impl Into<String>) {
        self.contents().values.insert(key.to_string(), value.into());
    }

    /// Current value under `key`
    #[must_use]
    pub fn value(&self, key: &str) -> Option<String> {
        self.contents().values.get(key).cloned()
    }

    /// Completed writes, oldest first
    #[must_use]
    pub fn writes(&self) -> Vec<(String, String)> {
        self.contents().writes.clone()
    }

    /// Keys removed so far
    #[must_use]
    pub fn removed(&self) -> Vec<String> {
        self.contents().removed.clone()
    }

    /// Make every read fail with `error`
    pub fn fail_reads(&self, error: StorageError) {
        self.contents().fail_reads = Some(error);
    }

    /// Make every write and removal fail with `error`
    pub fn fail_writes(&self, error: StorageError) {
        self.contents().fail_writes = Some(error);
    }

    /// Stop injecting failures
    pub fn heal(&self) {
        let mut contents = self.contents();
        contents.fail_reads = None;
        contents.fail_writes = None;
    }

    /// Delay the next write by `delay` before it lands
    ///
    /// Each call queues one delay; writes without a queued delay land
    /// immediately.
    pub fn delay_next_write(&self, delay: Duration) {
        self.contents().write_delays.push_back(delay);
    }
}

impl PersistentStorage for InMemoryStorage {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StorageError>> {
        Box::pin(async move {
            let contents = self.contents();
            if let Some(error) = &contents.fail_reads {
                return Err(error.clone());
            }
            Ok(contents.values.get(key).cloned())
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let delay = self.contents().write_delays.pop_front();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut contents = self.contents();
            if let Some(error) = &contents.fail_writes {
                return Err(error.clone());
            }
            contents.writes.push((key.to_string(), value.clone()));
            contents.values.insert(key.to_string(), value);
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let mut contents = self.contents();
            if let Some(error) = &contents.fail_writes {
                return Err(error.clone());
            }
            contents.values.remove(key);
            contents.removed.push(key.to_string());
            Ok(())
        })
    }
}
