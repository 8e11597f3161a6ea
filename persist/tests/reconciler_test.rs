//! Integration tests for the persistence reconciler.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use marquee_core::error::StorageError;
use marquee_persist::{FileStorage, PersistConfig, PersistenceReconciler};
use marquee_runtime::StateObserver;
use marquee_testing::InMemoryStorage;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct CitiesState {
    selected: Option<String>,
    list: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct EventsState {
    query: String,
    page_size: u32,
}

impl Default for EventsState {
    fn default() -> Self {
        Self {
            query: String::new(),
            page_size: 20,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct AppState {
    cities: CitiesState,
    events: EventsState,
}

fn reconciler(storage: &InMemoryStorage) -> PersistenceReconciler<AppState> {
    PersistenceReconciler::new(PersistConfig::new(["cities"]), Arc::new(storage.clone()))
}

fn stored(storage: &InMemoryStorage, key: &str) -> Value {
    serde_json::from_str(&storage.value(key).unwrap()).unwrap()
}

#[tokio::test]
async fn persisted_fields_win_and_missing_fields_come_from_defaults() {
    let storage = InMemoryStorage::new();
    storage.insert("persist:root:cities", r#"{"version":1,"state":{"selected":"sf"}}"#);

    let state = reconciler(&storage).rehydrate().await;

    assert_eq!(
        state,
        AppState {
            cities: CitiesState {
                selected: Some("sf".into()),
                list: vec![],
            },
            events: EventsState::default(),
        }
    );
}

#[tokio::test]
async fn round_trip_restores_only_whitelisted_slices() {
    let storage = InMemoryStorage::new();
    let first_session = reconciler(&storage);
    let state = AppState {
        cities: CitiesState {
            selected: Some("lisbon".into()),
            list: vec!["lisbon".into(), "porto".into()],
        },
        events: EventsState {
            query: "jazz".into(),
            page_size: 50,
        },
    };

    first_session.state_changed(1, &state);
    first_session.flush().await;

    assert_eq!(
        stored(&storage, "persist:root:cities"),
        json!({ "version": 1, "state": { "selected": "lisbon", "list": ["lisbon", "porto"] } })
    );
    assert_eq!(storage.value("persist:root:events"), None);

    let restored = reconciler(&storage).rehydrate().await;
    assert_eq!(restored.cities, state.cities);
    assert_eq!(restored.events, EventsState::default());
}

#[tokio::test]
async fn incompatible_records_fall_back_to_defaults() {
    let storage = InMemoryStorage::new();
    storage.insert("persist:root:cities", r#"{"version":1,"state":{"selected":42}}"#);

    let state = reconciler(&storage).rehydrate().await;
    assert_eq!(state, AppState::default());

    storage.insert("persist:root:cities", "{truncated");
    assert_eq!(reconciler(&storage).rehydrate().await, AppState::default());
}

#[tokio::test]
async fn records_from_another_version_are_discarded() {
    let storage = InMemoryStorage::new();
    storage.insert("persist:root:cities", r#"{"version":1,"state":{"selected":"sf"}}"#);

    let reconciler = PersistenceReconciler::<AppState>::new(
        PersistConfig::new(["cities"]).with_version(2),
        Arc::new(storage.clone()),
    );

    assert_eq!(reconciler.rehydrate().await, AppState::default());
    assert!(!reconciler.is_degraded());
}

#[tokio::test]
async fn unchanged_slices_are_not_rewritten() {
    let storage = InMemoryStorage::new();
    let reconciler = reconciler(&storage);
    let mut state = AppState::default();

    reconciler.state_changed(1, &state);
    state.events.query = "rock".into();
    reconciler.state_changed(2, &state);
    state.cities.selected = Some("porto".into());
    reconciler.state_changed(3, &state);
    reconciler.flush().await;

    assert_eq!(storage.writes().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn writes_land_in_version_order() {
    let storage = InMemoryStorage::new();
    storage.delay_next_write(Duration::from_millis(500));
    let reconciler = reconciler(&storage);

    for (version, city) in [(1, "lisbon"), (2, "porto"), (3, "faro")] {
        let state = AppState {
            cities: CitiesState {
                selected: Some(city.into()),
                list: vec![],
            },
            ..AppState::default()
        };
        reconciler.state_changed(version, &state);
    }
    reconciler.flush().await;

    let selected: Vec<Value> = storage
        .writes()
        .iter()
        .map(|(_, text)| serde_json::from_str::<Value>(text).unwrap()["state"]["selected"].clone())
        .collect();
    assert_eq!(selected, vec![json!("lisbon"), json!("porto"), json!("faro")]);
    assert_eq!(stored(&storage, "persist:root:cities")["state"]["selected"], "faro");
}

#[tokio::test]
async fn write_failure_degrades_without_failing() {
    let storage = InMemoryStorage::new();
    storage.fail_writes(StorageError::Unavailable("quota exceeded".into()));
    let reconciler = reconciler(&storage);

    let mut state = AppState::default();
    state.cities.selected = Some("sf".into());
    reconciler.state_changed(1, &state);
    reconciler.flush().await;

    assert!(reconciler.is_degraded());

    storage.heal();
    state.cities.selected = Some("la".into());
    reconciler.state_changed(2, &state);
    reconciler.flush().await;

    assert!(storage.writes().is_empty());
}

#[tokio::test]
async fn read_failure_degrades_and_uses_defaults() {
    let storage = InMemoryStorage::new();
    storage.insert("persist:root:cities", r#"{"version":1,"state":{"selected":"sf"}}"#);
    storage.fail_reads(StorageError::Io("disk gone".into()));
    let reconciler = reconciler(&storage);

    assert_eq!(reconciler.rehydrate().await, AppState::default());
    assert!(reconciler.is_degraded());
    assert!(format!("{reconciler:?}").contains("degraded: true"));
}

#[tokio::test]
async fn purge_removes_records_after_pending_writes() {
    let storage = InMemoryStorage::new();
    let reconciler = reconciler(&storage);
    let mut state = AppState::default();
    state.cities.selected = Some("sf".into());

    reconciler.state_changed(1, &state);
    reconciler.purge().await.unwrap();

    assert_eq!(storage.value("persist:root:cities"), None);
    assert_eq!(storage.removed(), vec!["persist:root:cities".to_string()]);

    // Purging forgets what was written, so the same state is written again
    reconciler.state_changed(2, &state);
    reconciler.flush().await;
    assert!(storage.value("persist:root:cities").is_some());
}

#[tokio::test]
async fn file_storage_survives_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let config = PersistConfig::new(["cities"]).with_root_key("persist:test");
    let mut state = AppState::default();
    state.cities.list = vec!["lisbon".into()];

    let first = PersistenceReconciler::<AppState>::new(config.clone(), Arc::new(FileStorage::new(dir.path())));
    first.state_changed(1, &state);
    first.flush().await;

    let second = PersistenceReconciler::<AppState>::new(config, Arc::new(FileStorage::new(dir.path())));
    assert_eq!(second.rehydrate().await.cities.list, vec!["lisbon".to_string()]);
}
