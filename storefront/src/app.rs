//! The storefront: query cache, application store and persistence, wired
//! together.
//!
//! Startup order matters: the persisted slices are rehydrated before the
//! store exists, and the reconciler starts observing the store right after,
//! so the first write reflects the rehydrated state.

use crate::api::{self, storefront_api};
use crate::config::StorefrontConfig;
use crate::error::StorefrontError;
use crate::selectors::{VisibleEvents, VisibleEventsSelector};
use crate::slices::{AppAction, AppReducer, AppState, CitiesAction, City, EventsAction};
use marquee_core::environment::{Anonymous, Clock, HttpClient, PersistentStorage, SystemClock, TokenSupplier};
use marquee_persist::PersistenceReconciler;
use marquee_query::{OptimisticUpdate, Patch, QueryCache, QueryEnvironment, QueryHandle, RequestOptions};
use marquee_runtime::Store;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Application store type
pub type AppStore = Store<AppState, AppAction, (), AppReducer>;

/// Collaborators injected into a [`Storefront`]
#[derive(Clone)]
pub struct StorefrontEnvironment {
    /// HTTP collaborator for queries and mutations
    pub http: Arc<dyn HttpClient>,
    /// Storage for persisted slices
    pub storage: Arc<dyn PersistentStorage>,
    /// Time source for cache freshness and retention
    pub clock: Arc<dyn Clock>,
    /// Bearer token source
    pub token: Arc<dyn TokenSupplier>,
}

impl StorefrontEnvironment {
    /// Anonymous session on the system clock
    #[must_use]
    pub fn new(http: Arc<dyn HttpClient>, storage: Arc<dyn PersistentStorage>) -> Self {
        Self {
            http,
            storage,
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

/// Arguments of the `getEvents` query for the current city filter
#[must_use]
pub fn event_list_args(state: &AppState) -> Value {
    let mut args = Map::new();
    if let Some(city) = &state.cities.selected {
        args.insert("city".to_string(), Value::String(city.clone()));
    }
    Value::Object(args)
}

/// The storefront's client-side state
pub struct Storefront {
    cache: QueryCache,
    store: AppStore,
    persistence: PersistenceReconciler<AppState>,
    visible_events: VisibleEventsSelector,
}

impl std::fmt::Debug for Storefront {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storefront")
            .field("cache", &self.cache)
            .field("persistence", &self.persistence)
            .finish_non_exhaustive()
    }
}

impl Storefront {
    /// Rehydrate persisted state and build the storefront
    ///
    /// Never fails: unusable persisted state falls back to defaults and an
    /// unavailable storage only disables persistence.
    #[tracing::instrument(skip_all, name = "storefront_start")]
    pub async fn start(config: &StorefrontConfig, env: StorefrontEnvironment) -> Self {
        let cache = QueryCache::new(
            storefront_api(config.cache.clone()),
            QueryEnvironment::new(env.http)
                .with_clock(env.clock)
                .with_token(env.token),
        );

        let persistence: PersistenceReconciler<AppState> =
            PersistenceReconciler::new(config.persist.clone(), env.storage);
        let initial = persistence.rehydrate().await;
        tracing::info!(
            city = ?initial.cities.selected,
            degraded = persistence.is_degraded(),
            "Storefront state rehydrated"
        );

        let store = Store::new(initial, AppReducer::new(), ());
        store.observe(Arc::new(persistence.clone())).await;

        Self {
            cache,
            store,
            persistence,
            visible_events: VisibleEventsSelector::new(),
        }
    }

    /// The query cache
    #[must_use]
    pub const fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// The application store
    #[must_use]
    pub const fn store(&self) -> &AppStore {
        &self.store
    }

    /// The persistence reconciler
    #[must_use]
    pub const fn persistence(&self) -> &PersistenceReconciler<AppState> {
        &self.persistence
    }

    /// Snapshot of the application state
    pub async fn state(&self) -> AppState {
        self.store.state(AppState::clone).await
    }

    /// Dispatch a slice action
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::Store`] once the store is shutting down.
    pub async fn send(&self, action: impl Into<AppAction>) -> Result<(), StorefrontError> {
        self.store.send(action.into()).await?;
        Ok(())
    }

    /// Type search text and wait until the debounced query is committed
    ///
    /// Text typed again within the debounce window supersedes this one; the
    /// call still returns once its own commit has been considered.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::Store`] once the store is shutting down.
    pub async fn search(&self, query: impl Into<String>) -> Result<(), StorefrontError> {
        let mut handle = self
            .store
            .send(AppAction::Events(EventsAction::SetSearchQuery(query.into())))
            .await?;
        handle.wait().await;
        Ok(())
    }

    /// Filter events by `city` and remember it as recently used
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::Store`] once the store is shutting down.
    pub async fn select_city(&self, city: impl Into<String>) -> Result<(), StorefrontError> {
        let city = city.into();
        self.send(CitiesAction::SelectCity(city.clone())).await?;
        self.send(CitiesAction::RememberCity(city)).await
    }

    /// Load the city list into the cities slice
    ///
    /// # Errors
    ///
    /// Returns the fetch error, or [`StorefrontError::Decode`] when the
    /// response is not a list of cities.
    #[tracing::instrument(skip(self), name = "storefront_load_cities")]
    pub async fn load_cities(&self) -> Result<Vec<City>, StorefrontError> {
        let entry = self
            .cache
            .fetch(api::GET_CITIES, &json!({}), RequestOptions::default())
            .await?;
        if let Some(error) = entry.error {
            return Err(error.into());
        }

        let cities: Vec<City> = match entry.decode() {
            Some(decoded) => decoded.map_err(|source| StorefrontError::Decode {
                endpoint: api::GET_CITIES,
                source,
            })?,
            None => Vec::new(),
        };
        self.send(CitiesAction::CitiesLoaded(cities.clone())).await?;
        Ok(cities)
    }

    /// Subscribe to the event list for the current city filter
    ///
    /// # Errors
    ///
    /// Same as [`QueryCache::request`].
    pub async fn watch_events(&self) -> Result<QueryHandle, StorefrontError> {
        let args = self.store.state(event_list_args).await;
        Ok(self.cache.request(api::GET_EVENTS, &args, RequestOptions::default())?)
    }

    /// Current page of events after city, search and paging filters
    ///
    /// Served from the cache when possible. The result is shared with the
    /// previous call when neither the list nor the filters changed.
    ///
    /// # Errors
    ///
    /// Returns the fetch error when no event list could be loaded.
    pub async fn visible_events(&self) -> Result<Arc<VisibleEvents>, StorefrontError> {
        let state = self.state().await;
        let mut handle = self
            .cache
            .request(api::GET_EVENTS, &event_list_args(&state), RequestOptions::default())?;
        let entry = handle.resolve().await;

        match (entry.data, entry.error) {
            (Some(events), _) => Ok(self.visible_events.select(&state, &events)),
            (None, Some(error)) => Err(error.into()),
            (None, None) => Ok(Arc::new(VisibleEvents::default())),
        }
    }

    /// Create an event, showing it in the current list until confirmed
    ///
    /// # Errors
    ///
    /// Returns the mutation error; the list is restored first.
    pub async fn create_event(&self, event: Value) -> Result<Value, StorefrontError> {
        let list = self.store.state(event_list_args).await;
        let update = OptimisticUpdate::new(api::GET_EVENTS, &list, Patch::InsertItem { item: event.clone() });
        Ok(self.cache.mutate(api::CREATE_EVENT, &event, vec![update]).await?)
    }

    /// Edit an event in the current list and in its detail entry
    ///
    /// # Errors
    ///
    /// Returns the mutation error; both entries are restored first.
    pub async fn update_event(&self, id: Value, fields: Value) -> Result<Value, StorefrontError> {
        let list = self.store.state(event_list_args).await;
        let updates = vec![
            OptimisticUpdate::new(
                api::GET_EVENTS,
                &list,
                Patch::UpdateItem {
                    id: id.clone(),
                    fields: fields.clone(),
                },
            ),
            OptimisticUpdate::new(api::GET_EVENT, &json!({ "id": id.clone() }), Patch::Merge { fields: fields.clone() }),
        ];

        let mut args = match fields {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };
        args.insert("id".to_string(), id);
        Ok(self.cache.mutate(api::UPDATE_EVENT, &Value::Object(args), updates).await?)
    }

    /// Delete an event, hiding it from the current list until confirmed
    ///
    /// # Errors
    ///
    /// Returns the mutation error; the list is restored first.
    pub async fn delete_event(&self, id: Value) -> Result<Value, StorefrontError> {
        let list = self.store.state(event_list_args).await;
        let update = OptimisticUpdate::new(api::GET_EVENTS, &list, Patch::RemoveItem { id: id.clone() });
        Ok(self.cache.mutate(api::DELETE_EVENT, &json!({ "id": id }), vec![update]).await?)
    }

    /// Start a ticket purchase; resolves to the payment processor's checkout
    /// payload
    ///
    /// Availability is not patched optimistically: the event and the order
    /// list are refetched once the server confirms.
    ///
    /// # Errors
    ///
    /// Returns the mutation error.
    #[tracing::instrument(skip(self), name = "storefront_purchase")]
    pub async fn purchase_tickets(&self, event_id: Value, quantity: u32) -> Result<Value, StorefrontError> {
        let args = json!({ "id": event_id, "quantity": quantity });
        Ok(self.cache.mutate(api::PURCHASE_TICKETS, &args, Vec::new()).await?)
    }

    /// Forget everything tied to the current user
    ///
    /// Drops every cache entry and deletes persisted state.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::Persist`] when persisted state could not
    /// be deleted.
    #[tracing::instrument(skip(self), name = "storefront_sign_out")]
    pub async fn sign_out(&self) -> Result<(), StorefrontError> {
        self.cache.reset();
        self.persistence.purge().await?;
        Ok(())
    }

    /// Stop accepting actions and wait for pending persistence writes
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::Store`] when effects are still running
    /// after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StorefrontError> {
        self.store.shutdown(timeout).await?;
        self.persistence.flush().await;
        tracing::info!("Storefront shut down");
        Ok(())
    }
}
