//! Application state: the events and cities slices and their composition.

use marquee_core::composition::{combine_reducers, scope_reducer, CombinedReducer};
use marquee_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cities slice
pub mod cities;

/// Events slice
pub mod events;

pub use cities::{CitiesAction, CitiesReducer, CitiesState, City};
pub use events::{EventsAction, EventsReducer, EventsState};

/// Whole storefront state
///
/// Field names double as persistence slice names.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppState {
    /// Search, selection and paging over events
    pub events: EventsState,
    /// City filter and city list
    pub cities: CitiesState,
}

/// Any storefront transition
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppAction {
    /// Events slice transition
    Events(EventsAction),
    /// Cities slice transition
    Cities(CitiesAction),
}

impl From<EventsAction> for AppAction {
    fn from(action: EventsAction) -> Self {
        Self::Events(action)
    }
}

impl From<CitiesAction> for AppAction {
    fn from(action: CitiesAction) -> Self {
        Self::Cities(action)
    }
}

type SliceReducer = dyn Reducer<State = AppState, Action = AppAction, Environment = ()> + Send + Sync;

/// Sends the event list back to its first page when the city filter changes
struct CityFilterPaging;

impl Reducer for CityFilterPaging {
    type State = AppState;
    type Action = AppAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if matches!(
            action,
            AppAction::Cities(CitiesAction::SelectCity(_) | CitiesAction::ClearCity)
        ) {
            state.events.page = 0;
        }
        smallvec![Effect::None]
    }
}

/// Reducer for [`AppState`]: both slices scoped in, plus cross-slice rules
///
/// Cheap to clone, as the store requires.
#[derive(Clone)]
pub struct AppReducer {
    inner: Arc<CombinedReducer<AppState, AppAction, ()>>,
}

impl AppReducer {
    /// Compose the slice reducers
    #[must_use]
    pub fn new() -> Self {
        let events = scope_reducer(
            EventsReducer::new(),
            |app: &mut AppState| &mut app.events,
            |action: AppAction| match action {
                AppAction::Events(inner) => Some(inner),
                AppAction::Cities(_) => None,
            },
            AppAction::Events,
        );
        let cities = scope_reducer(
            CitiesReducer::new(),
            |app: &mut AppState| &mut app.cities,
            |action: AppAction| match action {
                AppAction::Cities(inner) => Some(inner),
                AppAction::Events(_) => None,
            },
            AppAction::Cities,
        );

        let reducers: Vec<Box<SliceReducer>> = vec![
            Box::new(events),
            Box::new(cities),
            Box::new(CityFilterPaging),
        ];
        Self {
            inner: Arc::new(combine_reducers(reducers)),
        }
    }
}

impl Default for AppReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AppReducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppReducer").finish_non_exhaustive()
    }
}

impl Reducer for AppReducer {
    type State = AppState;
    type Action = AppAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        self.inner.reduce(state, action, env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_testing::reducer_test::assertions;
    use marquee_testing::ReducerTest;

    #[test]
    fn test_actions_reach_their_slice() {
        let reducer = AppReducer::new();
        let mut state = AppState::default();

        let effects = reducer.reduce(&mut state, EventsAction::SetSearchQuery("jazz".into()).into(), &());
        let _ = reducer.reduce(&mut state, CitiesAction::RememberCity("sf".into()).into(), &());

        assert_eq!(state.events.search_input, "jazz");
        assert_eq!(
            effects.as_slice(),
            [Effect::Delay {
                duration: events::SEARCH_DEBOUNCE,
                action: Box::new(AppAction::Events(EventsAction::CommitSearch("jazz".into()))),
            }]
        );
        assert_eq!(state.cities.recent, vec!["sf"]);
        assert_eq!(state.cities.selected, None);
    }

    #[test]
    fn test_city_change_resets_paging() {
        ReducerTest::new(AppReducer::new())
            .with_env(())
            .given_state(AppState {
                events: EventsState {
                    page: 4,
                    ..EventsState::default()
                },
                ..AppState::default()
            })
            .when_action(AppAction::Cities(CitiesAction::SelectCity("sf".into())))
            .then_state(|state| {
                assert_eq!(state.cities.selected.as_deref(), Some("sf"));
                assert_eq!(state.events.page, 0);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_serializes_by_slice_name() -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(AppState::default())?;
        assert_eq!(value["cities"]["selected"], serde_json::Value::Null);
        assert_eq!(value["events"]["page_size"], 20);

        let partial: AppState = serde_json::from_str(r#"{"cities":{"selected":"sf"}}"#)?;
        assert_eq!(partial.cities.selected.as_deref(), Some("sf"));
        assert_eq!(partial.events, EventsState::default());
        Ok(())
    }
}
