//! Cities slice: the known cities, the city filter and recently used cities.
//!
//! This slice is persisted across sessions.

use marquee_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
use serde::{Deserialize, Serialize};

/// How many recently used cities are remembered
pub const MAX_RECENT_CITIES: usize = 5;

/// A city events can be filtered by
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    /// Stable id, e.g. `sf`
    pub id: String,
    /// Display name
    pub name: String,
}

impl City {
    /// Create a city
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Cities slice state
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CitiesState {
    /// Id of the city events are filtered by
    pub selected: Option<String>,
    /// Cities offered by the server, as last loaded
    pub list: Vec<City>,
    /// Recently used city ids, most recent first
    pub recent: Vec<String>,
}

impl CitiesState {
    /// The selected city, if it is in the loaded list
    #[must_use]
    pub fn selected_city(&self) -> Option<&City> {
        let selected = self.selected.as_deref()?;
        self.list.iter().find(|city| city.id == selected)
    }
}

/// Cities slice transitions
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CitiesAction {
    /// Filter by a city
    SelectCity(String),
    /// Remove the city filter
    ClearCity,
    /// Replace the city list; a selection missing from the new list is dropped
    CitiesLoaded(Vec<City>),
    /// Move a city to the front of the recent list
    RememberCity(String),
}

/// Reducer for [`CitiesState`]
#[derive(Clone, Debug, Default)]
pub struct CitiesReducer;

impl CitiesReducer {
    /// Create the reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for CitiesReducer {
    type State = CitiesState;
    type Action = CitiesAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            CitiesAction::SelectCity(id) => state.selected = Some(id),
            CitiesAction::ClearCity => state.selected = None,
            CitiesAction::CitiesLoaded(list) => {
                let still_listed = state
                    .selected
                    .as_deref()
                    .is_none_or(|selected| list.iter().any(|city| city.id == selected));
                if !still_listed {
                    tracing::debug!(selected = ?state.selected, "Selected city no longer offered");
                    state.selected = None;
                }
                state.list = list;
            },
            CitiesAction::RememberCity(id) => {
                state.recent.retain(|recent| *recent != id);
                state.recent.insert(0, id);
                state.recent.truncate(MAX_RECENT_CITIES);
            },
        }
        smallvec![Effect::None]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_testing::reducer_test::assertions;
    use marquee_testing::ReducerTest;

    fn bay_area() -> Vec<City> {
        vec![City::new("sf", "San Francisco"), City::new("oak", "Oakland")]
    }

    #[test]
    fn test_select_and_clear() {
        let reducer = CitiesReducer::new();
        let mut state = CitiesState {
            list: bay_area(),
            ..CitiesState::default()
        };

        let _ = reducer.reduce(&mut state, CitiesAction::SelectCity("oak".to_string()), &());
        assert_eq!(state.selected_city().map(|city| city.name.as_str()), Some("Oakland"));

        let _ = reducer.reduce(&mut state, CitiesAction::ClearCity, &());
        assert_eq!(state.selected, None);
        assert_eq!(state.selected_city(), None);
    }

    #[test]
    fn test_loaded_list_keeps_listed_selection() {
        ReducerTest::new(CitiesReducer::new())
            .with_env(())
            .given_state(CitiesState {
                selected: Some("sf".to_string()),
                ..CitiesState::default()
            })
            .when_action(CitiesAction::CitiesLoaded(bay_area()))
            .then_state(|state| {
                assert_eq!(state.selected.as_deref(), Some("sf"));
                assert_eq!(state.list.len(), 2);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_loaded_list_drops_unlisted_selection() {
        ReducerTest::new(CitiesReducer::new())
            .with_env(())
            .given_state(CitiesState {
                selected: Some("nyc".to_string()),
                ..CitiesState::default()
            })
            .when_action(CitiesAction::CitiesLoaded(bay_area()))
            .then_state(|state| assert_eq!(state.selected, None))
            .run();
    }

    #[test]
    fn test_recent_cities_are_deduplicated_and_capped() {
        let reducer = CitiesReducer::new();
        let mut state = CitiesState::default();

        for id in ["a", "b", "c", "d", "e", "f"] {
            let _ = reducer.reduce(&mut state, CitiesAction::RememberCity(id.to_string()), &());
        }
        assert_eq!(state.recent, vec!["f", "e", "d", "c", "b"]);

        let _ = reducer.reduce(&mut state, CitiesAction::RememberCity("c".to_string()), &());
        assert_eq!(state.recent, vec!["c", "f", "e", "d", "b"]);
    }
}
