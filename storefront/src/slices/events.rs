//! Events slice: search text, selected event and pagination.
//!
//! The slice never holds event data. The list itself lives in the query
//! cache; [`crate::selectors`] combines both into the visible page.

use marquee_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Page size used until the user picks one
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page size accepted by [`EventsAction::SetPageSize`]
pub const MAX_PAGE_SIZE: u32 = 100;

/// Quiet period before typed search text filters the list
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(250);

/// Events slice state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsState {
    /// Search text as typed
    pub search_input: String,
    /// Committed search, matched against event titles and venues
    pub search_query: String,
    /// Id of the event whose details are open
    pub selected: Option<String>,
    /// Zero-based page index
    pub page: u32,
    /// Events per page
    pub page_size: u32,
}

impl Default for EventsState {
    fn default() -> Self {
        Self {
            search_input: String::new(),
            search_query: String::new(),
            selected: None,
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Events slice transitions
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventsAction {
    /// Replace the search text; it is committed after [`SEARCH_DEBOUNCE`]
    SetSearchQuery(String),
    /// Commit typed text as the search query, unless newer text replaced it.
    /// A different query starts from the first page.
    CommitSearch(String),
    /// Empty the search text and query at once
    ClearSearch,
    /// Open an event by id
    SelectEvent(String),
    /// Close the open event
    ClearSelection,
    /// Jump to a page
    SetPage(u32),
    /// Next page
    NextPage,
    /// Previous page, stopping at the first
    PreviousPage,
    /// Change the page size (clamped to `1..=MAX_PAGE_SIZE`), back to the first page
    SetPageSize(u32),
}

/// Reducer for [`EventsState`]
#[derive(Clone, Debug, Default)]
pub struct EventsReducer;

impl EventsReducer {
    /// Create the reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for EventsReducer {
    type State = EventsState;
    type Action = EventsAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            EventsAction::SetSearchQuery(query) => {
                state.search_input.clone_from(&query);
                return smallvec![Effect::Delay {
                    duration: SEARCH_DEBOUNCE,
                    action: Box::new(EventsAction::CommitSearch(query)),
                }];
            },
            EventsAction::CommitSearch(query) => {
                if query == state.search_input && query != state.search_query {
                    state.search_query = query;
                    state.page = 0;
                }
            },
            EventsAction::ClearSearch => {
                state.search_input.clear();
                if !state.search_query.is_empty() {
                    state.search_query.clear();
                    state.page = 0;
                }
            },
            EventsAction::SelectEvent(id) => state.selected = Some(id),
            EventsAction::ClearSelection => state.selected = None,
            EventsAction::SetPage(page) => state.page = page,
            EventsAction::NextPage => state.page = state.page.saturating_add(1),
            EventsAction::PreviousPage => state.page = state.page.saturating_sub(1),
            EventsAction::SetPageSize(size) => {
                let size = size.clamp(1, MAX_PAGE_SIZE);
                if size != state.page_size {
                    state.page_size = size;
                    state.page = 0;
                }
            },
        }
        smallvec![Effect::None]
    }
}
