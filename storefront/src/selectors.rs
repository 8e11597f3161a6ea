//! Derived views over slice state and cached event lists.
//!
//! [`visible_events`] is the pure function; [`VisibleEventsSelector`] wraps
//! it so the page is only rebuilt when the cached list (by identity) or one
//! of the filter inputs (by value) changed.

use crate::slices::AppState;
use marquee_core::selector::Selector;
use marquee_query::tag::{id_text, list_items};
use serde_json::Value;
use std::sync::Arc;

/// One page of the filtered event list
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisibleEvents {
    /// Events on the current page
    pub items: Vec<Value>,
    /// Events matching the filters, across all pages
    pub total: usize,
    /// Page shown, clamped to the last page
    pub page: u32,
    /// Number of pages (at least 1)
    pub pages: u32,
}

/// Filter inputs of [`visible_events`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventFilter<'a> {
    /// City id, matched against each event's `city`
    pub city: Option<&'a str>,
    /// Case-insensitive text matched against `title` and `venue`
    pub query: &'a str,
    /// Requested page
    pub page: u32,
    /// Events per page
    pub page_size: u32,
}

impl<'a> EventFilter<'a> {
    /// Filter described by the current state
    #[must_use]
    pub fn from_state(state: &'a AppState) -> Self {
        Self {
            city: state.cities.selected.as_deref(),
            query: &state.events.search_query,
            page: state.events.page,
            page_size: state.events.page_size,
        }
    }
}

/// Filter `events` (a cached `getEvents` result) and cut out one page
///
/// A page past the end shows the last page.
#[must_use]
pub fn visible_events(events: &Value, filter: &EventFilter<'_>) -> VisibleEvents {
    let needle = filter.query.trim().to_lowercase();
    let matching: Vec<&Value> = list_items(events)
        .map(|items| {
            items
                .iter()
                .filter(|event| in_city(event, filter.city) && mentions(event, &needle))
                .collect()
        })
        .unwrap_or_default();

    let page_size = filter.page_size.max(1) as usize;
    let total = matching.len();
    let pages = u32::try_from(total.div_ceil(page_size).max(1)).unwrap_or(u32::MAX);
    let page = filter.page.min(pages - 1);

    VisibleEvents {
        items: matching
            .into_iter()
            .skip(page as usize * page_size)
            .take(page_size)
            .cloned()
            .collect(),
        total,
        page,
        pages,
    }
}

fn in_city(event: &Value, city: Option<&str>) -> bool {
    city.is_none_or(|city| event.get("city").is_some_and(|value| id_text(value) == city))
}

fn mentions(event: &Value, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    ["title", "venue"].iter().any(|field| {
        event
            .get(field)
            .and_then(Value::as_str)
            .is_some_and(|text| text.to_lowercase().contains(needle))
    })
}

type Inputs = (Arc<Value>, Option<String>, String, u32, u32);

/// Memoized [`visible_events`]
#[derive(Debug)]
pub struct VisibleEventsSelector {
    selector: Selector<Inputs, Arc<VisibleEvents>>,
}

impl Default for VisibleEventsSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibleEventsSelector {
    /// Selector with an empty memo
    #[must_use]
    pub fn new() -> Self {
        Self {
            selector: Selector::new(|(events, city, query, page, page_size): &Inputs| {
                Arc::new(visible_events(
                    events,
                    &EventFilter {
                        city: city.as_deref(),
                        query,
                        page: *page,
                        page_size: *page_size,
                    },
                ))
            }),
        }
    }

    /// Visible page for `state` over the cached list `events`
    ///
    /// Returns the previous `Arc` when neither input changed.
    pub fn select(&self, state: &AppState, events: &Arc<Value>) -> Arc<VisibleEvents> {
        self.selector.select((
            Arc::clone(events),
            state.cities.selected.clone(),
            state.events.search_query.clone(),
            state.events.page,
            state.events.page_size,
        ))
    }

    /// How many times the page was actually rebuilt
    #[must_use]
    pub fn recomputations(&self) -> usize {
        self.selector.recomputations()
    }
}
