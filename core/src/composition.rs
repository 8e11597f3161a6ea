//! Reducer composition utilities
//!
//! - **`combine_reducers`**: Run several reducers over the same state and action
//! - **`scope_reducer`**: Embed a slice reducer (own state, own action enum)
//!   into the application reducer
//!
//! # Example
//!
//! ```
//! use marquee_core::composition::scope_reducer;
//! use marquee_core::effect::Effect;
//! use marquee_core::reducer::Reducer;
//! use marquee_core::{smallvec, SmallVec};
//!
//! #[derive(Clone, Debug, Default)]
//! struct PageState {
//!     page: u32,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum PageAction {
//!     Next,
//! }
//!
//! struct PageReducer;
//!
//! impl Reducer for PageReducer {
//!     type State = PageState;
//!     type Action = PageAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut PageState,
//!         action: PageAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<PageAction>; 4]> {
//!         match action {
//!             PageAction::Next => state.page += 1,
//!         }
//!         smallvec![Effect::None]
//!     }
//! }
//!
//! #[derive(Clone, Debug, Default)]
//! struct AppState {
//!     paging: PageState,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum AppAction {
//!     Paging(PageAction),
//!     Other,
//! }
//!
//! let scoped = scope_reducer(
//!     PageReducer,
//!     |app: &mut AppState| &mut app.paging,
//!     |action: AppAction| match action {
//!         AppAction::Paging(inner) => Some(inner),
//!         AppAction::Other => None,
//!     },
//!     AppAction::Paging,
//! );
//!
//! let mut state = AppState::default();
//! let _ = scoped.reduce(&mut state, AppAction::Paging(PageAction::Next), &());
//! let _ = scoped.reduce(&mut state, AppAction::Other, &());
//! assert_eq!(state.paging.page, 1);
//! ```

use crate::effect::Effect;
use crate::reducer::Reducer;
use smallvec::SmallVec;

/// Combines multiple reducers that operate on the same state and action types.
///
/// Each reducer is run in sequence, and all effects are collected and concatenated.
#[must_use]
pub fn combine_reducers<S, A, E>(
    reducers: Vec<Box<dyn Reducer<State = S, Action = A, Environment = E> + Send + Sync>>,
) -> CombinedReducer<S, A, E>
where
    A: Clone,
{
    CombinedReducer { reducers }
}

/// A combined reducer that runs multiple reducers in sequence.
///
/// Created by [`combine_reducers`].
pub struct CombinedReducer<S, A, E> {
    reducers: Vec<Box<dyn Reducer<State = S, Action = A, Environment = E> + Send + Sync>>,
}

impl<S, A, E> Reducer for CombinedReducer<S, A, E>
where
    A: Clone,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let mut all_effects = SmallVec::new();

        for reducer in &self.reducers {
            let effects = reducer.reduce(state, action.clone(), env);
            all_effects.extend(effects.into_iter().filter(|effect| !effect.is_none()));
        }

        if all_effects.is_empty() {
            all_effects.push(Effect::None);
        }

        all_effects
    }
}

/// Scopes a slice reducer into a larger state and action type.
///
/// - `state`: projects the parent state onto the slice
/// - `extract`: returns the slice action carried by a parent action, if any;
///   parent actions without one leave the slice untouched
/// - `embed`: wraps actions fed back by the slice's effects
pub fn scope_reducer<S, SubS, A, SubA, E, R>(
    reducer: R,
    state: fn(&mut S) -> &mut SubS,
    extract: fn(A) -> Option<SubA>,
    embed: fn(SubA) -> A,
) -> ScopedReducer<S, SubS, A, SubA, E, R>
where
    R: Reducer<State = SubS, Action = SubA, Environment = E>,
{
    ScopedReducer {
        reducer,
        state,
        extract,
        embed,
        _phantom: std::marker::PhantomData,
    }
}

/// A slice reducer embedded into a parent state.
///
/// Created by [`scope_reducer`].
pub struct ScopedReducer<S, SubS, A, SubA, E, R> {
    reducer: R,
    state: fn(&mut S) -> &mut SubS,
    extract: fn(A) -> Option<SubA>,
    embed: fn(SubA) -> A,
    _phantom: std::marker::PhantomData<fn(E)>,
}

impl<S, SubS, A, SubA, E, R> Reducer for ScopedReducer<S, SubS, A, SubA, E, R>
where
    R: Reducer<State = SubS, Action = SubA, Environment = E>,
    A: Send + 'static,
    SubA: Send + 'static,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let Some(local) = (self.extract)(action) else {
            return smallvec::smallvec![Effect::None];
        };

        let slice = (self.state)(state);
        let embed = self.embed;

        self.reducer
            .reduce(slice, local, env)
            .into_iter()
            .map(|effect| effect.map(embed))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{smallvec, SmallVec};
    use std::time::Duration;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct SearchState {
        query: String,
    }

    #[derive(Clone, Debug)]
    enum SearchAction {
        Set(String),
        Echo,
    }

    struct SearchReducer;

    impl Reducer for SearchReducer {
        type State = SearchState;
        type Action = SearchAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                SearchAction::Set(query) => {
                    state.query = query;
                    smallvec![Effect::None]
                },
                SearchAction::Echo => smallvec![Effect::Delay {
                    duration: Duration::from_millis(10),
                    action: Box::new(SearchAction::Set(format!("{}!", state.query))),
                }],
            }
        }
    }

    #[derive(Clone, Debug, Default)]
    struct AppState {
        search: SearchState,
        visits: u32,
    }

    #[derive(Clone, Debug)]
    enum AppAction {
        Search(SearchAction),
        Visit,
    }

    struct VisitReducer;

    impl Reducer for VisitReducer {
        type State = AppState;
        type Action = AppAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            if matches!(action, AppAction::Visit) {
                state.visits += 1;
            }
            smallvec![Effect::None]
        }
    }

    fn scoped_search() -> ScopedReducer<AppState, SearchState, AppAction, SearchAction, (), SearchReducer>
    {
        scope_reducer(
            SearchReducer,
            |app: &mut AppState| &mut app.search,
            |action| match action {
                AppAction::Search(inner) => Some(inner),
                AppAction::Visit => None,
            },
            AppAction::Search,
        )
    }

    #[test]
    fn scoped_reducer_ignores_foreign_actions() {
        let reducer = scoped_search();
        let mut state = AppState::default();

        let _ = reducer.reduce(&mut state, AppAction::Search(SearchAction::Set("jazz".into())), &());
        let _ = reducer.reduce(&mut state, AppAction::Visit, &());

        assert_eq!(state.search.query, "jazz");
        assert_eq!(state.visits, 0);
    }

    #[test]
    fn scoped_effects_are_embedded() {
        let reducer = scoped_search();
        let mut state = AppState::default();
        state.search.query = "rock".into();

        let mut effects = reducer.reduce(&mut state, AppAction::Search(SearchAction::Echo), &());
        let Some(Effect::Delay { duration, action }) = effects.pop() else {
            unreachable!("echo produces a delayed action");
        };

        assert_eq!(duration, Duration::from_millis(10));
        match *action {
            AppAction::Search(SearchAction::Set(query)) => assert_eq!(query, "rock!"),
            other => unreachable!("unexpected feedback action: {other:?}"),
        }
    }

    #[test]
    fn combined_reducers_all_run() {
        let combined = combine_reducers(vec![Box::new(scoped_search()), Box::new(VisitReducer)]);
        let mut state = AppState::default();

        let effects = combined.reduce(&mut state, AppAction::Visit, &());
        let _ = combined.reduce(&mut state, AppAction::Search(SearchAction::Set("folk".into())), &());

        assert_eq!(state.visits, 1);
        assert_eq!(state.search.query, "folk");
        assert_eq!(effects.len(), 1);
        assert!(effects[0].is_none());
    }
}
