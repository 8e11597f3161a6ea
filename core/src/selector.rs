//! Memoized selectors for derived state
//!
//! A [`Selector`] wraps a pure function of its inputs and remembers the last
//! inputs and output. It recomputes only when an input changed, where
//! "changed" is decided by [`SelectorInput::same`]: shared data (`Arc`) is
//! compared by identity, small values by equality.
//!
//! # Example
//!
//! ```
//! use marquee_core::selector::Selector;
//! use std::sync::Arc;
//!
//! let total = Selector::new(|(items, min): &(Arc<Vec<u32>>, u32)| {
//!     items.iter().filter(|n| **n >= *min).sum::<u32>()
//! });
//!
//! let items = Arc::new(vec![1, 5, 10]);
//! assert_eq!(total.select((Arc::clone(&items), 5)), 15);
//! assert_eq!(total.select((Arc::clone(&items), 5)), 15);
//! assert_eq!(total.recomputations(), 1);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Input of a memoized selector
pub trait SelectorInput: Clone {
    /// Whether `self` and `other` count as the same input
    fn same(&self, other: &Self) -> bool;
}

impl<T: ?Sized> SelectorInput for Arc<T> {
    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: SelectorInput> SelectorInput for Option<T> {
    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same(b),
            (None, None) => true,
            _ => false,
        }
    }
}

macro_rules! impl_selector_input_by_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SelectorInput for $ty {
                fn same(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

impl_selector_input_by_eq!(bool, u8, u16, u32, u64, usize, i32, i64, String);

macro_rules! impl_selector_input_for_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: SelectorInput),+> SelectorInput for ($($name,)+) {
            fn same(&self, other: &Self) -> bool {
                $(self.$idx.same(&other.$idx))&&+
            }
        }
    };
}

impl_selector_input_for_tuple!(A: 0);
impl_selector_input_for_tuple!(A: 0, B: 1);
impl_selector_input_for_tuple!(A: 0, B: 1, C: 2);
impl_selector_input_for_tuple!(A: 0, B: 1, C: 2, D: 3);
impl_selector_input_for_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);

type Compute<I, O> = Box<dyn Fn(&I) -> O + Send + Sync>;

/// Memoized pure function of `I`
pub struct Selector<I, O> {
    compute: Compute<I, O>,
    last: Mutex<Option<(I, O)>>,
    recomputations: AtomicUsize,
}

impl<I, O> Selector<I, O>
where
    I: SelectorInput,
    O: Clone,
{
    /// Wrap a pure function
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn(&I) -> O + Send + Sync + 'static,
    {
        Self {
            compute: Box::new(compute),
            last: Mutex::new(None),
            recomputations: AtomicUsize::new(0),
        }
    }

    /// Output for `input`, recomputed only when the input changed
    pub fn select(&self, input: I) -> O {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some((previous, output)) = last.as_ref() {
            if previous.same(&input) {
                return output.clone();
            }
        }

        let output = (self.compute)(&input);
        self.recomputations.fetch_add(1, Ordering::Relaxed);
        *last = Some((input, output.clone()));
        output
    }

    /// How many times the wrapped function actually ran
    #[must_use]
    pub fn recomputations(&self) -> usize {
        self.recomputations.load(Ordering::Relaxed)
    }

    /// Forget the memoized output
    pub fn reset(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl<I, O> std::fmt::Debug for Selector<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector")
            .field("recomputations", &self.recomputations.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
