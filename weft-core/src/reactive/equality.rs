//! Equality Policies
//!
//! A write is a no-op when the policy considers the old and new values
//! equal: the value is kept, no version is bumped and nothing is notified.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::graph::EqualsFn;

/// Decides whether a write actually changes a signal.
pub enum Equality<T> {
    /// Compare with `PartialEq`.
    Default,
    /// Every write is a change. Used to force reactivity for values that are
    /// mutated in place.
    Never,
    /// A custom comparator.
    Custom(Rc<dyn Fn(&T, &T) -> bool>),
}

impl<T> Equality<T> {
    /// A custom comparator.
    pub fn custom(f: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self::Custom(Rc::new(f))
    }
}

impl<T: PartialEq + 'static> Equality<T> {
    /// Erase the value type so the graph can apply the policy.
    pub(crate) fn into_erased(self) -> EqualsFn {
        match self {
            Self::Default => erase(|a: &T, b: &T| a == b),
            Self::Never => Rc::new(|_, _| false),
            Self::Custom(f) => erase(move |a: &T, b: &T| f(a, b)),
        }
    }
}

impl<T: 'static> Equality<T> {
    /// Erase a policy for a type without `PartialEq`. `Default` behaves
    /// like `Never`.
    pub(crate) fn into_erased_unordered(self) -> EqualsFn {
        match self {
            Self::Default | Self::Never => Rc::new(|_, _| false),
            Self::Custom(f) => erase(move |a: &T, b: &T| f(a, b)),
        }
    }
}

fn erase<T: 'static>(f: impl Fn(&T, &T) -> bool + 'static) -> EqualsFn {
    Rc::new(move |a: &dyn Any, b: &dyn Any| {
        match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
            (Some(a), Some(b)) => f(a, b),
            _ => false,
        }
    })
}

impl<T> Default for Equality<T> {
    fn default() -> Self {
        Self::Default
    }
}

impl<T> Clone for Equality<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Default => Self::Default,
            Self::Never => Self::Never,
            Self::Custom(f) => Self::Custom(f.clone()),
        }
    }
}

impl<T> fmt::Debug for Equality<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("Equality::Default"),
            Self::Never => f.write_str("Equality::Never"),
            Self::Custom(_) => f.write_str("Equality::Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check<T: PartialEq + 'static>(policy: Equality<T>, a: T, b: T) -> bool {
        (policy.into_erased())(&a, &b)
    }

    #[test]
    fn default_uses_partial_eq() {
        assert!(check(Equality::Default, 1, 1));
        assert!(!check(Equality::Default, 1, 2));
    }

    #[test]
    fn never_is_never_equal() {
        assert!(!check(Equality::Never, 1, 1));
    }

    #[test]
    fn custom_comparator() {
        let by_len = Equality::custom(|a: &String, b: &String| a.len() == b.len());
        assert!(check(by_len.clone(), "abc".into(), "xyz".into()));
        assert!(!check(by_len, "abc".into(), "ab".into()));
    }

    #[test]
    fn mismatched_types_are_unequal() {
        let eq = Equality::<i32>::Default.into_erased();
        assert!(!eq(&1i32, &"1"));
    }
}
