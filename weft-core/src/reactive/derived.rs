//! Derived Implementation
//!
//! A Derived is a cached computed value that re-evaluates only when its
//! dependencies change.
//!
//! # How Deriveds Work
//!
//! 1. On first access, the derived runs its computation and caches the
//!    result.
//!
//! 2. When a dependency changes, the derived is marked "maybe dirty"; its
//!    own dependents are marked maybe-dirty as well.
//!
//! 3. On next access, the derived re-checks whether an input actually
//!    changed. If so it recomputes, otherwise it is marked clean and the
//!    cache is returned.
//!
//! 4. A recompute that produces an equal value does not bump the derived's
//!    version, so reactions downstream of it stay clean.
//!
//! Deriveds that are never read stay dirty and cost nothing.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use super::equality::Equality;
use super::runtime::Runtime;
use crate::error::{ReactiveError, Result};
use crate::graph::{ComputeFn, EqualsFn, Node, NodeId, Value};

/// A cached value computed from other reactive nodes.
///
/// ```rust,ignore
/// let count = runtime.signal(2);
/// let doubled = runtime.derived({
///     let count = count.clone();
///     move || count.get() * 2
/// });
/// assert_eq!(doubled.get()?, 4);
/// ```
pub struct Derived<T> {
    id: NodeId,
    runtime: Runtime,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Derived<T> {
    /// Get the derived's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Borrow the value, recomputing first if needed.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let value = self.runtime.read_derived(self.id)?;
        value
            .downcast_ref::<T>()
            .map(f)
            .ok_or(ReactiveError::Destroyed(self.id))
    }

    /// Borrow the value without registering a dependency.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.runtime.untrack(|| self.with(f))
    }
}

impl<T: Clone + 'static> Derived<T> {
    /// Get the value, recomputing if a dependency changed.
    ///
    /// Errors raised by the computation are returned to the reader.
    pub fn get(&self) -> Result<T> {
        self.with(T::clone)
    }

    /// Get the value without tracking.
    pub fn get_untracked(&self) -> Result<T> {
        self.with_untracked(T::clone)
    }
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            runtime: self.runtime.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived").field("id", &self.id).finish()
    }
}

impl Runtime {
    /// Create a derived value compared with `PartialEq`.
    pub fn derived<T: PartialEq + 'static>(&self, mut f: impl FnMut() -> T + 'static) -> Derived<T> {
        self.derived_with(move || Ok(f()), Equality::Default)
    }

    /// Create a derived whose computation may fail.
    pub fn try_derived<T: PartialEq + 'static>(
        &self,
        f: impl FnMut() -> Result<T> + 'static,
    ) -> Derived<T> {
        self.derived_with(f, Equality::Default)
    }

    /// Create a fallible derived with an explicit equality policy.
    pub fn derived_with<T: PartialEq + 'static>(
        &self,
        f: impl FnMut() -> Result<T> + 'static,
        equality: Equality<T>,
    ) -> Derived<T> {
        self.make_derived(f, equality.into_erased())
    }

    fn make_derived<T: 'static>(
        &self,
        mut f: impl FnMut() -> Result<T> + 'static,
        equals: EqualsFn,
    ) -> Derived<T> {
        let compute: ComputeFn =
            Rc::new(std::cell::RefCell::new(move || f().map(|value| Rc::new(value) as Value)));
        let id = self.create_node(Node::derived(compute, equals));
        Derived {
            id,
            runtime: self.clone(),
            _marker: PhantomData,
        }
    }
}
