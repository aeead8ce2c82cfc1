//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a tracking frame (derived/effect), the
//!    running reaction records it as a dependency.
//!
//! 2. When a signal's value changes, every dependent is marked and dirty
//!    effects are queued for the next flush.
//!
//! 3. A write that the equality policy considers a no-op notifies nobody.
//!
//! # Storage
//!
//! The value lives in the runtime's graph behind an `Rc<dyn Any>`; the
//! handle is just an id plus a runtime reference, so it is cheap to clone
//! into closures.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use super::equality::Equality;
use super::runtime::Runtime;
use crate::error::Result;
use crate::graph::{Node, NodeId};

/// A reactive state cell holding a value of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let count = runtime.signal(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies dependents)
/// count.set(5)?;
/// ```
pub struct Signal<T> {
    id: NodeId,
    runtime: Runtime,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Signal<T> {
    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The runtime this signal belongs to.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Borrow the current value, tracking the read.
    ///
    /// Returns `None` once the runtime has been disposed.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let value = self.runtime.read_source(self.id)?;
        value.downcast_ref::<T>().map(f)
    }

    /// Borrow the current value, tracking the read.
    ///
    /// # Panics
    ///
    /// Panics if the signal no longer exists: its runtime was disposed or
    /// the effect that created it was destroyed or re-ran. Use
    /// [`try_with`](Self::try_with) when that can happen.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.try_with(f).expect("signal read after it was removed")
    }

    /// Borrow the current value without tracking.
    ///
    /// Returns `None` once the signal no longer exists.
    pub fn try_with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let value = self.runtime.peek(self.id)?;
        value.downcast_ref::<T>().map(f)
    }

    /// Borrow the current value without tracking.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`with`](Self::with).
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.try_with_untracked(f)
            .expect("signal read after it was removed")
    }

    /// Set a new value.
    ///
    /// Returns whether the value changed. Fails with
    /// [`UnsafeMutation`](crate::ReactiveError::UnsafeMutation) when called
    /// from a derived or block effect in strict mode.
    pub fn set(&self, value: T) -> Result<bool> {
        self.runtime.write(self.id, Rc::new(value))
    }

    /// Update the value using a function of the current one.
    ///
    /// The current value is read without tracking.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<bool> {
        let next = self.with_untracked(f);
        self.set(next)
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Get the current value.
    ///
    /// If called within a tracking frame, this also registers the signal as
    /// a dependency of the running reaction.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.with_untracked(T::clone)
    }

    /// The value before the most recent write, if there was one.
    pub fn old_value(&self) -> Option<T> {
        self.runtime
            .old_value(self.id)
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            runtime: self.runtime.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").field("id", &self.id).finish()
    }
}

impl Runtime {
    /// Create a signal compared with `PartialEq`.
    pub fn signal<T: PartialEq + 'static>(&self, value: T) -> Signal<T> {
        self.signal_with(value, Equality::Default)
    }

    /// Create a signal with an explicit equality policy.
    pub fn signal_with<T: PartialEq + 'static>(&self, value: T, equality: Equality<T>) -> Signal<T> {
        self.make_signal(value, equality.into_erased())
    }

    /// Create a signal for a type without `PartialEq`. Unless a custom
    /// comparator is given, every write counts as a change.
    pub fn signal_opaque<T: 'static>(&self, value: T, equality: Equality<T>) -> Signal<T> {
        self.make_signal(value, equality.into_erased_unordered())
    }

    fn make_signal<T: 'static>(&self, value: T, equals: crate::graph::EqualsFn) -> Signal<T> {
        let id = self.create_node(Node::source(Rc::new(value), equals));
        Signal {
            id,
            runtime: self.clone(),
            _marker: PhantomData,
        }
    }
}
