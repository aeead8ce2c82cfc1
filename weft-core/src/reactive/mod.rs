//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, deriveds, and
//! effects. These primitives form the foundation of Weft's fine-grained
//! reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking frame (such as a derived or effect), the running
//! reaction records it as a dependency. When the signal's value changes, all
//! dependents are marked.
//!
//! ## Deriveds
//!
//! A Derived is a lazily computed value that caches its result. It
//! re-evaluates only when one of its dependencies changed and it is read.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects nest: the effects created by a run belong to
//! it and are destroyed with it.
//!
//! # Implementation Notes
//!
//! Each [`Runtime`] keeps an explicit context stack to detect dependencies.
//! Asynchronous continuations capture the context with
//! [`Runtime::capture`] and re-enter it with [`CapturedContext::restore`].

mod context;
mod derived;
mod effect;
mod equality;
mod runtime;
mod signal;

pub use context::{CapturedContext, ContextGuard};
pub(crate) use context::{ContextStack, Frame};
pub use derived::Derived;
pub use effect::Effect;
pub use equality::Equality;
pub use runtime::Runtime;
pub(crate) use runtime::WeakRuntime;
pub use signal::Signal;
