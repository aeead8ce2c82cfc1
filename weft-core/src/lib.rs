//! Weft Core
//!
//! This crate provides the core runtime for the Weft declarative UI
//! compiler. Compiled components call into it to:
//!
//! - hold state in signals and compute derived values lazily,
//! - run effects when their dependencies change, in a deterministic order,
//! - group subtrees into boundaries that show a pending view while
//!   something inside is loading and a failed view after an error,
//! - run speculative updates in forks without disturbing other readers.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: signals, deriveds, effects and the [`Runtime`] that owns them
//! - `graph`: the dependency graph and the run queue
//! - `boundary`: pending/failed views, suspension and error routing
//! - `fork`: speculative overlays over a set of signals
//! - `deferred` and `blocks`: asynchronous values and the blocks built on them
//! - `host` and `dom`: the capabilities the runtime needs from its embedder
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use weft_core::{ManualHost, Runtime};
//!
//! let host = Rc::new(ManualHost::new());
//! let runtime = Runtime::new(host.clone());
//!
//! // Create a signal
//! let count = runtime.signal(0);
//!
//! // Create a derived value
//! let doubled = runtime.derived({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! runtime.effect({
//!     let doubled = doubled.clone();
//!     move || {
//!         println!("Doubled: {}", doubled.get()?);
//!         Ok(())
//!     }
//! });
//!
//! // Update the signal; the effect runs on the next microtask
//! count.set(5).unwrap();
//! host.run_microtasks();
//! assert_eq!(doubled.get().unwrap(), 10);
//! ```

pub mod blocks;
pub mod boundary;
pub mod config;
pub mod deferred;
pub mod dom;
pub mod error;
pub mod fork;
pub mod graph;
pub mod host;
pub mod reactive;

pub use boundary::{Boundary, BoundaryProps, Phase, ResetHandle, Suspense, Suspension};
pub use config::RuntimeConfig;
pub use deferred::Deferred;
pub use dom::{Dom, DomNode, MemoryDom, NodeRange};
pub use error::{ReactiveError, Result};
pub use fork::{Fork, ForkView};
pub use graph::{EffectKind, NodeId, Status};
pub use host::{Host, ManualHost, TokioHost};
pub use reactive::{CapturedContext, ContextGuard, Derived, Effect, Equality, Runtime, Signal};
