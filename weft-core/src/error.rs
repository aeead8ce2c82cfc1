//! Error Types
//!
//! Every fallible operation in the runtime returns [`Result`]. Errors fall
//! into two families:
//!
//! - **Contract violations** (`UnsafeMutation`, `AwaitOutsideBoundary`,
//!   `InfiniteLoop`, `CircularDependency`): mistakes in the calling code. They are fatal to the
//!   offending operation and are never caught by a boundary.
//! - **Recoverable failures** (`Thrown`, `Rejected`): raised by user code
//!   inside an effect or derived, or by a deferred value that rejected. These
//!   are routed to the nearest boundary that can handle them.

use std::error::Error as StdError;
use std::rc::Rc;

use crate::graph::NodeId;

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Errors produced by the reactive runtime.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReactiveError {
    /// A signal was written from inside a derived computation or a block
    /// effect.
    #[error("state_unsafe_mutation: signal {signal:?} was written inside a derived or block effect")]
    UnsafeMutation {
        /// The signal that was written.
        signal: NodeId,
    },

    /// `suspend` was called with no enclosing boundary able to show a
    /// pending view.
    #[error("await_outside_boundary: cannot suspend outside a boundary with a pending fallback")]
    AwaitOutsideBoundary,

    /// The scheduler hit its iteration cap while flushing.
    #[error("effect_update_depth_exceeded: flush did not settle after {iterations} iterations")]
    InfiniteLoop {
        /// The configured cap that was exceeded.
        iterations: usize,
    },

    /// A user computation failed.
    #[error("{0}")]
    Thrown(Rc<dyn StdError>),

    /// A deferred value rejected.
    #[error("rejected: {0}")]
    Rejected(Rc<dyn StdError>),

    /// A reaction read itself while it was running.
    #[error("circular_dependency: reaction {0:?} depends on itself")]
    CircularDependency(NodeId),

    /// The reaction was destroyed before the operation could run.
    #[error("reaction {0:?} has been destroyed")]
    Destroyed(NodeId),
}

impl ReactiveError {
    /// Wrap a user error.
    pub fn thrown<E: Into<Box<dyn StdError>>>(error: E) -> Self {
        Self::Thrown(Rc::from(error.into()))
    }

    /// Wrap the reason a deferred value rejected.
    pub fn rejected<E: Into<Box<dyn StdError>>>(reason: E) -> Self {
        Self::Rejected(Rc::from(reason.into()))
    }

    /// Whether this error is a programming contract violation.
    ///
    /// Contract violations bypass boundaries and go straight to the host.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::UnsafeMutation { .. }
                | Self::AwaitOutsideBoundary
                | Self::InfiniteLoop { .. }
                | Self::CircularDependency(_)
        )
    }
}
