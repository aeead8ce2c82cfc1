//! Boundary configuration.

use std::fmt;
use std::rc::Rc;

use super::Boundary;
use crate::dom::DomNode;
use crate::error::{ReactiveError, Result};

/// Renders a region in front of `anchor`.
pub type Snippet = Rc<dyn Fn(DomNode) -> Result<()>>;

/// Renders the failed view: anchor, the caught error and a reset handle.
pub type FailedSnippet = Rc<dyn Fn(DomNode, &ReactiveError, &ResetHandle) -> Result<()>>;

/// Observes an error caught by a boundary.
pub type ErrorHandler = Rc<dyn Fn(&ReactiveError, &ResetHandle)>;

/// The optional views and hooks of a boundary.
#[derive(Clone, Default)]
pub struct BoundaryProps {
    pub(crate) onerror: Option<ErrorHandler>,
    pub(crate) pending: Option<Snippet>,
    pub(crate) failed: Option<FailedSnippet>,
}

impl BoundaryProps {
    /// No pending view, no error handling.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with every error the boundary catches.
    pub fn onerror(mut self, f: impl Fn(&ReactiveError, &ResetHandle) + 'static) -> Self {
        self.onerror = Some(Rc::new(f));
        self
    }

    /// Shown while the boundary is suspended.
    pub fn pending(mut self, f: impl Fn(DomNode) -> Result<()> + 'static) -> Self {
        self.pending = Some(Rc::new(f));
        self
    }

    /// Shown after the boundary caught an error.
    pub fn failed(
        mut self,
        f: impl Fn(DomNode, &ReactiveError, &ResetHandle) -> Result<()> + 'static,
    ) -> Self {
        self.failed = Some(Rc::new(f));
        self
    }

    /// Whether the boundary can catch errors.
    pub fn handles_errors(&self) -> bool {
        self.onerror.is_some() || self.failed.is_some()
    }

    /// Whether the boundary can show a pending view.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl fmt::Debug for BoundaryProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundaryProps")
            .field("onerror", &self.onerror.is_some())
            .field("pending", &self.pending.is_some())
            .field("failed", &self.failed.is_some())
            .finish()
    }
}

/// Passed to error hooks; recovers the boundary from its failed state.
#[derive(Clone, Debug)]
pub struct ResetHandle {
    pub(crate) boundary: Boundary,
}

impl ResetHandle {
    /// Destroy the failed view and mount a fresh main view.
    pub fn reset(&self) {
        self.boundary.reset();
    }
}
