//! Boundaries
//!
//! A boundary is a block effect that owns up to three branches:
//!
//! - **main**: the regular content,
//! - **pending**: shown while something inside main is suspended,
//! - **failed**: shown after the boundary caught an error.
//!
//! # State Machine
//!
//! ```text
//! Active ──suspend──▶ Suspended ──last release──▶ Active
//!   │                    │
//!   └──── error ─────────┴──▶ Failed ──reset──▶ Active
//! ```
//!
//! While suspended, main is detached into an offscreen fragment (nodes keep
//! their identity) and user and render effects inside it are parked. The
//! last release runs the parked render effects, the queued callbacks,
//! removes pending, re-attaches main in front of the anchor and finally runs
//! the parked plain effects.
//!
//! # Deferred Work
//!
//! Showing pending after the initial mount and mounting the failed view both
//! happen on a host microtask. Every deferred step checks that the boundary
//! is still alive before touching it.

mod props;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

pub use props::{BoundaryProps, ErrorHandler, FailedSnippet, ResetHandle, Snippet};

use crate::dom::{DomNode, Offscreen};
use crate::error::{ReactiveError, Result};
use crate::graph::{EffectKind, NodeId, RunFn};
use crate::reactive::{Frame, Runtime};

/// Lifecycle phase of a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Main is visible.
    Active,
    /// Waiting for at least one suspension to be released.
    Suspended,
    /// Caught an error; main is gone.
    Failed,
}

/// Commands understood by a boundary.
pub trait Suspense {
    /// Register one more pending asynchronous operation.
    fn increment_suspense(&self);

    /// Release one pending operation. The last release unsuspends.
    fn decrement_suspense(&self);

    /// Run `f` when the boundary next unsuspends.
    fn add_callback(&self, f: Box<dyn FnOnce()>);

    /// Run `effect` when the boundary next unsuspends, if it is still dirty.
    fn add_effect(&self, effect: NodeId);

    /// Unsuspend now, regardless of the pending count.
    fn release(&self);
}

struct BoundaryState {
    effect: Option<NodeId>,
    anchor: DomNode,
    props: BoundaryProps,
    children: Snippet,

    main: Option<NodeId>,
    pending: Option<NodeId>,
    failed: Option<NodeId>,
    offscreen: Option<Offscreen>,

    async_count: usize,
    /// Bumped whenever the views are torn down, so stale suspensions can
    /// be ignored.
    epoch: u64,
    callbacks: Vec<Box<dyn FnOnce()>>,
    render_effects: Vec<NodeId>,
    effects: Vec<NodeId>,

    creating_fallback: bool,
    phase: Phase,
    initialized: bool,
    error: Option<ReactiveError>,
}

/// Boundary state shared between the graph node and its handles.
pub(crate) struct BoundaryCell {
    state: RefCell<BoundaryState>,
    live: Cell<bool>,
}

impl BoundaryCell {
    fn new(anchor: DomNode, props: BoundaryProps, children: Snippet) -> Self {
        Self {
            state: RefCell::new(BoundaryState {
                effect: None,
                anchor,
                props,
                children,
                main: None,
                pending: None,
                failed: None,
                offscreen: None,
                async_count: 0,
                epoch: 0,
                callbacks: Vec::new(),
                render_effects: Vec::new(),
                effects: Vec::new(),
                creating_fallback: false,
                phase: Phase::Active,
                initialized: false,
                error: None,
            }),
            live: Cell::new(true),
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        self.live.get()
    }

    /// Called when the boundary effect is destroyed. Pending deferred work
    /// becomes a no-op.
    pub(crate) fn mark_destroyed(&self) {
        self.live.set(false);
        let mut state = self.state.borrow_mut();
        state.callbacks.clear();
        state.render_effects.clear();
        state.effects.clear();
        state.offscreen = None;
    }

    fn can_handle(&self) -> bool {
        let state = self.state.borrow();
        self.is_live() && !state.creating_fallback && state.props.handles_errors()
    }

    fn effect(&self) -> Option<NodeId> {
        self.state.borrow().effect
    }
}

/// Handle to a boundary.
#[derive(Clone)]
pub struct Boundary {
    id: NodeId,
    cell: Rc<BoundaryCell>,
    runtime: Runtime,
}

impl Boundary {
    /// The boundary effect's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.cell.state.borrow().phase
    }

    /// Whether the boundary effect still exists.
    pub fn is_live(&self) -> bool {
        self.cell.is_live()
    }

    /// Number of unreleased suspensions.
    pub fn async_count(&self) -> usize {
        self.cell.state.borrow().async_count
    }

    /// The main branch, if mounted.
    pub fn main(&self) -> Option<NodeId> {
        self.cell.state.borrow().main
    }

    /// The pending branch, if shown.
    pub fn pending(&self) -> Option<NodeId> {
        self.cell.state.borrow().pending
    }

    /// The failed branch, if shown.
    pub fn failed(&self) -> Option<NodeId> {
        self.cell.state.borrow().failed
    }

    /// The error that put the boundary in its failed phase.
    pub fn error(&self) -> Option<ReactiveError> {
        self.cell.state.borrow().error.clone()
    }

    /// Tear down every view and mount a fresh main branch.
    pub fn reset(&self) {
        if !self.cell.is_live() {
            return;
        }
        debug!(boundary = ?self.id, "boundary reset");
        clear_views(&self.runtime, &self.cell);
        self.cell.state.borrow_mut().phase = Phase::Active;
        if let Err(error) = mount_main(&self.runtime, &self.cell) {
            self.runtime.host().report_error(error);
        }
    }

    fn reset_handle(&self) -> ResetHandle {
        ResetHandle {
            boundary: self.clone(),
        }
    }

    fn decrement_for(&self, epoch: u64) {
        if self.cell.state.borrow().epoch == epoch {
            self.decrement_suspense();
        }
    }
}

impl Suspense for Boundary {
    fn increment_suspense(&self) {
        let queue_swap = {
            let mut state = self.cell.state.borrow_mut();
            state.async_count += 1;
            if state.phase != Phase::Failed {
                state.phase = Phase::Suspended;
            }
            state.async_count == 1
                && state.initialized
                && state.phase == Phase::Suspended
                && state.pending.is_none()
        };
        debug!(boundary = ?self.id, count = self.async_count(), "boundary suspended");

        if queue_swap {
            let cell = self.cell.clone();
            self.runtime.queue_microtask(move |runtime| {
                let wanted = {
                    let state = cell.state.borrow();
                    cell.is_live()
                        && state.async_count > 0
                        && state.phase == Phase::Suspended
                        && state.pending.is_none()
                };
                if wanted {
                    if let Err(error) = show_pending(runtime, &cell) {
                        runtime.host().report_error(error);
                    }
                }
            });
        }
    }

    fn decrement_suspense(&self) {
        {
            let mut state = self.cell.state.borrow_mut();
            if state.async_count == 0 {
                return;
            }
            state.async_count -= 1;
            if state.async_count > 0 {
                return;
            }
        }
        unsuspend(&self.runtime, &self.cell);
        if let Some(main) = self.main() {
            self.runtime.schedule_effect(main);
        }
    }

    fn add_callback(&self, f: Box<dyn FnOnce()>) {
        if self.cell.is_live() {
            self.cell.state.borrow_mut().callbacks.push(f);
        }
    }

    fn add_effect(&self, effect: NodeId) {
        let render = self.runtime.graph().borrow().get(effect).and_then(|n| n.effect_kind())
            == Some(EffectKind::Render);
        park(&self.cell, effect, render);
    }

    fn release(&self) {
        unsuspend(&self.runtime, &self.cell);
    }
}

impl fmt::Debug for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Boundary")
            .field("id", &self.id)
            .field("phase", &self.phase())
            .field("async_count", &self.async_count())
            .finish()
    }
}

/// Token for one pending asynchronous operation. Resolving or dropping it
/// releases the suspension.
#[must_use = "dropping a suspension releases it immediately"]
pub struct Suspension {
    boundary: Option<Boundary>,
    epoch: u64,
}

impl Suspension {
    /// The suspended boundary.
    pub fn boundary(&self) -> Option<&Boundary> {
        self.boundary.as_ref()
    }

    /// Release the suspension.
    pub fn resolve(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if let Some(boundary) = self.boundary.take() {
            if boundary.is_live() {
                boundary.decrement_for(self.epoch);
            }
        }
    }
}

impl Drop for Suspension {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl fmt::Debug for Suspension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspension")
            .field("boundary", &self.boundary.as_ref().map(Boundary::id))
            .field("epoch", &self.epoch)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Runtime entry points
// ----------------------------------------------------------------------------

impl Runtime {
    /// Create a boundary in front of `anchor` and mount `children` as its
    /// main view.
    pub fn boundary(
        &self,
        anchor: DomNode,
        props: BoundaryProps,
        children: impl Fn(DomNode) -> Result<()> + 'static,
    ) -> Result<Boundary> {
        let cell = Rc::new(BoundaryCell::new(anchor, props, Rc::new(children)));

        let weak = self.downgrade();
        let mounted = cell.clone();
        let run: RunFn = Rc::new(RefCell::new(move || match weak.upgrade() {
            Some(runtime) => mount(&runtime, &mounted),
            None => Ok(()),
        }));

        let id = self.insert_effect(EffectKind::Boundary, run);
        cell.state.borrow_mut().effect = Some(id);
        if let Some(node) = self.graph().borrow_mut().get_mut(id) {
            node.boundary = Some(cell.clone());
        }
        self.run_effect(id)?;

        Ok(Boundary {
            id,
            cell,
            runtime: self.clone(),
        })
    }

    /// Suspend the nearest enclosing boundary that has a pending view.
    pub fn suspend(&self) -> Result<Suspension> {
        let boundary = self
            .boundaries_above(self.active_effect())
            .into_iter()
            .find(|boundary| boundary.cell.state.borrow().props.has_pending())
            .ok_or(ReactiveError::AwaitOutsideBoundary)?;

        boundary.increment_suspense();
        let epoch = boundary.cell.state.borrow().epoch;
        Ok(Suspension {
            boundary: Some(boundary),
            epoch,
        })
    }

    /// The nearest boundary at or above `effect`.
    pub fn find_boundary(&self, effect: NodeId) -> Option<Boundary> {
        self.boundaries_above(Some(effect)).into_iter().next()
    }

    fn boundaries_above(&self, effect: Option<NodeId>) -> Vec<Boundary> {
        let Some(effect) = effect else {
            return Vec::new();
        };
        let graph = self.graph().borrow();
        graph
            .ancestors(effect)
            .into_iter()
            .filter_map(|id| {
                let cell = graph.get(id)?.boundary.clone()?;
                Some(Boundary {
                    id,
                    cell,
                    runtime: self.clone(),
                })
            })
            .collect()
    }
}

// ----------------------------------------------------------------------------
// Error routing
// ----------------------------------------------------------------------------

/// Route `error` raised by `effect` to the nearest boundary that can handle
/// it, starting at the effect itself. Returns the error if none can.
pub(crate) fn handle_error(runtime: &Runtime, error: ReactiveError, effect: NodeId) -> Result<()> {
    if error.is_contract_violation() {
        return Err(error);
    }

    let candidates = runtime.boundaries_above(Some(effect));
    for boundary in candidates {
        if boundary.cell.can_handle() {
            debug!(boundary = ?boundary.id, ?effect, %error, "boundary caught error");
            fail(&boundary, error);
            return Ok(());
        }
    }

    warn!(?effect, %error, "error escaped every boundary");
    Err(error)
}

fn fail(boundary: &Boundary, error: ReactiveError) {
    let runtime = &boundary.runtime;
    let cell = &boundary.cell;

    clear_views(runtime, cell);
    let (onerror, has_failed_view) = {
        let mut state = cell.state.borrow_mut();
        state.phase = Phase::Failed;
        state.error = Some(error.clone());
        (state.props.onerror.clone(), state.props.failed.is_some())
    };

    if let Some(onerror) = onerror {
        onerror(&error, &boundary.reset_handle());
    }

    if has_failed_view {
        let boundary = boundary.clone();
        runtime.queue_microtask(move |runtime| {
            let wanted = {
                let state = boundary.cell.state.borrow();
                boundary.cell.is_live() && state.phase == Phase::Failed && state.failed.is_none()
            };
            if wanted {
                if let Err(error) = mount_failed(runtime, &boundary) {
                    runtime.host().report_error(error);
                }
            }
        });
    }
}

// ----------------------------------------------------------------------------
// Views
// ----------------------------------------------------------------------------

/// Body of the boundary effect. Runs once.
fn mount(runtime: &Runtime, cell: &Rc<BoundaryCell>) -> Result<()> {
    if cell.state.borrow().initialized {
        return Ok(());
    }
    mount_main(runtime, cell)?;

    let needs_pending = {
        let mut state = cell.state.borrow_mut();
        state.initialized = true;
        state.phase == Phase::Suspended && state.props.has_pending()
    };
    if needs_pending {
        show_pending(runtime, cell)?;
    }
    Ok(())
}

fn mount_main(runtime: &Runtime, cell: &Rc<BoundaryCell>) -> Result<()> {
    let (anchor, children) = {
        let state = cell.state.borrow();
        (state.anchor, state.children.clone())
    };
    let Some(main) = with_boundary(runtime, cell, || {
        runtime.create_effect(EffectKind::Branch, snippet(children, anchor))
    })?
    else {
        return Ok(());
    };

    // An error caught while main was being built leaves the boundary failed,
    // or already remounted by a reset from `onerror`; the half-built main
    // must not survive either way.
    let superseded = {
        let state = cell.state.borrow();
        state.phase == Phase::Failed || state.main.is_some()
    };
    if superseded {
        runtime.destroy_effect(main, true);
    } else if runtime.is_live(main) {
        cell.state.borrow_mut().main = Some(main);
    }
    Ok(())
}

fn show_pending(runtime: &Runtime, cell: &Rc<BoundaryCell>) -> Result<()> {
    let (main, anchor, pending) = {
        let state = cell.state.borrow();
        (state.main, state.anchor, state.props.pending.clone())
    };
    let Some(pending) = pending else {
        return Ok(());
    };

    if let (Some(dom), Some(main)) = (runtime.dom(), main) {
        if let Some(range) = runtime.effect_range(main) {
            let offscreen = Offscreen::detach(dom.as_ref(), range);
            cell.state.borrow_mut().offscreen = Some(offscreen);
        }
    }

    debug!(boundary = ?cell.effect(), "showing pending view");
    let branch = render_fallback(runtime, cell, pending, anchor)?;
    cell.state.borrow_mut().pending = branch;
    Ok(())
}

fn mount_failed(runtime: &Runtime, boundary: &Boundary) -> Result<()> {
    let (anchor, failed, error) = {
        let state = boundary.cell.state.borrow();
        (state.anchor, state.props.failed.clone(), state.error.clone())
    };
    let (Some(failed), Some(error)) = (failed, error) else {
        return Ok(());
    };

    let reset = boundary.reset_handle();
    let view: Snippet = Rc::new(move |anchor| failed(anchor, &error, &reset));
    debug!(boundary = ?boundary.id, "showing failed view");
    let branch = render_fallback(runtime, &boundary.cell, view, anchor)?;
    boundary.cell.state.borrow_mut().failed = branch;
    Ok(())
}

/// Render a pending or failed view. Errors raised while it renders skip
/// this boundary and go to its ancestors; one that nobody handles is
/// reported to the host.
fn render_fallback(
    runtime: &Runtime,
    cell: &Rc<BoundaryCell>,
    view: Snippet,
    anchor: DomNode,
) -> Result<Option<NodeId>> {
    cell.state.borrow_mut().creating_fallback = true;
    let result = with_boundary(runtime, cell, || {
        runtime.create_effect(EffectKind::Branch, snippet(view, anchor))
    });
    cell.state.borrow_mut().creating_fallback = false;

    match result {
        Ok(Some(id)) if runtime.is_live(id) => Ok(Some(id)),
        Ok(_) => Ok(None),
        Err(error) if error.is_contract_violation() => Err(error),
        Err(error) => {
            runtime.host().report_error(error);
            Ok(None)
        }
    }
}

/// Destroy main, pending and failed and forget every suspension.
fn clear_views(runtime: &Runtime, cell: &BoundaryCell) {
    let views = {
        let mut state = cell.state.borrow_mut();
        state.offscreen = None;
        state.async_count = 0;
        state.epoch += 1;
        state.callbacks.clear();
        state.render_effects.clear();
        state.effects.clear();
        state.error = None;
        [state.main.take(), state.pending.take(), state.failed.take()]
    };
    for view in views.into_iter().flatten() {
        runtime.destroy_effect(view, true);
    }
}

fn unsuspend(runtime: &Runtime, cell: &BoundaryCell) {
    if !cell.is_live() {
        return;
    }
    let render_effects = {
        let mut state = cell.state.borrow_mut();
        if state.phase == Phase::Suspended {
            state.phase = Phase::Active;
        }
        std::mem::take(&mut state.render_effects)
    };
    debug!(boundary = ?cell.effect(), "boundary unsuspended");

    for effect in render_effects {
        refresh(runtime, effect);
    }

    let callbacks = std::mem::take(&mut cell.state.borrow_mut().callbacks);
    for callback in callbacks {
        callback();
    }

    let pending = cell.state.borrow_mut().pending.take();
    if let Some(pending) = pending {
        runtime.destroy_effect(pending, true);
    }

    let (offscreen, anchor) = {
        let mut state = cell.state.borrow_mut();
        (state.offscreen.take(), state.anchor)
    };
    if let (Some(offscreen), Some(dom)) = (offscreen, runtime.dom()) {
        offscreen.attach_before(dom.as_ref(), anchor);
    }

    let effects = std::mem::take(&mut cell.state.borrow_mut().effects);
    for effect in effects {
        refresh(runtime, effect);
    }
}

/// Re-run a parked effect if it is still dirty.
fn refresh(runtime: &Runtime, effect: NodeId) {
    if !runtime.is_live(effect) {
        return;
    }
    let result = match runtime.check_dirtiness(effect) {
        Ok(true) => runtime.run_effect(effect),
        Ok(false) => Ok(()),
        Err(error) => handle_error(runtime, error, effect),
    };
    if let Err(error) = result {
        runtime.host().report_error(error);
    }
}

fn park(cell: &BoundaryCell, effect: NodeId, render: bool) {
    if !cell.is_live() {
        return;
    }
    let mut state = cell.state.borrow_mut();
    let list = if render {
        &mut state.render_effects
    } else {
        &mut state.effects
    };
    if !list.contains(&effect) {
        list.push(effect);
    }
}

/// Park `effect` if it sits in the main view of a suspended boundary.
/// Only user and render effects are parked; blocks keep running so the
/// suspension can resolve.
pub(crate) fn park_if_suspended(runtime: &Runtime, effect: NodeId) -> bool {
    let (kind, ancestors) = {
        let graph = runtime.graph().borrow();
        let Some(kind) = graph.get(effect).and_then(|node| node.effect_kind()) else {
            return false;
        };
        (kind, graph.ancestors(effect))
    };
    if !matches!(kind, EffectKind::User | EffectKind::Render) {
        return false;
    }

    for (index, id) in ancestors.iter().enumerate().skip(1) {
        let cell = runtime.graph().borrow().get(*id).and_then(|node| node.boundary.clone());
        let Some(cell) = cell else {
            continue;
        };
        let in_suspended_main = {
            let state = cell.state.borrow();
            state.phase == Phase::Suspended && state.main == Some(ancestors[index - 1])
        };
        if in_suspended_main {
            park(&cell, effect, kind == EffectKind::Render);
            return true;
        }
    }
    false
}

/// Run `f` with the boundary effect as the owner of new effects.
fn with_boundary<R>(
    runtime: &Runtime,
    cell: &BoundaryCell,
    f: impl FnOnce() -> Result<R>,
) -> Result<Option<R>> {
    let Some(effect) = cell.effect() else {
        return Ok(None);
    };
    if !runtime.is_live(effect) {
        return Ok(None);
    }
    let _guard = runtime.context().enter(Frame {
        reaction: Some(effect),
        effect: Some(effect),
        tracking: false,
    });
    f().map(Some)
}

fn snippet(view: Snippet, anchor: DomNode) -> RunFn {
    Rc::new(RefCell::new(move || view(anchor)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ManualHost;

    fn runtime() -> (Rc<ManualHost>, Runtime) {
        let host = Rc::new(ManualHost::new());
        (host.clone(), Runtime::new(host))
    }

    #[test]
    fn suspend_outside_a_boundary_fails() {
        let (_host, rt) = runtime();
        assert!(matches!(rt.suspend(), Err(ReactiveError::AwaitOutsideBoundary)));
    }

    #[test]
    fn suspend_skips_boundaries_without_pending() {
        let (_host, rt) = runtime();
        let inner = rt.clone();
        let result = Rc::new(RefCell::new(None));
        let slot = result.clone();

        rt.boundary(DomNode(0), BoundaryProps::new().onerror(|_, _| {}), move |_| {
            *slot.borrow_mut() = Some(inner.suspend().map(|_| ()));
            Ok(())
        })
        .unwrap();

        assert!(matches!(
            result.borrow_mut().take(),
            Some(Err(ReactiveError::AwaitOutsideBoundary))
        ));
    }

    #[test]
    fn initial_suspension_shows_pending_synchronously() {
        let (_host, rt) = runtime();
        let held = Rc::new(RefCell::new(None));
        let (slot, inner) = (held.clone(), rt.clone());

        let boundary = rt
            .boundary(DomNode(0), BoundaryProps::new().pending(|_| Ok(())), move |_| {
                *slot.borrow_mut() = Some(inner.suspend()?);
                Ok(())
            })
            .unwrap();

        assert_eq!(boundary.phase(), Phase::Suspended);
        assert!(boundary.pending().is_some());
        assert!(boundary.main().is_some());

        drop(held.borrow_mut().take());
        assert_eq!(boundary.phase(), Phase::Active);
        assert!(boundary.pending().is_none());
        assert_eq!(boundary.async_count(), 0);
    }

    #[test]
    fn errors_without_handlers_escape() {
        let (_host, rt) = runtime();
        let result = rt.boundary(DomNode(0), BoundaryProps::new(), |_| {
            Err(ReactiveError::thrown("boom"))
        });
        assert_eq!(result.unwrap_err().to_string(), "boom");
    }

    #[test]
    fn caught_errors_mount_the_failed_view_later() {
        let (host, rt) = runtime();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (log, log2) = (seen.clone(), seen.clone());

        let props = BoundaryProps::new()
            .onerror(move |error, _| log.borrow_mut().push(format!("onerror {error}")))
            .failed(move |_, error, _| {
                log2.borrow_mut().push(format!("failed {error}"));
                Ok(())
            });
        let boundary = rt
            .boundary(DomNode(0), props, |_| Err(ReactiveError::thrown("boom")))
            .unwrap();

        assert_eq!(boundary.phase(), Phase::Failed);
        assert!(boundary.main().is_none());
        assert_eq!(*seen.borrow(), vec!["onerror boom"]);

        host.run_microtasks();
        assert!(boundary.failed().is_some());
        assert_eq!(*seen.borrow(), vec!["onerror boom", "failed boom"]);
    }

    #[test]
    fn destroyed_boundaries_ignore_deferred_work() {
        let (host, rt) = runtime();
        let boundary = rt
            .boundary(
                DomNode(0),
                BoundaryProps::new().failed(|_, _, _| panic!("failed view mounted after destroy")),
                |_| Err(ReactiveError::thrown("boom")),
            )
            .unwrap();

        rt.destroy_effect(boundary.id(), true);
        host.run_microtasks();
        assert!(!boundary.is_live());
        assert!(boundary.failed().is_none());
    }

    #[test]
    fn stale_suspensions_are_ignored_after_reset() {
        let (host, rt) = runtime();
        let held = Rc::new(RefCell::new(Vec::new()));
        let (slot, inner) = (held.clone(), rt.clone());

        let boundary = rt
            .boundary(
                DomNode(0),
                BoundaryProps::new().pending(|_| Ok(())).onerror(|_, _| {}),
                move |_| {
                    slot.borrow_mut().push(inner.suspend()?);
                    Ok(())
                },
            )
            .unwrap();
        assert_eq!(boundary.async_count(), 1);

        boundary.reset();
        host.run_microtasks();
        assert_eq!(boundary.async_count(), 1);

        // The first token belongs to the torn-down main view.
        let first = held.borrow_mut().remove(0);
        drop(first);
        assert_eq!(boundary.async_count(), 1);
    }
}
