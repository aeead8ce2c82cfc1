//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, deriveds,
//! and effects. It owns the dependency graph, the run queue, the fork
//! registry and the context stack, and implements the write → propagate →
//! flush pipeline.
//!
//! # How It Works
//!
//! 1. Reading a node inside a tracking frame records it as a dependency of
//!    the running reaction. The recorded list replaces the reaction's
//!    previous dependencies when the run ends.
//!
//! 2. Writing a source checks the equality policy, bumps the write clock and
//!    marks dependents:
//!    a. deriveds become maybe-dirty, recursively (they are lazy),
//!    b. effects become dirty and are queued,
//!    c. a microtask flush is requested from the host.
//!
//! 3. A flush drains the queue. Each queued effect is checked
//!    (`check_dirtiness`) and re-run only if one of its dependencies really
//!    changed.
//!
//! # Threading
//!
//! A runtime is single-threaded. Independent runtimes share nothing, so
//! tests can create as many as they like.

use std::cell::{Cell, OnceCell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::context::{CapturedContext, ContextStack, Frame};
use crate::config::RuntimeConfig;
use crate::dom::{remove_range, Dom, NodeRange};
use crate::error::{ReactiveError, Result};
use crate::fork::ForkRegistry;
use crate::graph::{EffectKind, Graph, Node, NodeId, NodeKind, RunFn, Status, UpdateScheduler, Value};
use crate::host::Host;

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    host: Rc<dyn Host>,
    dom: OnceCell<Rc<dyn Dom>>,
    graph: RefCell<Graph>,
    scheduler: RefCell<UpdateScheduler>,
    context: ContextStack,
    forks: RefCell<ForkRegistry>,
    old_values: RefCell<HashMap<NodeId, Value>>,
    clock: Cell<u64>,
    flushing: Cell<bool>,
    flush_requested: Cell<bool>,
}

/// Handle to a reactive runtime. Cloning shares the same runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// Non-owning handle used by deferred work.
#[derive(Clone)]
pub(crate) struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }
}

impl Runtime {
    /// Create a strict-mode runtime driven by `host`.
    pub fn new(host: Rc<dyn Host>) -> Self {
        Self::with_config(host, RuntimeConfig::default())
    }

    /// Create a runtime with explicit settings.
    pub fn with_config(host: Rc<dyn Host>, config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                host,
                dom: OnceCell::new(),
                graph: RefCell::new(Graph::new()),
                scheduler: RefCell::new(UpdateScheduler::new()),
                context: ContextStack::default(),
                forks: RefCell::new(ForkRegistry::default()),
                old_values: RefCell::new(HashMap::new()),
                clock: Cell::new(0),
                flushing: Cell::new(false),
                flush_requested: Cell::new(false),
            }),
        }
    }

    /// Attach the renderer used to move and remove node ranges. Only the
    /// first call has an effect.
    pub fn attach_dom(&self, dom: Rc<dyn Dom>) {
        if self.inner.dom.set(dom).is_err() {
            warn!("a renderer is already attached to this runtime");
        }
    }

    /// The runtime's settings.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub(crate) fn host(&self) -> &Rc<dyn Host> {
        &self.inner.host
    }

    pub(crate) fn dom(&self) -> Option<&Rc<dyn Dom>> {
        self.inner.dom.get()
    }

    pub(crate) fn graph(&self) -> &RefCell<Graph> {
        &self.inner.graph
    }

    pub(crate) fn context(&self) -> &ContextStack {
        &self.inner.context
    }

    pub(crate) fn forks(&self) -> &RefCell<ForkRegistry> {
        &self.inner.forks
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Rc::downgrade(&self.inner))
    }

    /// Whether two handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Queue deferred work with the host. The task is skipped if the
    /// runtime has been dropped by then.
    pub(crate) fn queue_microtask(&self, task: impl FnOnce(&Runtime) + 'static) {
        let weak = self.downgrade();
        self.inner.host.queue_microtask(Box::new(move || {
            if let Some(runtime) = weak.upgrade() {
                task(&runtime);
            }
        }));
    }

    // ------------------------------------------------------------------------
    // Clock
    // ------------------------------------------------------------------------

    /// Current value of the write clock.
    pub fn clock(&self) -> u64 {
        self.inner.clock.get()
    }

    fn next_version(&self) -> u64 {
        let version = self.inner.clock.get() + 1;
        self.inner.clock.set(version);
        version
    }

    // ------------------------------------------------------------------------
    // Context
    // ------------------------------------------------------------------------

    /// Snapshot the active effect and reaction so an asynchronous
    /// continuation can re-enter them.
    pub fn capture(&self) -> CapturedContext {
        let frame = self.inner.context.current();
        CapturedContext {
            reaction: frame.reaction,
            effect: frame.effect,
        }
    }

    /// The effect that owns effects created right now.
    pub fn active_effect(&self) -> Option<NodeId> {
        self.inner.context.current().effect
    }

    /// Run `f` without tracking reads. Writes inside `f` are exempt from the
    /// unsafe-mutation check.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let frame = self.inner.context.current();
        let _guard = self.inner.context.enter(Frame {
            tracking: false,
            ..frame
        });
        f()
    }

    /// Record the rendered node range of the active effect.
    pub fn assign_nodes(&self, start: crate::dom::DomNode, end: crate::dom::DomNode) {
        let Some(effect) = self.active_effect() else {
            warn!("assign_nodes called outside an effect");
            return;
        };
        if let Some(node) = self.inner.graph.borrow_mut().get_mut(effect) {
            node.nodes = Some(NodeRange::new(start, end));
        }
    }

    /// Register a teardown on the active effect. It runs before the effect
    /// re-runs and when it is destroyed.
    pub fn on_cleanup(&self, f: impl FnOnce() + 'static) {
        let Some(effect) = self.active_effect() else {
            warn!("on_cleanup called outside an effect; teardown dropped");
            return;
        };
        if let Some(node) = self.inner.graph.borrow_mut().get_mut(effect) {
            node.teardowns.push(Box::new(f));
        }
    }

    // ------------------------------------------------------------------------
    // Sources
    // ------------------------------------------------------------------------

    /// Add a signal or derived. Nodes created while a reaction runs are
    /// owned by it.
    pub(crate) fn create_node(&self, node: Node) -> NodeId {
        let kind = node.kind();
        let id = self.inner.graph.borrow_mut().add_node(node);
        self.inner.context.record_created(id);
        trace!(?id, ?kind, "created node");
        id
    }

    /// Record a read of `id` by the tracking reaction, if any.
    pub(crate) fn track(&self, id: NodeId) {
        if self.inner.context.track_dependency(id) {
            trace!(?id, "dependency recorded");
        }
    }

    pub(crate) fn read_source(&self, id: NodeId) -> Option<Value> {
        self.track(id);
        self.peek(id)
    }

    /// Current value without tracking.
    pub(crate) fn peek(&self, id: NodeId) -> Option<Value> {
        self.inner
            .graph
            .borrow()
            .get(id)
            .and_then(|node| node.value.clone())
    }

    /// The value a source held before its most recent write.
    pub(crate) fn old_value(&self, id: NodeId) -> Option<Value> {
        self.inner.old_values.borrow().get(&id).cloned()
    }

    /// Write `value` through the public path, enforcing the
    /// unsafe-mutation rule.
    pub(crate) fn write(&self, id: NodeId, value: Value) -> Result<bool> {
        let frame = self.inner.context.current();
        if self.inner.config.strict && frame.tracking {
            if let Some(reaction) = frame.reaction {
                let forbidden = self
                    .inner
                    .graph
                    .borrow()
                    .get(reaction)
                    .map(|node| match node.kind() {
                        NodeKind::Derived => true,
                        NodeKind::Effect(kind) => kind.is_block(),
                        NodeKind::Source => false,
                    })
                    .unwrap_or(false);
                if forbidden && !self.inner.context.created_in_current_frame(id) {
                    return Err(ReactiveError::UnsafeMutation { signal: id });
                }
            }
        }
        Ok(self.internal_set(id, value))
    }

    /// Store `value`, bump the version and propagate. Returns whether the
    /// value changed.
    pub(crate) fn internal_set(&self, id: NodeId, value: Value) -> bool {
        let (old, equals) = {
            let graph = self.inner.graph.borrow();
            let Some(node) = graph.get(id) else {
                return false;
            };
            (node.value.clone(), node.equals.clone())
        };

        // Comparators are user code and may read the graph.
        if let (Some(old), Some(equals)) = (&old, &equals) {
            if equals(old.as_ref(), value.as_ref()) {
                return false;
            }
        }

        let version = self.next_version();
        if let Some(node) = self.inner.graph.borrow_mut().get_mut(id) {
            node.value = Some(value);
            node.write_version = version;
        }
        if let Some(old) = old.clone() {
            self.inner.old_values.borrow_mut().insert(id, old);
        }
        trace!(?id, version, "source written");

        if let Some(previous) = old {
            crate::fork::capture_write(self, id, previous);
        }

        self.mark_reactions(id, Status::Dirty);
        true
    }

    /// Overwrite a value without versioning or propagation. Used by forks
    /// to swap speculative values in and out.
    pub(crate) fn set_raw(&self, id: NodeId, value: Value) {
        if let Some(node) = self.inner.graph.borrow_mut().get_mut(id) {
            node.value = Some(value);
        }
    }

    // ------------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------------

    /// Mark every dependent of `source` with `status`.
    ///
    /// Deriveds are marked and their own dependents recursively become
    /// maybe-dirty; effects that were clean are queued. Already-dirty
    /// reactions are skipped, so marking is idempotent.
    pub(crate) fn mark_reactions(&self, source: NodeId, status: Status) {
        let legacy_skip = if self.inner.config.strict {
            None
        } else {
            self.inner.context.current().effect
        };
        let (scope, rewalk) = {
            let forks = self.inner.forks.borrow();
            let scope = forks.active_scope();
            (scope, scope.is_none() && forks.holds_skipped_effects())
        };

        let mut to_schedule = Vec::new();
        let mut skipped = Vec::new();
        let mut walked = HashSet::new();

        {
            let mut graph = self.inner.graph.borrow_mut();
            let mut stack = vec![(source, status)];

            while let Some((current, status)) = stack.pop() {
                let dependents: Vec<NodeId> = match graph.get(current) {
                    Some(node) => node.dependents().iter().copied().collect(),
                    None => continue,
                };

                for reaction in dependents {
                    if Some(reaction) == legacy_skip {
                        continue;
                    }

                    // While a fork holds effects back, the deriveds it left
                    // dirty are walked again so those effects still hear
                    // about writes made outside the fork.
                    let is_derived = match graph.get(reaction) {
                        Some(node) if node.is_destroyed() => continue,
                        Some(node) if node.is_dirty() && !(rewalk && node.is_derived()) => continue,
                        Some(node) => node.is_derived(),
                        None => continue,
                    };

                    if !is_derived {
                        if let Some(scope) = scope {
                            if !graph.ancestors(reaction).contains(&scope) {
                                skipped.push(reaction);
                                continue;
                            }
                        }
                    }

                    let Some(node) = graph.get_mut(reaction) else {
                        continue;
                    };
                    let was_clean = node.is_clean();
                    node.mark(status);

                    if is_derived {
                        if (was_clean || rewalk) && walked.insert(reaction) {
                            stack.push((reaction, Status::MaybeDirty));
                        }
                    } else if was_clean {
                        to_schedule.push(reaction);
                    }
                }
            }
        }

        if !skipped.is_empty() {
            self.inner.forks.borrow_mut().skip_effects(&skipped);
        }
        for effect in to_schedule {
            self.schedule_effect(effect);
        }
    }

    /// Queue an effect and make sure a flush will happen.
    pub(crate) fn schedule_effect(&self, effect: NodeId) {
        if self.inner.scheduler.borrow_mut().schedule(effect) {
            trace!(?effect, "effect scheduled");
        }
        self.request_flush();
    }

    fn request_flush(&self) {
        if self.inner.flushing.get() || self.inner.flush_requested.get() {
            return;
        }
        self.inner.flush_requested.set(true);
        self.queue_microtask(|runtime| {
            runtime.inner.flush_requested.set(false);
            if let Err(error) = runtime.flush_sync() {
                runtime.inner.host.report_error(error);
            }
        });
    }

    /// Decide whether `id` must re-run.
    ///
    /// A maybe-dirty reaction is verified against its dependencies: dirty
    /// deriveds among them are refreshed first, then any dependency written
    /// after the reaction last ran makes it dirty. Otherwise it becomes clean
    /// without running.
    pub(crate) fn check_dirtiness(&self, id: NodeId) -> Result<bool> {
        let (status, dependencies, verified) = {
            let graph = self.inner.graph.borrow();
            let Some(node) = graph.get(id) else {
                return Ok(false);
            };
            (node.status(), node.dependencies().to_vec(), node.verified_version)
        };

        match status {
            Status::Dirty => return Ok(true),
            Status::Clean | Status::Destroyed => return Ok(false),
            Status::MaybeDirty => {}
        }

        for dep in dependencies {
            let is_derived = self
                .inner
                .graph
                .borrow()
                .get(dep)
                .map(Node::is_derived)
                .unwrap_or(false);
            // A failing derived keeps its error and bumps its version, so
            // the reader re-runs and receives the error itself.
            if is_derived && self.check_dirtiness(dep)? {
                if let Err(error) = self.update_derived(dep) {
                    trace!(derived = ?dep, %error, "derived failed during verification");
                }
            }

            let changed = self
                .inner
                .graph
                .borrow()
                .get(dep)
                .map(|node| node.write_version() > verified)
                .unwrap_or(false);
            if changed {
                if let Some(node) = self.inner.graph.borrow_mut().get_mut(id) {
                    node.mark_dirty();
                }
                return Ok(true);
            }
        }

        let clock = self.clock();
        if let Some(node) = self.inner.graph.borrow_mut().get_mut(id) {
            node.mark_clean();
            node.verified_version = clock;
        }
        Ok(false)
    }

    // ------------------------------------------------------------------------
    // Deriveds
    // ------------------------------------------------------------------------

    pub(crate) fn read_derived(&self, id: NodeId) -> Result<Value> {
        if !self.inner.graph.borrow().is_live(id) {
            return Err(ReactiveError::Destroyed(id));
        }
        self.track(id);
        if self.check_dirtiness(id)? {
            self.update_derived(id)?;
        }
        let graph = self.inner.graph.borrow();
        let node = graph.get(id).ok_or(ReactiveError::Destroyed(id))?;
        if let Some(error) = node.error() {
            return Err(error.clone());
        }
        node.value.clone().ok_or(ReactiveError::Destroyed(id))
    }

    /// Recompute a derived, re-tracking its dependencies from scratch.
    ///
    /// A failure is stored on the node and counts as a change; readers get
    /// the error until a dependency is written again.
    pub(crate) fn update_derived(&self, id: NodeId) -> Result<()> {
        let (compute, equals, old) = {
            let graph = self.inner.graph.borrow();
            let node = graph.get(id).ok_or(ReactiveError::Destroyed(id))?;
            (node.compute.clone(), node.equals.clone(), node.value.clone())
        };
        let compute = compute.ok_or(ReactiveError::Destroyed(id))?;

        let frame = Frame {
            reaction: Some(id),
            effect: self.inner.context.current().effect,
            tracking: true,
        };
        let guard = self.inner.context.enter(frame);
        let result = match compute.try_borrow_mut() {
            Ok(mut compute) => compute(),
            Err(_) => Err(ReactiveError::CircularDependency(id)),
        };
        let collected = guard.exit();

        let previous = {
            let mut graph = self.inner.graph.borrow_mut();
            graph.replace_dependencies(id, &collected.dependencies);
            match graph.get_mut(id) {
                Some(node) => std::mem::replace(&mut node.owned, collected.created),
                None => SmallVec::new(),
            }
        };
        self.remove_nodes(previous);

        let value = match result {
            Ok(value) => value,
            Err(error) => {
                let version = self.next_version();
                if let Some(node) = self.inner.graph.borrow_mut().get_mut(id) {
                    node.error = Some(error.clone());
                    node.write_version = version;
                    node.verified_version = version;
                    node.mark_clean();
                }
                trace!(?id, %error, "derived failed");
                return Err(error);
            }
        };

        let recovered = self
            .inner
            .graph
            .borrow_mut()
            .get_mut(id)
            .and_then(|node| node.error.take())
            .is_some();
        let unchanged = !recovered
            && match (&old, &equals) {
                (Some(old), Some(equals)) => equals(old.as_ref(), value.as_ref()),
                _ => false,
            };
        let version = if unchanged { None } else { Some(self.next_version()) };
        let clock = self.clock();

        if let Some(node) = self.inner.graph.borrow_mut().get_mut(id) {
            if let Some(version) = version {
                node.value = Some(value);
                node.write_version = version;
            }
            node.verified_version = clock;
            node.mark_clean();
        }
        trace!(?id, changed = version.is_some(), "derived recomputed");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------------

    /// Create an effect owned by the active effect.
    ///
    /// User effects are queued for the next flush; every other kind runs
    /// immediately. Errors from that first run are routed to the nearest
    /// boundary; only unhandled ones are returned.
    pub(crate) fn create_effect(&self, kind: EffectKind, run: RunFn) -> Result<NodeId> {
        let id = self.insert_effect(kind, run);
        match kind {
            EffectKind::User => self.schedule_effect(id),
            _ => self.run_effect(id)?,
        }
        Ok(id)
    }

    /// Add an effect to the graph under the active effect without running
    /// it.
    pub(crate) fn insert_effect(&self, kind: EffectKind, run: RunFn) -> NodeId {
        let parent = self.active_effect();
        let mut graph = self.inner.graph.borrow_mut();
        let id = graph.add_node(Node::effect(kind, run));
        if let Some(parent) = parent {
            graph.adopt(parent, id);
        }
        trace!(?id, ?kind, ?parent, "created effect");
        id
    }

    /// Run an effect and route its failure.
    pub(crate) fn run_effect(&self, id: NodeId) -> Result<()> {
        match self.update_effect(id) {
            Ok(()) => Ok(()),
            Err(error) => crate::boundary::handle_error(self, error, id),
        }
    }

    /// Run an effect body, replacing its dependencies and children.
    pub(crate) fn update_effect(&self, id: NodeId) -> Result<()> {
        let (run, kind) = {
            let mut graph = self.inner.graph.borrow_mut();
            let Some(node) = graph.get_mut(id) else {
                return Ok(());
            };
            if node.is_destroyed() {
                return Ok(());
            }
            node.mark_clean();
            let Some(kind) = node.effect_kind() else {
                return Ok(());
            };
            (node.run.clone(), kind)
        };
        let Some(run) = run else {
            return Ok(());
        };

        self.destroy_children(id, kind);
        self.run_teardowns(id);
        self.remove_owned(id);

        let started = self.clock();
        let guard = self.inner.context.enter(Frame {
            reaction: Some(id),
            effect: Some(id),
            tracking: true,
        });
        let result = match run.try_borrow_mut() {
            Ok(mut run) => run(),
            Err(_) => Err(ReactiveError::CircularDependency(id)),
        };
        let collected = guard.exit();

        let clock = self.clock();
        let invalidated = {
            let mut graph = self.inner.graph.borrow_mut();
            graph.replace_dependencies(id, &collected.dependencies);
            // In strict mode an effect that wrote one of its own dependencies
            // runs again.
            let invalidated = self.inner.config.strict
                && clock > started
                && collected.dependencies.iter().any(|dependency| {
                    !collected.created.contains(dependency)
                        && graph
                            .get(*dependency)
                            .map(|node| {
                                node.kind() == NodeKind::Source && node.write_version() > started
                            })
                            .unwrap_or(false)
                });
            if let Some(node) = graph.get_mut(id) {
                node.verified_version = clock;
                node.owned = collected.created;
                if invalidated && !node.is_destroyed() {
                    node.mark_dirty();
                }
            }
            invalidated
        };
        if invalidated {
            trace!(effect = ?id, "effect invalidated itself");
            self.schedule_effect(id);
        }
        result
    }

    fn run_teardowns(&self, id: NodeId) {
        let teardowns = match self.inner.graph.borrow_mut().get_mut(id) {
            Some(node) => std::mem::take(&mut node.teardowns),
            None => return,
        };
        for teardown in teardowns {
            teardown();
        }
    }

    /// Destroy the children an effect re-creates on every run. Blocks keep
    /// their branches; they manage those themselves.
    fn destroy_children(&self, id: NodeId, kind: EffectKind) {
        let children: Vec<NodeId> = {
            let graph = self.inner.graph.borrow();
            let Some(node) = graph.get(id) else {
                return;
            };
            node.children
                .iter()
                .copied()
                .filter(|child| {
                    !(kind.is_block()
                        && graph.get(*child).and_then(Node::effect_kind) == Some(EffectKind::Branch))
                })
                .collect()
        };
        for child in children {
            self.destroy_effect(child, true);
        }
    }

    /// Remove the signals and deriveds `id` created during its last run.
    fn remove_owned(&self, id: NodeId) {
        let owned = match self.inner.graph.borrow_mut().get_mut(id) {
            Some(node) => std::mem::take(&mut node.owned),
            None => return,
        };
        self.remove_nodes(owned);
    }

    fn remove_nodes(&self, nodes: SmallVec<[NodeId; 2]>) {
        for id in nodes {
            self.remove_owned(id);
            self.inner.graph.borrow_mut().remove_node(id);
            self.inner.old_values.borrow_mut().remove(&id);
            trace!(?id, "owned node removed");
        }
    }

    /// Whether `id` exists and has not been destroyed.
    pub fn is_live(&self, id: NodeId) -> bool {
        self.inner.graph.borrow().is_live(id)
    }

    /// Pause or resume an effect. Inert effects are skipped by the
    /// scheduler; resuming one that went stale meanwhile queues it.
    pub fn set_inert(&self, id: NodeId, inert: bool) {
        let stale = match self.inner.graph.borrow_mut().get_mut(id) {
            Some(node) => {
                node.inert = inert;
                !inert && (node.is_dirty() || node.is_maybe_dirty())
            }
            None => false,
        };
        if stale {
            trace!(effect = ?id, "resumed stale effect");
            self.schedule_effect(id);
        }
    }

    /// The node range rendered by `id`: its own, or the span of its
    /// children's ranges.
    pub fn effect_range(&self, id: NodeId) -> Option<NodeRange> {
        let (own, children) = {
            let graph = self.inner.graph.borrow();
            let node = graph.get(id)?;
            (node.nodes, node.children.clone())
        };
        if own.is_some() {
            return own;
        }
        let ranges: Vec<NodeRange> = children
            .into_iter()
            .filter_map(|child| self.effect_range(child))
            .collect();
        match (ranges.first(), ranges.last()) {
            (Some(first), Some(last)) => Some(NodeRange::new(first.start, last.end)),
            _ => None,
        }
    }

    fn remove_effect_nodes(&self, id: NodeId) {
        let Some(dom) = self.dom().cloned() else {
            return;
        };
        let (own, children) = {
            let graph = self.inner.graph.borrow();
            let Some(node) = graph.get(id) else {
                return;
            };
            (node.nodes, node.children.clone())
        };
        match own {
            Some(range) => remove_range(dom.as_ref(), range),
            None => {
                for child in children {
                    self.remove_effect_nodes(child);
                }
            }
        }
    }

    /// Destroy an effect and everything it owns.
    ///
    /// With `remove_dom` the effect's rendered nodes are removed; children
    /// never remove their own nodes since the parent's removal covers them.
    pub fn destroy_effect(&self, id: NodeId, remove_dom: bool) {
        if !self.is_live(id) {
            return;
        }
        if remove_dom {
            self.remove_effect_nodes(id);
        }

        let (children, parent, boundary) = {
            let mut graph = self.inner.graph.borrow_mut();
            let Some(node) = graph.get_mut(id) else {
                return;
            };
            node.status = Status::Destroyed;
            (
                std::mem::take(&mut node.children),
                node.parent,
                node.boundary.take(),
            )
        };

        for child in children {
            self.destroy_effect(child, false);
        }
        self.run_teardowns(id);
        self.remove_owned(id);
        if let Some(boundary) = boundary {
            boundary.mark_destroyed();
        }

        self.inner.scheduler.borrow_mut().unschedule(id);
        let mut graph = self.inner.graph.borrow_mut();
        if let Some(parent) = parent.and_then(|parent| graph.get_mut(parent)) {
            parent.children.retain(|child| *child != id);
        }
        graph.remove_node(id);
        trace!(?id, "effect destroyed");
    }

    // ------------------------------------------------------------------------
    // Flushing
    // ------------------------------------------------------------------------

    /// Whether a flush is in progress.
    pub fn is_flushing(&self) -> bool {
        self.inner.flushing.get()
    }

    /// Number of effects waiting for the next flush.
    pub fn queued(&self) -> usize {
        self.inner.scheduler.borrow().len()
    }

    /// Run every dirty effect now.
    ///
    /// Calling this from inside a flush is a no-op; the running flush picks
    /// up anything queued in the meantime.
    pub fn flush_sync(&self) -> Result<()> {
        if self.inner.flushing.replace(true) {
            return Ok(());
        }
        let result = self.drain();
        self.inner.flushing.set(false);
        result
    }

    /// Run `f`, then flush. Returns what `f` returned.
    pub fn flush_sync_with<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let value = f();
        self.flush_sync()?;
        Ok(value)
    }

    fn drain(&self) -> Result<()> {
        let max = self.inner.config.max_flush_iterations;
        let mut iterations = 0;

        loop {
            let batch = {
                let graph = self.inner.graph.borrow();
                self.inner.scheduler.borrow_mut().take_batch(&graph)
            };
            if batch.is_empty() {
                return Ok(());
            }

            iterations += 1;
            if iterations > max {
                self.inner.scheduler.borrow_mut().clear();
                warn!(max, "flush exceeded its iteration cap");
                return Err(ReactiveError::InfiniteLoop { iterations: max });
            }
            debug!(effects = batch.len(), iteration = iterations, "flushing effects");

            for (index, id) in batch.iter().enumerate() {
                if let Err(error) = self.process(*id) {
                    let mut scheduler = self.inner.scheduler.borrow_mut();
                    for rest in &batch[index + 1..] {
                        scheduler.schedule(*rest);
                    }
                    return Err(error);
                }
            }
        }
    }

    fn process(&self, id: NodeId) -> Result<()> {
        let (live, inert) = {
            let graph = self.inner.graph.borrow();
            match graph.get(id) {
                Some(node) => (!node.is_destroyed(), node.inert),
                None => (false, false),
            }
        };
        if !live || inert {
            return Ok(());
        }

        if crate::boundary::park_if_suspended(self, id) {
            return Ok(());
        }

        match self.check_dirtiness(id) {
            Ok(true) => self.run_effect(id),
            Ok(false) => Ok(()),
            Err(error) => {
                let result = crate::boundary::handle_error(self, error, id);
                if result.is_err() {
                    // Left dirty, the effect runs again on the next flush.
                    if let Some(node) = self.inner.graph.borrow_mut().get_mut(id) {
                        node.mark_dirty();
                    }
                    self.inner.scheduler.borrow_mut().schedule(id);
                }
                result
            }
        }
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    /// Destroy every effect and drop all state. Handles created from this
    /// runtime become inert.
    pub fn dispose(&self) {
        let roots: Vec<NodeId> = {
            let graph = self.inner.graph.borrow();
            graph
                .node_ids()
                .into_iter()
                .filter(|id| {
                    graph
                        .get(*id)
                        .map(|node| node.is_effect() && node.parent.is_none())
                        .unwrap_or(false)
                })
                .collect()
        };
        for root in roots {
            self.destroy_effect(root, true);
        }
        self.inner.scheduler.borrow_mut().clear();
        self.inner.forks.borrow_mut().clear();
        self.inner.old_values.borrow_mut().clear();
        self.inner.graph.borrow_mut().clear();
        debug!("runtime disposed");
    }

    /// Number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.inner.graph.borrow().node_count()
    }

    /// Status of a node, if it exists.
    pub fn status(&self, id: NodeId) -> Option<Status> {
        self.inner.graph.borrow().get(id).map(Node::status)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("nodes", &self.node_count())
            .field("queued", &self.queued())
            .field("clock", &self.clock())
            .finish()
    }
}
