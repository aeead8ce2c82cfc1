//! Forks
//!
//! A fork is a speculative overlay over a set of signals. While a fork is
//! active, every write records the signal's baseline (`previous`, first
//! write wins) and the fork's candidate value (`current`). Several forks can
//! be outstanding at once when asynchronous updates interleave; the
//! registry on the runtime keeps them ordered by creation.
//!
//! # Lifecycle
//!
//! 1. [`Fork::ensure`] returns the active fork or starts a new one, scoped
//!    to the boundary around the active effect.
//! 2. Writes made while it is active are captured. Effects outside its
//!    scope are not marked; they are remembered and scheduled on commit.
//! 3. [`Fork::apply`] exposes the fork's view of the world: its own
//!    candidates on top, every other fork's speculative writes hidden.
//! 4. [`Fork::commit`] or [`Fork::discard`] ends the fork. Removal
//!    reconciles the baselines of the forks that remain.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::error::Result;
use crate::graph::{NodeId, Value};
use crate::reactive::Runtime;

struct ForkState {
    id: u64,
    /// Boundary effect whose subtree may observe this fork's writes.
    scope: Option<NodeId>,
    previous: IndexMap<NodeId, Value>,
    current: IndexMap<NodeId, Value>,
    skipped_effects: IndexSet<NodeId>,
    pending: usize,
    callbacks: Vec<Box<dyn FnOnce()>>,
}

/// The live forks of one runtime.
#[derive(Default)]
pub(crate) struct ForkRegistry {
    forks: IndexMap<u64, Rc<RefCell<ForkState>>>,
    active: Option<u64>,
    next_id: u64,
}

impl ForkRegistry {
    fn active_state(&self) -> Option<Rc<RefCell<ForkState>>> {
        self.active.and_then(|id| self.forks.get(&id).cloned())
    }

    /// Scope of the active fork, if it has one.
    pub fn active_scope(&self) -> Option<NodeId> {
        self.active_state().and_then(|fork| fork.borrow().scope)
    }

    /// Remember effects the active fork kept from being marked.
    pub fn skip_effects(&mut self, effects: &[NodeId]) {
        if let Some(fork) = self.active_state() {
            fork.borrow_mut().skipped_effects.extend(effects.iter().copied());
        }
    }

    /// Whether any live fork is holding effects back.
    pub fn holds_skipped_effects(&self) -> bool {
        self.forks
            .values()
            .any(|fork| !fork.borrow().skipped_effects.is_empty())
    }

    /// Number of live forks.
    pub fn len(&self) -> usize {
        self.forks.len()
    }

    pub fn clear(&mut self) {
        self.forks.clear();
        self.active = None;
    }
}

/// Record a write in the active fork, if there is one.
pub(crate) fn capture_write(runtime: &Runtime, signal: NodeId, previous: Value) {
    let Some(fork) = runtime.forks().borrow().active_state() else {
        return;
    };
    if let Some(present) = runtime.peek(signal) {
        fork.borrow_mut().capture(signal, previous, present);
    }
}

impl ForkState {
    fn capture(&mut self, signal: NodeId, previous: Value, present: Value) {
        self.previous.entry(signal).or_insert(previous);
        self.current.insert(signal, present);
    }
}

/// Handle to a fork.
#[derive(Clone)]
pub struct Fork {
    state: Rc<RefCell<ForkState>>,
    runtime: Runtime,
}

impl Fork {
    /// The active fork, or a new one scoped to the boundary enclosing the
    /// active effect. The returned fork is active.
    pub fn ensure(runtime: &Runtime) -> Fork {
        if let Some(fork) = Self::active(runtime) {
            return fork;
        }

        let scope = runtime
            .active_effect()
            .and_then(|effect| runtime.find_boundary(effect))
            .map(|boundary| boundary.id());

        let mut registry = runtime.forks().borrow_mut();
        registry.next_id += 1;
        let id = registry.next_id;
        let state = Rc::new(RefCell::new(ForkState {
            id,
            scope,
            previous: IndexMap::new(),
            current: IndexMap::new(),
            skipped_effects: IndexSet::new(),
            pending: 0,
            callbacks: Vec::new(),
        }));
        registry.forks.insert(id, state.clone());
        registry.active = Some(id);
        debug!(fork = id, ?scope, "fork created");

        Fork {
            state,
            runtime: runtime.clone(),
        }
    }

    /// The active fork, if any.
    pub fn active(runtime: &Runtime) -> Option<Fork> {
        let state = runtime.forks().borrow().active_state()?;
        Some(Fork {
            state,
            runtime: runtime.clone(),
        })
    }

    /// Clear the active fork without removing it.
    pub fn unset(runtime: &Runtime) {
        runtime.forks().borrow_mut().active = None;
    }

    /// Creation order of this fork.
    pub fn id(&self) -> u64 {
        self.state.borrow().id
    }

    /// The boundary this fork is scoped to.
    pub fn scope(&self) -> Option<NodeId> {
        self.state.borrow().scope
    }

    /// Whether this fork is still registered.
    pub fn is_live(&self) -> bool {
        self.runtime.forks().borrow().forks.contains_key(&self.id())
    }

    /// Whether this fork is the active one.
    pub fn is_active(&self) -> bool {
        self.runtime.forks().borrow().active == Some(self.id())
    }

    /// Signals this fork has written.
    pub fn touched(&self) -> Vec<NodeId> {
        self.state.borrow().previous.keys().copied().collect()
    }

    /// Record a write by hand: `previous` is kept only if this is the first
    /// capture of `signal`; the current value becomes the candidate.
    pub fn capture(&self, signal: NodeId, previous: Value) {
        if let Some(present) = self.runtime.peek(signal) {
            self.state.borrow_mut().capture(signal, previous, present);
        }
    }

    /// Baseline value this fork recorded for `signal`.
    pub fn previous<T: Clone + 'static>(&self, signal: NodeId) -> Option<T> {
        self.state
            .borrow()
            .previous
            .get(&signal)
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    /// Expose this fork's view of the world.
    ///
    /// Signals other forks touched are rolled back to their baselines and
    /// this fork's candidates are applied on top. The returned view puts
    /// everything back when restored or dropped.
    pub fn apply(&self) -> ForkView {
        let runtime = &self.runtime;
        let mut values: IndexMap<NodeId, Value> = IndexMap::new();

        let state = self.state.borrow();
        for signal in state.previous.keys() {
            if let Some(value) = runtime.peek(*signal) {
                values.insert(*signal, value);
            }
        }

        let others: Vec<Rc<RefCell<ForkState>>> = runtime
            .forks()
            .borrow()
            .forks
            .values()
            .filter(|fork| !Rc::ptr_eq(fork, &self.state))
            .cloned()
            .collect();
        for fork in others {
            for (signal, previous) in &fork.borrow().previous {
                if values.contains_key(signal) {
                    continue;
                }
                if let Some(value) = runtime.peek(*signal) {
                    values.insert(*signal, value);
                    runtime.set_raw(*signal, previous.clone());
                }
            }
        }

        for (signal, current) in &state.current {
            runtime.set_raw(*signal, current.clone());
        }

        ForkView {
            runtime: runtime.clone(),
            values,
        }
    }

    /// Deregister and reconcile the remaining forks: older forks forget the
    /// signals this fork touched; newer forks that touched the same signals
    /// take the present value as their baseline.
    pub fn remove(&self) {
        let id = self.id();
        let remaining: Vec<Rc<RefCell<ForkState>>> = {
            let mut registry = self.runtime.forks().borrow_mut();
            registry.forks.shift_remove(&id);
            if registry.active == Some(id) {
                registry.active = None;
            }
            registry.forks.values().cloned().collect()
        };

        let state = self.state.borrow();
        for fork in remaining {
            let mut other = fork.borrow_mut();
            if other.id < id {
                for signal in state.previous.keys() {
                    other.previous.shift_remove(signal);
                }
            } else {
                let shared: Vec<NodeId> = other
                    .previous
                    .keys()
                    .filter(|signal| state.previous.contains_key(*signal))
                    .copied()
                    .collect();
                for signal in shared {
                    if let Some(value) = self.runtime.peek(signal) {
                        other.previous.insert(signal, value);
                    }
                }
            }
        }
        debug!(fork = id, "fork removed");
    }

    /// Make this fork active, run `f` and flush synchronously, then
    /// deactivate.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        self.runtime.forks().borrow_mut().active = Some(self.id());
        let result = self.runtime.flush_sync_with(f);
        self.runtime.forks().borrow_mut().active = None;
        result
    }

    /// One more asynchronous operation is outstanding.
    pub fn increment(&self) {
        self.state.borrow_mut().pending += 1;
    }

    /// One asynchronous operation finished.
    pub fn decrement(&self) {
        let mut state = self.state.borrow_mut();
        state.pending = state.pending.saturating_sub(1);
    }

    /// Whether no asynchronous operation is outstanding.
    pub fn settled(&self) -> bool {
        self.state.borrow().pending == 0
    }

    /// Run `f` when the fork commits.
    pub fn add_callback(&self, f: impl FnOnce() + 'static) {
        self.state.borrow_mut().callbacks.push(Box::new(f));
    }

    /// Make the fork's writes final: remove it, run its callbacks and
    /// schedule the effects it kept from being marked.
    pub fn commit(&self) {
        self.remove();
        let callbacks = std::mem::take(&mut self.state.borrow_mut().callbacks);
        debug!(fork = self.id(), callbacks = callbacks.len(), "fork committed");

        for callback in callbacks {
            callback();
        }
        self.release_skipped();
    }

    /// Mark dirty and queue every effect this fork kept from being marked.
    fn release_skipped(&self) {
        let skipped = std::mem::take(&mut self.state.borrow_mut().skipped_effects);
        if !skipped.is_empty() {
            debug!(fork = self.id(), effects = skipped.len(), "releasing skipped effects");
        }
        for effect in skipped {
            let live = match self.runtime.graph().borrow_mut().get_mut(effect) {
                Some(node) if !node.is_destroyed() => {
                    node.mark_dirty();
                    true
                }
                _ => false,
            };
            if live {
                self.runtime.schedule_effect(effect);
            }
        }
    }

    /// Abandon the fork: write every baseline back, remove it and queue the
    /// effects it held back.
    pub fn discard(&self) {
        let active = {
            let mut registry = self.runtime.forks().borrow_mut();
            let active = registry.active.take();
            active.filter(|id| *id != self.id())
        };

        let previous: Vec<(NodeId, Value)> = self
            .state
            .borrow()
            .previous
            .iter()
            .map(|(signal, value)| (*signal, value.clone()))
            .collect();
        for (signal, value) in previous {
            self.runtime.internal_set(signal, value);
        }

        self.runtime.forks().borrow_mut().active = active;
        self.state.borrow_mut().callbacks.clear();
        self.remove();
        self.release_skipped();
        debug!(fork = self.id(), "fork discarded");
    }
}

impl fmt::Debug for Fork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Fork")
            .field("id", &state.id)
            .field("scope", &state.scope)
            .field("touched", &state.previous.len())
            .field("pending", &state.pending)
            .finish()
    }
}

/// A fork's values, applied. Restoring (or dropping) the view reinstates
/// the values that were visible before and clears the active fork.
#[must_use = "dropping the view restores the previous values immediately"]
pub struct ForkView {
    runtime: Runtime,
    values: IndexMap<NodeId, Value>,
}

impl ForkView {
    /// Reinstate the previous values.
    pub fn restore(self) {}
}

impl Drop for ForkView {
    fn drop(&mut self) {
        for (signal, value) in self.values.drain(..) {
            self.runtime.set_raw(signal, value);
        }
        self.runtime.forks().borrow_mut().active = None;
    }
}
