//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. Render-phase effects (render, block, branch, root) run immediately
//!    when created to establish their dependencies. User effects are queued
//!    and run on the next flush, after every render-phase effect.
//!
//! 2. When any dependency changes, the effect is queued to re-run.
//!
//! 3. Before re-running, the effect destroys the effects it created last
//!    time, runs its teardowns, drops the signals and deriveds it created
//!    and forgets its old dependencies.
//!
//! # Ownership
//!
//! Effects created while another effect runs are owned by it. Destroying an
//! owner destroys everything below it and removes its rendered nodes.
//!
//! # Cleanup
//!
//! Register teardowns with [`Runtime::on_cleanup`]. They run before the
//! effect re-runs and when it is destroyed.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::runtime::Runtime;
use crate::error::Result;
use crate::graph::{EffectKind, NodeId, RunFn};

/// Handle to an effect in the graph.
///
/// Dropping the handle does not destroy the effect; its owner does.
#[derive(Clone)]
pub struct Effect {
    id: NodeId,
    runtime: Runtime,
}

impl Effect {
    pub(crate) fn new(id: NodeId, runtime: Runtime) -> Self {
        Self { id, runtime }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Whether the effect still exists.
    pub fn is_live(&self) -> bool {
        self.runtime.is_live(self.id)
    }

    /// Destroy the effect, its children and its rendered nodes.
    pub fn destroy(&self) {
        self.runtime.destroy_effect(self.id, true);
    }

    /// Pause or resume the effect.
    pub fn set_inert(&self, inert: bool) {
        self.runtime.set_inert(self.id, inert);
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("live", &self.is_live())
            .finish()
    }
}

fn erase(f: impl FnMut() -> Result<()> + 'static) -> RunFn {
    Rc::new(RefCell::new(f))
}

impl Runtime {
    /// Create a user effect. It runs on the next flush.
    pub fn effect(&self, f: impl FnMut() -> Result<()> + 'static) -> Effect {
        let id = self.insert_effect(EffectKind::User, erase(f));
        self.schedule_effect(id);
        Effect::new(id, self.clone())
    }

    /// Create a render effect and run it now.
    pub fn render_effect(&self, f: impl FnMut() -> Result<()> + 'static) -> Result<Effect> {
        self.spawn(EffectKind::Render, f)
    }

    /// Create a block effect and run it now. Writes from inside a block
    /// are rejected in strict mode.
    pub fn block(&self, f: impl FnMut() -> Result<()> + 'static) -> Result<Effect> {
        self.spawn(EffectKind::Block, f)
    }

    /// Create a branch and run it now.
    pub fn branch(&self, f: impl FnMut() -> Result<()> + 'static) -> Result<Effect> {
        self.spawn(EffectKind::Branch, f)
    }

    /// Create the root of an effect tree and run it now.
    pub fn root(&self, f: impl FnMut() -> Result<()> + 'static) -> Result<Effect> {
        self.spawn(EffectKind::Root, f)
    }

    fn spawn(&self, kind: EffectKind, f: impl FnMut() -> Result<()> + 'static) -> Result<Effect> {
        let id = self.create_effect(kind, erase(f))?;
        Ok(Effect::new(id, self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ManualHost;
    use crate::ReactiveError;
    use std::cell::Cell;

    fn runtime() -> (Rc<ManualHost>, Runtime) {
        let host = Rc::new(ManualHost::new());
        (host.clone(), Runtime::new(host))
    }

    #[test]
    fn user_effects_wait_for_a_flush() {
        let (host, rt) = runtime();
        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();
        rt.effect(move || {
            r.set(r.get() + 1);
            Ok(())
        });

        assert_eq!(runs.get(), 0);
        host.run_microtasks();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn render_effects_run_immediately_and_rerun_on_change() {
        let (_host, rt) = runtime();
        let count = rt.signal(0);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let (c, s) = (count.clone(), seen.clone());
        rt.render_effect(move || {
            s.borrow_mut().push(c.get());
            Ok(())
        })
        .unwrap();
        assert_eq!(*seen.borrow(), vec![0]);

        count.set(1).unwrap();
        count.set(2).unwrap();
        rt.flush_sync().unwrap();
        assert_eq!(*seen.borrow(), vec![0, 2]);
    }

    #[test]
    fn cleanup_runs_before_rerun_and_on_destroy() {
        let (_host, rt) = runtime();
        let count = rt.signal(0);
        let cleanups = Rc::new(Cell::new(0));

        let (c, n, inner) = (count.clone(), cleanups.clone(), rt.clone());
        let effect = rt
            .render_effect(move || {
                c.get();
                let n = n.clone();
                inner.on_cleanup(move || n.set(n.get() + 1));
                Ok(())
            })
            .unwrap();

        count.set(1).unwrap();
        rt.flush_sync().unwrap();
        assert_eq!(cleanups.get(), 1);

        effect.destroy();
        assert_eq!(cleanups.get(), 2);
        assert!(!effect.is_live());
    }

    #[test]
    fn block_effects_reject_writes() {
        let (_host, rt) = runtime();
        let count = rt.signal(0);
        let c = count.clone();

        let result = rt.block(move || {
            c.set(1)?;
            Ok(())
        });
        assert!(matches!(result, Err(ReactiveError::UnsafeMutation { .. })));
    }

    #[test]
    fn inert_effects_are_skipped() {
        let (_host, rt) = runtime();
        let count = rt.signal(0);
        let runs = Rc::new(Cell::new(0));

        let (c, r) = (count.clone(), runs.clone());
        let effect = rt
            .render_effect(move || {
                c.get();
                r.set(r.get() + 1);
                Ok(())
            })
            .unwrap();

        effect.set_inert(true);
        count.set(1).unwrap();
        rt.flush_sync().unwrap();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn children_are_recreated_on_rerun() {
        let (_host, rt) = runtime();
        let toggle = rt.signal(false);
        let created = Rc::new(Cell::new(0));

        let (t, n, inner) = (toggle.clone(), created.clone(), rt.clone());
        rt.render_effect(move || {
            t.get();
            n.set(n.get() + 1);
            inner.render_effect(|| Ok(()))?;
            Ok(())
        })
        .unwrap();
        let before = rt.node_count();

        toggle.set(true).unwrap();
        rt.flush_sync().unwrap();
        assert_eq!(created.get(), 2);
        assert_eq!(rt.node_count(), before);
    }
}
