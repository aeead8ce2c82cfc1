//! Keyed block over an asynchronous key.
//!
//! The block reads a [`Deferred`] key, suspends the nearest boundary until
//! it settles and then re-renders its branch only if the settled key
//! differs from the last one. An equal key keeps the existing nodes. A
//! result that arrives after a newer run, or after the block is gone, is
//! dropped.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use crate::boundary::{handle_error, Suspension};
use crate::deferred::Deferred;
use crate::dom::DomNode;
use crate::error::Result;
use crate::graph::NodeId;
use crate::reactive::{Effect, Runtime};

struct KeyState<K> {
    generation: u64,
    key: Option<K>,
    branch: Option<NodeId>,
    suspension: Option<Suspension>,
}

impl Runtime {
    /// Render `render` in front of `anchor`, keyed by the value `key`
    /// resolves to.
    pub fn key_block<K, F, R>(&self, anchor: DomNode, key: F, render: R) -> Result<Effect>
    where
        K: PartialEq + Clone + 'static,
        F: Fn() -> Deferred<K> + 'static,
        R: Fn(DomNode) -> Result<()> + 'static,
    {
        let state = Rc::new(RefCell::new(KeyState::<K> {
            generation: 0,
            key: None,
            branch: None,
            suspension: None,
        }));
        let render = Rc::new(render);
        let weak = self.downgrade();

        self.block(move || {
            let Some(runtime) = weak.upgrade() else {
                return Ok(());
            };
            let deferred = key();

            let generation = {
                let mut state = state.borrow_mut();
                state.generation += 1;
                state.generation
            };

            // Take the new suspension before releasing the old one so the
            // boundary does not flicker back to main in between.
            let suspension = runtime.suspend()?;
            let stale = state.borrow_mut().suspension.replace(suspension);
            drop(stale);

            let captured = runtime.capture();
            let block = captured.effect();
            let (state, render, weak) = (state.clone(), render.clone(), weak.clone());

            deferred.then(move |outcome| {
                let Some(runtime) = weak.upgrade() else {
                    return;
                };
                let suspension = {
                    let mut state = state.borrow_mut();
                    if state.generation != generation {
                        trace!(generation, "stale key result dropped");
                        return;
                    }
                    state.suspension.take()
                };
                let Some(block) = block.filter(|block| runtime.is_live(*block)) else {
                    return;
                };

                {
                    let _context = captured.restore(&runtime);
                    let result = match outcome {
                        Ok(key) => swap(&runtime, &state, anchor, key, &render),
                        Err(error) => handle_error(&runtime, error, block),
                    };
                    if let Err(error) = result {
                        runtime.host().report_error(error);
                    }
                }

                drop(suspension);
            });
            Ok(())
        })
    }
}

fn swap<K, R>(
    runtime: &Runtime,
    state: &RefCell<KeyState<K>>,
    anchor: DomNode,
    key: K,
    render: &Rc<R>,
) -> Result<()>
where
    K: PartialEq,
    R: Fn(DomNode) -> Result<()> + 'static,
{
    let previous = {
        let mut state = state.borrow_mut();
        if state.key.as_ref() == Some(&key) && state.branch.is_some() {
            return Ok(());
        }
        state.key = Some(key);
        state.branch.take()
    };
    if let Some(previous) = previous {
        runtime.destroy_effect(previous, true);
    }

    let render = render.clone();
    let branch = runtime.branch(move || render(anchor))?;
    state.borrow_mut().branch = Some(branch.id());
    Ok(())
}
