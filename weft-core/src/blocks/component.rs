//! Dynamic component block.
//!
//! Renders whatever `get_component` returns and swaps the rendered branch
//! when it changes. Under an active fork the new branch is built into an
//! offscreen fragment and only swapped in when the fork commits, so the old
//! content stays visible while the fork is speculative.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::dom::{DomNode, Offscreen};
use crate::error::Result;
use crate::fork::Fork;
use crate::graph::NodeId;
use crate::reactive::{Effect, Runtime};

struct ComponentState<C> {
    component: Option<C>,
    effect: Option<NodeId>,
    pending_effect: Option<NodeId>,
    offscreen: Option<Offscreen>,
}

impl Runtime {
    /// Render the current component in front of `anchor`.
    pub fn component<C, G, R>(&self, anchor: DomNode, get_component: G, render: R) -> Result<Effect>
    where
        C: PartialEq + Clone + 'static,
        G: Fn() -> Option<C> + 'static,
        R: Fn(DomNode, &C) -> Result<()> + 'static,
    {
        let state = Rc::new(RefCell::new(ComponentState::<C> {
            component: None,
            effect: None,
            pending_effect: None,
            offscreen: None,
        }));
        let render = Rc::new(render);
        let weak = self.downgrade();

        self.block(move || {
            let Some(runtime) = weak.upgrade() else {
                return Ok(());
            };
            let next = get_component();
            if state.borrow().component == next {
                return Ok(());
            }
            state.borrow_mut().component = next.clone();

            let fork = Fork::active(&runtime);
            let dom = runtime.dom().cloned();
            let defer = fork.is_some() && dom.is_some();

            if let Some(component) = next {
                let mut target = anchor;
                if let (true, Some(dom)) = (defer, dom.as_ref()) {
                    let offscreen = Offscreen::empty(dom.as_ref());
                    target = dom.create_marker();
                    dom.append(offscreen.fragment(), target);
                    state.borrow_mut().offscreen = Some(offscreen);
                }

                let render = render.clone();
                let branch = runtime.branch(move || render(target, &component))?;
                state.borrow_mut().pending_effect = Some(branch.id());

                if let (true, Some(dom)) = (defer, dom.as_ref()) {
                    dom.remove(target);
                }
            }

            match fork {
                Some(fork) if defer => {
                    debug!(fork = fork.id(), "component swap deferred until commit");
                    let (state, weak) = (state.clone(), weak.clone());
                    fork.add_callback(move || {
                        if let Some(runtime) = weak.upgrade() {
                            commit(&runtime, &state, anchor);
                        }
                    });
                }
                _ => commit(&runtime, &state, anchor),
            }
            Ok(())
        })
    }
}

/// Replace the visible branch with the freshly rendered one.
fn commit<C>(runtime: &Runtime, state: &RefCell<ComponentState<C>>, anchor: DomNode) {
    let (old, offscreen) = {
        let mut state = state.borrow_mut();
        (state.effect.take(), state.offscreen.take())
    };
    if let Some(old) = old {
        runtime.destroy_effect(old, true);
    }
    if let (Some(offscreen), Some(dom)) = (offscreen, runtime.dom()) {
        offscreen.attach_before(dom.as_ref(), anchor);
    }
    let mut state = state.borrow_mut();
    state.effect = state.pending_effect.take();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Dom, MemoryDom};
    use crate::host::ManualHost;

    fn setup() -> (Runtime, Rc<MemoryDom>, DomNode, DomNode) {
        let rt = Runtime::new(Rc::new(ManualHost::new()));
        let dom = Rc::new(MemoryDom::new());
        rt.attach_dom(dom.clone());
        let root = dom.create_root();
        let anchor = dom.create_anchor();
        dom.append(root, anchor);
        (rt, dom, root, anchor)
    }

    fn render(rt: &Runtime, dom: &Rc<MemoryDom>) -> impl Fn(DomNode, &&'static str) -> Result<()> {
        let (rt, dom) = (rt.clone(), dom.clone());
        move |anchor, name| {
            let node = dom.create_element("div", name);
            dom.insert_before(anchor, node);
            rt.assign_nodes(node, node);
            Ok(())
        }
    }

    #[test]
    fn swaps_when_the_component_changes() {
        let (rt, dom, root, anchor) = setup();
        let which = rt.signal(Some("a"));
        let w = which.clone();
        rt.component(anchor, move || w.get(), render(&rt, &dom)).unwrap();
        assert_eq!(dom.inner_html(root), "<div>a</div>");

        which.set(Some("b")).unwrap();
        rt.flush_sync().unwrap();
        assert_eq!(dom.inner_html(root), "<div>b</div>");

        which.set(None).unwrap();
        rt.flush_sync().unwrap();
        assert_eq!(dom.inner_html(root), "");
    }

    #[test]
    fn fork_defers_the_swap_until_commit() {
        let (rt, dom, root, anchor) = setup();
        let which = rt.signal(Some("a"));
        let w = which.clone();
        rt.component(anchor, move || w.get(), render(&rt, &dom)).unwrap();

        let fork = Fork::ensure(&rt);
        Fork::unset(&rt);
        fork.run(|| which.set(Some("b")).unwrap()).unwrap();
        assert_eq!(dom.inner_html(root), "<div>a</div>");

        fork.commit();
        assert_eq!(dom.inner_html(root), "<div>b</div>");
    }
}
