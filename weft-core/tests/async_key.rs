//! Keyed Block Tests
//!
//! A key block inside a boundary, keyed by a deferred value held in a
//! signal.

use std::cell::RefCell;
use std::rc::Rc;

use weft_core::{
    Boundary, BoundaryProps, Deferred, Dom, DomNode, ManualHost, MemoryDom, Phase, Result,
    Runtime, Signal,
};

struct App {
    host: Rc<ManualHost>,
    rt: Runtime,
    dom: Rc<MemoryDom>,
    root: DomNode,
    key: Signal<Deferred<&'static str>>,
    rendered: Rc<RefCell<Vec<DomNode>>>,
    boundary: Boundary,
}

/// root > boundary(pending: <p>pending</p>) > main > key block > <h1>.
fn app(props: impl FnOnce(&Runtime, &Rc<MemoryDom>) -> BoundaryProps) -> App {
    let host = Rc::new(ManualHost::new());
    let rt = Runtime::new(host.clone());
    let dom = Rc::new(MemoryDom::new());
    rt.attach_dom(dom.clone());

    let root = dom.create_root();
    let anchor = dom.create_anchor();
    dom.append(root, anchor);

    let key = rt.signal(rt.deferred::<&'static str>());
    let rendered = Rc::new(RefCell::new(Vec::new()));

    let pending = {
        let (rt, dom) = (rt.clone(), dom.clone());
        move |anchor: DomNode| -> Result<()> {
            let node = dom.create_element("p", "pending");
            dom.insert_before(anchor, node);
            rt.assign_nodes(node, node);
            Ok(())
        }
    };
    let props = props(&rt, &dom).pending(pending);

    let (inner, d, k, r) = (rt.clone(), dom.clone(), key.clone(), rendered.clone());
    let children = move |anchor: DomNode| -> Result<()> {
        let start = d.create_anchor();
        let a = d.create_anchor();
        d.insert_before(anchor, start);
        d.insert_before(anchor, a);
        inner.assign_nodes(start, a);

        let k = k.clone();
        let (rt, dom, rendered) = (inner.clone(), d.clone(), r.clone());
        inner.key_block(a, move || k.get(), move |anchor| {
            let node = dom.create_element("h1", "hello");
            dom.insert_before(anchor, node);
            rt.assign_nodes(node, node);
            rendered.borrow_mut().push(node);
            Ok(())
        })?;
        Ok(())
    };

    let slot = Rc::new(RefCell::new(None));
    let (inner, s) = (rt.clone(), slot.clone());
    rt.root(move || {
        let boundary = inner.boundary(anchor, props.clone(), children.clone())?;
        *s.borrow_mut() = Some(boundary);
        Ok(())
    })
    .unwrap();
    let boundary = slot.borrow_mut().take().unwrap();

    App {
        host,
        rt,
        dom,
        root,
        key,
        rendered,
        boundary,
    }
}

/// Pending shows until the key resolves; an equal key keeps the rendered
/// nodes and a different key replaces them.
#[test]
fn key_block_follows_the_resolved_key() {
    let App {
        host,
        rt,
        dom,
        root,
        key,
        rendered,
        ..
    } = app(|_, _| BoundaryProps::new());
    assert_eq!(dom.inner_html(root), "<p>pending</p>");

    key.get_untracked().resolve("hello");
    host.run_microtasks();
    assert_eq!(dom.inner_html(root), "<h1>hello</h1>");
    assert_eq!(rendered.borrow().len(), 1);
    let first = rendered.borrow()[0];

    // Same key: the existing nodes come back untouched.
    let next = rt.deferred();
    key.set(next.clone()).unwrap();
    host.run_microtasks();
    assert_eq!(dom.inner_html(root), "<p>pending</p>");

    next.resolve("hello");
    host.run_microtasks();
    assert_eq!(dom.inner_html(root), "<h1>hello</h1>");
    assert_eq!(*rendered.borrow(), vec![first]);
    assert!(dom.contains(root, first));

    // Different key: a fresh branch replaces the old one.
    let next = rt.deferred();
    key.set(next.clone()).unwrap();
    host.run_microtasks();
    next.resolve("world");
    host.run_microtasks();

    assert_eq!(dom.inner_html(root), "<h1>hello</h1>");
    let rendered = rendered.borrow();
    assert_eq!(rendered.len(), 2);
    assert_ne!(rendered[1], first);
    assert!(!dom.contains(root, first));
    assert!(host.take_errors().is_empty());
}

/// A result that arrives after a newer key was requested is dropped.
#[test]
fn stale_results_are_ignored() {
    let App {
        host,
        rt,
        dom,
        root,
        key,
        rendered,
        ..
    } = app(|_, _| BoundaryProps::new());

    let stale = key.get_untracked();
    let fresh = rt.deferred();
    key.set(fresh.clone()).unwrap();
    host.run_microtasks();

    stale.resolve("old");
    host.run_microtasks();
    assert_eq!(dom.inner_html(root), "<p>pending</p>");
    assert!(rendered.borrow().is_empty());

    fresh.resolve("new");
    host.run_microtasks();
    assert_eq!(dom.inner_html(root), "<h1>hello</h1>");
    assert_eq!(rendered.borrow().len(), 1);
}

/// A rejected key fails the boundary and shows its failed view.
#[test]
fn rejected_keys_fail_the_boundary() {
    let boundary_errors = Rc::new(RefCell::new(Vec::new()));
    let log = boundary_errors.clone();
    let App {
        host,
        dom,
        root,
        key,
        ..
    } = app(move |rt, dom| {
        let (rt, dom) = (rt.clone(), dom.clone());
        BoundaryProps::new()
            .onerror(move |error, _| log.borrow_mut().push(error.to_string()))
            .failed(move |anchor, error, _| {
                let node = dom.create_element("p", &format!("failed: {error}"));
                dom.insert_before(anchor, node);
                rt.assign_nodes(node, node);
                Ok(())
            })
    });

    key.get_untracked().reject("nope");
    host.run_microtasks();

    assert_eq!(*boundary_errors.borrow(), vec!["rejected: nope"]);
    assert_eq!(dom.inner_html(root), "<p>failed: rejected: nope</p>");
    assert!(host.take_errors().is_empty());
}

/// The block keeps the boundary suspended exactly while a key is
/// outstanding.
#[test]
fn boundary_phase_tracks_the_key() {
    let App {
        host,
        rt,
        key,
        boundary,
        ..
    } = app(|_, _| BoundaryProps::new());
    assert_eq!(boundary.phase(), Phase::Suspended);
    assert_eq!(boundary.async_count(), 1);
    assert!(boundary.pending().is_some());

    key.get_untracked().resolve("hello");
    host.run_microtasks();
    assert_eq!(boundary.phase(), Phase::Active);
    assert_eq!(boundary.async_count(), 0);
    assert!(boundary.pending().is_none());

    // A key that is already settled still resolves on a microtask.
    key.set(rt.resolved("again")).unwrap();
    host.run_microtasks();
    assert_eq!(boundary.phase(), Phase::Active);
    assert_eq!(boundary.async_count(), 0);
    assert!(host.take_errors().is_empty());
}
