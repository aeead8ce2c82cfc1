//! Fork Tests
//!
//! Speculative writes, isolation between outstanding forks, commit and
//! discard.

use std::cell::RefCell;
use std::rc::Rc;

use weft_core::{BoundaryProps, CapturedContext, DomNode, Fork, ManualHost, Runtime, Signal};

fn runtime() -> (Rc<ManualHost>, Runtime) {
    let host = Rc::new(ManualHost::new());
    (host.clone(), Runtime::new(host))
}

/// Write `value` to `signal` inside a fresh fork and deactivate it.
fn fork_write(rt: &Runtime, signal: &Signal<i32>, value: i32) -> Fork {
    let fork = Fork::ensure(rt);
    signal.set(value).unwrap();
    Fork::unset(rt);
    fork
}

fn disjoint_forks_commit(first_commits_first: bool) {
    let (_host, rt) = runtime();
    let a = rt.signal(0);
    let b = rt.signal(0);

    let first = fork_write(&rt, &a, 1);
    let second = fork_write(&rt, &b, 2);
    assert_ne!(first.id(), second.id());

    {
        let _view = first.apply();
        assert_eq!((a.get_untracked(), b.get_untracked()), (1, 0));
    }
    {
        let _view = second.apply();
        assert_eq!((a.get_untracked(), b.get_untracked()), (0, 2));
    }
    assert_eq!((a.get_untracked(), b.get_untracked()), (1, 2));

    if first_commits_first {
        first.commit();
        second.commit();
    } else {
        second.commit();
        first.commit();
    }
    assert!(!first.is_live() && !second.is_live());
    assert_eq!((a.get_untracked(), b.get_untracked()), (1, 2));
}

/// Forks over disjoint signals do not see each other and both survive
/// commit in creation order.
#[test]
fn disjoint_forks_commit_in_order() {
    disjoint_forks_commit(true);
}

/// The same, committed newest first.
#[test]
fn disjoint_forks_commit_out_of_order() {
    disjoint_forks_commit(false);
}

/// The first write to a signal inside a fork fixes its baseline.
#[test]
fn first_write_fixes_the_baseline() {
    let (_host, rt) = runtime();
    let count = rt.signal(10);

    let fork = Fork::ensure(&rt);
    count.set(11).unwrap();
    count.set(12).unwrap();
    Fork::unset(&rt);

    assert_eq!(fork.previous::<i32>(count.id()), Some(10));
    assert_eq!(fork.touched(), vec![count.id()]);
}

/// Removing an older fork hands the present value to newer forks that
/// touched the same signal.
#[test]
fn newer_forks_rebase_when_an_older_one_commits() {
    let (_host, rt) = runtime();
    let count = rt.signal(0);

    let older = fork_write(&rt, &count, 1);
    let newer = fork_write(&rt, &count, 2);
    assert_eq!(newer.previous::<i32>(count.id()), Some(1));

    older.commit();
    assert_eq!(newer.previous::<i32>(count.id()), Some(2));
}

/// Effects outside the fork's boundary are held back until commit.
#[test]
fn commit_schedules_effects_outside_the_scope() {
    let (host, rt) = runtime();
    let count = rt.signal(0);
    let log = Rc::new(RefCell::new(Vec::new()));
    let context: Rc<RefCell<Option<CapturedContext>>> = Rc::new(RefCell::new(None));

    let (c, l) = (count.clone(), log.clone());
    rt.render_effect(move || {
        l.borrow_mut().push(format!("outside {}", c.get()));
        Ok(())
    })
    .unwrap();

    let (c, l, slot, inner) = (count.clone(), log.clone(), context.clone(), rt.clone());
    let boundary = rt
        .boundary(DomNode(0), BoundaryProps::new(), move |_| {
            let (c, l) = (c.clone(), l.clone());
            inner.render_effect(move || {
                l.borrow_mut().push(format!("inside {}", c.get()));
                Ok(())
            })?;
            *slot.borrow_mut() = Some(inner.capture());
            Ok(())
        })
        .unwrap();
    log.borrow_mut().clear();

    let fork = {
        let context = context.borrow_mut().take().unwrap();
        let _guard = context.restore(&rt);
        Fork::ensure(&rt)
    };
    assert_eq!(fork.scope(), Some(boundary.id()));

    fork.run(|| count.set(5).unwrap()).unwrap();
    assert_eq!(*log.borrow(), vec!["inside 5"]);

    fork.commit();
    host.run_microtasks();
    assert_eq!(*log.borrow(), vec!["inside 5", "outside 5"]);
}

/// Discarding writes every baseline back and notifies readers.
#[test]
fn discard_reverts_writes() {
    let (host, rt) = runtime();
    let count = rt.signal(1);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let (c, s) = (count.clone(), seen.clone());
    rt.render_effect(move || {
        s.borrow_mut().push(c.get());
        Ok(())
    })
    .unwrap();

    let fork = fork_write(&rt, &count, 7);
    host.run_microtasks();
    assert_eq!(*seen.borrow(), vec![1, 7]);

    fork.discard();
    host.run_microtasks();
    assert_eq!(count.get_untracked(), 1);
    assert_eq!(*seen.borrow(), vec![1, 7, 1]);
    assert!(!fork.is_live());
}

/// A reader outside the fork's boundary still follows ordinary writes that
/// reach it through a derived the fork also dirtied, and settles on the
/// committed value once the fork is discarded.
#[test]
fn outside_readers_follow_writes_through_a_shared_derived() {
    let (host, rt) = runtime();
    let first = rt.signal(0);
    let second = rt.signal(0);
    let sum = {
        let (a, b) = (first.clone(), second.clone());
        rt.derived(move || a.get() + b.get())
    };
    let log = Rc::new(RefCell::new(Vec::new()));

    let (s, l) = (sum.clone(), log.clone());
    rt.render_effect(move || {
        l.borrow_mut().push(s.get()?);
        Ok(())
    })
    .unwrap();

    let context: Rc<RefCell<Option<CapturedContext>>> = Rc::new(RefCell::new(None));
    let (slot, inner) = (context.clone(), rt.clone());
    rt.boundary(DomNode(0), BoundaryProps::new(), move |_| {
        *slot.borrow_mut() = Some(inner.capture());
        Ok(())
    })
    .unwrap();

    let fork = {
        let context = context.borrow_mut().take().unwrap();
        let _guard = context.restore(&rt);
        Fork::ensure(&rt)
    };
    assert!(fork.scope().is_some());

    fork.run(|| first.set(5).unwrap()).unwrap();
    assert_eq!(*log.borrow(), vec![0]);

    second.set(100).unwrap();
    host.run_microtasks();
    assert_eq!(log.borrow().len(), 2);

    fork.discard();
    host.run_microtasks();
    assert_eq!(sum.get_untracked().unwrap(), 100);
    assert_eq!(log.borrow().last(), Some(&100));
}
