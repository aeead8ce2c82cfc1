//! Tokio Host Tests
//!
//! The runtime driven by a `LocalSet` instead of a manual queue.

use std::cell::RefCell;
use std::rc::Rc;

use tokio::task::LocalSet;
use weft_core::{Runtime, TokioHost};

/// Let every task queued on the local set run.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

/// Writes schedule a flush that runs once the current task yields.
#[tokio::test(flavor = "current_thread")]
async fn effects_flush_on_the_local_set() {
    LocalSet::new()
        .run_until(async {
            let rt = Runtime::new(Rc::new(TokioHost));
            let count = rt.signal(0);
            let log = Rc::new(RefCell::new(Vec::new()));

            let (c, l) = (count.clone(), log.clone());
            rt.effect(move || {
                l.borrow_mut().push(c.get());
                Ok(())
            });
            assert!(log.borrow().is_empty());

            settle().await;
            assert_eq!(*log.borrow(), vec![0]);

            count.set(1).unwrap();
            count.set(2).unwrap();
            settle().await;
            assert_eq!(*log.borrow(), vec![0, 2]);
        })
        .await;
}

/// Deferred continuations run as local tasks.
#[tokio::test(flavor = "current_thread")]
async fn deferred_values_resolve_on_the_local_set() {
    LocalSet::new()
        .run_until(async {
            let rt = Runtime::new(Rc::new(TokioHost));
            let deferred = rt.deferred::<u32>();
            let seen = Rc::new(RefCell::new(None));

            let s = seen.clone();
            deferred.then(move |outcome| *s.borrow_mut() = outcome.ok());
            deferred.resolve(7);
            assert!(seen.borrow().is_none());

            settle().await;
            assert_eq!(*seen.borrow(), Some(7));
        })
        .await;
}
