//! Deferred Values
//!
//! A [`Deferred`] is a value that arrives later: it is settled once, by
//! [`resolve`](Deferred::resolve) or [`reject`](Deferred::reject), and
//! hands its outcome to continuations registered with
//! [`then`](Deferred::then). Continuations always run on a host microtask,
//! never synchronously inside `resolve` or `then`, so an async continuation
//! can never observe a half-finished flush.
//!
//! Two handles are equal when they refer to the same deferred value, so a
//! signal holding a `Deferred` notifies only when it is given a new one.

use std::cell::RefCell;
use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

use crate::error::{ReactiveError, Result};
use crate::reactive::{Runtime, WeakRuntime};

type Continuation<T> = Box<dyn FnOnce(Result<T>)>;

struct DeferredState<T> {
    outcome: Option<Result<T>>,
    waiters: Vec<Continuation<T>>,
}

/// A value settled at most once, observed through continuations.
pub struct Deferred<T> {
    shared: Rc<RefCell<DeferredState<T>>>,
    runtime: WeakRuntime,
}

impl<T: Clone + 'static> Deferred<T> {
    /// Settle with `value`. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with a rejection. Returns `false` if already settled.
    pub fn reject<E: Into<Box<dyn StdError>>>(&self, reason: E) -> bool {
        self.settle(Err(ReactiveError::rejected(reason)))
    }

    fn settle(&self, outcome: Result<T>) -> bool {
        let waiters = {
            let mut state = self.shared.borrow_mut();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            std::mem::take(&mut state.waiters)
        };
        tracing::trace!(waiters = waiters.len(), ok = outcome.is_ok(), "deferred settled");
        for waiter in waiters {
            self.dispatch(waiter, outcome.clone());
        }
        true
    }

    /// Run `f` with the outcome on a microtask after settlement.
    pub fn then(&self, f: impl FnOnce(Result<T>) + 'static) {
        let settled = self.shared.borrow().outcome.clone();
        match settled {
            Some(outcome) => self.dispatch(Box::new(f), outcome),
            None => self.shared.borrow_mut().waiters.push(Box::new(f)),
        }
    }

    fn dispatch(&self, waiter: Continuation<T>, outcome: Result<T>) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.queue_microtask(move |_| waiter(outcome));
        }
    }

    /// Whether the value has been settled.
    pub fn is_settled(&self) -> bool {
        self.shared.borrow().outcome.is_some()
    }

    /// The outcome, if settled.
    pub fn outcome(&self) -> Option<Result<T>> {
        self.shared.borrow().outcome.clone()
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T> PartialEq for Deferred<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settled = self.shared.borrow().outcome.is_some();
        f.debug_struct("Deferred").field("settled", &settled).finish()
    }
}

impl Runtime {
    /// A new unsettled value whose continuations run on this runtime's
    /// host.
    pub fn deferred<T: Clone + 'static>(&self) -> Deferred<T> {
        Deferred {
            shared: Rc::new(RefCell::new(DeferredState {
                outcome: None,
                waiters: Vec::new(),
            })),
            runtime: self.downgrade(),
        }
    }

    /// An already resolved value.
    pub fn resolved<T: Clone + 'static>(&self, value: T) -> Deferred<T> {
        let deferred = self.deferred();
        deferred.resolve(value);
        deferred
    }
}
