//! Host Integration
//!
//! The runtime never drives its own event loop. Deferred flushes, boundary
//! transitions and deferred-value continuations are handed to the host as
//! microtasks, and errors that no boundary handles are reported back to it.
//!
//! Two hosts ship with the crate:
//!
//! - [`ManualHost`]: a deterministic queue drained by the caller. Tests and
//!   headless renderers use it.
//! - [`TokioHost`]: spawns each microtask onto the current `LocalSet`.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use crate::error::ReactiveError;

/// A unit of deferred work.
pub type Microtask = Box<dyn FnOnce()>;

/// Capabilities the runtime needs from its environment.
pub trait Host {
    /// Run `task` after the current synchronous work completes.
    fn queue_microtask(&self, task: Microtask);

    /// Receive an error that escaped every boundary during deferred work.
    fn report_error(&self, error: ReactiveError) {
        tracing::error!(%error, "unhandled error in reactive runtime");
    }
}

/// A host whose microtasks run only when the owner drains them.
#[derive(Default)]
pub struct ManualHost {
    queue: RefCell<VecDeque<Microtask>>,
    errors: RefCell<Vec<ReactiveError>>,
    executed: Cell<usize>,
}

impl ManualHost {
    /// Create an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run queued microtasks, including any they enqueue, until the queue is
    /// empty. Returns how many ran.
    pub fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            // The borrow ends before the task runs so it can enqueue more.
            let task = self.queue.borrow_mut().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        self.executed.set(self.executed.get() + ran);
        ran
    }

    /// Number of microtasks waiting.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Total microtasks executed so far.
    pub fn executed(&self) -> usize {
        self.executed.get()
    }

    /// Errors reported since the last call.
    pub fn take_errors(&self) -> Vec<ReactiveError> {
        std::mem::take(&mut *self.errors.borrow_mut())
    }
}

impl Host for ManualHost {
    fn queue_microtask(&self, task: Microtask) {
        self.queue.borrow_mut().push_back(task);
    }

    fn report_error(&self, error: ReactiveError) {
        tracing::warn!(%error, "error reported to host");
        self.errors.borrow_mut().push(error);
    }
}

/// A host that schedules microtasks on the current tokio `LocalSet`.
///
/// Must be used from within `LocalSet::run_until` (or a task spawned on a
/// `LocalSet`); the runtime's handles are not `Send`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioHost;

impl Host for TokioHost {
    fn queue_microtask(&self, task: Microtask) {
        tokio::task::spawn_local(async move { task() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn manual_host_runs_in_fifo_order() {
        let host = Rc::new(ManualHost::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            host.queue_microtask(Box::new(move || log.borrow_mut().push(i)));
        }

        assert_eq!(host.pending(), 3);
        assert_eq!(host.run_microtasks(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert_eq!(host.pending(), 0);
    }

    #[test]
    fn nested_microtasks_run_in_same_drain() {
        let host = Rc::new(ManualHost::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner_host = host.clone();
        let inner_log = log.clone();
        host.queue_microtask(Box::new(move || {
            inner_log.borrow_mut().push("outer");
            let log = inner_log.clone();
            inner_host.queue_microtask(Box::new(move || log.borrow_mut().push("inner")));
        }));

        assert_eq!(host.run_microtasks(), 2);
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
        assert_eq!(host.executed(), 2);
    }

    #[test]
    fn reported_errors_are_collected() {
        let host = ManualHost::new();
        host.report_error(ReactiveError::AwaitOutsideBoundary);
        assert_eq!(host.take_errors().len(), 1);
        assert!(host.take_errors().is_empty());
    }
}
