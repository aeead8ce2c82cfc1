//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! Each runtime owns a stack of frames. Running a derived or an effect
//! pushes a frame; the [`ContextGuard`] returned by [`ContextStack::enter`]
//! pops it again, either explicitly through [`ContextGuard::exit`] (which
//! hands back the dependencies collected while the frame was on top) or on
//! drop.
//!
//! Asynchronous continuations lose the stack they were started from. A
//! reaction that wants to resume later calls
//! [`Runtime::capture`](super::Runtime::capture) and, once the awaited value
//! arrives, [`CapturedContext::restore`] to re-enter the same owner before
//! touching the graph.

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::graph::NodeId;

/// One level of the context stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Frame {
    /// Reaction whose reads are being recorded.
    pub reaction: Option<NodeId>,
    /// Effect that owns effects created in this frame.
    pub effect: Option<NodeId>,
    /// Whether reads register dependencies.
    pub tracking: bool,
}

/// What a frame collected while it was on top of the stack.
#[derive(Debug, Default)]
pub(crate) struct Collected {
    pub dependencies: SmallVec<[NodeId; 8]>,
    /// Signals and deriveds created while the frame was running.
    pub created: SmallVec<[NodeId; 2]>,
}

#[derive(Debug)]
struct Entry {
    frame: Frame,
    collected: Collected,
}

/// The per-runtime context stack.
#[derive(Debug, Default)]
pub(crate) struct ContextStack {
    stack: RefCell<Vec<Entry>>,
}

impl ContextStack {
    /// Push `frame`. The frame is popped when the guard exits or drops.
    pub fn enter(&self, frame: Frame) -> ContextGuard<'_> {
        let mut stack = self.stack.borrow_mut();
        stack.push(Entry {
            frame,
            collected: Collected::default(),
        });
        ContextGuard {
            stack: self,
            depth: stack.len(),
            exited: false,
        }
    }

    /// Frame on top of the stack, or an empty frame.
    pub fn current(&self) -> Frame {
        self.stack
            .borrow()
            .last()
            .map(|entry| entry.frame)
            .unwrap_or_default()
    }

    /// Record a read of `source`. Returns `false` when nothing is tracking
    /// or the source was already recorded in this frame.
    pub fn track_dependency(&self, source: NodeId) -> bool {
        let mut stack = self.stack.borrow_mut();
        let Some(entry) = stack.last_mut() else {
            return false;
        };
        if !entry.frame.tracking || entry.frame.reaction.is_none() {
            return false;
        }
        if entry.collected.dependencies.contains(&source) {
            return false;
        }
        entry.collected.dependencies.push(source);
        true
    }

    /// Record that `node` was created by the reaction running in the
    /// nearest tracking frame. Untracked frames above it pass the record
    /// down.
    pub fn record_created(&self, node: NodeId) {
        let mut stack = self.stack.borrow_mut();
        if let Some(entry) = stack.iter_mut().rev().find(|entry| entry.frame.tracking) {
            entry.collected.created.push(node);
        }
    }

    /// Whether `source` was created by the reaction running in the nearest
    /// tracking frame.
    pub fn created_in_current_frame(&self, source: NodeId) -> bool {
        self.stack
            .borrow()
            .iter()
            .rev()
            .find(|entry| entry.frame.tracking)
            .map(|entry| entry.collected.created.contains(&source))
            .unwrap_or(false)
    }

    fn pop(&self, depth: usize) -> Collected {
        let mut stack = self.stack.borrow_mut();
        debug_assert_eq!(
            stack.len(),
            depth,
            "ReactiveContext mismatch: expected depth {}, got {}",
            depth,
            stack.len()
        );
        stack
            .pop()
            .map(|entry| entry.collected)
            .unwrap_or_default()
    }
}

/// Capability for the frame pushed by [`ContextStack::enter`].
///
/// Dropping the guard pops the frame, so the stack stays balanced even if
/// the computation panics.
pub struct ContextGuard<'a> {
    stack: &'a ContextStack,
    depth: usize,
    exited: bool,
}

impl ContextGuard<'_> {
    /// Pop the frame and return what it collected.
    pub(crate) fn exit(mut self) -> Collected {
        self.exited = true;
        self.stack.pop(self.depth)
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        if !self.exited {
            self.stack.pop(self.depth);
        }
    }
}

/// The active effect and reaction at the moment of capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedContext {
    pub(crate) reaction: Option<NodeId>,
    pub(crate) effect: Option<NodeId>,
}

impl CapturedContext {
    /// The effect that owned the captured context.
    pub fn effect(&self) -> Option<NodeId> {
        self.effect
    }

    /// Re-enter the captured context on `runtime`.
    ///
    /// Effects created while the guard is alive are owned by the captured
    /// effect. Reads are not tracked: the reaction that captured the context
    /// has already finished its run.
    pub fn restore<'a>(&self, runtime: &'a super::Runtime) -> ContextGuard<'a> {
        runtime.context().enter(Frame {
            reaction: self.reaction,
            effect: self.effect,
            tracking: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracking(id: NodeId) -> Frame {
        Frame {
            reaction: Some(id),
            effect: None,
            tracking: true,
        }
    }

    #[test]
    fn context_tracks_reaction() {
        let stack = ContextStack::default();
        let id = NodeId::new();

        assert_eq!(stack.current(), Frame::default());

        {
            let _ctx = stack.enter(tracking(id));
            assert_eq!(stack.current().reaction, Some(id));
        }

        // Context should be cleaned up after drop
        assert_eq!(stack.current(), Frame::default());
    }

    #[test]
    fn context_tracks_dependencies_once() {
        let stack = ContextStack::default();
        let ctx = stack.enter(tracking(NodeId::new()));
        let (a, b) = (NodeId::new(), NodeId::new());

        assert!(stack.track_dependency(a));
        assert!(stack.track_dependency(b));
        assert!(!stack.track_dependency(a));

        let collected = ctx.exit();
        assert_eq!(collected.dependencies.as_slice(), &[a, b]);
    }

    #[test]
    fn nested_contexts() {
        let stack = ContextStack::default();
        let (id1, id2) = (NodeId::new(), NodeId::new());

        let outer = stack.enter(tracking(id1));
        stack.track_dependency(NodeId::new());
        {
            let inner = stack.enter(tracking(id2));
            assert_eq!(stack.current().reaction, Some(id2));
            stack.track_dependency(NodeId::new());
            stack.track_dependency(NodeId::new());
            assert_eq!(inner.exit().dependencies.len(), 2);
        }

        // After inner context exits, outer should be current
        assert_eq!(stack.current().reaction, Some(id1));
        assert_eq!(outer.exit().dependencies.len(), 1);
    }

    #[test]
    fn untracked_frames_do_not_record() {
        let stack = ContextStack::default();
        let _outer = stack.enter(tracking(NodeId::new()));
        let _untracked = stack.enter(Frame {
            tracking: false,
            ..stack.current()
        });

        assert!(!stack.track_dependency(NodeId::new()));
    }

    #[test]
    fn creations_inside_untracked_frames_belong_to_the_reaction() {
        let stack = ContextStack::default();
        let outer = stack.enter(tracking(NodeId::new()));
        let created = NodeId::new();
        {
            let _untracked = stack.enter(Frame {
                tracking: false,
                ..stack.current()
            });
            stack.record_created(created);
            assert!(stack.created_in_current_frame(created));
        }
        assert_eq!(outer.exit().created.as_slice(), &[created]);
    }
}
