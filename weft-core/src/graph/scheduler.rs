//! Update Scheduler
//!
//! The scheduler holds the run queue of dirty effects and decides the order
//! in which one flush pass processes them.
//!
//! # Algorithm
//!
//! 1. Propagation hands every effect that became dirty to [`schedule`].
//!    The queue is a set: an effect queued twice runs once.
//! 2. A flush pass takes the whole queue as one batch.
//! 3. The batch is ordered:
//!    - render-phase effects (render, block, branch, boundary, root) before
//!      user effects,
//!    - within each phase, shallower effects before deeper ones, so a parent
//!      that re-runs (and possibly destroys its children) goes first,
//!    - ties keep queue order.
//! 4. Effects scheduled while the batch runs land in the next batch.
//!
//! [`schedule`]: UpdateScheduler::schedule

use indexmap::IndexSet;

use super::{Graph, NodeId};

/// The run queue of dirty effects.
#[derive(Debug, Default)]
pub struct UpdateScheduler {
    queue: IndexSet<NodeId>,
}

impl UpdateScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an effect. Returns `false` if it was already queued.
    pub fn schedule(&mut self, effect: NodeId) -> bool {
        self.queue.insert(effect)
    }

    /// Forget a queued effect.
    pub fn unschedule(&mut self, effect: NodeId) {
        self.queue.shift_remove(&effect);
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of queued effects.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Take every queued effect, ordered for execution.
    ///
    /// Effects no longer present in the graph are dropped.
    pub fn take_batch(&mut self, graph: &Graph) -> Vec<NodeId> {
        let queued = std::mem::take(&mut self.queue);

        let mut batch: Vec<(u8, u32, usize, NodeId)> = queued
            .into_iter()
            .enumerate()
            .filter_map(|(position, id)| {
                let node = graph.get(id)?;
                let phase = match node.effect_kind() {
                    Some(kind) if kind.is_render_phase() => 0,
                    Some(_) => 1,
                    None => return None,
                };
                Some((phase, node.depth, position, id))
            })
            .collect();

        batch.sort_unstable();
        batch.into_iter().map(|(_, _, _, id)| id).collect()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
