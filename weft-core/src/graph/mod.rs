//! Dependency Graph
//!
//! This module implements the graph that tracks relationships between
//! reactive values and computations.
//!
//! # Overview
//!
//! - Nodes represent state cells (sources), derived values and effects.
//! - Edges represent dependencies: if A reads B, B lists A as a dependent
//!   and A lists B as a dependency.
//! - Effects additionally form an ownership tree through `parent`/`children`
//!   that mirrors the nesting of rendered regions.
//!
//! # Design Decisions
//!
//! 1. The graph is a centralized table owned by one runtime. Tearing a
//!    runtime down is a single `clear`.
//!
//! 2. Nodes are indexed by [`NodeId`] for O(1) lookups.
//!
//! 3. Both directions of every edge are stored. Dependents are kept in an
//!    insertion-ordered set so notification order is stable.

mod node;
mod scheduler;

use std::collections::HashMap;

pub use node::{EffectKind, Node, NodeId, NodeKind, Status, Value};
pub(crate) use node::{ComputeFn, EqualsFn, RunFn, Teardown};
pub use scheduler::UpdateScheduler;

/// The node table.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: HashMap<NodeId, Node>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = NodeId::new();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&node_id)?;

        // Remove this node from its dependencies' dependent lists
        for dep_id in node.dependencies() {
            if let Some(dep) = self.nodes.get_mut(dep_id) {
                dep.dependents.shift_remove(&node_id);
            }
        }

        // Remove this node from its dependents' dependency lists
        for dependent_id in node.dependents() {
            if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                dependent.dependencies.retain(|dep| *dep != node_id);
            }
        }

        Some(node)
    }

    /// Get a reference to a node.
    pub fn get(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable reference to a node.
    pub fn get_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Whether the node exists and has not been destroyed.
    pub fn is_live(&self, node_id: NodeId) -> bool {
        self.nodes
            .get(&node_id)
            .map(|node| !node.is_destroyed())
            .unwrap_or(false)
    }

    /// Add a dependency edge: `dependent` reads `dependency`.
    pub fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.dependents.insert(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            if !dependent_node.dependencies.contains(&dependency) {
                dependent_node.dependencies.push(dependency);
            }
        }
    }

    /// Replace every dependency of `reaction` with `dependencies`.
    ///
    /// Dependencies are replaced wholesale after each run; stale edges are
    /// dropped and new ones installed in read order.
    pub fn replace_dependencies(&mut self, reaction: NodeId, dependencies: &[NodeId]) {
        let old = match self.nodes.get_mut(&reaction) {
            Some(node) => std::mem::take(&mut node.dependencies),
            None => return,
        };

        for dep in old.iter().filter(|dep| !dependencies.contains(dep)) {
            if let Some(dep_node) = self.nodes.get_mut(dep) {
                dep_node.dependents.shift_remove(&reaction);
            }
        }

        for dep in dependencies {
            self.add_edge(*dep, reaction);
        }
    }

    /// Attach `child` to `parent` in the ownership tree.
    pub fn adopt(&mut self, parent: NodeId, child: NodeId) {
        let depth = match self.nodes.get_mut(&parent) {
            Some(parent_node) => {
                parent_node.children.push(child);
                parent_node.depth + 1
            }
            None => return,
        };
        if let Some(child_node) = self.nodes.get_mut(&child) {
            child_node.parent = Some(parent);
            child_node.depth = depth;
        }
    }

    /// Ancestors of `node_id`, nearest first, including the node itself.
    pub fn ancestors(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = Some(node_id);
        while let Some(id) = current {
            match self.nodes.get(&id) {
                Some(node) => {
                    chain.push(id);
                    current = node.parent;
                }
                None => break,
            }
        }
        chain
    }

    /// Ids of every node, in no particular order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    /// Drop every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
