//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//! Signals, deriveds and effects all share one [`Node`] record; the
//! [`NodeKind`] decides which fields are meaningful.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use smallvec::SmallVec;

use crate::boundary::BoundaryCell;
use crate::dom::NodeRange;
use crate::error::{ReactiveError, Result};

/// A type-erased signal value.
pub type Value = Rc<dyn Any>;

/// Type-erased equality check between an old and a new value.
pub(crate) type EqualsFn = Rc<dyn Fn(&dyn Any, &dyn Any) -> bool>;

/// Type-erased derived computation.
pub(crate) type ComputeFn = Rc<RefCell<dyn FnMut() -> Result<Value>>>;

/// Type-erased effect body.
pub(crate) type RunFn = Rc<RefCell<dyn FnMut() -> Result<()>>>;

/// Teardown registered by an effect run.
pub(crate) type Teardown = Box<dyn FnOnce()>;

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// The kind of effect, mirroring the nesting of rendered regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    /// A user side effect. Runs after render-phase effects.
    User,
    /// Updates rendered output in place.
    Render,
    /// Controls which branches exist (if/each/key blocks).
    Block,
    /// A region owned by a block; survives its block's re-runs.
    Branch,
    /// Top of an effect tree.
    Root,
    /// A block that owns pending/main/failed branches.
    Boundary,
}

impl EffectKind {
    /// Whether this effect belongs to the render phase of a flush.
    pub fn is_render_phase(&self) -> bool {
        !matches!(self, Self::User)
    }

    /// Whether writes from inside this effect are rejected in strict mode.
    pub fn is_block(&self) -> bool {
        matches!(self, Self::Block | Self::Boundary)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A state cell. Has dependents, no dependencies.
    Source,

    /// A derived value. Has dependencies and may have dependents.
    /// It caches its computed value.
    Derived,

    /// An effect. Has dependencies but no dependents.
    Effect(EffectKind),
}

/// Dirty state of a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The cached result is up-to-date.
    Clean,

    /// A dependency might have changed; verify before recomputing.
    MaybeDirty,

    /// The reaction definitely needs to run again.
    Dirty,

    /// The reaction has been torn down.
    Destroyed,
}

/// A node in the dependency graph.
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) status: Status,

    /// Paused effects are skipped by the scheduler.
    pub(crate) inert: bool,

    pub(crate) value: Option<Value>,
    /// Failure of a derived's last computation, handed to every reader
    /// until a dependency changes.
    pub(crate) error: Option<ReactiveError>,
    pub(crate) equals: Option<EqualsFn>,

    /// Clock value of the last successful write (or change of a derived).
    pub(crate) write_version: u64,
    /// Clock value at which this reaction last ran or was verified clean.
    pub(crate) verified_version: u64,

    /// Reactions that read this node, in subscription order.
    pub(crate) dependents: IndexSet<NodeId>,
    /// Nodes this reaction read during its last run.
    pub(crate) dependencies: SmallVec<[NodeId; 4]>,

    pub(crate) compute: Option<ComputeFn>,
    pub(crate) run: Option<RunFn>,

    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) depth: u32,

    /// Signals and deriveds created during the last run. They are removed
    /// before the next run and when this node goes away.
    pub(crate) owned: SmallVec<[NodeId; 2]>,

    pub(crate) nodes: Option<NodeRange>,
    pub(crate) teardowns: Vec<Teardown>,
    pub(crate) boundary: Option<Rc<BoundaryCell>>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            status: match kind {
                NodeKind::Source => Status::Clean,
                // Start dirty to ensure first computation
                NodeKind::Derived | NodeKind::Effect(_) => Status::Dirty,
            },
            inert: false,
            value: None,
            error: None,
            equals: None,
            write_version: 0,
            verified_version: 0,
            dependents: IndexSet::new(),
            dependencies: SmallVec::new(),
            compute: None,
            run: None,
            parent: None,
            children: Vec::new(),
            depth: 0,
            owned: SmallVec::new(),
            nodes: None,
            teardowns: Vec::new(),
            boundary: None,
        }
    }

    /// Create a state cell holding `value`.
    pub(crate) fn source(value: Value, equals: EqualsFn) -> Self {
        let mut node = Self::new(NodeKind::Source);
        node.value = Some(value);
        node.equals = Some(equals);
        node
    }

    /// Create a derived node. It holds no value until first read.
    pub(crate) fn derived(compute: ComputeFn, equals: EqualsFn) -> Self {
        let mut node = Self::new(NodeKind::Derived);
        node.compute = Some(compute);
        node.equals = Some(equals);
        node
    }

    /// Create an effect node.
    pub(crate) fn effect(kind: EffectKind, run: RunFn) -> Self {
        let mut node = Self::new(NodeKind::Effect(kind));
        node.run = Some(run);
        node
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Effect kind, if this node is an effect.
    pub fn effect_kind(&self) -> Option<EffectKind> {
        match self.kind {
            NodeKind::Effect(kind) => Some(kind),
            _ => None,
        }
    }

    /// Get the current dirty state.
    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_derived(&self) -> bool {
        self.kind == NodeKind::Derived
    }

    pub fn is_effect(&self) -> bool {
        matches!(self.kind, NodeKind::Effect(_))
    }

    pub fn is_boundary(&self) -> bool {
        self.kind == NodeKind::Effect(EffectKind::Boundary)
    }

    pub fn is_clean(&self) -> bool {
        self.status == Status::Clean
    }

    pub fn is_dirty(&self) -> bool {
        self.status == Status::Dirty
    }

    pub fn is_maybe_dirty(&self) -> bool {
        self.status == Status::MaybeDirty
    }

    pub fn is_destroyed(&self) -> bool {
        self.status == Status::Destroyed
    }

    /// Mark the node as clean.
    pub fn mark_clean(&mut self) {
        if !self.is_destroyed() {
            self.status = Status::Clean;
        }
    }

    /// Mark the node as maybe dirty (a dependency might have changed).
    pub fn mark_maybe_dirty(&mut self) {
        if self.is_clean() {
            self.status = Status::MaybeDirty;
        }
    }

    /// Mark the node as definitely dirty (needs recomputation).
    pub fn mark_dirty(&mut self) {
        if !self.is_destroyed() {
            self.status = Status::Dirty;
        }
    }

    /// Mark with the given propagation status. Destroyed nodes stay
    /// destroyed and dirty nodes are never downgraded.
    pub fn mark(&mut self, status: Status) {
        match status {
            Status::Dirty => self.mark_dirty(),
            Status::MaybeDirty => self.mark_maybe_dirty(),
            Status::Clean => self.mark_clean(),
            Status::Destroyed => self.status = Status::Destroyed,
        }
    }

    /// Nodes this node reads from.
    pub fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }

    /// Nodes that read from this node, in subscription order.
    pub fn dependents(&self) -> &IndexSet<NodeId> {
        &self.dependents
    }

    /// Write version of this node.
    pub fn write_version(&self) -> u64 {
        self.write_version
    }

    /// The error a derived's last computation failed with.
    pub fn error(&self) -> Option<&ReactiveError> {
        self.error.as_ref()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("write_version", &self.write_version)
            .field("dependencies", &self.dependencies)
            .field("dependents", &self.dependents)
            .field("parent", &self.parent)
            .finish()
    }
}
