//! Render Output Capability
//!
//! The runtime never creates markup. Render code supplied by the host builds
//! nodes and tells the runtime which range of siblings belongs to which
//! effect ([`Runtime::assign_nodes`](crate::reactive::Runtime::assign_nodes)).
//! The runtime only needs to move those ranges around:
//!
//! - park a range in an offscreen fragment while a boundary is suspended,
//! - put the fragment back in front of an anchor,
//! - remove a range when its effect is destroyed.
//!
//! Nodes are opaque [`DomNode`] tokens. [`MemoryDom`] is an in-memory tree
//! that implements [`Dom`] for tests and headless rendering.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// Opaque handle to a node owned by the host's renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomNode(pub u64);

/// Inclusive range of sibling nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRange {
    /// First node of the range.
    pub start: DomNode,
    /// Last node of the range.
    pub end: DomNode,
}

impl NodeRange {
    /// A range covering `start..=end`.
    pub fn new(start: DomNode, end: DomNode) -> Self {
        Self { start, end }
    }

    /// A range of one node.
    pub fn single(node: DomNode) -> Self {
        Self { start: node, end: node }
    }

    /// Visit every node of the range. The next sibling is read before `f`
    /// runs, so `f` may move or remove the node it is given.
    pub fn for_each(&self, dom: &dyn Dom, mut f: impl FnMut(DomNode)) {
        let mut node = Some(self.start);
        while let Some(current) = node {
            node = if current == self.end {
                None
            } else {
                dom.next_sibling(current)
            };
            f(current);
        }
    }
}

/// Operations the runtime performs on rendered output.
pub trait Dom {
    /// The sibling after `node`, if any.
    fn next_sibling(&self, node: DomNode) -> Option<DomNode>;

    /// A new, empty, detached fragment.
    fn create_fragment(&self) -> DomNode;

    /// A new invisible node used as an insertion point.
    fn create_marker(&self) -> DomNode;

    /// Move `node` to the end of `parent`. Appending a fragment moves its
    /// children instead.
    fn append(&self, parent: DomNode, node: DomNode);

    /// Move `node` in front of `anchor`. Inserting a fragment moves its
    /// children instead.
    fn insert_before(&self, anchor: DomNode, node: DomNode);

    /// Detach `node` from its parent.
    fn remove(&self, node: DomNode);
}

/// Remove every node in `range`.
pub fn remove_range(dom: &dyn Dom, range: NodeRange) {
    range.for_each(dom, |node| dom.remove(node));
}

/// A node range parked outside the visible tree.
#[derive(Debug, PartialEq, Eq)]
pub struct Offscreen {
    fragment: DomNode,
}

impl Offscreen {
    /// Move `range` into a new offscreen fragment. Node identity is kept.
    pub fn detach(dom: &dyn Dom, range: NodeRange) -> Self {
        let fragment = dom.create_fragment();
        range.for_each(dom, |node| dom.append(fragment, node));
        Self { fragment }
    }

    /// An empty offscreen fragment to render into.
    pub fn empty(dom: &dyn Dom) -> Self {
        Self {
            fragment: dom.create_fragment(),
        }
    }

    /// The fragment holding the parked nodes.
    pub fn fragment(&self) -> DomNode {
        self.fragment
    }

    /// Put the parked nodes back in front of `anchor`.
    pub fn attach_before(self, dom: &dyn Dom, anchor: DomNode) {
        dom.insert_before(anchor, self.fragment);
    }
}

// ----------------------------------------------------------------------------
// In-memory implementation
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum NodeData {
    Root,
    Fragment,
    Element { tag: String, text: String },
    Text(String),
    Comment,
}

#[derive(Debug)]
struct Entry {
    data: NodeData,
    parent: Option<DomNode>,
    children: Vec<DomNode>,
}

/// An in-memory node tree.
#[derive(Debug, Default)]
pub struct MemoryDom {
    nodes: RefCell<HashMap<DomNode, Entry>>,
    next_id: Cell<u64>,
}

impl MemoryDom {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    fn create(&self, data: NodeData) -> DomNode {
        let id = DomNode(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.nodes.borrow_mut().insert(
            id,
            Entry {
                data,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    /// A container node to render into.
    pub fn create_root(&self) -> DomNode {
        self.create(NodeData::Root)
    }

    /// An element with text content.
    pub fn create_element(&self, tag: &str, text: &str) -> DomNode {
        self.create(NodeData::Element {
            tag: tag.to_string(),
            text: text.to_string(),
        })
    }

    /// A text node.
    pub fn create_text(&self, text: &str) -> DomNode {
        self.create(NodeData::Text(text.to_string()))
    }

    /// An invisible marker node.
    pub fn create_anchor(&self) -> DomNode {
        self.create(NodeData::Comment)
    }

    /// Parent of `node`, if attached.
    pub fn parent(&self, node: DomNode) -> Option<DomNode> {
        self.nodes.borrow().get(&node).and_then(|entry| entry.parent)
    }

    /// Whether `node` is a descendant of `root`.
    pub fn contains(&self, root: DomNode, node: DomNode) -> bool {
        let mut current = self.parent(node);
        while let Some(parent) = current {
            if parent == root {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }

    /// Serialised children of `node`. Markers render as nothing.
    pub fn inner_html(&self, node: DomNode) -> String {
        let nodes = self.nodes.borrow();
        let mut out = String::new();
        if let Some(entry) = nodes.get(&node) {
            for child in &entry.children {
                Self::render(&nodes, *child, &mut out);
            }
        }
        out
    }

    fn render(nodes: &HashMap<DomNode, Entry>, node: DomNode, out: &mut String) {
        let Some(entry) = nodes.get(&node) else {
            return;
        };
        match &entry.data {
            NodeData::Element { tag, text } => {
                out.push_str(&format!("<{tag}>{text}"));
                for child in &entry.children {
                    Self::render(nodes, *child, out);
                }
                out.push_str(&format!("</{tag}>"));
            }
            NodeData::Text(text) => out.push_str(text),
            NodeData::Comment => {}
            NodeData::Root | NodeData::Fragment => {
                for child in &entry.children {
                    Self::render(nodes, *child, out);
                }
            }
        }
    }

    fn detach(nodes: &mut HashMap<DomNode, Entry>, node: DomNode) {
        let parent = nodes.get_mut(&node).and_then(|entry| entry.parent.take());
        if let Some(parent) = parent {
            if let Some(entry) = nodes.get_mut(&parent) {
                entry.children.retain(|child| *child != node);
            }
        }
    }

    /// The nodes to move when `node` is inserted: its children for a
    /// fragment, itself otherwise.
    fn movable(nodes: &HashMap<DomNode, Entry>, node: DomNode) -> Vec<DomNode> {
        match nodes.get(&node) {
            Some(entry) if matches!(entry.data, NodeData::Fragment) => entry.children.clone(),
            Some(_) => vec![node],
            None => Vec::new(),
        }
    }
}

impl Dom for MemoryDom {
    fn next_sibling(&self, node: DomNode) -> Option<DomNode> {
        let nodes = self.nodes.borrow();
        let parent = nodes.get(&node)?.parent?;
        let siblings = &nodes.get(&parent)?.children;
        let index = siblings.iter().position(|child| *child == node)?;
        siblings.get(index + 1).copied()
    }

    fn create_fragment(&self) -> DomNode {
        self.create(NodeData::Fragment)
    }

    fn create_marker(&self) -> DomNode {
        self.create_anchor()
    }

    fn append(&self, parent: DomNode, node: DomNode) {
        let mut nodes = self.nodes.borrow_mut();
        for moved in Self::movable(&nodes, node) {
            Self::detach(&mut nodes, moved);
            if let Some(entry) = nodes.get_mut(&parent) {
                entry.children.push(moved);
            }
            if let Some(entry) = nodes.get_mut(&moved) {
                entry.parent = Some(parent);
            }
        }
    }

    fn insert_before(&self, anchor: DomNode, node: DomNode) {
        let mut nodes = self.nodes.borrow_mut();
        let Some(parent) = nodes.get(&anchor).and_then(|entry| entry.parent) else {
            tracing::warn!(?anchor, "insert_before on a detached anchor");
            return;
        };
        for moved in Self::movable(&nodes, node) {
            Self::detach(&mut nodes, moved);
            if let Some(entry) = nodes.get_mut(&parent) {
                let index = entry
                    .children
                    .iter()
                    .position(|child| *child == anchor)
                    .unwrap_or(entry.children.len());
                entry.children.insert(index, moved);
            }
            if let Some(entry) = nodes.get_mut(&moved) {
                entry.parent = Some(parent);
            }
        }
    }

    fn remove(&self, node: DomNode) {
        Self::detach(&mut self.nodes.borrow_mut(), node);
    }
}
