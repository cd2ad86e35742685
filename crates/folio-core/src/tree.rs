//! Ordered document tree of a collection.
//!
//! The tree is a forest of [`TreeNode`]s. Parenthood is defined only by
//! membership in a node's `children`; there are no parent pointers. The whole
//! tree is loaded and saved as one JSON array.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};
use uuid::Uuid;

use crate::{Error, Result};

/// A document's entry in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    /// Ordered children; order is display order.
    #[serde(default)]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Create a leaf node.
    pub fn new(id: Uuid, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            url: url.into(),
            children: Vec::new(),
        }
    }

    /// Replace the children of this node.
    pub fn with_children(mut self, children: Vec<TreeNode>) -> Self {
        self.children = children;
        self
    }

    /// Ids of this node and all its descendants, pre-order.
    pub fn subtree_ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::new();
        collect_ids(std::slice::from_ref(self), &mut ids);
        ids
    }
}

/// Partial metadata update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl NodePatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            url: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.url.is_none()
    }

    fn apply(&self, node: &mut TreeNode) {
        if let Some(ref title) = self.title {
            node.title = title.clone();
        }
        if let Some(ref url) = self.url {
            node.url = url.clone();
        }
    }
}

/// The ordered document structure of one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentTree {
    roots: Vec<TreeNode>,
}

impl DocumentTree {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from existing top-level nodes.
    pub fn from_roots(roots: Vec<TreeNode>) -> Self {
        Self { roots }
    }

    /// Parse the persisted JSON form.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// The persisted JSON form.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn roots(&self) -> &[TreeNode] {
        &self.roots
    }

    pub fn into_roots(self) -> Vec<TreeNode> {
        self.roots
    }

    /// True when there are no top-level nodes.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Total number of nodes at every depth.
    pub fn len(&self) -> usize {
        fn count(nodes: &[TreeNode]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.children)).sum()
        }
        count(&self.roots)
    }

    /// All ids, pre-order.
    pub fn ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::with_capacity(self.len());
        collect_ids(&self.roots, &mut ids);
        ids
    }

    /// Find a node anywhere in the tree (depth-first, pre-order).
    pub fn find(&self, id: Uuid) -> Option<&TreeNode> {
        find_in(&self.roots, id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.find(id).is_some()
    }

    /// Parent id (`None` for a root) and index of a node among its siblings.
    pub fn locate(&self, id: Uuid) -> Option<(Option<Uuid>, usize)> {
        locate_in(&self.roots, None, id)
    }

    /// Insert `node` under `parent_id` (or at root level) at `position`.
    ///
    /// A missing position appends; a position past the end is clamped to it.
    /// When `parent_id` is not in the tree nothing changes and `false` is
    /// returned: callers are expected to have validated the parent first.
    pub fn insert(
        &mut self,
        node: TreeNode,
        parent_id: Option<Uuid>,
        position: Option<usize>,
    ) -> bool {
        let node_id = node.id;
        match parent_id {
            None => {
                splice(&mut self.roots, node, position);
                trace!(document_id = %node_id, "Inserted at root level");
                true
            }
            Some(parent_id) => match place(&mut self.roots, parent_id, node, position) {
                Ok(()) => {
                    trace!(document_id = %node_id, parent_id = %parent_id, "Inserted under parent");
                    true
                }
                Err(_) => {
                    warn!(
                        subsystem = "structure",
                        component = "tree",
                        op = "insert",
                        document_id = %node_id,
                        parent_id = %parent_id,
                        "Parent not in structure, insert dropped"
                    );
                    false
                }
            },
        }
    }

    /// Overwrite the metadata of the first node (pre-order) with `id`.
    ///
    /// Children and tree shape are never touched. Returns `false` when no
    /// node matches.
    pub fn update(&mut self, id: Uuid, patch: &NodePatch) -> bool {
        match find_in_mut(&mut self.roots, id) {
            Some(node) => {
                patch.apply(node);
                true
            }
            None => false,
        }
    }

    /// Detach the node with `id`, together with its subtree.
    ///
    /// Every level is visited: children are processed before the level
    /// itself is searched, so the whole tree is traversed on each call.
    pub fn remove(&mut self, id: Uuid) -> Option<TreeNode> {
        let mut removed = None;
        remove_from_level(&mut self.roots, id, &mut removed);
        removed
    }

    /// Check the forest invariant: every id occurs once.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for id in self.ids() {
            if !seen.insert(id) {
                return Err(Error::InvalidInput(format!(
                    "duplicate document {} in structure",
                    id
                )));
            }
        }
        Ok(())
    }
}

fn splice(list: &mut Vec<TreeNode>, node: TreeNode, position: Option<usize>) {
    let at = position.map_or(list.len(), |p| p.min(list.len()));
    list.insert(at, node);
}

// Hands the node back when the parent is missing so the caller can report it.
fn place(
    nodes: &mut [TreeNode],
    parent_id: Uuid,
    node: TreeNode,
    position: Option<usize>,
) -> std::result::Result<(), TreeNode> {
    let mut node = node;
    for candidate in nodes.iter_mut() {
        if candidate.id == parent_id {
            splice(&mut candidate.children, node, position);
            return Ok(());
        }
        match place(&mut candidate.children, parent_id, node, position) {
            Ok(()) => return Ok(()),
            Err(returned) => node = returned,
        }
    }
    Err(node)
}

fn remove_from_level(level: &mut Vec<TreeNode>, id: Uuid, removed: &mut Option<TreeNode>) {
    for child in level.iter_mut() {
        remove_from_level(&mut child.children, id, removed);
    }
    if let Some(pos) = level.iter().position(|n| n.id == id) {
        let node = level.remove(pos);
        if removed.is_none() {
            *removed = Some(node);
        }
    }
}

fn find_in(nodes: &[TreeNode], id: Uuid) -> Option<&TreeNode> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_in(&node.children, id) {
            return Some(found);
        }
    }
    None
}

fn find_in_mut(nodes: &mut [TreeNode], id: Uuid) -> Option<&mut TreeNode> {
    for node in nodes.iter_mut() {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_in_mut(&mut node.children, id) {
            return Some(found);
        }
    }
    None
}

fn locate_in(nodes: &[TreeNode], parent: Option<Uuid>, id: Uuid) -> Option<(Option<Uuid>, usize)> {
    for (index, node) in nodes.iter().enumerate() {
        if node.id == id {
            return Some((parent, index));
        }
        if let Some(found) = locate_in(&node.children, Some(node.id), id) {
            return Some(found);
        }
    }
    None
}

fn collect_ids(nodes: &[TreeNode], out: &mut Vec<Uuid>) {
    for node in nodes {
        out.push(node.id);
        collect_ids(&node.children, out);
    }
}
