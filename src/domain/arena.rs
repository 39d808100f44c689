//! Arena-backed registry of graph nodes keyed by identity.

use std::collections::HashMap;

use generational_arena::{Arena, Index};
use termtree::Tree;
use tracing::instrument;

use crate::domain::entities::GraphNode;

/// Node in the arena-based graph structure.
#[derive(Debug)]
pub struct TreeNode<N> {
    /// Content wrapped by this node
    pub data: N,
    /// Index of the node that discovered this one, None for the root
    pub parent: Option<Index>,
    /// Indices of all successor nodes (merge points included)
    pub children: Vec<Index>,
}

/// Arena-based registry for a discovered content graph.
///
/// Uses generational arena for memory-safe node references and O(1) lookups.
/// Nodes are reachable both by arena index and by identity.
#[derive(Debug)]
pub struct TreeArena<N> {
    arena: Arena<TreeNode<N>>,
    ids: HashMap<String, Index>,
    /// Discovery order, root first
    order: Vec<Index>,
    root: Option<Index>,
}

impl<N: GraphNode> Default for TreeArena<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: GraphNode> TreeArena<N> {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            ids: HashMap::new(),
            order: Vec::new(),
            root: None,
        }
    }

    /// Registers `data`, linking it below `parent` if given.
    /// The first parentless node becomes the root.
    #[instrument(level = "trace", skip(self, data))]
    pub fn insert_node(&mut self, data: N, parent: Option<Index>) -> Index {
        let id = data.id().to_string();
        let node = TreeNode {
            data,
            parent,
            children: Vec::new(),
        };
        let node_idx = self.arena.insert(node);
        self.ids.insert(id, node_idx);
        self.order.push(node_idx);

        match parent {
            Some(parent_idx) => {
                if let Some(parent) = self.arena.get_mut(parent_idx) {
                    parent.children.push(node_idx);
                }
            }
            None => {
                if self.root.is_none() {
                    self.root = Some(node_idx);
                }
            }
        }

        node_idx
    }

    /// Adds an edge to an already registered node.
    pub fn add_child(&mut self, parent: Index, child: Index) {
        if let Some(node) = self.arena.get_mut(parent) {
            if !node.children.contains(&child) {
                node.children.push(child);
            }
        }
    }

    pub fn get_node(&self, idx: Index) -> Option<&TreeNode<N>> {
        self.arena.get(idx)
    }

    pub fn find(&self, id: &str) -> Option<Index> {
        self.ids.get(id).copied()
    }

    pub fn get_by_id(&self, id: &str) -> Option<&N> {
        self.find(id)
            .and_then(|idx| self.arena.get(idx))
            .map(|node| &node.data)
    }

    pub fn root(&self) -> Option<Index> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Nodes in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (Index, &TreeNode<N>)> {
        self.order
            .iter()
            .filter_map(move |&idx| self.arena.get(idx).map(|node| (idx, node)))
    }
}

/// Renders an arena as a printable tree.
pub trait TreeNodeConvert {
    fn to_tree_string(&self) -> Tree<String>;
}

impl<N: GraphNode + std::fmt::Display> TreeNodeConvert for TreeArena<N> {
    fn to_tree_string(&self) -> Tree<String> {
        fn build_tree<N: GraphNode + std::fmt::Display>(
            arena: &TreeArena<N>,
            node_idx: Index,
            parent_tree: &mut Tree<String>,
        ) {
            let Some(node) = arena.get_node(node_idx) else {
                return;
            };
            for &child_idx in &node.children {
                let Some(child) = arena.get_node(child_idx) else {
                    continue;
                };
                if child.parent == Some(node_idx) {
                    let mut child_tree = Tree::new(child.data.to_string());
                    build_tree(arena, child_idx, &mut child_tree);
                    parent_tree.push(child_tree);
                } else {
                    parent_tree.push(Tree::new(format!("-> {}", child.data.id())));
                }
            }
        }

        match self.root.and_then(|idx| self.get_node(idx).map(|n| (idx, n))) {
            Some((root_idx, root)) => {
                let mut tree = Tree::new(root.data.to_string());
                build_tree(self, root_idx, &mut tree);
                tree
            }
            None => Tree::new("Empty tree".to_string()),
        }
    }
}
