//! Tree builder: breadth-first discovery of a content graph from its entry.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, instrument};

use crate::domain::arena::TreeArena;
use crate::domain::entities::GraphNode;
use crate::domain::error::{DomainError, DomainResult};

/// Result type for tree operations.
pub type TreeResult<T> = DomainResult<T>;

/// Constructs node registries by following `next_ids` from an entry node.
pub struct TreeBuilder {
    scope: String,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new("graph")
    }
}

impl TreeBuilder {
    /// `scope` names the lookup domain in errors and logs.
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    /// Discover every node reachable from `entry`.
    ///
    /// `lookup` materializes a node for an identity; a miss means the graph
    /// references content that does not exist and fails the build.
    /// Nodes are registered exactly once and expanded at most once, so cyclic
    /// content terminates.
    #[instrument(level = "debug", skip(self, entry, lookup), fields(scope = %self.scope))]
    pub fn build<N, F>(&self, entry: N, mut lookup: F) -> TreeResult<TreeArena<N>>
    where
        N: GraphNode,
        F: FnMut(&str) -> Option<N>,
    {
        let mut tree = TreeArena::new();
        let root = tree.insert_node(entry, None);
        let mut queue = VecDeque::from([root]);
        let mut visited = HashSet::new();
        let mut revisits = 0usize;

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }

            let next_ids: Vec<String> = match tree.get_node(current) {
                Some(node) => node.data.next_ids().into_iter().map(String::from).collect(),
                None => continue,
            };

            for id in next_ids {
                let child = match tree.find(&id) {
                    Some(known) => {
                        tree.add_child(current, known);
                        if visited.contains(&known) {
                            revisits += 1;
                        }
                        known
                    }
                    None => {
                        let data = lookup(&id).ok_or_else(|| DomainError::NodeNotFound {
                            id: id.clone(),
                            scope: self.scope.clone(),
                        })?;
                        tree.insert_node(data, Some(current))
                    }
                };
                if !visited.contains(&child) {
                    queue.push_back(child);
                }
            }
        }

        if revisits > 0 {
            debug!(
                "{}: {} edge(s) lead back to expanded nodes",
                self.scope, revisits
            );
        }
        debug!("{}: registered {} node(s)", self.scope, tree.len());
        Ok(tree)
    }
}
