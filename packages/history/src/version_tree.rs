//! # Version Tree
//!
//! Append-only store of every action ever recorded. Nodes are indexed by their version
//! id, so lookup is a plain slice access.
//!
//! ```text
//!        0 ── 1 ── 4          next_id(1) = 4
//!              \
//!               2 ── 3        old_next_ids(1) = [2]
//! ```

use serde::{Deserialize, Serialize};

use crate::action::{Action, VersionId};
use crate::errors::{HistoryError, HistoryResult};

/// A new edit diverged from the continuation redo used to lead to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchCreated {
    /// Version the branch leaves from
    pub at: VersionId,
    pub new_next_id: VersionId,
    pub previous_next_id: VersionId,
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    action: Action,
    prev_id: Option<VersionId>,
    next_id: Option<VersionId>,
    old_next_ids: Vec<VersionId>,
}

impl TreeNode {
    fn new(action: Action, prev_id: Option<VersionId>) -> Self {
        Self {
            action,
            prev_id,
            next_id: None,
            old_next_ids: Vec::new(),
        }
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn version_id(&self) -> VersionId {
        self.action.version_id()
    }

    pub fn prev_id(&self) -> Option<VersionId> {
        self.prev_id
    }

    /// Where redo currently leads
    pub fn next_id(&self) -> Option<VersionId> {
        self.next_id
    }

    /// Earlier continuations, oldest first
    pub fn old_next_ids(&self) -> &[VersionId] {
        &self.old_next_ids
    }

    /// Make `next` the forward continuation and return the continuation it displaced
    fn set_next_id(&mut self, next: VersionId) -> Option<VersionId> {
        let previous = self.next_id.replace(next);
        self.old_next_ids.retain(|id| *id != next);
        match previous {
            Some(previous) if previous != next => {
                self.old_next_ids.push(previous);
                Some(previous)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VersionTree {
    nodes: Vec<TreeNode>,
}

impl VersionTree {
    /// A tree holding only the sentinel at version 0
    pub fn new() -> Self {
        Self {
            nodes: vec![TreeNode::new(Action::sentinel(), None)],
        }
    }

    /// Store `action` as the successor of `prev`.
    ///
    /// Returns the new version id and, when `prev` already had a different
    /// continuation, the branch that was created.
    pub fn append(
        &mut self,
        mut action: Action,
        prev: VersionId,
    ) -> HistoryResult<(VersionId, Option<BranchCreated>)> {
        if prev >= self.nodes.len() {
            return Err(HistoryError::UnknownVersion(prev));
        }
        let id = self.nodes.len();
        action.set_version_id(id);
        self.nodes.push(TreeNode::new(action, Some(prev)));

        let branch = self.nodes[prev]
            .set_next_id(id)
            .map(|previous_next_id| BranchCreated {
                at: prev,
                new_next_id: id,
                previous_next_id,
            });
        Ok((id, branch))
    }

    pub fn get(&self, id: VersionId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn node(&self, id: VersionId) -> HistoryResult<&TreeNode> {
        self.nodes.get(id).ok_or(HistoryError::UnknownVersion(id))
    }

    pub(crate) fn action_mut(&mut self, id: VersionId) -> Option<&mut Action> {
        self.nodes.get_mut(id).map(|node| &mut node.action)
    }

    /// Point `at`'s forward continuation to its child `next`
    pub(crate) fn switch_next(&mut self, at: VersionId, next: VersionId) -> HistoryResult<()> {
        if self.node(next)?.prev_id != Some(at) {
            return Err(HistoryError::TreeInconsistent(format!(
                "version {} is not a successor of {}",
                next, at
            )));
        }
        self.nodes[at].set_next_id(next);
        Ok(())
    }

    /// `id` followed by its predecessors up to the root
    pub fn ancestors(&self, id: VersionId) -> HistoryResult<Vec<VersionId>> {
        let mut chain = vec![id];
        let mut current = self.node(id)?;
        while let Some(prev) = current.prev_id {
            if chain.len() > self.nodes.len() {
                return Err(HistoryError::TreeInconsistent(format!(
                    "prev chain of version {} does not terminate",
                    id
                )));
            }
            chain.push(prev);
            current = self.node(prev)?;
        }
        Ok(chain)
    }

    /// Versions redo would walk through after `id`, in order
    pub fn forward_chain(&self, id: VersionId) -> HistoryResult<Vec<VersionId>> {
        let mut chain = Vec::new();
        let mut current = self.node(id)?;
        while let Some(next) = current.next_id {
            if chain.len() >= self.nodes.len() {
                return Err(HistoryError::TreeInconsistent(format!(
                    "next chain of version {} does not terminate",
                    id
                )));
            }
            chain.push(next);
            current = self.node(next)?;
        }
        Ok(chain)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; the sentinel is never removed
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Verify the arborescence: a single root, predecessors older than their successors,
    /// and forward links that agree with the predecessor links
    pub fn check(&self) -> HistoryResult<()> {
        for (id, node) in self.nodes.iter().enumerate() {
            if node.version_id() != id {
                return Err(HistoryError::TreeInconsistent(format!(
                    "node {} holds version {}",
                    id,
                    node.version_id()
                )));
            }
            match node.prev_id {
                None if id != 0 => {
                    return Err(HistoryError::TreeInconsistent(format!(
                        "version {} has no predecessor",
                        id
                    )))
                }
                Some(prev) if prev >= id => {
                    return Err(HistoryError::TreeInconsistent(format!(
                        "version {} points back to {}",
                        id, prev
                    )))
                }
                _ => {}
            }
            if let Some(next) = node.next_id {
                if node.old_next_ids.contains(&next) {
                    return Err(HistoryError::TreeInconsistent(format!(
                        "version {} lists its next {} as old",
                        id, next
                    )));
                }
            }
            for child in node.next_id.iter().chain(node.old_next_ids.iter()) {
                if self.node(*child)?.prev_id != Some(id) {
                    return Err(HistoryError::TreeInconsistent(format!(
                        "version {} is linked from {} but not its successor",
                        child, id
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for VersionTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tree_has_sentinel() {
        let tree = VersionTree::new();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.node(0).unwrap().prev_id(), None);
        assert!(tree.check().is_ok());
    }

    #[test]
    fn test_append_records_branch() {
        let mut tree = VersionTree::new();
        let (first, branch) = tree.append(Action::sentinel(), 0).unwrap();
        assert_eq!(first, 1);
        assert!(branch.is_none());

        let (second, branch) = tree.append(Action::sentinel(), 0).unwrap();
        assert_eq!(
            branch,
            Some(BranchCreated {
                at: 0,
                new_next_id: second,
                previous_next_id: first,
            })
        );

        let root = tree.node(0).unwrap();
        assert_eq!(root.next_id(), Some(second));
        assert_eq!(root.old_next_ids(), &[first]);
        assert!(tree.check().is_ok());
    }

    #[test]
    fn test_switch_next_restores_old_continuation() {
        let mut tree = VersionTree::new();
        let (first, _) = tree.append(Action::sentinel(), 0).unwrap();
        let (second, _) = tree.append(Action::sentinel(), 0).unwrap();

        tree.switch_next(0, first).unwrap();

        let root = tree.node(0).unwrap();
        assert_eq!(root.next_id(), Some(first));
        assert_eq!(root.old_next_ids(), &[second]);
        assert!(tree.switch_next(first, second).is_err());
    }

    #[test]
    fn test_ancestors_and_forward_chain() {
        let mut tree = VersionTree::new();
        let (a, _) = tree.append(Action::sentinel(), 0).unwrap();
        let (b, _) = tree.append(Action::sentinel(), a).unwrap();
        let (c, _) = tree.append(Action::sentinel(), b).unwrap();

        assert_eq!(tree.ancestors(c).unwrap(), vec![c, b, a, 0]);
        assert_eq!(tree.forward_chain(a).unwrap(), vec![b, c]);
        assert!(tree.forward_chain(c).unwrap().is_empty());
        assert!(matches!(tree.ancestors(99), Err(HistoryError::UnknownVersion(99))));
    }

    #[test]
    fn test_append_to_unknown_version() {
        let mut tree = VersionTree::new();
        assert!(tree.append(Action::sentinel(), 5).is_err());
        assert_eq!(tree.len(), 1);
    }
}
