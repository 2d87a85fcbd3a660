//! Column trees: insertion, merging and nearest-match traversal.
//!
//! A [`ColumnTree`] is a binary tree whose branching is decided by cosine
//! angles rather than key order. At every node the new vector is scored
//! against the node's vector:
//!
//! ```text
//!   angle >= identical_angle   same token: merge postings, stop
//!   angle >  fold_angle        go left  (attach if the slot is empty)
//!   otherwise                  go right (attach if the slot is empty)
//! ```
//!
//! There is no rebalancing; the shape follows insertion order.
//!
//! # Arena layout
//!
//! Nodes live in an append-only arena and refer to each other by
//! [`NodeId`]. Slot 0 is the empty-root sentinel: it has no vector, scores
//! 0 against everything and therefore only ever has one child.
//!
//! # Thread Safety
//!
//! Any number of threads may call [`ColumnTree::insert`] concurrently.
//! Claiming an empty child slot is double-checked under the parent's lock,
//! and merges lock their target. Subtree weights are atomic counters.
//! Traversal concurrent with insertion may observe a partially grown tree.

pub mod codec;
mod node;

pub use node::{IndexNode, NodeId, Postings, Side};

use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::{FoldTreeError, NotFoundError, Result};
use crate::model::SimilarityModel;
use crate::vector::SparseVector;

/// Result of [`ColumnTree::insert`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The vector was identical to an existing node and its postings were
    /// folded into that node.
    Merged(NodeId),
    /// A new leaf was attached.
    Added(NodeId),
}

impl InsertOutcome {
    /// Returns true for [`InsertOutcome::Merged`].
    pub fn is_merge(&self) -> bool {
        matches!(self, InsertOutcome::Merged(_))
    }

    /// The node that now carries the postings.
    pub fn node(&self) -> NodeId {
        match self {
            InsertOutcome::Merged(id) | InsertOutcome::Added(id) => *id,
        }
    }
}

/// Best node found by a single-path descent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeHit {
    /// Node with the highest score seen on the path.
    pub node: NodeId,
    /// Its cosine angle to the query.
    pub score: f64,
}

/// One in-memory tree per indexed column.
#[derive(Debug)]
pub struct ColumnTree {
    nodes: RwLock<Vec<Arc<IndexNode>>>,
    /// Real nodes pushed so far, readable without the arena lock.
    count: AtomicUsize,
}

impl Default for ColumnTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnTree {
    /// Creates a tree holding only the empty-root sentinel.
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(vec![Arc::new(IndexNode::sentinel())]),
            count: AtomicUsize::new(0),
        }
    }

    /// Returns the node with the given id.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError::Node` for an id this tree never issued.
    pub fn node(&self, id: NodeId) -> Result<Arc<IndexNode>> {
        let nodes = self
            .nodes
            .read()
            .map_err(|_| FoldTreeError::LockPoisoned("column tree"))?;
        nodes
            .get(id.0)
            .cloned()
            .ok_or_else(|| NotFoundError::node(id.0).into())
    }

    /// Number of real nodes (the sentinel is not counted).
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Returns true if nothing has been inserted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Root of the stored tree, i.e. the sentinel's only child.
    pub fn root(&self) -> Result<Option<NodeId>> {
        let sentinel = self.node(NodeId::ROOT)?;
        Ok(sentinel.left().or(sentinel.right()))
    }

    /// Total weight of the stored tree (sentinel excluded).
    pub fn weight(&self) -> Result<u32> {
        Ok(self.node(NodeId::ROOT)?.weight() - 1)
    }

    /// Inserts a vector, merging it into an identical node if one lies on
    /// its descent path.
    ///
    /// # Errors
    ///
    /// Returns `MergeAfterFlush` when the identical node's postings were
    /// already written and `postings` is still pending.
    pub fn insert(
        &self,
        vector: SparseVector,
        postings: Postings,
        model: &dyn SimilarityModel,
    ) -> Result<InsertOutcome> {
        let identical = model.identical_angle();
        let fold = model.fold_angle();
        let mut cursor = NodeId::ROOT;

        loop {
            let node = self.node(cursor)?;
            let angle = Self::score(&node, &vector, model);

            if node.vector().is_some() && angle >= identical {
                node.lock()?.postings.merge(postings, cursor.0)?;
                return Ok(InsertOutcome::Merged(cursor));
            }

            let side = Side::for_angle(angle, fold);
            let claim = Self::claim_or_follow(&node, side)?;
            match claim {
                Claim::Follow(next) => cursor = next,
                Claim::Locked(guard) => {
                    let id = self.attach(cursor, &node, side, vector, postings, angle, guard)?;
                    return Ok(InsertOutcome::Added(id));
                }
            };
        }
    }

    /// Adds a vector only if no identical node exists on its path.
    ///
    /// Returns true if a node was added.
    pub fn put(
        &self,
        vector: SparseVector,
        postings: Postings,
        model: &dyn SimilarityModel,
    ) -> Result<bool> {
        let identical = model.identical_angle();
        let fold = model.fold_angle();
        let mut cursor = NodeId::ROOT;

        loop {
            let node = self.node(cursor)?;
            let angle = Self::score(&node, &vector, model);

            if node.vector().is_some() && angle >= identical {
                return Ok(false);
            }

            let side = Side::for_angle(angle, fold);
            let claim = Self::claim_or_follow(&node, side)?;
            match claim {
                Claim::Follow(next) => cursor = next,
                Claim::Locked(guard) => {
                    self.attach(cursor, &node, side, vector, postings, angle, guard)?;
                    return Ok(true);
                }
            };
        }
    }

    /// Follows an occupied slot, or locks the node when the slot is empty
    /// and still empty after locking.
    fn claim_or_follow(node: &IndexNode, side: Side) -> Result<Claim<'_>> {
        if let Some(next) = node.child(side) {
            return Ok(Claim::Follow(next));
        }
        let guard = node.lock()?;
        match node.child(side) {
            // another producer won the slot while we waited
            Some(next) => Ok(Claim::Follow(next)),
            None => Ok(Claim::Locked(guard)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn attach(
        &self,
        parent: NodeId,
        parent_node: &IndexNode,
        side: Side,
        vector: SparseVector,
        postings: Postings,
        angle: f64,
        guard: std::sync::MutexGuard<'_, node::NodeState>,
    ) -> Result<NodeId> {
        let leaf = IndexNode::leaf(vector, postings);
        leaf.set_angle(angle);
        leaf.set_ancestor(parent);
        let id = self.push(leaf)?;
        parent_node.slot(side).store(id.0, Ordering::Release);
        drop(guard);

        self.propagate_weight(parent, 1)?;
        Ok(id)
    }

    /// Attaches a node decoded from a page without touching ancestor
    /// weights (the record already carries the subtree weight).
    pub(crate) fn attach_decoded(
        &self,
        parent: NodeId,
        side: Side,
        node: IndexNode,
        model: &dyn SimilarityModel,
    ) -> Result<NodeId> {
        let parent_node = self.node(parent)?;
        if parent_node.child(side).is_some() {
            return Err(crate::error::StorageError::corrupted(format!(
                "node {} already has a {:?} child",
                parent.0, side
            ))
            .into());
        }
        node.set_ancestor(parent);
        if let (Some(p), Some(v)) = (parent_node.vector(), node.vector()) {
            node.set_angle(model.cos_angle(p, v));
        }
        let id = self.push(node)?;
        parent_node.slot(side).store(id.0, Ordering::Release);
        Ok(id)
    }

    fn push(&self, node: IndexNode) -> Result<NodeId> {
        let mut nodes = self
            .nodes
            .write()
            .map_err(|_| FoldTreeError::LockPoisoned("column tree"))?;
        nodes.push(Arc::new(node));
        self.count.fetch_add(1, Ordering::Release);
        Ok(NodeId(nodes.len() - 1))
    }

    /// Adds `delta` to `from` and every node above it.
    fn propagate_weight(&self, from: NodeId, delta: u32) -> Result<()> {
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            let node = self.node(id)?;
            node.add_weight(delta);
            cursor = node.ancestor();
        }
        Ok(())
    }

    /// Sets the sentinel's weight to cover a decoded page root.
    pub(crate) fn adopt_root_weight(&self, weight: u32) -> Result<()> {
        self.node(NodeId::ROOT)?.add_weight(weight);
        Ok(())
    }

    fn score(node: &IndexNode, vector: &SparseVector, model: &dyn SimilarityModel) -> f64 {
        node.vector()
            .map_or(0.0, |existing| model.cos_angle(vector, existing))
    }

    /// Greedy single-path nearest match.
    ///
    /// The best score seen at any node of the path wins, not only the
    /// leaf's. Returns `None` if no node scores above 0.
    pub fn closest_match(
        &self,
        query: &SparseVector,
        model: &dyn SimilarityModel,
    ) -> Result<Option<TreeHit>> {
        let fold = model.fold_angle();
        let mut best = NodeId::ROOT;
        let mut highscore = 0.0f64;
        let mut cursor = Some(NodeId::ROOT);

        while let Some(id) = cursor {
            let node = self.node(id)?;
            let angle = Self::score(&node, query, model);
            if angle > highscore {
                highscore = angle;
                best = id;
            }
            cursor = node.child(Side::for_angle(angle, fold));
        }

        if best == NodeId::ROOT {
            return Ok(None);
        }
        Ok(Some(TreeHit {
            node: best,
            score: highscore,
        }))
    }

    /// Ids of all real nodes in depth-first preorder (node, left, right).
    pub fn preorder(&self) -> Result<Vec<NodeId>> {
        let mut out = Vec::with_capacity(self.len());
        let mut stack = Vec::new();
        let mut cursor = self.root()?;

        while let Some(id) = cursor {
            out.push(id);
            let node = self.node(id)?;
            if let Some(right) = node.right() {
                stack.push(right);
            }
            cursor = node.left().or_else(|| stack.pop());
        }
        Ok(out)
    }

    /// Checks `weight == 1 + weight(left) + weight(right)` at every node,
    /// the sentinel included.
    pub fn check_weights(&self) -> Result<bool> {
        let nodes = self
            .nodes
            .read()
            .map_err(|_| FoldTreeError::LockPoisoned("column tree"))?;
        let weight_of = |slot: Option<NodeId>| slot.map_or(0, |id| nodes[id.0].weight());
        Ok(nodes
            .iter()
            .all(|node| node.weight() == 1 + weight_of(node.left()) + weight_of(node.right())))
    }

    /// Longest root-to-leaf path, counted in nodes.
    pub fn depth(&self) -> Result<usize> {
        let mut deepest = 0;
        let mut stack: Vec<(NodeId, usize)> = self.root()?.map(|r| (r, 1)).into_iter().collect();
        while let Some((id, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            let node = self.node(id)?;
            for child in [node.left(), node.right()].into_iter().flatten() {
                stack.push((child, depth + 1));
            }
        }
        Ok(deepest)
    }

    /// Indented dump: left children one level deeper, right children at
    /// the same level as their parent.
    pub fn visualize(&self) -> Result<String> {
        let mut out = String::new();
        let mut stack: Vec<(NodeId, usize)> = self.root()?.map(|r| (r, 0)).into_iter().collect();
        while let Some((id, depth)) = stack.pop() {
            let node = self.node(id)?;
            let label = node.vector().map(ToString::to_string).unwrap_or_default();
            let _ = writeln!(out, "{}.{} ({:.4})", "\t".repeat(depth), label, node.angle());
            if let Some(right) = node.right() {
                stack.push((right, depth));
            }
            if let Some(left) = node.left() {
                stack.push((left, depth + 1));
            }
        }
        Ok(out)
    }
}

enum Claim<'a> {
    Follow(NodeId),
    Locked(std::sync::MutexGuard<'a, node::NodeState>),
}
