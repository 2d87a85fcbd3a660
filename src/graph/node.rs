//! Arena nodes of a column tree.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::{FoldTreeError, Result};
use crate::types::DocId;
use crate::vector::SparseVector;

/// Sentinel stored in an empty child or ancestor slot.
pub(crate) const EMPTY: usize = usize::MAX;

/// Index of a node in its tree's arena.
///
/// Ids are only meaningful for the [`ColumnTree`](super::ColumnTree) that
/// issued them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The empty-root sentinel every tree starts with.
    pub const ROOT: NodeId = NodeId(0);

    /// Raw arena index.
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }

    #[inline]
    pub(crate) fn from_slot(slot: usize) -> Option<NodeId> {
        (slot != EMPTY).then_some(NodeId(slot))
    }
}

/// Child slot of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// Taken when the angle is above the fold angle.
    Left,
    /// Taken when the angle is at or below the fold angle.
    Right,
}

impl Side {
    /// Direction chosen for `angle` against `fold_angle`.
    #[inline]
    pub fn for_angle(angle: f64, fold_angle: f64) -> Side {
        if angle > fold_angle {
            Side::Left
        } else {
            Side::Right
        }
    }
}

/// Where a node's document ids live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Postings {
    /// In-memory set, not yet written.
    Pending(BTreeSet<DocId>),
    /// Offsets of posting lists already in the postings stream. More than
    /// one offset means identical tokens from several pages were merged.
    Flushed(Vec<u64>),
}

impl Postings {
    /// Pending postings holding a single document.
    pub fn single(doc_id: DocId) -> Self {
        Postings::Pending(BTreeSet::from([doc_id]))
    }

    /// Returns true if nothing has been written for these postings yet.
    pub fn is_pending(&self) -> bool {
        matches!(self, Postings::Pending(_))
    }

    /// Pending document ids, if any.
    pub fn doc_ids(&self) -> Option<&BTreeSet<DocId>> {
        match self {
            Postings::Pending(ids) => Some(ids),
            Postings::Flushed(_) => None,
        }
    }

    /// Flushed offsets, if any.
    pub fn offsets(&self) -> Option<&[u64]> {
        match self {
            Postings::Pending(_) => None,
            Postings::Flushed(offsets) => Some(offsets),
        }
    }

    /// Folds `incoming` into `self`.
    ///
    /// Pending sets union; flushed offset lists concatenate without
    /// duplicates. Mixing the two is rejected: a flushed node has no set
    /// left to receive ids.
    pub(crate) fn merge(&mut self, incoming: Postings, node: usize) -> Result<()> {
        match (self, incoming) {
            (Postings::Pending(ids), Postings::Pending(more)) => {
                ids.extend(more);
                Ok(())
            }
            (Postings::Flushed(offsets), Postings::Flushed(more)) => {
                for offset in more {
                    if !offsets.contains(&offset) {
                        offsets.push(offset);
                    }
                }
                Ok(())
            }
            _ => Err(FoldTreeError::MergeAfterFlush { node }),
        }
    }
}

/// Mutable part of a node, guarded by the node's own lock.
#[derive(Debug)]
pub(crate) struct NodeState {
    pub(crate) postings: Postings,
    pub(crate) vector_offset: Option<u64>,
}

/// One node of a column tree.
///
/// Links are arena indices. `ancestor` is only followed upward to add
/// weight; it never owns anything.
#[derive(Debug)]
pub struct IndexNode {
    vector: Option<SparseVector>,
    angle: AtomicU64,
    weight: AtomicU32,
    left: AtomicUsize,
    right: AtomicUsize,
    ancestor: AtomicUsize,
    state: Mutex<NodeState>,
}

impl IndexNode {
    pub(crate) fn sentinel() -> Self {
        Self::with_parts(None, Postings::Pending(BTreeSet::new()), None, 1)
    }

    pub(crate) fn leaf(vector: SparseVector, postings: Postings) -> Self {
        Self::with_parts(Some(vector), postings, None, 1)
    }

    pub(crate) fn decoded(
        vector: SparseVector,
        postings_offset: u64,
        vector_offset: u64,
        weight: u32,
    ) -> Self {
        Self::with_parts(
            Some(vector),
            Postings::Flushed(vec![postings_offset]),
            Some(vector_offset),
            weight,
        )
    }

    fn with_parts(
        vector: Option<SparseVector>,
        postings: Postings,
        vector_offset: Option<u64>,
        weight: u32,
    ) -> Self {
        Self {
            vector,
            angle: AtomicU64::new(0f64.to_bits()),
            weight: AtomicU32::new(weight),
            left: AtomicUsize::new(EMPTY),
            right: AtomicUsize::new(EMPTY),
            ancestor: AtomicUsize::new(EMPTY),
            state: Mutex::new(NodeState {
                postings,
                vector_offset,
            }),
        }
    }

    /// The node's vector; `None` only for the empty-root sentinel.
    #[inline]
    pub fn vector(&self) -> Option<&SparseVector> {
        self.vector.as_ref()
    }

    /// Cosine angle to the parent's vector, recorded at attach time.
    #[inline]
    pub fn angle(&self) -> f64 {
        f64::from_bits(self.angle.load(Ordering::Relaxed))
    }

    /// Node count of the subtree rooted here, including this node.
    #[inline]
    pub fn weight(&self) -> u32 {
        self.weight.load(Ordering::Acquire)
    }

    /// Left child.
    #[inline]
    pub fn left(&self) -> Option<NodeId> {
        NodeId::from_slot(self.left.load(Ordering::Acquire))
    }

    /// Right child.
    #[inline]
    pub fn right(&self) -> Option<NodeId> {
        NodeId::from_slot(self.right.load(Ordering::Acquire))
    }

    /// Parent, if attached.
    #[inline]
    pub fn ancestor(&self) -> Option<NodeId> {
        NodeId::from_slot(self.ancestor.load(Ordering::Acquire))
    }

    /// Child on the given side.
    #[inline]
    pub fn child(&self, side: Side) -> Option<NodeId> {
        match side {
            Side::Left => self.left(),
            Side::Right => self.right(),
        }
    }

    /// Snapshot of the node's postings.
    pub fn postings(&self) -> Result<Postings> {
        Ok(self.lock()?.postings.clone())
    }

    /// Offset of the vector in the vector stream once written.
    pub fn vector_offset(&self) -> Result<Option<u64>> {
        Ok(self.lock()?.vector_offset)
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, NodeState>> {
        self.state
            .lock()
            .map_err(|_| FoldTreeError::LockPoisoned("index node"))
    }

    pub(crate) fn slot(&self, side: Side) -> &AtomicUsize {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub(crate) fn set_angle(&self, angle: f64) {
        self.angle.store(angle.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn set_ancestor(&self, parent: NodeId) {
        self.ancestor.store(parent.0, Ordering::Release);
    }

    pub(crate) fn add_weight(&self, delta: u32) {
        self.weight.fetch_add(delta, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_for_angle() {
        assert_eq!(Side::for_angle(0.6, 0.5), Side::Left);
        assert_eq!(Side::for_angle(0.5, 0.5), Side::Right);
        assert_eq!(Side::for_angle(0.0, 0.5), Side::Right);
        assert_eq!(Side::for_angle(0.0, -0.1), Side::Left);
    }

    #[test]
    fn test_pending_merge_is_union() {
        let mut postings = Postings::Pending(BTreeSet::from([1, 2]));
        postings
            .merge(Postings::Pending(BTreeSet::from([2, 3])), 1)
            .unwrap();
        assert_eq!(
            postings.doc_ids().unwrap().iter().copied().collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_flushed_merge_appends_offsets_once() {
        let mut postings = Postings::Flushed(vec![10]);
        postings.merge(Postings::Flushed(vec![20, 10]), 1).unwrap();
        assert_eq!(postings.offsets().unwrap(), &[10, 20]);
    }

    #[test]
    fn test_merge_pending_into_flushed_is_rejected() {
        let mut postings = Postings::Flushed(vec![10]);
        let err = postings.merge(Postings::single(4), 9).unwrap_err();
        assert!(matches!(err, FoldTreeError::MergeAfterFlush { node: 9 }));
    }

    #[test]
    fn test_sentinel_has_no_vector() {
        let node = IndexNode::sentinel();
        assert!(node.vector().is_none());
        assert_eq!(node.weight(), 1);
        assert!(node.left().is_none());
        assert!(node.right().is_none());
        assert!(node.ancestor().is_none());
    }
}
