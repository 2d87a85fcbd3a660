//! Binary page encoding of column trees.
//!
//! A page is the preorder sequence (node, left subtree, right subtree) of
//! fixed-size node records. Child links are not stored; the terminator tag
//! says which children follow and the weight says how many records the
//! left subtree spans.
//!
//! ```text
//! node record (25 bytes, little-endian)
//! ┌───────────────┬────────────────┬─────────────┬────────┬────────────┐
//! │ vector_offset │ postings_offset│ components  │ weight │ terminator │
//! │ i64           │ i64            │ i32         │ i32    │ u8         │
//! └───────────────┴────────────────┴─────────────┴────────┴────────────┘
//!
//! postings list:   count: i64, then count × doc id (u64)
//! ```
//!
//! Offsets point into the collection's shared vector and postings streams.

use std::io::Write;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use crate::error::{FoldTreeError, Result, StorageError};
use crate::model::SimilarityModel;
use crate::storage::OffsetWriter;
use crate::types::DocId;
use crate::vector::codec::{read_vector, write_vector};
use crate::vector::SparseVector;

use super::{ColumnTree, IndexNode, NodeId, Postings, Side};

/// Size of one node record in bytes.
pub const RECORD_SIZE: usize = 8 + 8 + 4 + 4 + 1;

/// Which children follow a record in preorder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Terminator {
    /// Left and right children.
    Both = 0,
    /// Left child only.
    LeftOnly = 1,
    /// Right child only.
    RightOnly = 2,
    /// No children.
    Leaf = 3,
}

impl Terminator {
    /// Tag for a node with the given children.
    pub fn for_children(has_left: bool, has_right: bool) -> Self {
        match (has_left, has_right) {
            (true, true) => Terminator::Both,
            (true, false) => Terminator::LeftOnly,
            (false, true) => Terminator::RightOnly,
            (false, false) => Terminator::Leaf,
        }
    }

    /// Parses a stored tag.
    pub fn from_byte(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Terminator::Both),
            1 => Some(Terminator::LeftOnly),
            2 => Some(Terminator::RightOnly),
            3 => Some(Terminator::Leaf),
            _ => None,
        }
    }

    /// Returns true if a left child follows.
    pub fn has_left(self) -> bool {
        matches!(self, Terminator::Both | Terminator::LeftOnly)
    }

    /// Returns true if a right child follows.
    pub fn has_right(self) -> bool {
        matches!(self, Terminator::Both | Terminator::RightOnly)
    }
}

/// One decoded node record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeRecord {
    /// Offset of the vector in the vector stream.
    pub vector_offset: u64,
    /// Offset of the posting list in the postings stream.
    pub postings_offset: u64,
    /// Number of vector components.
    pub component_count: u32,
    /// Records in the subtree rooted here, including this one.
    pub weight: u32,
    /// Children that follow.
    pub terminator: Terminator,
}

impl NodeRecord {
    /// Parses record `index` of a page.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Corrupted` for a truncated record, an
    /// unknown tag, or a negative field.
    pub fn parse(page: &[u8], index: usize) -> Result<Self> {
        let start = index
            .checked_mul(RECORD_SIZE)
            .filter(|start| start.checked_add(RECORD_SIZE).is_some_and(|end| end <= page.len()))
            .ok_or_else(|| {
                StorageError::corrupted(format!(
                    "record {} past end of {}-byte page",
                    index,
                    page.len()
                ))
            })?;
        let mut bytes = &page[start..start + RECORD_SIZE];

        let vector_offset = bytes.read_i64::<LittleEndian>()?;
        let postings_offset = bytes.read_i64::<LittleEndian>()?;
        let component_count = bytes.read_i32::<LittleEndian>()?;
        let weight = bytes.read_i32::<LittleEndian>()?;
        let tag = bytes.read_u8()?;

        let terminator = Terminator::from_byte(tag).ok_or_else(|| {
            StorageError::corrupted(format!("record {} has unknown terminator {}", index, tag))
        })?;
        if vector_offset < 0 || postings_offset < 0 || component_count < 0 || weight < 1 {
            return Err(
                StorageError::corrupted(format!("record {} has out-of-range fields", index)).into(),
            );
        }

        Ok(Self {
            vector_offset: vector_offset as u64,
            postings_offset: postings_offset as u64,
            component_count: component_count as u32,
            weight: weight as u32,
            terminator,
        })
    }

    /// Appends the 25-byte encoding.
    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_i64::<LittleEndian>(self.vector_offset as i64)?;
        out.write_i64::<LittleEndian>(self.postings_offset as i64)?;
        out.write_i32::<LittleEndian>(self.component_count as i32)?;
        out.write_i32::<LittleEndian>(self.weight as i32)?;
        out.write_u8(self.terminator as u8)?;
        Ok(())
    }

    /// Loads this record's vector from the vector stream.
    pub fn load_vector(&self, vectors: &[u8], width: u32) -> Result<SparseVector> {
        read_vector(
            vectors,
            self.vector_offset,
            self.component_count as usize,
            width,
        )
    }
}

/// Number of whole records in a page, rejecting trailing bytes.
pub fn record_count(page: &[u8]) -> Result<usize> {
    if page.len() % RECORD_SIZE != 0 {
        return Err(StorageError::corrupted(format!(
            "page length {} is not a multiple of {}",
            page.len(),
            RECORD_SIZE
        ))
        .into());
    }
    Ok(page.len() / RECORD_SIZE)
}

/// Appends a posting list; returns its offset.
pub fn write_postings<'a, W, I>(ids: I, out: &mut W) -> Result<u64>
where
    W: OffsetWriter,
    I: ExactSizeIterator<Item = &'a DocId>,
{
    let offset = out.position();
    out.write_i64::<LittleEndian>(ids.len() as i64)?;
    for &id in ids {
        out.write_u64::<LittleEndian>(id)?;
    }
    Ok(offset)
}

/// Reads the posting list at `offset`.
///
/// # Errors
///
/// Returns `StorageError::Corrupted` if the list runs past the stream.
pub fn read_postings(stream: &[u8], offset: u64) -> Result<Vec<DocId>> {
    let start = usize::try_from(offset)
        .ok()
        .filter(|&start| start.checked_add(8).is_some_and(|end| end <= stream.len()))
        .ok_or_else(|| {
            StorageError::corrupted(format!(
                "postings offset {} past stream end {}",
                offset,
                stream.len()
            ))
        })?;
    let mut cursor = &stream[start..];
    let count = cursor.read_i64::<LittleEndian>()?;
    let count = usize::try_from(count)
        .ok()
        .filter(|&count| count.checked_mul(8).is_some_and(|len| len <= cursor.len()))
        .ok_or_else(|| {
            StorageError::corrupted(format!(
                "posting list at {} claims {} ids",
                offset, count
            ))
        })?;

    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        ids.push(cursor.read_u64::<LittleEndian>()?);
    }
    Ok(ids)
}

/// Location of a written page in its record stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageExtent {
    /// Byte offset of the first record.
    pub offset: u64,
    /// Byte length of the page.
    pub length: u64,
    /// Number of records.
    pub count: usize,
}

/// Writes `tree` as one page.
///
/// Vectors not yet persisted go to `vectors`, pending postings to
/// `postings`, records to `records`. Every written node ends up holding a
/// single flushed postings offset. Returns `None` for an empty tree.
///
/// # Errors
///
/// Returns a serialization error for a node whose postings were merged
/// from several pages; such a node has no single offset to record.
pub fn serialize_tree<V, P, R>(
    tree: &ColumnTree,
    vectors: &mut V,
    postings: &mut P,
    records: &mut R,
) -> Result<Option<PageExtent>>
where
    V: OffsetWriter,
    P: OffsetWriter,
    R: OffsetWriter,
{
    let order = tree.preorder()?;
    if order.is_empty() {
        return Ok(None);
    }

    let start = records.position();
    for id in &order {
        let node = tree.node(*id)?;
        let (vector_offset, postings_offset) = persist_node(*id, &node, vectors, postings)?;
        NodeRecord {
            vector_offset,
            postings_offset,
            component_count: node.vector().map_or(0, |v| v.component_count()) as u32,
            weight: node.weight(),
            terminator: Terminator::for_children(node.left().is_some(), node.right().is_some()),
        }
        .write(records)?;
    }

    let extent = PageExtent {
        offset: start,
        length: records.position() - start,
        count: order.len(),
    };
    debug!(records = extent.count, bytes = extent.length, "Serialized tree page");
    Ok(Some(extent))
}

/// Writes a node's vector (once) and pending postings; returns the
/// `(vector_offset, postings_offset)` its record must carry.
pub(crate) fn persist_node<V, P>(
    id: NodeId,
    node: &IndexNode,
    vectors: &mut V,
    postings: &mut P,
) -> Result<(u64, u64)>
where
    V: OffsetWriter,
    P: OffsetWriter,
{
    let vector = node
        .vector()
        .ok_or_else(|| StorageError::serialization("sentinel reached during serialization"))?;

    let mut state = node.lock()?;
    let vector_offset = match state.vector_offset {
        Some(offset) => offset,
        None => {
            let offset = vectors.position();
            write_vector(vector, vectors)?;
            state.vector_offset = Some(offset);
            offset
        }
    };

    let postings_offset = match &state.postings {
        Postings::Pending(ids) => write_postings(ids.iter(), postings)?,
        Postings::Flushed(offsets) if offsets.len() == 1 => offsets[0],
        Postings::Flushed(offsets) => {
            return Err(StorageError::serialization(format!(
                "node {} holds {} postings offsets",
                id.index(),
                offsets.len()
            ))
            .into())
        }
    };
    state.postings = Postings::Flushed(vec![postings_offset]);

    Ok((vector_offset, postings_offset))
}

/// Rebuilds a tree from one page.
///
/// Decoding is driven by the previous record's tag: its children must come
/// next, and a leaf hands control back to the most recent node still owed
/// a right child.
///
/// # Errors
///
/// Returns `StorageError::Corrupted` for any inconsistency between tags,
/// weights and the record count, or for a vector past the stream end.
pub fn deserialize_tree(
    page: &[u8],
    vectors: &[u8],
    model: &dyn SimilarityModel,
) -> Result<ColumnTree> {
    let count = record_count(page)?;
    let tree = ColumnTree::new();
    let width = model.vector_width();

    let mut pending_right: Vec<NodeId> = Vec::new();
    let mut cursor: Option<(NodeId, Terminator)> = None;

    for index in 0..count {
        let record = NodeRecord::parse(page, index)?;
        let vector = record.load_vector(vectors, width)?;
        let node = IndexNode::decoded(
            vector,
            record.postings_offset,
            record.vector_offset,
            record.weight,
        );

        let id = match cursor {
            None => {
                let side = Side::for_angle(0.0, model.fold_angle());
                let id = tree.attach_decoded(NodeId::ROOT, side, node, model)?;
                tree.adopt_root_weight(record.weight)?;
                id
            }
            Some((parent, Terminator::Both)) => {
                pending_right.push(parent);
                tree.attach_decoded(parent, Side::Left, node, model)?
            }
            Some((parent, Terminator::LeftOnly)) => tree.attach_decoded(parent, Side::Left, node, model)?,
            Some((parent, Terminator::RightOnly)) => {
                tree.attach_decoded(parent, Side::Right, node, model)?
            }
            Some((_, Terminator::Leaf)) => {
                let parent = pending_right.pop().ok_or_else(|| {
                    StorageError::corrupted(format!(
                        "record {} follows a leaf with no open right slot",
                        index
                    ))
                })?;
                tree.attach_decoded(parent, Side::Right, node, model)?
            }
        };
        cursor = Some((id, record.terminator));
    }

    let owes_children = cursor.is_some_and(|(_, tag)| tag != Terminator::Leaf);
    if owes_children || !pending_right.is_empty() {
        return Err(StorageError::corrupted(format!(
            "page of {} records ends with children still owed",
            count
        ))
        .into());
    }
    if !tree.check_weights()? {
        return Err(StorageError::corrupted("subtree weights disagree with page shape").into());
    }

    Ok(tree)
}

/// Record-level navigation of a page without decoding it into a tree.
#[derive(Clone, Copy, Debug)]
pub struct RecordPage<'a> {
    bytes: &'a [u8],
    count: usize,
}

impl<'a> RecordPage<'a> {
    /// Wraps page bytes.
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        Ok(Self {
            bytes,
            count: record_count(bytes)?,
        })
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true for a page with no records.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Parses record `index`.
    pub fn record(&self, index: usize) -> Result<NodeRecord> {
        NodeRecord::parse(self.bytes, index)
    }

    /// Index of the child of record `index` on `side`, if it has one.
    ///
    /// The left child directly follows its parent; a right child follows
    /// directly when there is no left subtree, otherwise it follows the
    /// whole left subtree. Child weights must add up to the parent's.
    pub fn child(&self, index: usize, record: &NodeRecord, side: Side) -> Result<Option<usize>> {
        if record.weight as usize > self.count.saturating_sub(index) {
            return Err(self.bad_weight(index));
        }
        // (child index, weight the child subtree must carry)
        let child = match (side, record.terminator) {
            (Side::Left, Terminator::LeftOnly) | (Side::Right, Terminator::RightOnly) => {
                Some((index + 1, record.weight.saturating_sub(1)))
            }
            (Side::Left, Terminator::Both) => {
                let left = self.record_in_page(index, index + 1)?;
                if left.weight >= record.weight.saturating_sub(1) {
                    return Err(self.bad_weight(index));
                }
                Some((index + 1, left.weight))
            }
            (Side::Right, Terminator::Both) => {
                let left = self.record_in_page(index, index + 1)?;
                let right_weight = record
                    .weight
                    .saturating_sub(1)
                    .checked_sub(left.weight)
                    .filter(|&w| w > 0)
                    .ok_or_else(|| self.bad_weight(index))?;
                Some((index + 1 + left.weight as usize, right_weight))
            }
            _ => None,
        };

        let Some((child, weight)) = child else {
            return Ok(None);
        };
        if self.record_in_page(index, child)?.weight != weight {
            return Err(self.bad_weight(index));
        }
        Ok(Some(child))
    }

    fn record_in_page(&self, parent: usize, child: usize) -> Result<NodeRecord> {
        if child >= self.count {
            return Err(StorageError::corrupted(format!(
                "child {} of record {} past page end",
                child, parent
            ))
            .into());
        }
        self.record(child)
    }

    fn bad_weight(&self, index: usize) -> FoldTreeError {
        StorageError::corrupted(format!(
            "subtree weights under record {} disagree with a {}-record page",
            index, self.count
        ))
        .into()
    }
}
