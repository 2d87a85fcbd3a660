//! Sorted-list pages.
//!
//! An alternative page layout: every node becomes a leaf record, records
//! are ordered by the projection of their vector on the model's sorting
//! vector, and the projections follow the records as a key array.
//!
//! ```text
//! ┌──────────────────────────────┬──────────────────────────┐
//! │ n × node record (25 bytes)   │ n × key: f64 LE          │
//! │ ascending by key             │                          │
//! └──────────────────────────────┴──────────────────────────┘
//! ```
//!
//! Lookup binary-searches the query's own projection and scores only the
//! neighbours of the insertion point. Projections collide for unrelated
//! vectors, so this trades recall for a fixed number of comparisons.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::graph::codec::{persist_node, NodeRecord, Terminator, RECORD_SIZE};
use crate::graph::ColumnTree;
use crate::model::SimilarityModel;
use crate::storage::{read_page_index, ByteView, OffsetWriter, PageEntry};
use crate::vector::SparseVector;

use super::{Hit, NodeReader};

/// Bytes per node in a sorted-list page (record plus key).
pub const SORTED_ENTRY_SIZE: usize = RECORD_SIZE + 8;

/// Projection used as the sort key.
fn sort_key(model: &dyn SimilarityModel, vector: &SparseVector) -> f64 {
    model.cos_angle(model.sorting_vector(), vector)
}

/// Writes every node of `tree` as one sorted-list page.
pub(crate) fn write_sorted_page<V, P, R, I>(
    tree: &ColumnTree,
    model: &dyn SimilarityModel,
    vectors: &mut V,
    postings: &mut P,
    records: &mut R,
    index: &mut I,
) -> Result<Option<PageEntry>>
where
    V: OffsetWriter,
    P: OffsetWriter,
    R: OffsetWriter,
    I: OffsetWriter,
{
    let order = tree.preorder()?;
    if order.is_empty() {
        return Ok(None);
    }

    let mut entries = Vec::with_capacity(order.len());
    for id in order {
        let node = tree.node(id)?;
        let (vector_offset, postings_offset) = persist_node(id, &node, vectors, postings)?;
        let vector = node
            .vector()
            .ok_or_else(|| StorageError::serialization("sentinel reached during serialization"))?;
        let record = NodeRecord {
            vector_offset,
            postings_offset,
            component_count: vector.component_count() as u32,
            weight: 1,
            terminator: Terminator::Leaf,
        };
        entries.push((sort_key(model, vector), record));
    }
    entries.sort_by(|a, b| a.0.total_cmp(&b.0));

    let start = records.position();
    for (_, record) in &entries {
        record.write(records)?;
    }
    for (key, _) in &entries {
        records.write_f64::<LittleEndian>(*key)?;
    }

    let entry = PageEntry {
        offset: start,
        length: records.position() - start,
    };
    entry.write(index)?;
    debug!(
        nodes = entries.len(),
        offset = entry.offset,
        "Sorted page written"
    );
    Ok(Some(entry))
}

/// One parsed sorted-list page.
struct SortedPage<'a> {
    bytes: &'a [u8],
    keys: Vec<f64>,
}

impl<'a> SortedPage<'a> {
    fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() % SORTED_ENTRY_SIZE != 0 {
            return Err(StorageError::corrupted(format!(
                "sorted page length {} is not a multiple of {}",
                bytes.len(),
                SORTED_ENTRY_SIZE
            ))
            .into());
        }
        let count = bytes.len() / SORTED_ENTRY_SIZE;
        let mut cursor = &bytes[count * RECORD_SIZE..];
        let mut keys = Vec::with_capacity(count);
        for _ in 0..count {
            let key = cursor.read_f64::<LittleEndian>()?;
            if keys.last().is_some_and(|&prev: &f64| prev.total_cmp(&key).is_gt()) {
                return Err(StorageError::corrupted("sorted page keys out of order").into());
            }
            keys.push(key);
        }
        Ok(Self {
            bytes: &bytes[..count * RECORD_SIZE],
            keys,
        })
    }

    fn record(&self, index: usize) -> Result<NodeRecord> {
        NodeRecord::parse(self.bytes, index)
    }
}

/// Reader over the sorted-list pages of one column.
#[derive(Clone, Debug)]
pub struct SortedPageReader {
    pages: ByteView,
    index: Vec<PageEntry>,
    vectors: ByteView,
}

impl SortedPageReader {
    /// Creates a reader from the record stream, its page index and the
    /// collection's vector stream.
    pub fn new(pages: ByteView, page_index: &[u8], vectors: ByteView) -> Result<Self> {
        Ok(Self {
            pages,
            index: read_page_index(page_index)?,
            vectors,
        })
    }

    fn page_hit(
        &self,
        entry: &PageEntry,
        query: &SparseVector,
        model: &dyn SimilarityModel,
    ) -> Result<Option<Hit>> {
        let page = SortedPage::parse(entry.slice(&self.pages)?)?;
        if page.keys.is_empty() {
            return Ok(None);
        }

        let key = sort_key(model, query);
        let insertion = page.keys.partition_point(|k| k.total_cmp(&key).is_lt());
        let first = insertion.saturating_sub(1);
        let last = (insertion + 1).min(page.keys.len() - 1);

        let width = model.vector_width();
        let mut best: Option<Hit> = None;
        for index in first..=last {
            let record = page.record(index)?;
            let vector = record.load_vector(&self.vectors, width)?;
            let score = model.cos_angle(query, &vector);
            if score > best.as_ref().map_or(0.0, |b| b.score) {
                best = Some(Hit {
                    score,
                    postings_offsets: vec![record.postings_offset],
                    vector,
                });
            }
        }
        Ok(best)
    }

    /// Every `(vector, postings_offset)` pair stored in the pages.
    pub fn entries(&self, model: &dyn SimilarityModel) -> Result<Vec<(SparseVector, u64)>> {
        let width = model.vector_width();
        let mut out = Vec::new();
        for entry in &self.index {
            let page = SortedPage::parse(entry.slice(&self.pages)?)?;
            for index in 0..page.keys.len() {
                let record = page.record(index)?;
                out.push((record.load_vector(&self.vectors, width)?, record.postings_offset));
            }
        }
        Ok(out)
    }
}

impl NodeReader for SortedPageReader {
    fn page_hits(&self, query: &SparseVector, model: &dyn SimilarityModel) -> Result<Vec<Hit>> {
        let mut hits = Vec::with_capacity(self.index.len());
        for entry in &self.index {
            if let Some(hit) = self.page_hit(entry, query, model)? {
                hits.push(hit);
            }
        }
        Ok(hits)
    }

    fn page_count(&self) -> usize {
        self.index.len()
    }
}
