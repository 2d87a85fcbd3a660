//! Node-by-node search of tree pages.

use crate::error::Result;
use crate::graph::codec::{deserialize_tree, RecordPage};
use crate::graph::{ColumnTree, Side};
use crate::model::SimilarityModel;
use crate::storage::{read_page_index, ByteView, PageEntry};
use crate::vector::SparseVector;

use super::{Hit, NodeReader};

/// Reader over the tree pages of one column.
///
/// Vectors are loaded from the vector stream only for the records a
/// descent visits.
#[derive(Clone, Debug)]
pub struct TreePageReader {
    pages: ByteView,
    index: Vec<PageEntry>,
    vectors: ByteView,
}

impl TreePageReader {
    /// Creates a reader from the record stream, its page index and the
    /// collection's vector stream.
    pub fn new(pages: ByteView, page_index: &[u8], vectors: ByteView) -> Result<Self> {
        Ok(Self {
            pages,
            index: read_page_index(page_index)?,
            vectors,
        })
    }

    /// Greedy descent over one page.
    fn page_hit(
        &self,
        entry: &PageEntry,
        query: &SparseVector,
        model: &dyn SimilarityModel,
    ) -> Result<Option<Hit>> {
        let page = RecordPage::new(entry.slice(&self.pages)?)?;
        if page.is_empty() {
            return Ok(None);
        }

        let width = model.vector_width();
        let fold = model.fold_angle();
        let mut best: Option<Hit> = None;
        let mut cursor = Some(0);

        while let Some(index) = cursor {
            let record = page.record(index)?;
            let vector = record.load_vector(&self.vectors, width)?;
            let angle = model.cos_angle(query, &vector);

            if angle > best.as_ref().map_or(0.0, |b| b.score) {
                best = Some(Hit {
                    score: angle,
                    postings_offsets: vec![record.postings_offset],
                    vector,
                });
            }
            cursor = page.child(index, &record, Side::for_angle(angle, fold))?;
        }

        Ok(best)
    }

    /// Decodes every page into its own tree.
    pub fn load_trees(&self, model: &dyn SimilarityModel) -> Result<Vec<ColumnTree>> {
        self.index
            .iter()
            .map(|entry| deserialize_tree(entry.slice(&self.pages)?, &self.vectors, model))
            .collect()
    }
}

impl NodeReader for TreePageReader {
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
