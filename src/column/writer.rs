//! Appending pages to a column.

use tracing::{debug, instrument};

use crate::config::SyncMode;
use crate::error::Result;
use crate::graph::codec::serialize_tree;
use crate::graph::ColumnTree;
use crate::model::SimilarityModel;
use crate::storage::{AppendStream, ColumnFiles, OffsetWriter, PageEntry};

use super::sorted::write_sorted_page;

/// Writes pages for one column.
///
/// The vector and postings streams are shared by all columns of a
/// collection and are passed in by the caller; the record stream and page
/// index belong to this column.
#[derive(Debug)]
pub struct ColumnWriter {
    files: ColumnFiles,
    sync_mode: SyncMode,
}

impl ColumnWriter {
    /// Creates a writer for the column stored at `files`.
    pub fn new(files: ColumnFiles, sync_mode: SyncMode) -> Self {
        Self { files, sync_mode }
    }

    /// Appends `tree` as a tree page.
    ///
    /// Returns the page's location, or `None` if the tree is empty and
    /// nothing was written.
    #[instrument(skip_all, fields(path = %self.files.tree_pages.display(), nodes = tree.len()))]
    pub fn create_page(
        &self,
        tree: &ColumnTree,
        vectors: &mut AppendStream,
        postings: &mut AppendStream,
    ) -> Result<Option<PageEntry>> {
        if tree.is_empty() {
            return Ok(None);
        }
        let mut records = AppendStream::open(&self.files.tree_pages)?;
        let mut index = AppendStream::open(&self.files.tree_index)?;

        let entry = Self::write_tree_page(tree, vectors, postings, &mut records, &mut index)?;
        self.commit(vectors, postings, &mut records, &mut index)?;
        Ok(entry)
    }

    /// Appends `tree` as a sorted-list page.
    #[instrument(skip_all, fields(path = %self.files.sorted_pages.display(), nodes = tree.len()))]
    pub fn create_sorted_page(
        &self,
        tree: &ColumnTree,
        model: &dyn SimilarityModel,
        vectors: &mut AppendStream,
        postings: &mut AppendStream,
    ) -> Result<Option<PageEntry>> {
        if tree.is_empty() {
            return Ok(None);
        }
        let mut records = AppendStream::open(&self.files.sorted_pages)?;
        let mut index = AppendStream::open(&self.files.sorted_index)?;

        let entry =
            write_sorted_page(tree, model, vectors, postings, &mut records, &mut index)?;
        self.commit(vectors, postings, &mut records, &mut index)?;
        Ok(entry)
    }

    /// Serializes a tree page into arbitrary sinks and appends its page
    /// index entry.
    pub fn write_tree_page<V, P, R, I>(
        tree: &ColumnTree,
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
        let Some(extent) = serialize_tree(tree, vectors, postings, records)? else {
            return Ok(None);
        };
        let entry = PageEntry {
            offset: extent.offset,
            length: extent.length,
        };
        entry.write(index)?;
        debug!(offset = entry.offset, length = entry.length, "Tree page written");
        Ok(Some(entry))
    }

    /// Streams referenced by the index entry are committed first, so a
    /// crash never leaves an entry pointing at missing bytes.
    fn commit(
        &self,
        vectors: &mut AppendStream,
        postings: &mut AppendStream,
        records: &mut AppendStream,
        index: &mut AppendStream,
    ) -> Result<()> {
        vectors.commit(self.sync_mode)?;
        postings.commit(self.sync_mode)?;
        records.commit(self.sync_mode)?;
        index.commit(self.sync_mode)
    }
}
