//! Read sessions.

use tracing::{debug, instrument};

use crate::column::{reduce, Hit, NodeReader, SortedPageReader, TreePageReader};
use crate::db::FoldTreeDB;
use crate::error::Result;
use crate::graph::{ColumnTree, Postings};
use crate::postings::PostingsReader;
use crate::storage::schema::validate_collection_name;
use crate::storage::{CollectionFiles, ColumnFiles};
use crate::types::{ColumnId, DocId};
use crate::vector::SparseVector;

/// Best hit for one query token.
#[derive(Clone, Debug, PartialEq)]
pub struct TermHit {
    /// Token text (or a component summary for unlabelled vectors).
    pub token: String,
    /// Best match across all pages, if any node scored above 0.
    pub hit: Option<Hit>,
}

/// Read-only view over every page of one collection.
///
/// Missing columns and files read as empty: they yield no hits rather than
/// errors. Malformed pages fail the whole call.
#[derive(Debug)]
pub struct ReadSession<'db> {
    db: &'db FoldTreeDB,
    collection: String,
    files: CollectionFiles,
}

impl<'db> ReadSession<'db> {
    pub(crate) fn open(db: &'db FoldTreeDB, collection: &str) -> Result<Self> {
        validate_collection_name(collection)?;
        Ok(Self {
            db,
            collection: collection.to_string(),
            files: CollectionFiles::new(db.path(), collection),
        })
    }

    /// Collection this session reads.
    #[inline]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Best match for `query` in `field` across tree and sorted-list
    /// pages.
    #[instrument(skip(self, query), fields(collection = %self.collection))]
    pub fn closest_match(&self, field: &str, query: &SparseVector) -> Result<Option<Hit>> {
        let model = self.db.model();
        model.validate_vector(query)?;

        let Some(column) = self.db.column_id(&self.collection, field)? else {
            debug!("Unknown column");
            return Ok(None);
        };

        let mut hits = Vec::new();
        for reader in self.readers(column)? {
            hits.extend(reader.page_hits(query, model)?);
        }
        Ok(reduce(hits, model.identical_angle()))
    }

    /// Tokenizes `text` and looks up every token in `field`.
    pub fn search(&self, field: &str, text: &str) -> Result<Vec<TermHit>> {
        let tokens = self.db.model().tokenize(text)?;
        tokens
            .into_iter()
            .take(self.db.config().max_tokens_per_value)
            .map(|token| {
                let hit = self.closest_match(field, &token)?;
                Ok(TermHit {
                    token: token.to_string(),
                    hit,
                })
            })
            .collect()
    }

    /// Document ids of a hit, ascending.
    pub fn resolve(&self, hit: &Hit) -> Result<Vec<DocId>> {
        let stream = self.db.views().view(&self.files.postings)?;
        PostingsReader::new(stream).read(&hit.postings_offsets)
    }

    /// Builds one in-memory tree from every page of `field`.
    ///
    /// Identical tokens from different pages fold into a single node
    /// carrying all their postings offsets. The result is for inspection
    /// and lookup; it cannot be written back as a page.
    #[instrument(skip(self), fields(collection = %self.collection))]
    pub fn load_merged_tree(&self, field: &str) -> Result<ColumnTree> {
        let model = self.db.model();
        let merged = ColumnTree::new();
        let Some(column) = self.db.column_id(&self.collection, field)? else {
            return Ok(merged);
        };

        let (tree_pages, sorted_pages) = self.page_readers(column)?;

        for page in tree_pages.load_trees(model)? {
            for id in page.preorder()? {
                let node = page.node(id)?;
                if let Some(vector) = node.vector() {
                    merged.insert(vector.clone(), node.postings()?, model)?;
                }
            }
        }
        for (vector, offset) in sorted_pages.entries(model)? {
            merged.insert(vector, Postings::Flushed(vec![offset]), model)?;
        }

        debug!(nodes = merged.len(), "Merged tree loaded");
        Ok(merged)
    }

    /// Number of pages written for `field`, by kind: (tree, sorted-list).
    pub fn page_counts(&self, field: &str) -> Result<(usize, usize)> {
        let Some(column) = self.db.column_id(&self.collection, field)? else {
            return Ok((0, 0));
        };
        let (tree, sorted) = self.page_readers(column)?;
        Ok((tree.page_count(), sorted.page_count()))
    }

    fn page_readers(&self, column: ColumnId) -> Result<(TreePageReader, SortedPageReader)> {
        let views = self.db.views();
        let files = ColumnFiles::new(self.db.path(), &self.collection, column);

        // reverse of the order a flush commits in, so every index entry
        // seen here points at bytes already present in the later views
        let tree_index = views.view(&files.tree_index)?;
        let sorted_index = views.view(&files.sorted_index)?;
        let tree_pages = views.view(&files.tree_pages)?;
        let sorted_pages = views.view(&files.sorted_pages)?;
        let vectors = views.view(&self.files.vectors)?;

        let tree = TreePageReader::new(tree_pages, &tree_index, vectors.clone())?;
        let sorted = SortedPageReader::new(sorted_pages, &sorted_index, vectors)?;
        Ok((tree, sorted))
    }

    fn readers(&self, column: ColumnId) -> Result<Vec<Box<dyn NodeReader>>> {
        let (tree, sorted) = self.page_readers(column)?;
        Ok(vec![Box::new(tree), Box::new(sorted)])
    }
}
