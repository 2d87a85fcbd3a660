//! Resolving postings offsets into document ids.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::graph::codec::read_postings;
use crate::storage::ByteView;
use crate::types::DocId;

/// Reads posting lists from a collection's postings stream.
#[derive(Clone, Debug)]
pub struct PostingsReader {
    stream: ByteView,
}

impl PostingsReader {
    /// Wraps a view of the postings stream.
    pub fn new(stream: ByteView) -> Self {
        Self { stream }
    }

    /// Union of the lists at `offsets`, ascending and without duplicates.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Corrupted` if any list lies outside the
    /// stream.
    pub fn read(&self, offsets: &[u64]) -> Result<Vec<DocId>> {
        let mut ids = BTreeSet::new();
        for &offset in offsets {
            ids.extend(read_postings(&self.stream, offset)?);
        }
        Ok(ids.into_iter().collect())
    }
}
