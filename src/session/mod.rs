//! Write and read sessions over one collection.
//!
//! An [`IndexSession`] builds one in-memory [`ColumnTree`](crate::graph::ColumnTree)
//! per field and flushes them once, each as a new page. A [`ReadSession`]
//! searches every page written so far.
//!
//! ```text
//! IndexSession::put ──► tokenize ──► ColumnTree::insert   (per field)
//!          │
//!        flush ──► ColumnWriter ──► .vec / .pos / .ix / .ixp
//!
//! ReadSession::search ──► NodeReader per page ──► reduce ──► resolve
//! ```

mod index;
mod read;

pub use index::{FlushReport, GraphInfo, IndexInfo, IndexSession, PageReport};
pub use read::{ReadSession, TermHit};
