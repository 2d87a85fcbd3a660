//! Integration tests for index and read sessions.
//!
//! These tests verify the end-to-end behavior of:
//! - Indexing text and finding it again after a flush
//! - Folding similar tokens without merging them
//! - Flush running once, and puts being rejected afterwards
//! - The per-collection writer lock
//! - Diagnostics (`index_info`, JSON export)

use foldtree::{
    BagOfCharsModel, Config, ExternalModel, FoldTreeDB, FoldTreeError, SparseVector, StorageError,
};
use tempfile::tempdir;

fn open(dir: &std::path::Path) -> FoldTreeDB {
    FoldTreeDB::open(dir, Config::default(), BagOfCharsModel::new()).unwrap()
}

// ============================================================================
// Put / flush / search
// ============================================================================

#[test]
fn test_similar_tokens_fold_without_merging() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    {
        let session = db.index_session("pets").unwrap();
        session.put(1, "name", "cat").unwrap();
        session.put(2, "name", "cats").unwrap();
        session.put(3, "name", "dog").unwrap();

        // "cats" scores ~0.87 against "cat": below the identical angle
        let info = session.index_info().unwrap();
        assert_eq!(info.merges, 0);
        assert_eq!(info.columns[0].weight, 3);

        let report = session.flush().unwrap();
        assert_eq!(report.pages.len(), 1);
        assert_eq!(report.pages[0].nodes, 3);
    }

    let reader = db.read_session("pets").unwrap();
    let terms = reader.search("name", "cat").unwrap();
    assert_eq!(terms.len(), 1);
    assert_eq!(terms[0].token, "cat");

    let hit = terms[0].hit.as_ref().unwrap();
    assert!((hit.score - 1.0).abs() < 1e-9);
    assert_eq!(reader.resolve(hit).unwrap(), vec![1]);

    db.close().unwrap();
}

#[test]
fn test_identical_tokens_share_postings() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    {
        let session = db.index_session("docs").unwrap();
        session.put(1, "body", "index").unwrap();
        session.put(7, "body", "INDEX").unwrap();
        session.put(4, "body", "xedni").unwrap();
        assert_eq!(session.index_info().unwrap().merges, 2);
    }

    let reader = db.read_session("docs").unwrap();
    let hit = reader.search("body", "index").unwrap()[0].hit.clone().unwrap();
    assert_eq!(reader.resolve(&hit).unwrap(), vec![1, 4, 7]);

    db.close().unwrap();
}

#[test]
fn test_search_unknown_field_or_collection_is_empty() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    {
        let session = db.index_session("docs").unwrap();
        session.put(1, "title", "hello").unwrap();
    }

    let reader = db.read_session("docs").unwrap();
    let terms = reader.search("body", "hello").unwrap();
    assert!(terms[0].hit.is_none());

    let other = db.read_session("nothing-here").unwrap();
    assert!(other.search("title", "hello").unwrap()[0].hit.is_none());
    assert_eq!(other.page_counts("title").unwrap(), (0, 0));

    db.close().unwrap();
}

#[test]
fn test_put_vectors_with_external_model() {
    let dir = tempdir().unwrap();
    let db = FoldTreeDB::open(
        dir.path(),
        Config::default(),
        ExternalModel::new(4, 0.99, 0.5),
    )
    .unwrap();

    {
        let session = db.index_session("emb").unwrap();
        let vectors = vec![
            SparseVector::from_dense(&[1.0, 0.0, 0.0, 0.0]),
            SparseVector::from_dense(&[0.0, 1.0, 0.0, 0.0]),
            SparseVector::from_dense(&[0.0, 0.0, 0.0, 0.0]),
        ];
        // the zero vector has no direction and is skipped
        assert_eq!(session.put_vectors(10, "v", vectors).unwrap(), 2);

        let wrong = SparseVector::from_dense(&[1.0, 0.0]);
        let err = session.put_vectors(11, "v", [wrong]).unwrap_err();
        assert!(err.is_validation());

        // the external model cannot tokenize text
        assert!(matches!(
            session.put(12, "v", "text").unwrap_err(),
            FoldTreeError::Model(_)
        ));
    }

    let reader = db.read_session("emb").unwrap();
    let hit = reader
        .closest_match("v", &SparseVector::from_dense(&[0.1, 1.0, 0.0, 0.0]))
        .unwrap()
        .unwrap();
    assert_eq!(reader.resolve(&hit).unwrap(), vec![10]);

    db.close().unwrap();
}

#[test]
fn test_max_tokens_per_value() {
    let dir = tempdir().unwrap();
    let config = Config {
        max_tokens_per_value: 2,
        ..Default::default()
    };
    let db = FoldTreeDB::open(dir.path(), config, BagOfCharsModel::new()).unwrap();

    let session = db.index_session("docs").unwrap();
    assert_eq!(session.put(1, "body", "one two three four").unwrap(), 2);
    drop(session);

    db.close().unwrap();
}

// ============================================================================
// Flush semantics
// ============================================================================

#[test]
fn test_flush_runs_once() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    let session = db.index_session("docs").unwrap();
    session.put(1, "title", "alpha beta").unwrap();

    let first = session.flush().unwrap();
    assert_eq!(first.pages.len(), 1);
    assert!(session.is_flushed());

    let second = session.flush().unwrap();
    assert_eq!(second.session_id, session.id());
    assert!(second.pages.is_empty());
    drop(session);

    let reader = db.read_session("docs").unwrap();
    assert_eq!(reader.page_counts("title").unwrap(), (1, 0));

    db.close().unwrap();
}

#[test]
fn test_put_after_flush_is_rejected() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    let session = db.index_session("docs").unwrap();
    session.flush().unwrap();

    let err = session.put(1, "title", "late").unwrap_err();
    assert!(matches!(err, FoldTreeError::SessionFlushed(_)));
    drop(session);

    db.close().unwrap();
}

#[test]
fn test_failed_flush_is_not_reported_as_success() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    // a directory where the vector stream should be makes the flush fail
    let vectors = dir.path().join("docs.vec");
    std::fs::create_dir(&vectors).unwrap();

    let session = db.index_session("docs").unwrap();
    session.put(1, "title", "lost").unwrap();

    let first = session.flush().unwrap_err();
    assert!(matches!(first, FoldTreeError::Io(_)), "unexpected error: {first}");
    assert!(!session.is_flushed());

    let second = session.flush().unwrap_err();
    assert!(matches!(second, FoldTreeError::FlushFailed { .. }));
    let late = session.put(2, "title", "late").unwrap_err();
    assert!(matches!(late, FoldTreeError::FlushFailed { .. }));
    drop(session);

    std::fs::remove_dir(&vectors).unwrap();
    let reader = db.read_session("docs").unwrap();
    assert_eq!(reader.page_counts("title").unwrap(), (0, 0));
    drop(reader);

    db.close().unwrap();
}

#[test]
fn test_drop_flushes_session() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    {
        let session = db.index_session("docs").unwrap();
        session.put(5, "title", "dropped").unwrap();
    }

    let reader = db.read_session("docs").unwrap();
    assert_eq!(reader.page_counts("title").unwrap(), (1, 0));
    let hit = reader.search("title", "dropped").unwrap()[0].hit.clone().unwrap();
    assert_eq!(reader.resolve(&hit).unwrap(), vec![5]);

    db.close().unwrap();
}

#[test]
fn test_empty_session_writes_nothing() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    let session = db.index_session("docs").unwrap();
    assert!(session.flush().unwrap().pages.is_empty());
    drop(session);

    assert!(db.list_columns("docs").unwrap().is_empty());
    db.close().unwrap();
}

// ============================================================================
// Writer lock
// ============================================================================

#[test]
fn test_second_index_session_is_locked() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    let first = db.index_session("docs").unwrap();
    let err = db.index_session("docs").unwrap_err();
    assert!(matches!(
        err,
        FoldTreeError::Storage(StorageError::CollectionLocked(ref name)) if name == "docs"
    ));

    // other collections are independent
    let other = db.index_session("other").unwrap();
    drop(other);

    drop(first);
    let again = db.index_session("docs").unwrap();
    drop(again);

    db.close().unwrap();
}

#[test]
fn test_invalid_collection_name() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    assert!(db.index_session("../escape").unwrap_err().is_validation());
    assert!(db.read_session("").unwrap_err().is_validation());

    db.close().unwrap();
}

// ============================================================================
// Parallel puts and diagnostics
// ============================================================================

#[test]
fn test_put_batch() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    let documents: Vec<(u64, String)> = (0..200)
        .map(|i| (i, format!("word{} common", "x".repeat((i % 7) as usize))))
        .collect();
    let borrowed: Vec<(u64, &str)> = documents.iter().map(|(id, t)| (*id, t.as_str())).collect();

    {
        let session = db.index_session("bulk").unwrap();
        let indexed = session.put_batch("body", &borrowed).unwrap();
        assert_eq!(indexed, 400);

        let tree = session.tree("body").unwrap();
        assert!(tree.check_weights().unwrap());
        assert_eq!(
            session.index_info().unwrap().merges as usize + tree.len(),
            indexed
        );
    }

    let reader = db.read_session("bulk").unwrap();
    let hit = reader.search("body", "common").unwrap()[0].hit.clone().unwrap();
    assert_eq!(reader.resolve(&hit).unwrap().len(), 200);

    db.close().unwrap();
}

#[test]
fn test_concurrent_puts_from_threads() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    let session = db.index_session("docs").unwrap();
    std::thread::scope(|scope| {
        for t in 0..4u64 {
            let session = &session;
            scope.spawn(move || {
                for i in 0..50 {
                    session.put(t * 100 + i, "body", "shared token").unwrap();
                }
            });
        }
    });

    let tree = session.tree("body").unwrap();
    assert_eq!(tree.len(), 2);
    assert!(tree.check_weights().unwrap());
    drop(session);

    let reader = db.read_session("docs").unwrap();
    let hit = reader.search("body", "shared").unwrap()[0].hit.clone().unwrap();
    assert_eq!(reader.resolve(&hit).unwrap().len(), 200);

    db.close().unwrap();
}

#[test]
fn test_index_info_json() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    let session = db.index_session("docs").unwrap();
    session.put(1, "title", "alpha").unwrap();
    session.put(2, "body", "alpha beta").unwrap();

    let info = session.index_info().unwrap();
    // ordered by field name
    assert_eq!(info.columns[0].field, "body");
    assert_eq!(info.columns[1].field, "title");
    assert_eq!(info.columns[0].weight, 2);

    let json = info.to_json().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["columns"][1]["field"], "title");
    assert_eq!(parsed["merges"], 0);
    drop(session);

    db.close().unwrap();
}
