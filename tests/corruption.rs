//! Integration tests for damaged and missing page files.
//!
//! Missing files read as empty. Bytes that are present but malformed
//! surface as `StorageError::Corrupted`, never as a panic or a wrong hit.

use std::fs::{self, OpenOptions};
use std::path::Path;

use foldtree::{BagOfCharsModel, Config, FoldTreeDB};
use tempfile::tempdir;

fn write_pages(dir: &Path) {
    let db = FoldTreeDB::open(dir, Config::default(), BagOfCharsModel::new()).unwrap();
    {
        let session = db.index_session("docs").unwrap();
        session.put(1, "body", "alpha beta gamma").unwrap();
    }
    db.close().unwrap();
}

fn reopen(dir: &Path) -> FoldTreeDB {
    FoldTreeDB::open(dir, Config::default(), BagOfCharsModel::new()).unwrap()
}

fn truncate_by(path: &Path, bytes: u64) {
    let file = OpenOptions::new().write(true).open(path).unwrap();
    let len = file.metadata().unwrap().len();
    file.set_len(len - bytes).unwrap();
}

#[test]
fn test_truncated_record_stream_is_corruption() {
    let dir = tempdir().unwrap();
    write_pages(dir.path());
    truncate_by(&dir.path().join("docs.0.ix"), 1);

    let db = reopen(dir.path());
    let reader = db.read_session("docs").unwrap();
    let err = reader.search("body", "alpha").unwrap_err();
    assert!(err.is_corrupted(), "unexpected error: {err}");
    drop(reader);
    db.close().unwrap();
}

#[test]
fn test_partial_page_index_entry_is_corruption() {
    let dir = tempdir().unwrap();
    write_pages(dir.path());
    truncate_by(&dir.path().join("docs.0.ixp"), 3);

    let db = reopen(dir.path());
    let reader = db.read_session("docs").unwrap();
    assert!(reader.page_counts("body").unwrap_err().is_corrupted());
    drop(reader);
    db.close().unwrap();
}

#[test]
fn test_unknown_terminator_is_corruption() {
    let dir = tempdir().unwrap();
    write_pages(dir.path());

    let path = dir.path().join("docs.0.ix");
    let mut bytes = fs::read(&path).unwrap();
    // terminator byte of the first record
    bytes[24] = 9;
    fs::write(&path, bytes).unwrap();

    let db = reopen(dir.path());
    let reader = db.read_session("docs").unwrap();
    assert!(reader.search("body", "alpha").unwrap_err().is_corrupted());
    assert!(reader.load_merged_tree("body").unwrap_err().is_corrupted());
    drop(reader);
    db.close().unwrap();
}

#[test]
fn test_missing_vector_stream_is_corruption() {
    let dir = tempdir().unwrap();
    write_pages(dir.path());
    fs::remove_file(dir.path().join("docs.vec")).unwrap();

    let db = reopen(dir.path());
    let reader = db.read_session("docs").unwrap();
    assert!(reader.search("body", "beta").unwrap_err().is_corrupted());
    drop(reader);
    db.close().unwrap();
}

#[test]
fn test_missing_page_index_reads_as_empty() {
    let dir = tempdir().unwrap();
    write_pages(dir.path());
    fs::remove_file(dir.path().join("docs.0.ixp")).unwrap();

    let db = reopen(dir.path());
    let reader = db.read_session("docs").unwrap();
    assert_eq!(reader.page_counts("body").unwrap(), (0, 0));
    assert!(reader.search("body", "alpha").unwrap()[0].hit.is_none());
    drop(reader);
    db.close().unwrap();
}

#[test]
fn test_missing_postings_stream_is_corruption_on_resolve() {
    let dir = tempdir().unwrap();
    write_pages(dir.path());
    fs::remove_file(dir.path().join("docs.pos")).unwrap();

    let db = reopen(dir.path());
    let reader = db.read_session("docs").unwrap();
    // the page itself is intact
    let hit = reader.search("body", "gamma").unwrap()[0].hit.clone().unwrap();
    assert!(reader.resolve(&hit).unwrap_err().is_corrupted());
    drop(reader);
    db.close().unwrap();
}
