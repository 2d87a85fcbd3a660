//! Integration tests for the column catalog.
//!
//! These tests verify:
//! - Column ids are assigned per collection, in first-use order
//! - The registry and metadata survive reopening
//! - Vector width checks on open

use foldtree::storage::SCHEMA_VERSION;
use foldtree::{
    BagOfCharsModel, ColumnId, Config, ExternalModel, FoldTreeDB, FoldTreeError, ValidationError,
};
use tempfile::tempdir;

fn touch_fields(db: &FoldTreeDB, collection: &str, fields: &[&str]) {
    let session = db.index_session(collection).unwrap();
    for field in fields {
        session.put(1, field, "token").unwrap();
    }
}

#[test]
fn test_column_ids_per_collection() {
    let dir = tempdir().unwrap();
    let db = FoldTreeDB::open(dir.path(), Config::default(), BagOfCharsModel::new()).unwrap();

    touch_fields(&db, "books", &["title", "author"]);
    touch_fields(&db, "films", &["director"]);
    touch_fields(&db, "books", &["author", "isbn"]);

    assert_eq!(
        db.list_columns("books").unwrap(),
        vec![
            ("title".to_string(), ColumnId(0)),
            ("author".to_string(), ColumnId(1)),
            ("isbn".to_string(), ColumnId(2)),
        ]
    );
    assert_eq!(db.column_id("films", "director").unwrap(), Some(ColumnId(0)));
    assert_eq!(db.column_id("films", "title").unwrap(), None);

    db.close().unwrap();
}

#[test]
fn test_registry_survives_reopen() {
    let dir = tempdir().unwrap();

    let created_at = {
        let db =
            FoldTreeDB::open(dir.path(), Config::default(), BagOfCharsModel::new()).unwrap();
        touch_fields(&db, "books", &["title", "author"]);
        let created_at = db.metadata().created_at;
        db.close().unwrap();
        created_at
    };

    let db = FoldTreeDB::open(dir.path(), Config::default(), BagOfCharsModel::new()).unwrap();
    assert_eq!(db.metadata().created_at, created_at);
    assert!(db.metadata().last_opened_at >= created_at);
    assert_eq!(db.metadata().schema_version, SCHEMA_VERSION);
    assert_eq!(db.column_id("books", "author").unwrap(), Some(ColumnId(1)));

    // new fields continue the sequence
    touch_fields(&db, "books", &["year"]);
    assert_eq!(db.column_id("books", "year").unwrap(), Some(ColumnId(2)));

    db.close().unwrap();
}

#[test]
fn test_reopen_with_different_width_fails() {
    let dir = tempdir().unwrap();

    let db = FoldTreeDB::open(dir.path(), Config::default(), BagOfCharsModel::new()).unwrap();
    db.close().unwrap();

    let err = FoldTreeDB::open(
        dir.path(),
        Config::default(),
        ExternalModel::new(768, 0.99, 0.5),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        FoldTreeError::Validation(ValidationError::DimensionMismatch {
            expected: 768,
            got: 256
        })
    ));
}

#[test]
fn test_invalid_field_name_is_rejected() {
    let dir = tempdir().unwrap();
    let db = FoldTreeDB::open(dir.path(), Config::default(), BagOfCharsModel::new()).unwrap();

    {
        let session = db.index_session("books").unwrap();
        assert!(session.put(1, "", "token").unwrap_err().is_validation());
        let long = "f".repeat(200);
        assert!(session.put(1, &long, "token").unwrap_err().is_validation());
    }
    assert!(db.list_columns("books").unwrap().is_empty());

    db.close().unwrap();
}
