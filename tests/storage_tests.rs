//! Tests for the storage layer
//!
//! These tests verify:
//! - Directory layout for databases and collections
//! - Appending records and reading them back by offset
//! - Scans skip checksum failures and stop at a truncated tail
//! - Torn appends past the free offset are never read
//! - File handle pooling and purging

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use atlasdb::config::SyncStrategy;
use atlasdb::storage::{
    DataFile, FileHeader, FilePool, Layout, RecordHeader, FILE_HEADER_SIZE, FLAG_TOMBSTONE,
    RECORD_HEADER_SIZE,
};
use atlasdb::AtlasError;
use tempfile::TempDir;
use uuid::Uuid;

// =============================================================================
// Helper Functions
// =============================================================================

fn open_rw(path: &Path) -> File {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .unwrap()
}

fn setup_data_file() -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("data.adb");
    (temp, path)
}

/// Append `payloads` and return the offsets they landed at
fn append_all(data: &DataFile<'_>, header: &mut FileHeader, payloads: &[&str]) -> Vec<u64> {
    payloads
        .iter()
        .map(|payload| {
            let id = Uuid::new_v4().to_string();
            let record = RecordHeader::for_payload(&id, payload.as_bytes(), 1, 0, 1_700_000_000_000).unwrap();
            data.append(header, &record, payload.as_bytes()).unwrap()
        })
        .collect()
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_layout_create_and_list() {
    let temp = TempDir::new().unwrap();
    let layout = Layout::new(temp.path().join("data"));

    layout.create_database("shop").unwrap();
    layout.create_database("app").unwrap();
    assert_eq!(layout.list_databases().unwrap(), vec!["app", "shop"]);

    // Re-creating is fine, a file in the way is not
    assert_eq!(layout.create_database("shop").unwrap(), layout.database_dir("shop"));
    fs::write(layout.database_dir("blocked"), b"x").unwrap();
    let err = layout.create_database("blocked").err();
    assert!(matches!(err, Some(AtlasError::InvalidName(_))));

    layout.create_collection("shop", "orders", "total:float:required:unindexed\n").unwrap();
    layout.create_collection("shop", "notes", "").unwrap();
    assert_eq!(layout.list_collections("shop").unwrap(), vec!["notes", "orders"]);

    assert_eq!(
        layout.read_schema("shop", "orders").unwrap().as_deref(),
        Some("total:float:required:unindexed\n")
    );
    assert_eq!(layout.read_schema("shop", "notes").unwrap(), None);
}

#[test]
fn test_layout_collection_appears_with_its_schema() {
    let temp = TempDir::new().unwrap();
    let layout = Layout::new(temp.path());
    layout.create_database("shop").unwrap();

    layout.create_collection("shop", "orders", "total:float:required:unindexed\n").unwrap();
    let err = layout.create_collection("shop", "orders", "other:int:optional:unindexed\n").err();
    assert!(matches!(err, Some(AtlasError::AlreadyExists(_))));

    assert_eq!(
        layout.read_schema("shop", "orders").unwrap().as_deref(),
        Some("total:float:required:unindexed\n")
    );

    // No staging directories are left behind
    let entries: Vec<String> = fs::read_dir(layout.database_dir("shop"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(entries, vec!["orders"]);
}

#[test]
fn test_layout_rejects_bad_names_and_missing_parents() {
    let temp = TempDir::new().unwrap();
    let layout = Layout::new(temp.path());

    for name in ["", "..", "a/b", "a\\b", "a b", "x..y"] {
        assert!(layout.create_database(name).is_err(), "accepted {:?}", name);
    }

    let err = layout.create_collection("missing", "orders", "").err();
    assert!(matches!(err, Some(AtlasError::DatabaseNotFound(_))));

    let err = layout.list_collections("missing").err();
    assert!(matches!(err, Some(AtlasError::DatabaseNotFound(_))));
}

#[test]
fn test_layout_delete_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let layout = Layout::new(temp.path());

    layout.create_database("shop").unwrap();
    layout.create_collection("shop", "orders", "").unwrap();
    fs::write(layout.data_path("shop", "orders"), b"x").unwrap();

    layout.delete_collection("shop", "orders").unwrap();
    layout.delete_collection("shop", "orders").unwrap();
    assert!(!layout.collection_exists("shop", "orders"));

    layout.delete_database("shop").unwrap();
    layout.delete_database("shop").unwrap();
    assert!(layout.list_databases().unwrap().is_empty());
}

// =============================================================================
// Data File Tests
// =============================================================================

#[test]
fn test_empty_file_has_no_header() {
    let (_temp, path) = setup_data_file();
    let file = open_rw(&path);
    let data = DataFile::new(&file, SyncStrategy::OsManaged);

    assert!(data.read_header().unwrap().is_none());
    assert_eq!(data.scan().unwrap().count(), 0);

    let header = data.header_or_init(7).unwrap();
    assert_eq!(header.record_count, 0);
    assert_eq!(header.free_offset, FILE_HEADER_SIZE as u64);
    assert_eq!(header.schema_checksum, 7);
    assert_eq!(fs::metadata(&path).unwrap().len(), FILE_HEADER_SIZE as u64);
}

#[test]
fn test_append_then_read_at() {
    let (_temp, path) = setup_data_file();
    let file = open_rw(&path);
    let data = DataFile::new(&file, SyncStrategy::EveryWrite);
    let mut header = data.init_header(0).unwrap();

    let offsets = append_all(&data, &mut header, &[r#"{"a":1}"#, r#"{"b":22}"#]);
    assert_eq!(offsets[0], FILE_HEADER_SIZE as u64);
    assert_eq!(offsets[1], offsets[0] + RECORD_HEADER_SIZE as u64 + 7 + 1);
    assert_eq!(header.record_count, 2);
    assert_eq!(header.free_offset, fs::metadata(&path).unwrap().len());

    let second = data.read_at(&header, offsets[1]).unwrap();
    assert_eq!(second.payload, br#"{"b":22}"#);
    assert_eq!(second.header.id_str().unwrap().len(), 36);

    // The persisted header matches the in-memory one
    assert_eq!(data.read_header().unwrap(), Some(header));

    let err = data.read_at(&header, 3).err();
    assert!(matches!(err, Some(AtlasError::Corruption(_))));
    let err = data.read_at(&header, header.free_offset).err();
    assert!(matches!(err, Some(AtlasError::Corruption(_))));
}

#[test]
fn test_tombstone_flag_survives_scan() {
    let (_temp, path) = setup_data_file();
    let file = open_rw(&path);
    let data = DataFile::new(&file, SyncStrategy::OsManaged);
    let mut header = data.init_header(0).unwrap();

    let id = Uuid::new_v4().to_string();
    let record = RecordHeader::for_payload(&id, b"{}", 0, FLAG_TOMBSTONE, 42).unwrap();
    data.append(&mut header, &record, b"{}").unwrap();

    let records: Vec<_> = data.scan().unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].header.is_tombstone());
    assert_eq!(records[0].header.timestamp, 42);
    assert_eq!(records[0].header.id_str().unwrap(), id);
}

#[test]
fn test_record_id_must_be_full_length() {
    let err = RecordHeader::for_payload("short", b"{}", 0, 0, 0).err();
    assert!(matches!(err, Some(AtlasError::Validation(_))));
}

#[test]
fn test_scan_skips_checksum_failure() {
    let (_temp, path) = setup_data_file();
    let offsets = {
        let file = open_rw(&path);
        let data = DataFile::new(&file, SyncStrategy::OsManaged);
        let mut header = data.init_header(0).unwrap();
        append_all(&data, &mut header, &[r#"{"n":1}"#, r#"{"n":2}"#, r#"{"n":3}"#])
    };

    // Flip one payload byte of the middle record
    {
        let mut file = open_rw(&path);
        file.seek(SeekFrom::Start(offsets[1] + RECORD_HEADER_SIZE as u64 + 5)).unwrap();
        file.write_all(b"9").unwrap();
    }

    let file = open_rw(&path);
    let data = DataFile::new(&file, SyncStrategy::OsManaged);
    let results: Vec<_> = data.scan().unwrap().collect();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().payload, br#"{"n":1}"#);
    assert!(matches!(results[1], Err(AtlasError::Corruption(_))));
    assert_eq!(results[2].as_ref().unwrap().payload, br#"{"n":3}"#);
}

#[test]
fn test_scan_stops_at_truncated_tail() {
    let (_temp, path) = setup_data_file();
    let offsets = {
        let file = open_rw(&path);
        let data = DataFile::new(&file, SyncStrategy::OsManaged);
        let mut header = data.init_header(0).unwrap();
        append_all(&data, &mut header, &[r#"{"n":1}"#, r#"{"n":2}"#])
    };

    // Cut the second record in half
    let file = open_rw(&path);
    file.set_len(offsets[1] + 10).unwrap();

    let data = DataFile::new(&file, SyncStrategy::OsManaged);
    let results: Vec<_> = data.scan().unwrap().collect();

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(AtlasError::Corruption(_))));
}

#[test]
fn test_torn_append_is_invisible() {
    let (_temp, path) = setup_data_file();
    {
        let file = open_rw(&path);
        let data = DataFile::new(&file, SyncStrategy::OsManaged);
        let mut header = data.init_header(0).unwrap();
        append_all(&data, &mut header, &[r#"{"n":1}"#]);
    }

    // Bytes written past the free offset without a header update
    {
        let mut file = open_rw(&path);
        file.seek(SeekFrom::End(0)).unwrap();
        file.write_all(&[0xAB; 100]).unwrap();
    }

    let file = open_rw(&path);
    let data = DataFile::new(&file, SyncStrategy::OsManaged);
    let records: Vec<_> = data.scan().unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(records.len(), 1);
}

#[test]
fn test_corrupt_header_is_reinitialized() {
    let (_temp, path) = setup_data_file();
    fs::write(&path, vec![0xFFu8; FILE_HEADER_SIZE]).unwrap();

    let file = open_rw(&path);
    let data = DataFile::new(&file, SyncStrategy::OsManaged);

    assert!(matches!(data.read_header(), Err(AtlasError::Corruption(_))));
    assert_eq!(data.scan().unwrap().count(), 0);

    let header = data.header_or_init(0).unwrap();
    assert_eq!(header.record_count, 0);
    assert!(data.read_header().unwrap().is_some());
}

// =============================================================================
// File Pool Tests
// =============================================================================

#[test]
fn test_pool_reuses_released_handle() {
    let (_temp, path) = setup_data_file();
    let pool = FilePool::new(4);

    {
        let _file = pool.acquire("db", "coll", &path).unwrap();
        assert_eq!(pool.idle_count("db", "coll"), 0);
    }
    assert_eq!(pool.idle_count("db", "coll"), 1);

    {
        let _file = pool.acquire("db", "coll", &path).unwrap();
    }
    assert_eq!(pool.opened(), 1);
    assert_eq!(pool.reused(), 1);
}

#[test]
fn test_pool_caps_idle_handles() {
    let (_temp, path) = setup_data_file();
    let pool = FilePool::new(1);

    let first = pool.acquire("db", "coll", &path).unwrap();
    let second = pool.acquire("db", "coll", &path).unwrap();
    assert_eq!(pool.opened(), 2);

    drop(first);
    drop(second);
    assert_eq!(pool.idle_count("db", "coll"), 1);
}

#[test]
fn test_purge_drops_checked_out_handles() {
    let (_temp, path) = setup_data_file();
    let pool = FilePool::new(4);

    let held = pool.acquire("db", "coll", &path).unwrap();
    {
        let _idle = pool.acquire("db", "other", &path).unwrap();
    }
    assert_eq!(pool.idle_count("db", "other"), 1);

    pool.purge_collection("db", "coll");
    drop(held);
    assert_eq!(pool.idle_count("db", "coll"), 0);

    pool.purge_database("db");
    assert_eq!(pool.idle_count("db", "other"), 0);

    {
        let _file = pool.acquire("db", "coll", &path).unwrap();
    }
    pool.clear();
    assert_eq!(pool.idle_count("db", "coll"), 0);
}
