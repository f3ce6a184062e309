//! Storage Module
//!
//! Directory-per-database, directory-per-collection storage with one
//! append-only binary data file per collection.
//!
//! ## Responsibilities
//! - Validate database/collection/field names before they touch the filesystem
//! - Create/delete/list database and collection directories
//! - Encode/decode file and record headers (CRC-32 per record)
//! - Append records and scan them back, skipping checksum failures
//! - Pool open data file handles across requests

pub mod data_file;
pub mod file_pool;
pub mod format;
pub mod layout;
pub mod names;

pub use data_file::{DataFile, RecordScanner, StoredRecord};
pub use file_pool::{FilePool, PooledFile};
pub use format::{FileHeader, RecordHeader, FILE_HEADER_SIZE, FLAG_TOMBSTONE, RECORD_HEADER_SIZE};
pub use layout::Layout;
pub use names::{validate_field_name, validate_name};
