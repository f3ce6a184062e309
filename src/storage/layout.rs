//! On-disk layout
//!
//! ```text
//! {base}/
//!   └── {database}/
//!       └── {collection}/
//!           ├── schema.txt    (one field definition per line)
//!           ├── data.adb      (file header + records)
//!           └── .lock         (advisory write lock)
//! ```
//!
//! Every name passed in here has already been through `validate_name`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use uuid::Uuid;

use crate::error::{AtlasError, Result};

use super::names::validate_name;

/// Schema file name inside a collection directory
pub const SCHEMA_FILE: &str = "schema.txt";

/// Data file name inside a collection directory
pub const DATA_FILE: &str = "data.adb";

/// Prefix of a collection directory still being assembled
const STAGING_PREFIX: &str = ".creating~";

/// Lock file name inside a collection directory
pub const LOCK_FILE: &str = ".lock";

const MKDIR_ATTEMPTS: u32 = 3;
const MKDIR_BACKOFF: Duration = Duration::from_millis(10);

/// Path helper rooted at the base storage directory
#[derive(Debug, Clone)]
pub struct Layout {
    base: PathBuf,
}

impl Layout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn database_dir(&self, db: &str) -> PathBuf {
        self.base.join(db)
    }

    pub fn collection_dir(&self, db: &str, collection: &str) -> PathBuf {
        self.database_dir(db).join(collection)
    }

    pub fn schema_path(&self, db: &str, collection: &str) -> PathBuf {
        self.collection_dir(db, collection).join(SCHEMA_FILE)
    }

    pub fn data_path(&self, db: &str, collection: &str) -> PathBuf {
        self.collection_dir(db, collection).join(DATA_FILE)
    }

    pub fn lock_path(&self, db: &str, collection: &str) -> PathBuf {
        self.collection_dir(db, collection).join(LOCK_FILE)
    }

    // =========================================================================
    // Existence
    // =========================================================================

    pub fn database_exists(&self, db: &str) -> bool {
        is_accessible_dir(&self.database_dir(db))
    }

    pub fn collection_exists(&self, db: &str, collection: &str) -> bool {
        is_accessible_dir(&self.collection_dir(db, collection))
    }

    // =========================================================================
    // Databases
    // =========================================================================

    /// Create a database directory.
    ///
    /// An existing database directory is success, including one made by a
    /// racing creator between the check and the `mkdir`. A non-directory
    /// already at the path is an `InvalidName` error.
    pub fn create_database(&self, db: &str) -> Result<PathBuf> {
        validate_name("database", db)?;
        fs::create_dir_all(&self.base)?;

        let path = self.database_dir(db);
        let mut attempt = 0;
        loop {
            attempt += 1;

            match fs::metadata(&path) {
                Ok(meta) if meta.is_dir() => return Ok(path),
                Ok(_) => {
                    return Err(AtlasError::InvalidName(format!(
                        "database '{}': '{}' exists and is not a directory",
                        db,
                        path.display()
                    )));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }

            match fs::create_dir(&path) {
                Ok(()) => {
                    tracing::debug!("Created database directory {}", path.display());
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) if attempt < MKDIR_ATTEMPTS => {
                    tracing::warn!("mkdir {} failed (attempt {}): {}", path.display(), attempt, e);
                    thread::sleep(MKDIR_BACKOFF * attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Remove a database and everything in it. Missing databases are fine.
    pub fn delete_database(&self, db: &str) -> Result<()> {
        validate_name("database", db)?;
        remove_tree(&self.database_dir(db))
    }

    /// Sorted names of every database directory
    pub fn list_databases(&self) -> Result<Vec<String>> {
        list_dirs(&self.base)
    }

    // =========================================================================
    // Collections
    // =========================================================================

    /// Create a collection directory with its schema file.
    ///
    /// The directory is assembled under a staging name that never passes
    /// `validate_name`, then renamed into place, so the collection is never
    /// visible without its schema. The database must exist and the
    /// collection must not.
    pub fn create_collection(&self, db: &str, collection: &str, schema_text: &str) -> Result<PathBuf> {
        validate_name("database", db)?;
        validate_name("collection", collection)?;

        if !self.database_exists(db) {
            return Err(AtlasError::DatabaseNotFound(db.to_string()));
        }

        let path = self.collection_dir(db, collection);
        if fs::symlink_metadata(&path).is_ok() {
            return Err(already_exists(db, collection));
        }

        let staging = self
            .database_dir(db)
            .join(format!("{}{}~{}", STAGING_PREFIX, collection, Uuid::new_v4()));
        fs::create_dir(&staging)?;

        let staged = (|| -> Result<()> {
            if !schema_text.is_empty() {
                fs::write(staging.join(SCHEMA_FILE), schema_text)?;
            }
            if fs::symlink_metadata(&path).is_ok() {
                return Err(already_exists(db, collection));
            }
            fs::rename(&staging, &path)?;
            Ok(())
        })();

        if let Err(e) = staged {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                tracing::warn!("Could not remove {}: {}", staging.display(), cleanup);
            }
            return Err(e);
        }

        Ok(path)
    }

    /// Remove a collection directory. Missing collections are fine.
    pub fn delete_collection(&self, db: &str, collection: &str) -> Result<()> {
        validate_name("database", db)?;
        validate_name("collection", collection)?;
        remove_tree(&self.collection_dir(db, collection))
    }

    /// Sorted collection names within a database
    pub fn list_collections(&self, db: &str) -> Result<Vec<String>> {
        validate_name("database", db)?;
        if !self.database_exists(db) {
            return Err(AtlasError::DatabaseNotFound(db.to_string()));
        }
        list_dirs(&self.database_dir(db))
    }

    /// Raw schema text, or `None` for a schema-less collection
    pub fn read_schema(&self, db: &str, collection: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.schema_path(db, collection)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

fn is_accessible_dir(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
        Err(_) => false,
    }
}

fn already_exists(db: &str, collection: &str) -> AtlasError {
    AtlasError::AlreadyExists(format!("collection '{}/{}'", db, collection))
}

fn remove_tree(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            tracing::debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn list_dirs(path: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if validate_name("entry", name).is_ok() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
