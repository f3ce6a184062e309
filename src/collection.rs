//! Collection handle
//!
//! Per-collection shared state: the collection lock, the live-version map,
//! the field indexes and the document cache. One handle exists per
//! (database, collection) in a process; the engine hands out `Arc`s to it.
//!
//! ## Versioning
//! The data file is append-only. An update appends a full new version under
//! the same `_id`; a delete appends a tombstone. `live` maps each id to the
//! offset of its newest non-tombstone version, and anything else found in a
//! scan is skipped.
//!
//! ## Locking order
//! collection lock → lock file (writes only) → pooled file handle → state

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::cache::{CacheStats, DocumentCache};
use crate::config::{Config, SyncStrategy};
use crate::error::{AtlasError, Result};
use crate::index::FieldIndex;
use crate::query::Query;
use crate::schema::Schema;
use crate::storage::format::ID_LEN;
use crate::storage::{DataFile, FilePool, Layout, RecordHeader, StoredRecord, FLAG_TOMBSTONE};
use crate::sync::{CollectionLock, FileLock};

/// Generated id field
pub const ID_FIELD: &str = "_id";

/// Insertion timestamp field (unix millis)
pub const CREATED_AT_FIELD: &str = "_created_at";

/// Last update timestamp field (unix millis)
pub const UPDATED_AT_FIELD: &str = "_updated_at";

/// Unix time in milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Statistics reported for one collection
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub database: String,
    pub collection: String,
    pub record_count: u64,
    pub live_count: usize,
    pub file_size: u64,
    pub free_offset: u64,
    pub skipped_records: u64,
    pub indexed_fields: Vec<String>,
    pub cache: CacheStats,
}

#[derive(Default)]
struct CollectionState {
    /// id → offset of the newest live version
    live: HashMap<String, u64>,
    index: FieldIndex,
    /// Records dropped during scans (checksum or JSON failures)
    skipped: u64,
}

/// Shared handle to one collection
pub struct Collection {
    db: String,
    name: String,
    data_path: PathBuf,
    lock_path: PathBuf,
    schema: Schema,
    lock: CollectionLock,
    state: RwLock<CollectionState>,
    cache: DocumentCache,
    pool: Arc<FilePool>,
    sync_strategy: SyncStrategy,
    lock_timeout: Duration,
    dropped: AtomicBool,
}

impl Collection {
    /// Open an existing collection and rebuild its in-memory state by
    /// scanning the data file once.
    pub fn open(layout: &Layout, db: &str, name: &str, pool: Arc<FilePool>, config: &Config) -> Result<Self> {
        let schema = match layout.read_schema(db, name)? {
            Some(text) => Schema::parse(&text)?,
            None => Schema::default(),
        };

        let collection = Self {
            db: db.to_string(),
            name: name.to_string(),
            data_path: layout.data_path(db, name),
            lock_path: layout.lock_path(db, name),
            state: RwLock::new(CollectionState {
                index: FieldIndex::new(schema.indexed_fields()),
                ..CollectionState::default()
            }),
            schema,
            lock: CollectionLock::new(config.lock_timeout()),
            cache: DocumentCache::new(config.cache_capacity),
            pool,
            sync_strategy: config.sync_strategy,
            lock_timeout: config.lock_timeout(),
            dropped: AtomicBool::new(false),
        };

        collection.rebuild()?;
        Ok(collection)
    }

    /// Write the initial file header for a freshly created collection
    pub fn init_data_file(&self) -> Result<()> {
        let file = self.pool.acquire(&self.db, &self.name, &self.data_path)?;
        DataFile::new(&file, self.sync_strategy).header_or_init(self.schema.checksum())?;
        Ok(())
    }

    pub fn database(&self) -> &str {
        &self.db
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn lock(&self) -> &CollectionLock {
        &self.lock
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Number of live instances
    pub fn live_count(&self) -> usize {
        self.state.read().live.len()
    }

    /// Mark the handle unusable; later operations report not-found
    pub(crate) fn mark_dropped(&self) {
        self.dropped.store(true, Ordering::SeqCst);
        self.cache.clear();
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Validate and append a new instance; returns the stored document
    /// (with `_id` and `_created_at`).
    pub fn insert(&self, document: Value) -> Result<Value> {
        let Value::Object(mut fields) = document else {
            return Err(AtlasError::Validation("instance must be a JSON object".to_string()));
        };

        fields.remove(ID_FIELD);
        fields.remove(CREATED_AT_FIELD);
        fields.remove(UPDATED_AT_FIELD);
        self.schema.validate(&Value::Object(fields.clone()))?;

        let id = uuid::Uuid::new_v4().hyphenated().to_string();
        let created_at = now_millis();
        fields.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        fields.insert(CREATED_AT_FIELD.to_string(), Value::from(created_at));
        let stored = Value::Object(fields);

        let _guard = self.lock.write()?;
        self.ensure_present()?;
        let _file_lock = FileLock::acquire(&self.lock_path, self.lock_timeout)?;

        let offset = self.append(&id, &stored, 0, created_at)?;
        self.apply_version(&id, offset, stored.clone());

        tracing::debug!("Inserted {} into {}/{} at offset {}", id, self.db, self.name, offset);
        Ok(stored)
    }

    /// Merge `patch` into the live instance and append the result as a new
    /// version. Fails with not-found if `id` is not live.
    pub fn update(&self, id: &str, patch: Value) -> Result<Value> {
        let Value::Object(patch) = patch else {
            return Err(AtlasError::Validation("update must be a JSON object".to_string()));
        };

        let _guard = self.lock.write()?;
        self.ensure_present()?;

        let current = self
            .load_live(id)?
            .ok_or_else(|| AtlasError::InstanceNotFound(id.to_string()))?;

        let mut merged: Map<String, Value> = current.as_object().cloned().unwrap_or_default();
        for (key, value) in patch {
            if matches!(key.as_str(), ID_FIELD | CREATED_AT_FIELD | UPDATED_AT_FIELD) {
                continue;
            }
            merged.insert(key, value);
        }
        let updated_at = now_millis();
        merged.insert(UPDATED_AT_FIELD.to_string(), Value::from(updated_at));
        let merged = Value::Object(merged);

        // Reserved fields are not part of the schema
        let mut user_fields = merged.clone();
        if let Some(object) = user_fields.as_object_mut() {
            object.remove(ID_FIELD);
            object.remove(CREATED_AT_FIELD);
            object.remove(UPDATED_AT_FIELD);
        }
        self.schema.validate(&user_fields)?;

        let _file_lock = FileLock::acquire(&self.lock_path, self.lock_timeout)?;
        let offset = self.append(id, &merged, 0, updated_at)?;
        self.apply_version(id, offset, merged.clone());

        tracing::debug!("Updated {} in {}/{} at offset {}", id, self.db, self.name, offset);
        Ok(merged)
    }

    /// Append a tombstone for `id`. Returns whether the instance was live;
    /// deleting an absent id is not an error.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.lock.write()?;
        self.ensure_present()?;

        if id.len() != ID_LEN || !self.state.read().live.contains_key(id) {
            return Ok(false);
        }

        let _file_lock = FileLock::acquire(&self.lock_path, self.lock_timeout)?;
        let offset = self.append(id, &Value::Object(Map::new()), FLAG_TOMBSTONE, now_millis())?;

        self.state.write().live.remove(id);
        self.cache.remove(id);

        tracing::debug!("Deleted {} from {}/{} (tombstone at {})", id, self.db, self.name, offset);
        Ok(true)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The live version of `id`, if any
    pub fn get(&self, id: &str) -> Result<Option<Arc<Value>>> {
        let _guard = self.lock.read()?;
        self.ensure_present()?;
        self.load_live(id)
    }

    /// Every live instance matching `query`, in insertion order.
    ///
    /// Uses an index when one of the conditions is on an indexed field;
    /// otherwise scans the whole data file.
    pub fn find(&self, query: &Query) -> Result<Vec<Value>> {
        let _guard = self.lock.read()?;
        self.ensure_present()?;

        let state = self.state.read();
        let indexed = query
            .conditions()
            .iter()
            .find_map(|c| state.index.lookup(&c.field, &c.value));

        let file = self.pool.acquire(&self.db, &self.name, &self.data_path)?;
        let data = DataFile::new(&file, self.sync_strategy);
        let mut results = Vec::with_capacity(state.live.len().min(1024));

        match indexed {
            Some(mut offsets) => {
                offsets.sort_unstable();
                offsets.dedup();
                let Some(header) = data.read_header()? else {
                    return Ok(results);
                };
                for offset in offsets {
                    match data.read_at(&header, offset) {
                        Ok(record) => {
                            if let Some(doc) = live_document(&state.live, &record) {
                                if query.matches(&doc) {
                                    results.push(doc);
                                }
                            }
                        }
                        Err(AtlasError::Corruption(reason)) => {
                            tracing::warn!("Skipping indexed record at {}: {}", offset, reason);
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
            None => {
                for record in data.scan()? {
                    match record {
                        Ok(record) => {
                            if let Some(doc) = live_document(&state.live, &record) {
                                if query.matches(&doc) {
                                    results.push(doc);
                                }
                            }
                        }
                        Err(AtlasError::Corruption(reason)) => {
                            tracing::warn!("Skipping record in {}/{}: {}", self.db, self.name, reason);
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        Ok(results)
    }

    pub fn stats(&self) -> Result<CollectionStats> {
        let _guard = self.lock.read()?;
        self.ensure_present()?;

        let header = {
            let file = self.pool.acquire(&self.db, &self.name, &self.data_path)?;
            DataFile::new(&file, self.sync_strategy).read_header().ok().flatten()
        };
        let state = self.state.read();

        Ok(CollectionStats {
            database: self.db.clone(),
            collection: self.name.clone(),
            record_count: header.map(|h| h.record_count).unwrap_or(0),
            live_count: state.live.len(),
            file_size: header.map(|h| h.file_size).unwrap_or(0),
            free_offset: header.map(|h| h.free_offset).unwrap_or(0),
            skipped_records: state.skipped,
            indexed_fields: state.index.fields().into_iter().map(String::from).collect(),
            cache: self.cache.stats(),
        })
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_present(&self) -> Result<()> {
        if self.dropped.load(Ordering::SeqCst) {
            return Err(AtlasError::CollectionNotFound(format!("{}/{}", self.db, self.name)));
        }
        Ok(())
    }

    /// Scan the data file into `live` and the indexes
    fn rebuild(&self) -> Result<()> {
        let file = self.pool.acquire(&self.db, &self.name, &self.data_path)?;
        let data = DataFile::new(&file, self.sync_strategy);
        let mut state = self.state.write();

        for record in data.scan()? {
            let record = match record {
                Ok(record) => record,
                Err(AtlasError::Corruption(reason)) => {
                    state.skipped += 1;
                    tracing::warn!("Skipping record in {}/{}: {}", self.db, self.name, reason);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let id = match record.header.id_str() {
                Ok(id) => id.to_string(),
                Err(e) => {
                    state.skipped += 1;
                    tracing::warn!("Skipping record at {} in {}/{}: {}", record.offset, self.db, self.name, e);
                    continue;
                }
            };
            if record.header.is_tombstone() {
                state.live.remove(&id);
                continue;
            }

            match serde_json::from_slice::<Value>(&record.payload) {
                Ok(doc) => {
                    state.index.insert_document(&doc, record.offset);
                    state.live.insert(id, record.offset);
                }
                Err(e) => {
                    state.skipped += 1;
                    tracing::warn!("Record {} at {} is not valid JSON: {}", id, record.offset, e);
                }
            }
        }

        tracing::debug!(
            "Opened {}/{}: {} live instance(s), {} skipped record(s)",
            self.db,
            self.name,
            state.live.len(),
            state.skipped
        );
        Ok(())
    }

    /// Append one record (caller holds the write lock and lock file)
    fn append(&self, id: &str, document: &Value, flags: u32, timestamp: u64) -> Result<u64> {
        let payload = serde_json::to_vec(document)?;
        let field_count = document.as_object().map(|o| o.len()).unwrap_or(0) as u32;
        let record = RecordHeader::for_payload(id, &payload, field_count, flags, timestamp)?;

        let file = self.pool.acquire(&self.db, &self.name, &self.data_path)?;
        let data = DataFile::new(&file, self.sync_strategy);
        let mut header = data.header_or_init(self.schema.checksum())?;
        data.append(&mut header, &record, &payload)
    }

    /// Publish a freshly appended version to live map, indexes and cache
    fn apply_version(&self, id: &str, offset: u64, document: Value) {
        let mut state = self.state.write();
        state.index.insert_document(&document, offset);
        state.live.insert(id.to_string(), offset);
        drop(state);
        self.cache.put(id, Arc::new(document));
    }

    /// Cached or on-disk live version of `id` (caller holds a lock)
    fn load_live(&self, id: &str) -> Result<Option<Arc<Value>>> {
        let Some(offset) = self.state.read().live.get(id).copied() else {
            return Ok(None);
        };

        if let Some(doc) = self.cache.get(id) {
            return Ok(Some(doc));
        }

        let file = self.pool.acquire(&self.db, &self.name, &self.data_path)?;
        let data = DataFile::new(&file, self.sync_strategy);
        let header = data
            .read_header()?
            .ok_or_else(|| AtlasError::Corruption(format!("{}/{} has no data file header", self.db, self.name)))?;
        let record = data.read_at(&header, offset)?;
        if record.header.id_str().ok() != Some(id) {
            tracing::warn!(
                "Record at {} in {}/{} does not belong to instance {}",
                offset,
                self.db,
                self.name,
                id
            );
            return Ok(None);
        }
        let doc = Arc::new(serde_json::from_slice::<Value>(&record.payload)?);

        self.cache.put(id, Arc::clone(&doc));
        Ok(Some(doc))
    }
}

/// Decode `record` if it is the live version of its id
fn live_document(live: &HashMap<String, u64>, record: &StoredRecord) -> Option<Value> {
    if record.header.is_tombstone() {
        return None;
    }
    let id = record.header.id_str().ok()?;
    if live.get(id) != Some(&record.offset) {
        return None;
    }
    serde_json::from_slice(&record.payload).ok()
}
