//! Engine Module
//!
//! The database engine that coordinates all components.
//!
//! ## Responsibilities
//! - Create/delete/list databases and collections on disk
//! - Hand out one shared `Collection` handle per collection
//! - Route commands to collection operations
//! - Build the JSON result every front end (HTTP, CLI) returns

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::{json, Value};

use crate::cache::CacheStats;
use crate::collection::{Collection, ID_FIELD};
use crate::config::Config;
use crate::error::{AtlasError, Result};
use crate::protocol::Command;
use crate::query::Query;
use crate::schema::Schema;
use crate::storage::{validate_name, FilePool, Layout};

type CollectionKey = (String, String);

/// The main database engine
///
/// ## Concurrency Model
///
/// - `collections`: map of open handles behind an RwLock. Lookups take the
///   read side; opening, creating and deleting take the write side.
/// - Each `Collection` carries its own writer-preferring lock, so work on
///   different collections never serializes.
/// - Deletes hold the map's write side while they wait for the collection
///   lock and remove the directory, so no new handle can be opened for a
///   directory that is being removed.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Paths under the base directory
    layout: Layout,

    /// Reusable data file handles
    pool: Arc<FilePool>,

    /// Open collection handles
    collections: RwLock<HashMap<CollectionKey, Arc<Collection>>>,

    /// Process start, for uptime reporting
    started: Instant,
}

impl Engine {
    /// Open an engine rooted at `config.data_dir`, creating it if missing
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;

        tracing::info!("Engine opened at {}", config.data_dir.display());

        Ok(Self {
            layout: Layout::new(&config.data_dir),
            pool: Arc::new(FilePool::new(config.file_pool_size)),
            collections: RwLock::new(HashMap::new()),
            started: Instant::now(),
            config,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Execute a command
    ///
    /// Returns the JSON body the API answers with (always carrying
    /// `"success": true`; failures come back as `Err`).
    pub fn execute(&self, command: Command) -> Result<Value> {
        tracing::trace!("Executing {}", command.name());

        match command {
            Command::ListDatabases => {
                let databases = self.list_databases()?;
                Ok(json!({ "success": true, "count": databases.len(), "databases": databases }))
            }
            Command::CreateDatabase { name } => {
                self.create_database(&name)?;
                Ok(json!({ "success": true, "message": "Database created", "database": name }))
            }
            Command::DeleteDatabase { name } => {
                self.delete_database(&name)?;
                Ok(json!({ "success": true, "message": "Database deleted", "database": name }))
            }
            Command::ListCollections { db } => {
                let collections = self.list_collections(&db)?;
                Ok(json!({
                    "success": true,
                    "database": db,
                    "count": collections.len(),
                    "collections": collections,
                }))
            }
            Command::CreateCollection { db, name, schema } => {
                let schema_json = schema.to_json();
                self.create_collection(&db, &name, schema)?;
                Ok(json!({
                    "success": true,
                    "message": "Collection created",
                    "database": db,
                    "collection": name,
                    "schema": schema_json,
                }))
            }
            Command::DeleteCollection { db, name } => {
                self.delete_collection(&db, &name)?;
                Ok(json!({
                    "success": true,
                    "message": "Collection deleted",
                    "database": db,
                    "collection": name,
                }))
            }
            Command::GetSchema { db, collection } => {
                let schema = self.schema(&db, &collection)?;
                Ok(json!({
                    "success": true,
                    "database": db,
                    "collection": collection,
                    "schema": schema.to_json(),
                }))
            }
            Command::Stats { db, collection } => {
                let stats = self.collection(&db, &collection)?.stats()?;
                Ok(json!({ "success": true, "stats": stats }))
            }
            Command::Insert { db, collection, document } => {
                let stored = self.insert(&db, &collection, document)?;
                Ok(json!({ "success": true, "id": stored[ID_FIELD], "instance": stored }))
            }
            Command::Find { db, collection, query } => {
                let instances = self.find(&db, &collection, &query)?;
                Ok(json!({ "success": true, "count": instances.len(), "instances": instances }))
            }
            Command::GetInstance { db, collection, id } => {
                let instance = self.get_instance(&db, &collection, &id)?;
                Ok(json!({ "success": true, "instance": *instance }))
            }
            Command::Update { db, collection, id, document } => {
                let instance = self.update_instance(&db, &collection, &id, document)?;
                Ok(json!({ "success": true, "id": id, "instance": instance }))
            }
            Command::DeleteInstance { db, collection, id } => {
                let deleted = self.delete_instance(&db, &collection, &id)?;
                Ok(json!({ "success": true, "id": id, "deleted": deleted }))
            }
        }
    }

    // =========================================================================
    // Databases
    // =========================================================================

    pub fn create_database(&self, name: &str) -> Result<()> {
        self.layout.create_database(name)?;
        tracing::info!("Created database {}", name);
        Ok(())
    }

    /// Remove a database recursively. Absent databases are not an error.
    pub fn delete_database(&self, name: &str) -> Result<()> {
        validate_name("database", name)?;

        self.drop_handles(|db, _| db == name)?;

        let mut collections = self.collections.write();
        detach(&mut collections, |db, _| db == name);
        self.layout.delete_database(name)?;
        drop(collections);

        self.pool.purge_database(name);
        tracing::info!("Deleted database {}", name);
        Ok(())
    }

    pub fn list_databases(&self) -> Result<Vec<String>> {
        self.layout.list_databases()
    }

    pub fn database_exists(&self, name: &str) -> bool {
        validate_name("database", name).is_ok() && self.layout.database_exists(name)
    }

    // =========================================================================
    // Collections
    // =========================================================================

    /// Create a collection; the database must exist and the collection not.
    ///
    /// The map lock is held from directory creation until the handle is
    /// published, so no concurrent lookup caches a handle opened halfway.
    pub fn create_collection(&self, db: &str, name: &str, schema: Schema) -> Result<()> {
        let mut collections = self.collections.write();
        self.layout.create_collection(db, name, &schema.to_text())?;

        let opened = Collection::open(&self.layout, db, name, Arc::clone(&self.pool), &self.config)
            .and_then(|handle| {
                {
                    let _guard = handle.lock().write()?;
                    handle.init_data_file()?;
                }
                Ok(handle)
            });
        let handle = match opened {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                if let Err(cleanup) = self.layout.delete_collection(db, name) {
                    tracing::warn!("Could not remove half-created {}/{}: {}", db, name, cleanup);
                }
                return Err(e);
            }
        };

        if let Some(stale) = collections.insert((db.to_string(), name.to_string()), Arc::clone(&handle)) {
            stale.mark_dropped();
        }
        drop(collections);

        tracing::info!(
            "Created collection {}/{} ({} field(s))",
            db,
            name,
            handle.schema().fields().len()
        );
        Ok(())
    }

    /// Remove a collection. Absent collections are not an error.
    pub fn delete_collection(&self, db: &str, name: &str) -> Result<()> {
        validate_name("database", db)?;
        validate_name("collection", name)?;

        let matches = |d: &str, c: &str| d == db && c == name;
        self.drop_handles(matches)?;

        let mut collections = self.collections.write();
        detach(&mut collections, matches);
        self.layout.delete_collection(db, name)?;
        drop(collections);

        self.pool.purge_collection(db, name);
        tracing::info!("Deleted collection {}/{}", db, name);
        Ok(())
    }

    pub fn list_collections(&self, db: &str) -> Result<Vec<String>> {
        self.layout.list_collections(db)
    }

    pub fn schema(&self, db: &str, collection: &str) -> Result<Schema> {
        Ok(self.collection(db, collection)?.schema().clone())
    }

    /// Shared handle for a collection, opening it on first use
    pub fn collection(&self, db: &str, name: &str) -> Result<Arc<Collection>> {
        let key = (db.to_string(), name.to_string());
        if let Some(handle) = self.collections.read().get(&key) {
            return Ok(Arc::clone(handle));
        }

        validate_name("database", db)?;
        validate_name("collection", name)?;
        if !self.layout.database_exists(db) {
            return Err(AtlasError::DatabaseNotFound(db.to_string()));
        }
        if !self.layout.collection_exists(db, name) {
            return Err(AtlasError::CollectionNotFound(format!("{}/{}", db, name)));
        }

        // Scan outside the map lock; a racing opener may win below
        let opened = Collection::open(&self.layout, db, name, Arc::clone(&self.pool), &self.config)?;

        let mut collections = self.collections.write();
        if let Some(handle) = collections.get(&key) {
            return Ok(Arc::clone(handle));
        }
        // Deleted while we were scanning
        if !self.layout.collection_exists(db, name) {
            return Err(AtlasError::CollectionNotFound(format!("{}/{}", db, name)));
        }

        let handle = Arc::new(opened);
        collections.insert(key, Arc::clone(&handle));
        Ok(handle)
    }

    /// Detach matching handles, then wait for their in-flight operations.
    ///
    /// Handles are marked dropped before the map lock is released, so any
    /// operation that gets their lock afterwards reports not-found. The
    /// waits happen without the map lock held.
    fn drop_handles(&self, matches: impl Fn(&str, &str) -> bool) -> Result<()> {
        let detached = detach(&mut self.collections.write(), matches);
        for handle in detached {
            let _guard = handle.lock().write()?;
        }
        Ok(())
    }

    // =========================================================================
    // Instances
    // =========================================================================

    /// Insert a document; returns it with `_id` and `_created_at` set
    pub fn insert(&self, db: &str, collection: &str, document: Value) -> Result<Value> {
        self.collection(db, collection)?.insert(document)
    }

    /// Instances matching a `field:value,...` query (empty: all)
    pub fn find(&self, db: &str, collection: &str, query: &str) -> Result<Vec<Value>> {
        let query = Query::parse(query)?;
        self.collection(db, collection)?.find(&query)
    }

    pub fn get_instance(&self, db: &str, collection: &str, id: &str) -> Result<Arc<Value>> {
        self.collection(db, collection)?
            .get(id)?
            .ok_or_else(|| AtlasError::InstanceNotFound(id.to_string()))
    }

    pub fn update_instance(&self, db: &str, collection: &str, id: &str, patch: Value) -> Result<Value> {
        self.collection(db, collection)?.update(id, patch)
    }

    /// Delete an instance; returns whether it was live
    pub fn delete_instance(&self, db: &str, collection: &str, id: &str) -> Result<bool> {
        self.collection(db, collection)?.delete(id)
    }

    // =========================================================================
    // Accessors (for health checks and testing)
    // =========================================================================

    /// Cache counters summed over every open collection
    pub fn cache_stats(&self) -> CacheStats {
        self.collections
            .read()
            .values()
            .map(|c| c.cache_stats())
            .fold(CacheStats::default(), |acc, s| CacheStats {
                hits: acc.hits + s.hits,
                misses: acc.misses + s.misses,
                evictions: acc.evictions + s.evictions,
                size: acc.size + s.size,
                capacity: acc.capacity + s.capacity,
            })
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn file_pool(&self) -> &FilePool {
        &self.pool
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Drop open handles and pooled files
    pub fn close(&self) {
        self.collections.write().clear();
        self.pool.clear();
        tracing::info!("Engine closed");
    }
}

/// Remove matching handles from the map and mark them dropped
fn detach(
    collections: &mut HashMap<CollectionKey, Arc<Collection>>,
    matches: impl Fn(&str, &str) -> bool,
) -> Vec<Arc<Collection>> {
    let keys: Vec<CollectionKey> = collections
        .keys()
        .filter(|(db, name)| matches(db, name))
        .cloned()
        .collect();

    keys.iter()
        .filter_map(|key| collections.remove(key))
        .inspect(|handle| handle.mark_dropped())
        .collect()
}
