//! File Connection Pool
//!
//! Keeps open data file handles per (database, collection) so requests do
//! not pay an open/close each time. A handle goes back to the pool when its
//! guard drops and is only closed when the pool for that key is full.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::Result;

type PoolKey = (String, String);

#[derive(Default)]
struct Slot {
    /// Bumped on purge so handles checked out before it get closed on return
    generation: u64,
    idle: Vec<File>,
}

/// Pool of reusable data file handles
pub struct FilePool {
    max_idle_per_key: usize,
    slots: Mutex<HashMap<PoolKey, Slot>>,
    opened: AtomicU64,
    reused: AtomicU64,
}

impl FilePool {
    pub fn new(max_idle_per_key: usize) -> Self {
        Self {
            max_idle_per_key,
            slots: Mutex::new(HashMap::new()),
            opened: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    /// Check out a handle for the collection's data file, opening one if
    /// none is idle.
    pub fn acquire(&self, db: &str, collection: &str, path: &Path) -> Result<PooledFile<'_>> {
        let key = (db.to_string(), collection.to_string());

        let (generation, idle) = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(key.clone()).or_default();
            (slot.generation, slot.idle.pop())
        };

        let file = match idle {
            Some(file) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                file
            }
            None => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(path)?;
                self.opened.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Opened data file {}", path.display());
                file
            }
        };

        Ok(PooledFile {
            pool: self,
            key,
            generation,
            file: Some(file),
        })
    }

    /// Close idle handles for one collection and invalidate checked-out ones
    pub fn purge_collection(&self, db: &str, collection: &str) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(&(db.to_string(), collection.to_string())) {
            slot.generation += 1;
            slot.idle.clear();
        }
    }

    /// Purge every collection of a database
    pub fn purge_database(&self, db: &str) {
        let mut slots = self.slots.lock();
        for ((slot_db, _), slot) in slots.iter_mut() {
            if slot_db == db {
                slot.generation += 1;
                slot.idle.clear();
            }
        }
    }

    /// Close every idle handle
    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    /// Idle handles currently pooled for a collection
    pub fn idle_count(&self, db: &str, collection: &str) -> usize {
        self.slots
            .lock()
            .get(&(db.to_string(), collection.to_string()))
            .map(|slot| slot.idle.len())
            .unwrap_or(0)
    }

    /// Handles opened since creation
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }

    /// Checkouts served by an idle handle
    pub fn reused(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }

    fn release(&self, key: PoolKey, generation: u64, file: File) {
        let mut slots = self.slots.lock();
        // Slot removed by clear(): the collection is gone, close the handle
        let Some(slot) = slots.get_mut(&key) else {
            return;
        };
        if slot.generation == generation && slot.idle.len() < self.max_idle_per_key {
            slot.idle.push(file);
        }
    }
}

/// A checked-out handle; returns itself to the pool on drop
pub struct PooledFile<'a> {
    pool: &'a FilePool,
    key: PoolKey,
    generation: u64,
    /// Only `None` once dropped
    file: Option<File>,
}

impl Deref for PooledFile<'_> {
    type Target = File;

    fn deref(&self) -> &File {
        match &self.file {
            Some(file) => file,
            None => unreachable!("pooled file used after release"),
        }
    }
}

impl Drop for PooledFile<'_> {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let key = std::mem::take(&mut self.key);
            self.pool.release(key, self.generation, file);
        }
    }
}
