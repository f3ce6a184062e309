//! Concurrency primitives
//!
//! - `CollectionLock`: in-process readers/writer lock per collection
//! - `FileLock`: cross-process advisory lock on the collection's write path

mod collection_lock;
mod file_lock;

pub use collection_lock::{CollectionLock, LockState, ReadGuard, WriteGuard};
pub use file_lock::FileLock;
