//! Tests for the collection lock and lock file
//!
//! These tests verify:
//! - Readers share the lock
//! - A writer waits for active readers
//! - A queued writer holds back new readers
//! - Acquisitions time out instead of hanging
//! - The lock file excludes a second holder

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use atlasdb::sync::{CollectionLock, FileLock};
use atlasdb::AtlasError;
use tempfile::TempDir;

const LONG: Duration = Duration::from_secs(5);

#[test]
fn test_readers_run_in_parallel() {
    let lock = Arc::new(CollectionLock::new(LONG));
    let barrier = Arc::new(Barrier::new(3));

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let _guard = lock.read().unwrap();
                // Deadlocks unless all three hold the read lock at once
                barrier.wait();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(lock.state().active_readers, 0);
}

#[test]
fn test_writer_waits_for_readers() {
    let lock = Arc::new(CollectionLock::new(LONG));
    let written = Arc::new(AtomicBool::new(false));

    let reader = lock.read().unwrap();

    let writer = {
        let lock = Arc::clone(&lock);
        let written = Arc::clone(&written);
        thread::spawn(move || {
            let _guard = lock.write().unwrap();
            written.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!written.load(Ordering::SeqCst));
    assert_eq!(lock.state().waiting_writers, 1);

    drop(reader);
    writer.join().unwrap();
    assert!(written.load(Ordering::SeqCst));
    assert!(!lock.state().writer_active);
}

#[test]
fn test_waiting_writer_blocks_new_readers() {
    let lock = Arc::new(CollectionLock::new(LONG));
    let first_reader = lock.read().unwrap();

    let writer = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            let _guard = lock.write().unwrap();
            thread::sleep(Duration::from_millis(50));
        })
    };

    // Let the writer queue up
    while lock.state().waiting_writers == 0 {
        thread::sleep(Duration::from_millis(1));
    }

    // A new reader must not slip in ahead of the queued writer
    let err = lock.read_timeout(Duration::from_millis(100)).err();
    assert!(matches!(err, Some(AtlasError::LockTimeout(_))));

    drop(first_reader);
    writer.join().unwrap();

    // Once the writer is done readers proceed
    assert!(lock.read_timeout(Duration::from_millis(100)).is_ok());
}

#[test]
fn test_writers_are_exclusive() {
    let lock = Arc::new(CollectionLock::new(LONG));
    let inside = Arc::new(AtomicBool::new(false));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let inside = Arc::clone(&inside);
            thread::spawn(move || {
                for _ in 0..20 {
                    let _guard = lock.write().unwrap();
                    assert!(!inside.swap(true, Ordering::SeqCst));
                    thread::yield_now();
                    inside.store(false, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_write_timeout_releases_waiting_slot() {
    let lock = CollectionLock::new(LONG);
    let reader = lock.read().unwrap();

    let start = Instant::now();
    let err = lock.write_timeout(Duration::from_millis(50)).err();
    assert!(matches!(err, Some(AtlasError::LockTimeout(_))));
    assert!(start.elapsed() >= Duration::from_millis(50));

    // The abandoned writer no longer blocks readers
    assert_eq!(lock.state().waiting_writers, 0);
    assert!(lock.read_timeout(Duration::from_millis(50)).is_ok());
    drop(reader);
}

#[test]
fn test_file_lock_excludes_second_holder() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(".lock");

    let held = FileLock::acquire(&path, Duration::from_millis(100)).unwrap();
    assert_eq!(held.path(), path.as_path());

    let err = FileLock::acquire(&path, Duration::from_millis(50)).err();
    assert!(matches!(err, Some(AtlasError::LockTimeout(_))));

    drop(held);
    assert!(FileLock::acquire(&path, Duration::from_millis(100)).is_ok());
}
