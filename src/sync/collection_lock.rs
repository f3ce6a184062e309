//! Collection Lock
//!
//! Writer-preferring readers/writer lock guarding one collection's data
//! file, cache and indexes.
//!
//! ## State
//! `{ active_readers, waiting_writers, writer_active }` behind one mutex.
//!
//! - Readers wait while a writer is active *or queued*, so a steady stream
//!   of readers cannot starve a writer.
//! - A writer registers as waiting first, then waits for the active writer
//!   and all active readers to leave.
//! - Every acquisition gives up after the configured timeout.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{AtlasError, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LockState {
    pub active_readers: usize,
    pub waiting_writers: usize,
    pub writer_active: bool,
}

/// Readers/writer lock with writer preference and bounded waits
pub struct CollectionLock {
    state: Mutex<LockState>,
    readers: Condvar,
    writers: Condvar,
    timeout: Duration,
}

impl CollectionLock {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            readers: Condvar::new(),
            writers: Condvar::new(),
            timeout,
        }
    }

    /// Acquire shared access, waiting up to the lock's timeout
    pub fn read(&self) -> Result<ReadGuard<'_>> {
        self.read_timeout(self.timeout)
    }

    pub fn read_timeout(&self, timeout: Duration) -> Result<ReadGuard<'_>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        while state.writer_active || state.waiting_writers > 0 {
            if self.readers.wait_until(&mut state, deadline).timed_out()
                && (state.writer_active || state.waiting_writers > 0)
            {
                tracing::warn!("Read lock not acquired within {:?}", timeout);
                return Err(AtlasError::LockTimeout(format!(
                    "read lock not acquired within {:?}",
                    timeout
                )));
            }
        }

        state.active_readers += 1;
        Ok(ReadGuard { lock: self })
    }

    /// Acquire exclusive access, waiting up to the lock's timeout
    pub fn write(&self) -> Result<WriteGuard<'_>> {
        self.write_timeout(self.timeout)
    }

    pub fn write_timeout(&self, timeout: Duration) -> Result<WriteGuard<'_>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        state.waiting_writers += 1;

        while state.writer_active || state.active_readers > 0 {
            if self.writers.wait_until(&mut state, deadline).timed_out()
                && (state.writer_active || state.active_readers > 0)
            {
                state.waiting_writers -= 1;
                // Readers held back by this writer may go now
                if state.waiting_writers == 0 {
                    self.readers.notify_all();
                }
                tracing::warn!("Write lock not acquired within {:?}", timeout);
                return Err(AtlasError::LockTimeout(format!(
                    "write lock not acquired within {:?}",
                    timeout
                )));
            }
        }

        state.waiting_writers -= 1;
        state.writer_active = true;
        Ok(WriteGuard { lock: self })
    }

    /// Snapshot of the lock state
    pub fn state(&self) -> LockState {
        *self.state.lock()
    }

    fn release_read(&self) {
        let mut state = self.state.lock();
        state.active_readers -= 1;
        if state.active_readers == 0 && state.waiting_writers > 0 {
            self.writers.notify_one();
        }
    }

    fn release_write(&self) {
        let mut state = self.state.lock();
        state.writer_active = false;
        self.writers.notify_all();
        self.readers.notify_all();
    }
}

/// Shared access; released on drop
pub struct ReadGuard<'a> {
    lock: &'a CollectionLock,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

/// Exclusive access; released on drop
pub struct WriteGuard<'a> {
    lock: &'a CollectionLock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}
