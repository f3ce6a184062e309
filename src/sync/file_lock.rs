//! Collection lock file
//!
//! Advisory exclusive lock on `{collection}/.lock`, taken on the write path
//! so a second process touching the same collection is kept out. Acquisition
//! polls with exponential backoff until a deadline.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{AtlasError, Result};

const INITIAL_BACKOFF: Duration = Duration::from_millis(1);
const MAX_BACKOFF: Duration = Duration::from_millis(100);

/// Held exclusive lock on a lock file; unlocked on drop
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Lock `path`, creating it if needed, retrying until `timeout` elapses
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let deadline = Instant::now() + timeout;
        let mut backoff = INITIAL_BACKOFF;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match file.try_lock_exclusive() {
                Ok(()) => {
                    if attempts > 1 {
                        tracing::debug!("Locked {} after {} attempts", path.display(), attempts);
                    }
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    let now = Instant::now();
                    if now >= deadline {
                        tracing::warn!(
                            "Lock file {} still held after {:?} ({} attempts)",
                            path.display(),
                            timeout,
                            attempts
                        );
                        return Err(AtlasError::LockTimeout(format!(
                            "lock file {} held by another process",
                            path.display()
                        )));
                    }
                    thread::sleep(backoff.min(deadline - now));
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}
