//! Worker Pool
//!
//! Fixed number of worker threads pulling jobs from a bounded queue.
//!
//! ```text
//!   accept loop ──send_timeout──► [ bounded queue ] ──recv_timeout──► worker 0..N
//! ```
//!
//! - Producers block up to `submit_timeout` when the queue is full, then get
//!   `ResourceExhausted`
//! - Workers wake every `POLL_INTERVAL` to notice shutdown
//! - A panicking job is contained; the worker keeps running

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::Mutex;

use crate::error::{AtlasError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// How long an idle worker waits before re-checking the running flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Bounded worker pool
pub struct ThreadPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
    completed: Arc<AtomicU64>,
    submit_timeout: Duration,
}

impl ThreadPool {
    /// Spawn `size` workers sharing a queue of `capacity` jobs
    pub fn new(size: usize, capacity: usize, submit_timeout: Duration) -> Result<Self> {
        if size == 0 {
            return Err(AtlasError::Config("worker pool needs at least one thread".to_string()));
        }

        let (sender, receiver) = bounded::<Job>(capacity.max(1));
        let running = Arc::new(AtomicBool::new(true));
        let completed = Arc::new(AtomicU64::new(0));

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let receiver = receiver.clone();
            let running = Arc::clone(&running);
            let completed = Arc::clone(&completed);
            let handle = thread::Builder::new()
                .name(format!("atlasdb-worker-{}", id))
                .spawn(move || worker_loop(id, receiver, running, completed))?;
            workers.push(handle);
        }

        tracing::debug!("Started {} worker(s), queue capacity {}", size, capacity);

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            running,
            completed,
            submit_timeout,
        })
    }

    /// Queue a job, waiting up to the submit timeout for space
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = match self.sender.lock().as_ref() {
            Some(sender) if self.running.load(Ordering::SeqCst) => sender.clone(),
            _ => return Err(AtlasError::ResourceExhausted("worker pool is shut down".to_string())),
        };

        match sender.send_timeout(Box::new(job), self.submit_timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                Err(AtlasError::ResourceExhausted("worker queue is full".to_string()))
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                Err(AtlasError::ResourceExhausted("worker pool is shut down".to_string()))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn size(&self) -> usize {
        self.workers.lock().len()
    }

    /// Jobs finished so far (panicked ones included)
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Stop accepting jobs, let workers drain the queue, and join them
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.sender.lock().take();

        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                tracing::warn!("Worker thread exited with a panic");
            }
        }
        tracing::debug!("Worker pool stopped");
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(id: usize, receiver: Receiver<Job>, running: Arc<AtomicBool>, completed: Arc<AtomicU64>) {
    loop {
        match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(job) => {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::error!("Job panicked on worker {}", id);
                }
                completed.fetch_add(1, Ordering::Relaxed);
            }
            // Queued jobs still run after shutdown; exit once it is empty
            Err(RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::trace!("Worker {} exiting", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn runs_all_jobs_before_shutdown_returns() {
        let pool = ThreadPool::new(4, 16, Duration::from_secs(1)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        assert!(pool.submit(|| {}).is_err());
    }

    #[test]
    fn full_queue_times_out() {
        let pool = ThreadPool::new(1, 1, Duration::from_millis(20)).unwrap();
        let (gate_tx, gate_rx) = crossbeam::channel::bounded::<()>(0);

        // Occupy the worker, then fill the single queue slot
        pool.submit(move || {
            let _ = gate_rx.recv();
        })
        .unwrap();
        thread::sleep(Duration::from_millis(50));
        pool.submit(|| {}).unwrap();

        let err = pool.submit(|| {}).unwrap_err();
        assert!(matches!(err, AtlasError::ResourceExhausted(_)));

        drop(gate_tx);
        pool.shutdown();
    }

    #[test]
    fn panicking_job_does_not_kill_worker() {
        let pool = ThreadPool::new(1, 4, Duration::from_secs(1)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        pool.submit(|| panic!("boom")).unwrap();
        let c = Arc::clone(&counter);
        pool.submit(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(pool.completed(), 2);
    }
}
