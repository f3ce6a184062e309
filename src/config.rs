//! Configuration for AtlasDB
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AtlasError, Result};

/// Environment variable overriding the base storage directory
pub const DATA_DIR_ENV: &str = "ATLASDB_DATA_DIR";

/// Main configuration for an AtlasDB instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Base directory holding every database
    /// Internal structure:
    ///   {data_dir}/
    ///     └── {database}/
    ///         └── {collection}/
    ///             ├── schema.txt
    ///             ├── data.adb
    ///             └── .lock
    pub data_dir: PathBuf,

    /// When to fsync the data file after an append
    pub sync_strategy: SyncStrategy,

    /// Open file handles kept per collection
    pub file_pool_size: usize,

    /// How long a collection read/write lock may be waited on (milliseconds)
    pub lock_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// Max decoded documents held per collection cache
    pub cache_capacity: usize,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Listen host
    pub listen_addr: String,

    /// Listen port
    pub port: u16,

    /// Worker threads serving connections
    pub worker_threads: usize,

    /// Accepted connections that may wait for a worker
    pub queue_capacity: usize,

    /// Connection read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds)
    pub write_timeout_ms: u64,

    /// Largest request body accepted (bytes)
    pub max_body_bytes: usize,

    /// Per-client request limits
    pub rate_limit: RateLimitConfig,
}

/// Data file sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every append (safest, slowest)
    EveryWrite,

    /// Leave flushing to the OS page cache
    OsManaged,
}

/// Fixed-window rate limit settings
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Requests allowed per client within one window
    pub max_requests: u32,

    /// Window length (seconds)
    pub window_secs: u64,

    /// Distinct client addresses tracked before failing open
    pub max_clients: usize,

    /// Never limit loopback clients
    pub exempt_loopback: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 1000,
            window_secs: 60,
            max_clients: 10_000,
            exempt_loopback: true,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./atlasdb_data"),
            sync_strategy: SyncStrategy::EveryWrite,
            file_pool_size: 4,
            lock_timeout_ms: 30_000,
            cache_capacity: 10_000,
            listen_addr: "0.0.0.0".to_string(),
            port: 8080,
            worker_threads: 8,
            queue_capacity: 256,
            read_timeout_ms: 15_000,
            write_timeout_ms: 15_000,
            max_body_bytes: 10 * 1024 * 1024, // 10 MB
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }
        config
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(AtlasError::Config("worker_threads must be > 0".into()));
        }
        if self.queue_capacity == 0 {
            return Err(AtlasError::Config("queue_capacity must be > 0".into()));
        }
        if self.cache_capacity == 0 {
            return Err(AtlasError::Config("cache_capacity must be > 0".into()));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(AtlasError::Config("rate limit window must be > 0".into()));
        }
        Ok(())
    }

    /// `host:port` string for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.port)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the base data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the data file sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the number of pooled file handles per collection
    pub fn file_pool_size(mut self, size: usize) -> Self {
        self.config.file_pool_size = size;
        self
    }

    /// Set the collection lock timeout (in milliseconds)
    pub fn lock_timeout_ms(mut self, ms: u64) -> Self {
        self.config.lock_timeout_ms = ms;
        self
    }

    /// Set the per-collection cache capacity
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    /// Set the listen host
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the listen port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the worker thread count
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = count;
        self
    }

    /// Set the connection queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the largest accepted request body (in bytes)
    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.config.max_body_bytes = bytes;
        self
    }

    /// Set the rate limit settings
    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.config.rate_limit = rate_limit;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
