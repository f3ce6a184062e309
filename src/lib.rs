//! # AtlasDB
//!
//! An embedded, file-backed document database with:
//! - Append-only data files with checksummed records
//! - Optional per-collection schemas with validation
//! - In-memory B-tree secondary indexes and an LRU document cache
//! - Writer-preferring per-collection locking plus a cross-process lock file
//! - A JSON-over-HTTP API and a CLI
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │             HTTP Server (accept loop + rate limit)           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ worker pool
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Router (route table)  /  CLI                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Command
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                          Engine                              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Arc<Collection>
//!          ┌────────────┼─────────────┬──────────────┐
//!          ▼            ▼             ▼              ▼
//!   ┌────────────┐ ┌─────────┐ ┌────────────┐ ┌────────────┐
//!   │ Collection │ │ Schema  │ │  B-tree    │ │ LRU cache  │
//!   │   Lock     │ │         │ │  indexes   │ │            │
//!   └────────────┘ └─────────┘ └────────────┘ └────────────┘
//!                       │
//!                       ▼
//!              ┌─────────────────┐
//!              │ Storage         │
//!              │ (data.adb, pool)│
//!              └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod storage;
pub mod schema;
pub mod index;
pub mod cache;
pub mod sync;
pub mod query;
pub mod collection;
pub mod protocol;
pub mod engine;
pub mod api;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{AtlasError, Result};
pub use config::Config;
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
