//! Error types for AtlasDB
//!
//! Provides a unified error type for all operations, plus the mapping from
//! each error kind to the HTTP status the API answers with.

use thiserror::Error;

/// Result type alias using AtlasError
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Unified error type for AtlasDB operations
#[derive(Debug, Error)]
pub enum AtlasError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Validation Errors
    // -------------------------------------------------------------------------
    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Data corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Lock timeout: {0}")]
    LockTimeout(String),
}

impl AtlasError {
    /// HTTP status code the API reports for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AtlasError::InvalidName(_)
            | AtlasError::InvalidSchema(_)
            | AtlasError::Validation(_)
            | AtlasError::InvalidQuery(_)
            | AtlasError::Serialization(_)
            | AtlasError::Protocol(_) => 400,

            AtlasError::DatabaseNotFound(_)
            | AtlasError::CollectionNotFound(_)
            | AtlasError::InstanceNotFound(_) => 404,

            AtlasError::AlreadyExists(_) => 409,

            AtlasError::LockTimeout(_) | AtlasError::ResourceExhausted(_) => 503,

            AtlasError::Io(_) | AtlasError::Corruption(_) | AtlasError::Config(_) => 500,
        }
    }

    /// Whether the error was caused by the caller's input (never retried)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}
