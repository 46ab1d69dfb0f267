//! Error types for LodestoneDB.

use thiserror::Error;

/// Result type alias using LodestoneError.
pub type Result<T> = std::result::Result<T, LodestoneError>;

/// Errors that can occur in LodestoneDB operations.
#[derive(Debug, Error)]
pub enum LodestoneError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Buffer pool errors
    #[error("Buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    #[error("Page not found: {page_id}")]
    PageNotFound { page_id: i64 },

    // Index errors
    #[error("Duplicate key")]
    DuplicateKey,

    #[error("Key not found")]
    KeyNotFound,

    #[error("Header page full: {capacity} records")]
    HeaderFull { capacity: usize },

    #[error("Record not found in header page: {0}")]
    RecordNotFound(String),

    #[error("B+ tree corrupted: {0}")]
    TreeCorrupted(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}
