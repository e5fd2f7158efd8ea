//! Error types for the Pilum index engine.
//!
//! All fallible operations in this crate return [`Result`], whose error type
//! is the [`PilumError`] enum. Construction-time failures abort the current
//! build attempt; nothing partially written is ever published.
//!
//! # Examples
//!
//! ```
//! use pilum::error::{PilumError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(PilumError::invalid_argument("Invalid input"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Pilum operations.
#[derive(Error, Debug)]
pub enum PilumError {
    /// I/O errors (disk full, permissions, missing files, ...)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Index-related errors
    #[error("Index error: {0}")]
    Index(String),

    /// Storage-related errors (memory maps, file arrays)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Journal reading or writing errors
    #[error("Journal error: {0}")]
    Journal(String),

    /// Query-related errors
    #[error("Query error: {0}")]
    Query(String),

    /// On-disk data that does not decode
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// A spans file footer carries a version this build cannot read
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(String),

    /// A violated internal invariant; the operation was aborted
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with PilumError.
pub type Result<T> = std::result::Result<T, PilumError>;

impl PilumError {
    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        PilumError::Index(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        PilumError::Storage(msg.into())
    }

    /// Create a new journal error.
    pub fn journal<S: Into<String>>(msg: S) -> Self {
        PilumError::Journal(msg.into())
    }

    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        PilumError::Query(msg.into())
    }

    /// Create a new corruption error.
    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        PilumError::Corruption(msg.into())
    }

    /// Create a new unsupported version error.
    pub fn unsupported_version<S: Into<String>>(msg: S) -> Self {
        PilumError::UnsupportedVersion(msg.into())
    }

    /// Create a new invariant violation error.
    pub fn invariant<S: Into<String>>(msg: S) -> Self {
        PilumError::Invariant(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        PilumError::InvalidArgument(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        PilumError::Other(msg.into())
    }
}
