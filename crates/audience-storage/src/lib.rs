//! Key-value persistence for visitor state.
//!
//! The [`DataStore`] trait is the only thing the state store knows about
//! persistence. The SQLite database implements it for real runs and
//! [`MemoryDataStore`] stands in for tests and for hosts without a disk.

mod keys;
mod memory;
mod traits;

pub use keys::StorageKeys;
pub use memory::MemoryDataStore;
pub use traits::DataStore;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific failure (database locked, disk full, ...)
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Stored value could not be decoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Backend is not reachable at all
    #[error("Storage unavailable")]
    Unavailable,
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
