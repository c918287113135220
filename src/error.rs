// src/error.rs

use crate::common::Address;
use thiserror::Error;

/// Error type for the local chunk store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    #[error("Not found in {index} index: {}", hex::encode(address))]
    NotFound {
        index: &'static str,
        address: Address,
    },

    #[error("Invalid proximity bin: {0}")]
    InvalidBin(u8),

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error("Bin id allocation failed for bin {bin}: {source}")]
    Sequencer {
        bin: u8,
        #[source]
        source: Box<StoreError>,
    },

    #[error("Checksum mismatch: {context}")]
    ChecksumMismatch { context: String },

    #[error("Failed to decode record: {0}")]
    Decode(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bincode serialization/deserialization error: {source}")]
    Bincode {
        #[from]
        source: bincode::Error,
    },

    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// True for the hard not-found variant.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
