//! Error types for ingestion and configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort an ingestion run.
///
/// Malformed individual items never produce one of these; they are rejected
/// and logged while the rest of the run proceeds.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The generation output is not JSON at all.
    #[error("generation output is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// JSON, but neither a block array nor an object with `blocks`.
    #[error("generation output has no block list")]
    MissingBlocks,

    /// The materialized blocks could not be placed in the store.
    #[error("document error: {0}")]
    Document(#[from] folio_doc::DocError),
}

/// Errors loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Errors from an image lookup backend.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("lookup request failed: {0}")]
    Request(String),

    #[error("lookup response malformed: {0}")]
    Response(String),
}

/// Result type for ingestion.
pub type Result<T> = std::result::Result<T, IngestError>;
