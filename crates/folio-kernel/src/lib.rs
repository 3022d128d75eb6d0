//! # folio-kernel
//!
//! Ingestion for folio documents: turns loosely typed generation output into
//! an ordered sequence of typed blocks and appends it to an
//! [`OptimisticStore`](folio_client::OptimisticStore).
//!
//! - [`proposal`]: untrusted JSON into [`ParsedItem`]s
//! - [`materializer`]: proposals into blocks under a [`ResolutionPolicy`]
//! - [`provenance`]: matching source-file hints against input files
//! - [`lookup`]: optional external image search
//! - [`ingest`]: the whole pipeline
//! - [`db`]: SQLite [`BlockPersistence`](folio_client::BlockPersistence)
//! - [`config`]: `folio.toml`

pub mod config;
pub mod db;
mod error;
pub mod ingest;
pub mod lookup;
pub mod materializer;
pub mod proposal;
pub mod provenance;

pub use config::{FolioConfig, IngestConfig, LookupConfig, LookupCredentials};
pub use db::{DocumentMeta, SqlitePersistence};
pub use error::{ConfigError, IngestError, LookupError, Result};
pub use ingest::{DEFAULT_TITLE, IngestReport, ingest};
pub use lookup::{
    GoogleImageSearch, ImageLookup, StaticLookup, lookup_from_config_with,
};
pub use materializer::{MaterializeStats, Materialized, Materializer, ResolutionPolicy, placeholder_markup};
pub use proposal::{GenerationOutput, ParsedItem, Proposal, ProposedKind, parse_generation};
pub use provenance::CandidateFile;
