//! Shared identity and block types for folio.
//!
//! This crate is the leaf of the workspace: typed IDs, the block entity and
//! its content payloads. It has **no internal folio dependencies**.
//!
//! # Entity Overview
//!
//! ```text
//! Document (DocumentId) ← a summary or exercise sheet
//!     └── owns an ordered sequence of Block
//!
//! Block (BlockId) ← Pending(TempId) until persisted, then Committed(PermanentId)
//!     └── kind: text | formula | image | pending-image
//!     └── content: payload shaped by kind
//!     └── order: dense position 0..N-1 within its document
//!     └── provenance: optional (source page, source FileId)
//! ```
//!
//! # Key Types
//!
//! |-------------------|----------------------------------------------|
//! | Type              | Purpose                                      |
//! |-------------------|----------------------------------------------|
//! | [`DocumentId`]    | Which document owns a block                  |
//! | [`TempId`]        | Client-minted identity before persistence    |
//! | [`PermanentId`]   | Identity assigned by the persistence layer   |
//! | [`BlockId`]       | `Pending(TempId)` or `Committed(PermanentId)` |
//! | [`FileId`]        | An uploaded input file (provenance target)   |
//! | [`Block`]         | The unit of document content                 |
//! | [`BlockContent`]  | Kind-shaped payload                          |
//! |-------------------|----------------------------------------------|

pub mod block;
pub mod content;
pub mod ids;

pub use block::{Block, BlockId, BlockKind, Provenance, Retype};
pub use content::{
    BlockContent, ContentError, ImageSource, PendingImage, RichText, SizeHint, TextVariant,
};
pub use ids::{DocumentId, FileId, PermanentId, TempId};
