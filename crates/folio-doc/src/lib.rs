//! Client-side document structure for folio.
//!
//! Owns the ordered block sequence of one open document and the transient
//! selection over it. Everything here is synchronous and free of I/O; the
//! optimistic store in `folio-client` drives these types and forwards
//! persistence calls.
//!
//! # Ordering
//!
//! Every structural change goes through [`ordering`], which returns a
//! sequence whose `order` values are exactly `0..N-1` by position. Group
//! moves position the selection relative to an anchor block; see the module
//! docs for the details.
//!
//! # Selection
//!
//! [`Selection`] is a three-state machine (`None`, `Single`, `Multi`) driven
//! by clicks with optional toggle/range modifiers. It is never persisted.

mod error;
pub mod ordering;
pub mod selection;
mod sequence;

pub use error::DocError;
pub use ordering::Mutation;
pub use selection::{Modifiers, Selection, SelectionState};
pub use sequence::BlockSequence;

/// Result type for document operations.
pub type Result<T> = std::result::Result<T, DocError>;
