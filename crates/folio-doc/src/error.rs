//! Error types for document operations.

use folio_types::{BlockId, BlockKind};
use thiserror::Error;

/// Errors that can occur while mutating a block sequence.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DocError {
    /// Block not found in the sequence.
    #[error("block not found: {0:?}")]
    BlockNotFound(BlockId),

    /// Position outside the sequence.
    #[error("index {index} out of range for sequence of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Block id already present.
    #[error("block already exists: {0:?}")]
    DuplicateBlock(BlockId),

    /// Content of one kind supplied where another was required.
    #[error("expected {expected} content, found {found}")]
    KindMismatch { expected: BlockKind, found: BlockKind },
}
