//! Durable block storage contract.
//!
//! The store never talks to storage directly; it enqueues commands that the
//! persistence queue turns into calls on a [`BlockPersistence`]. Every call
//! addresses blocks by [`PermanentId`]; temporary identities never leave the
//! client.

use async_trait::async_trait;
use folio_types::{Block, BlockContent, BlockId, DocumentId, PermanentId, Provenance};

/// Errors reported by a persistence backend.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PersistError {
    /// The backend refused the request.
    #[error("persistence rejected {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },

    /// The addressed block does not exist in storage.
    #[error("unknown block: {0}")]
    UnknownBlock(PermanentId),

    /// The stored payload could not be decoded.
    #[error("corrupt block {id}: {reason}")]
    Corrupt { id: PermanentId, reason: String },

    /// The persistence queue is gone.
    #[error("persistence queue shut down")]
    Shutdown,
}

impl PersistError {
    pub fn rejected(operation: &'static str, reason: impl Into<String>) -> Self {
        PersistError::Rejected {
            operation,
            reason: reason.into(),
        }
    }
}

/// Result type for persistence calls.
pub type PersistResult<T> = std::result::Result<T, PersistError>;

/// A block to be created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewBlock {
    pub content: BlockContent,
    /// Insertion position; siblings at or after it shift by one.
    pub order: u32,
    pub provenance: Option<Provenance>,
}

/// A block as the backend stores it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredBlock {
    pub id: PermanentId,
    pub document_id: DocumentId,
    pub content: BlockContent,
    pub order: u32,
    pub provenance: Option<Provenance>,
}

impl StoredBlock {
    /// The committed client-side view of this block.
    pub fn into_block(self) -> Block {
        let block = Block::with_content(BlockId::Committed(self.id), self.content, self.order);
        match self.provenance {
            Some(p) => block.with_provenance(p),
            None => block,
        }
    }
}

/// Durable block storage, keyed by permanent id.
///
/// Implementations keep each document's `order` values dense: `create_block`
/// shifts siblings at or after the requested order (clamping past-the-end
/// orders to an append) and `delete_block` closes the gap.
#[async_trait]
pub trait BlockPersistence: Send + Sync {
    /// All blocks of a document, sorted by order.
    async fn load_blocks(&self, document_id: DocumentId) -> PersistResult<Vec<StoredBlock>>;

    /// Insert a block and assign its permanent id.
    async fn create_block(
        &self,
        document_id: DocumentId,
        block: NewBlock,
    ) -> PersistResult<StoredBlock>;

    /// Replace a block's content (the kind travels with the content).
    async fn update_block(
        &self,
        id: PermanentId,
        content: BlockContent,
    ) -> PersistResult<StoredBlock>;

    async fn delete_block(&self, id: PermanentId) -> PersistResult<()>;

    /// Apply `(id, order)` pairs as one unit.
    async fn reorder_blocks(
        &self,
        document_id: DocumentId,
        pairs: Vec<(PermanentId, u32)>,
    ) -> PersistResult<()>;
}
