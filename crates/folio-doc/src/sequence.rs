//! Ordered, dense block container for one document.
//!
//! [`BlockSequence`] is the only owner of a document's blocks on the client.
//! All structural changes go through the [`ordering`](crate::ordering)
//! engine, so `order` always equals position after every call. Content edits
//! (`update`, `retype`) never touch `order`.

use folio_types::{Block, BlockContent, BlockId, PermanentId, Retype, TempId};
use tracing::trace;

use crate::error::DocError;
use crate::ordering::{self, Mutation};
use crate::Result;

/// Ordered blocks of one document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockSequence {
    blocks: Vec<Block>,
}

impl BlockSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from blocks in any order; sorts by stored `order` then reindexes
    /// so gaps or duplicates from storage are healed.
    pub fn from_blocks(mut blocks: Vec<Block>) -> Self {
        blocks.sort_by_key(|b| b.order);
        ordering::reindex(&mut blocks);
        Self { blocks }
    }

    // =========================================================================
    // Read accessors
    // =========================================================================

    /// Blocks in document order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub fn position(&self, id: &BlockId) -> Option<usize> {
        self.blocks.iter().position(|b| &b.id == id)
    }

    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| &b.id == id)
    }

    /// Ids in document order.
    pub fn ids(&self) -> Vec<BlockId> {
        self.blocks.iter().map(|b| b.id).collect()
    }

    /// `(id, order)` pairs for a bulk reorder call.
    pub fn order_pairs(&self) -> Vec<(BlockId, u32)> {
        ordering::order_pairs(&self.blocks)
    }

    pub fn is_dense(&self) -> bool {
        ordering::is_dense(&self.blocks)
    }

    // =========================================================================
    // Structural mutations
    // =========================================================================

    /// Apply a structural mutation through the ordering engine.
    pub fn apply(&mut self, mutation: Mutation) -> Result<()> {
        self.blocks = ordering::apply(&self.blocks, mutation)?;
        Ok(())
    }

    /// Insert at `index`; the block's `order` is overwritten.
    pub fn insert(&mut self, index: usize, block: Block) -> Result<()> {
        self.apply(Mutation::Insert { index, block })
    }

    /// Remove a block, returning its former index and the block.
    pub fn remove(&mut self, id: &BlockId) -> Result<(usize, Block)> {
        let (blocks, index, removed) = ordering::delete(&self.blocks, id)?;
        self.blocks = blocks;
        Ok((index, removed))
    }

    /// Swap a temporary id for its permanent one, in place.
    pub fn commit_id(&mut self, temp: TempId, permanent: PermanentId) -> Result<usize> {
        let from = BlockId::Pending(temp);
        let index = self.position(&from).ok_or(DocError::BlockNotFound(from))?;
        self.blocks[index].id = BlockId::Committed(permanent);
        trace!(%temp, %permanent, index, "committed block id");
        Ok(index)
    }

    // =========================================================================
    // Content mutations
    // =========================================================================

    /// Replace a block's content (which may change its kind).
    ///
    /// Returns the previous content.
    pub fn set_content(&mut self, id: &BlockId, content: BlockContent) -> Result<BlockContent> {
        let block = self.block_mut(id)?;
        Ok(std::mem::replace(&mut block.content, content))
    }

    /// Retype in place. Returns the previous content.
    pub fn retype(&mut self, id: &BlockId, target: Retype) -> Result<BlockContent> {
        let block = self.block_mut(id)?;
        let before = block.content.clone();
        block.retype(target);
        Ok(before)
    }

    fn block_mut(&mut self, id: &BlockId) -> Result<&mut Block> {
        self.blocks
            .iter_mut()
            .find(|b| &b.id == id)
            .ok_or(DocError::BlockNotFound(*id))
    }
}

// ============================================================================
// Tests
// ============================================================================
