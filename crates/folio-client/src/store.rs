//! Optimistic block store for one open document.
//!
//! Every mutation updates the local [`BlockSequence`] synchronously and then
//! enqueues a persistence command; the UI never waits on storage. Results
//! come back as [`Completion`]s, which the owner applies on its own thread
//! with [`OptimisticStore::apply_completions`] or [`OptimisticStore::settle`].
//!
//! When `rollback_on_failure` is set, failed calls are compensated locally:
//!
//! | Failed call | Local compensation                                   |
//! |-------------|------------------------------------------------------|
//! | create      | remove the temporary block, resync order             |
//! | update      | restore the previous content (if not edited since)   |
//! | delete      | re-insert at the former index, resync order          |
//! | reorder     | flag the store as needing a reload                   |

use std::collections::HashMap;
use std::sync::Arc;

use folio_doc::{BlockSequence, DocError, Modifiers, Mutation, Result, Selection};
use folio_types::{
    Block, BlockContent, BlockId, BlockKind, DocumentId, PermanentId, Retype, TempId,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::persistence::{BlockPersistence, NewBlock, PersistResult, StoredBlock};
use crate::queue::{Command, Completion, QueueHandle, spawn_queue};

// ============================================================================
// Configuration
// ============================================================================

/// Store behavior knobs (the `[store]` config section).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Compensate failed persistence calls locally.
    pub rollback_on_failure: bool,
    /// Log a warning when this many commands are waiting (0 disables).
    pub queue_capacity_warn: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            rollback_on_failure: true,
            queue_capacity_warn: 64,
        }
    }
}

// ============================================================================
// Focus
// ============================================================================

/// Where the caret should land inside a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusEdge {
    Start,
    End,
}

/// Editing focus the UI should apply after a mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FocusRequest {
    pub id: BlockId,
    pub edge: FocusEdge,
}

impl FocusRequest {
    pub fn start(id: BlockId) -> Self {
        Self {
            id,
            edge: FocusEdge::Start,
        }
    }

    pub fn end(id: BlockId) -> Self {
        Self {
            id,
            edge: FocusEdge::End,
        }
    }
}

// ============================================================================
// OptimisticStore
// ============================================================================

/// Client-resident ordered blocks of one document.
pub struct OptimisticStore {
    document_id: DocumentId,
    sequence: BlockSequence,
    selection: Selection,
    persistence: Arc<dyn BlockPersistence>,
    queue: QueueHandle,
    completions: mpsc::UnboundedReceiver<Completion>,
    /// Temporary ids that have been committed, for callers holding stale ids.
    committed: HashMap<TempId, PermanentId>,
    config: StoreConfig,
    needs_reload: bool,
    issued: u64,
}

impl OptimisticStore {
    /// An empty document. Must be called inside a tokio runtime.
    pub fn new(
        document_id: DocumentId,
        persistence: Arc<dyn BlockPersistence>,
        config: StoreConfig,
    ) -> Self {
        Self::with_blocks(document_id, persistence, config, Vec::new())
    }

    /// A document hydrated from already-persisted blocks.
    pub fn with_blocks(
        document_id: DocumentId,
        persistence: Arc<dyn BlockPersistence>,
        config: StoreConfig,
        blocks: Vec<Block>,
    ) -> Self {
        let (queue, completions) =
            spawn_queue(persistence.clone(), document_id, config.queue_capacity_warn);
        Self {
            document_id,
            sequence: BlockSequence::from_blocks(blocks),
            selection: Selection::new(),
            persistence,
            queue,
            completions,
            committed: HashMap::new(),
            config,
            needs_reload: false,
            issued: 0,
        }
    }

    /// Load a document from persistence.
    pub async fn open(
        document_id: DocumentId,
        persistence: Arc<dyn BlockPersistence>,
        config: StoreConfig,
    ) -> PersistResult<Self> {
        let stored = persistence.load_blocks(document_id).await?;
        let blocks = stored.into_iter().map(StoredBlock::into_block).collect();
        info!(document = %document_id, "opened document");
        Ok(Self::with_blocks(document_id, persistence, config, blocks))
    }

    // =========================================================================
    // Read accessors
    // =========================================================================

    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    /// Blocks in document order.
    pub fn blocks(&self) -> &[Block] {
        self.sequence.blocks()
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.sequence.block(&self.current_id(id))
    }

    pub fn position(&self, id: &BlockId) -> Option<usize> {
        self.sequence.position(&self.current_id(id))
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// A reorder failed; local and persisted order may disagree.
    pub fn needs_reload(&self) -> bool {
        self.needs_reload
    }

    /// Commands waiting in the persistence queue.
    pub fn pending_commands(&self) -> usize {
        self.queue.depth()
    }

    /// Follow a temporary id to its permanent form once committed.
    pub fn current_id(&self, id: &BlockId) -> BlockId {
        match id {
            BlockId::Pending(temp) => self
                .committed
                .get(temp)
                .map_or(*id, |p| BlockId::Committed(*p)),
            BlockId::Committed(_) => *id,
        }
    }

    /// Neighbour below `id`, focused at its start.
    pub fn focus_next(&self, id: &BlockId) -> Option<FocusRequest> {
        let index = self.position(id)?;
        self.sequence
            .get(index + 1)
            .map(|b| FocusRequest::start(b.id))
    }

    /// Neighbour above `id`, focused at its end.
    pub fn focus_prev(&self, id: &BlockId) -> Option<FocusRequest> {
        let index = self.position(id)?.checked_sub(1)?;
        self.sequence.get(index).map(|b| FocusRequest::end(b.id))
    }

    // =========================================================================
    // Content mutations
    // =========================================================================

    /// Insert a block at `after + 1` (or at the top when `after` is `None`).
    ///
    /// `initial` must match `kind` when given; otherwise the block starts
    /// empty.
    pub fn create(
        &mut self,
        kind: BlockKind,
        after: Option<usize>,
        edge: FocusEdge,
        initial: Option<BlockContent>,
    ) -> Result<FocusRequest> {
        let content = match initial {
            Some(content) if content.kind() != kind => {
                return Err(DocError::KindMismatch {
                    expected: kind,
                    found: content.kind(),
                });
            }
            Some(content) => content,
            None => BlockContent::empty(kind),
        };
        let index = match after {
            None => 0,
            Some(i) => i.checked_add(1).ok_or(DocError::IndexOutOfRange {
                index: i,
                len: self.len(),
            })?,
        };
        let id = self.insert_new(index, Block::with_content(BlockId::temp(), content, 0))?;
        Ok(FocusRequest { id, edge })
    }

    /// Replace a block's content. The kind follows the content.
    pub fn update(&mut self, id: &BlockId, content: BlockContent) -> Result<()> {
        let id = self.current_id(id);
        let previous = self.sequence.set_content(&id, content.clone())?;
        if previous == content {
            return Ok(());
        }
        debug!(document = %self.document_id, block = %id, kind = %content.kind(), "update");
        self.enqueue(Command::Update {
            id,
            content,
            previous,
        });
        Ok(())
    }

    /// Change kind or text variant in place.
    pub fn retype(&mut self, id: &BlockId, target: Retype) -> Result<()> {
        let id = self.current_id(id);
        let previous = self.sequence.retype(&id, target)?;
        let content = self
            .sequence
            .block(&id)
            .map(|b| b.content.clone())
            .ok_or(DocError::BlockNotFound(id))?;
        if previous == content {
            return Ok(());
        }
        debug!(document = %self.document_id, block = %id, ?target, "retype");
        self.enqueue(Command::Update {
            id,
            content,
            previous,
        });
        Ok(())
    }

    /// Turn a pending-image block into an image with the given source.
    pub fn fulfil_pending_image(&mut self, id: &BlockId, url: impl Into<String>) -> Result<()> {
        let id = self.current_id(id);
        let kind = self
            .sequence
            .block(&id)
            .map(Block::kind)
            .ok_or(DocError::BlockNotFound(id))?;
        if kind != BlockKind::PendingImage {
            return Err(DocError::KindMismatch {
                expected: BlockKind::PendingImage,
                found: kind,
            });
        }
        self.update(&id, BlockContent::image(url))
    }

    // =========================================================================
    // Structural mutations
    // =========================================================================

    /// Remove a block. Focus moves to the end of the block above, if any.
    pub fn delete(&mut self, id: &BlockId) -> Result<Option<FocusRequest>> {
        let id = self.current_id(id);
        let (index, block) = self.sequence.remove(&id)?;
        self.selection.forget(&id);
        debug!(document = %self.document_id, block = %id, index, "delete");
        self.enqueue(Command::Delete { index, block });

        Ok(index
            .checked_sub(1)
            .and_then(|i| self.sequence.get(i))
            .map(|prev| FocusRequest::end(prev.id)))
    }

    /// Delete every selected block (global delete key).
    ///
    /// Does nothing while focus is inside an editable region.
    pub fn delete_selected(&mut self, focus_in_editable: bool) -> Result<Vec<BlockId>> {
        let ids = self
            .selection
            .take_for_delete(focus_in_editable, &self.sequence.ids());
        for id in &ids {
            self.delete(id)?;
        }
        Ok(ids)
    }

    /// Merge the block at `index` into the one above it.
    ///
    /// Both must be text blocks; otherwise this is a no-op returning `None`.
    pub fn merge(&mut self, index: usize) -> Result<Option<FocusRequest>> {
        if index >= self.len() {
            return Err(DocError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        let Some(prev_index) = index.checked_sub(1) else {
            return Ok(None);
        };
        let (Some(prev), Some(curr)) = (self.sequence.get(prev_index), self.sequence.get(index))
        else {
            return Ok(None);
        };
        let (Some(prev_text), Some(curr_text)) = (prev.content.as_text(), curr.content.as_text())
        else {
            debug!(
                document = %self.document_id,
                prev = %prev.kind(),
                curr = %curr.kind(),
                "merge skipped: not both text"
            );
            return Ok(None);
        };

        let mut merged = prev_text.clone();
        merged.append(curr_text);
        let (prev_id, curr_id) = (prev.id, curr.id);

        self.update(&prev_id, BlockContent::Text(merged))?;
        self.delete(&curr_id)?;
        Ok(Some(FocusRequest::end(prev_id)))
    }

    /// Insert an empty text block right after `index` and focus its start.
    pub fn split(&mut self, index: usize) -> Result<FocusRequest> {
        self.create(BlockKind::Text, Some(index), FocusEdge::Start, None)
    }

    /// Move the block at `source` so it ends up at `destination`.
    pub fn move_block(&mut self, source: usize, destination: usize) -> Result<()> {
        self.reorder(Mutation::Move {
            source,
            destination,
        })
    }

    /// Move `selected` as a group, positioned by where `dragged` was dropped.
    pub fn move_group(
        &mut self,
        dragged: &BlockId,
        destination: usize,
        selected: &[BlockId],
    ) -> Result<()> {
        let selected = selected.iter().map(|id| self.current_id(id)).collect();
        self.reorder(Mutation::MoveGroup {
            dragged: self.current_id(dragged),
            destination,
            selected,
        })
    }

    /// Drop handler: a group move when `dragged` is part of a multi
    /// selection, a single move otherwise.
    pub fn drop_block(&mut self, dragged: &BlockId, destination: usize) -> Result<()> {
        let dragged = self.current_id(dragged);
        if self.selection.is_group_drag(&dragged) {
            let selected = self.selection.ids();
            return self.move_group(&dragged, destination, &selected);
        }
        let source = self
            .sequence
            .position(&dragged)
            .ok_or(DocError::BlockNotFound(dragged))?;
        self.move_block(source, destination)
    }

    /// Append materialized blocks after the current content, preserving
    /// their relative order and provenance.
    pub fn extend(&mut self, blocks: impl IntoIterator<Item = Block>) -> Result<Vec<BlockId>> {
        let mut blocks: Vec<Block> = blocks.into_iter().collect();
        blocks.sort_by_key(|b| b.order);
        let mut ids = Vec::with_capacity(blocks.len());
        for block in blocks {
            let mut fresh = Block::with_content(BlockId::temp(), block.content, 0);
            fresh.provenance = block.provenance;
            ids.push(self.insert_new(self.len(), fresh)?);
        }
        info!(document = %self.document_id, count = ids.len(), "appended blocks");
        Ok(ids)
    }

    // =========================================================================
    // Selection
    // =========================================================================

    /// Click on a block's non-editable surface.
    pub fn click(&mut self, id: &BlockId, modifiers: Modifiers) {
        let id = self.current_id(id);
        self.selection.click(id, modifiers, &self.sequence.ids());
    }

    /// Focus entered an editable region.
    pub fn focus_editable(&mut self, modifiers: Modifiers) {
        self.selection.focus_editable(modifiers);
    }

    // =========================================================================
    // Completions
    // =========================================================================

    /// Apply every completion that has arrived, without waiting.
    ///
    /// Returns how many were applied.
    pub fn apply_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completions.try_recv() {
            self.apply_completion(completion);
            applied += 1;
        }
        applied
    }

    /// Wait until the persistence queue is idle and apply all completions,
    /// including follow-up commands issued by rollbacks.
    pub async fn settle(&mut self) -> PersistResult<()> {
        loop {
            self.queue.flush().await?;
            let issued = self.issued;
            self.apply_completions();
            if self.issued == issued {
                return Ok(());
            }
        }
    }

    /// Replace local state with what persistence holds.
    ///
    /// Settles first, then clears the selection, the reload flag and the
    /// temporary id history. Ids from before the reload stop resolving.
    pub async fn reload(&mut self) -> PersistResult<()> {
        self.settle().await?;
        let stored = self.persistence.load_blocks(self.document_id).await?;
        self.sequence =
            BlockSequence::from_blocks(stored.into_iter().map(StoredBlock::into_block).collect());
        self.selection.clear();
        self.committed.clear();
        self.needs_reload = false;
        info!(document = %self.document_id, blocks = self.len(), "reloaded document");
        Ok(())
    }

    fn apply_completion(&mut self, completion: Completion) {
        let rollback = self.config.rollback_on_failure;
        match completion {
            Completion::Created { temp, permanent } => {
                self.committed.insert(temp, permanent);
                match self.sequence.commit_id(temp, permanent) {
                    Ok(_) => self
                        .selection
                        .remap(&BlockId::Pending(temp), BlockId::Committed(permanent)),
                    Err(_) => debug!(%temp, %permanent, "committed block no longer present"),
                }
                self.enqueue(Command::Release { temp });
            }

            Completion::CreateFailed { temp, error } => {
                let id = BlockId::Pending(temp);
                warn!(document = %self.document_id, block = %id, rollback, "create failed: {error}");
                if rollback {
                    if self.sequence.remove(&id).is_ok() {
                        self.selection.forget(&id);
                        self.enqueue_reorder();
                    }
                    self.enqueue(Command::Release { temp });
                }
            }

            Completion::UpdateFailed {
                id,
                attempted,
                previous,
                error,
            } => {
                warn!(document = %self.document_id, block = %id, rollback, "update failed: {error}");
                let untouched = self.sequence.block(&id).is_some_and(|b| b.content == attempted);
                if rollback && untouched {
                    let _ = self.sequence.set_content(&id, previous);
                }
            }

            Completion::DeleteFailed {
                index,
                block,
                error,
            } => {
                warn!(document = %self.document_id, block = %block.id, rollback, "delete failed: {error}");
                if rollback {
                    let index = index.min(self.len());
                    match self.sequence.insert(index, block) {
                        Ok(()) => self.enqueue_reorder(),
                        Err(e) => error!(document = %self.document_id, "could not restore deleted block: {e}"),
                    }
                }
            }

            Completion::ReorderFailed { error } => {
                warn!(document = %self.document_id, "reorder failed, reload required: {error}");
                self.needs_reload = true;
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn insert_new(&mut self, index: usize, block: Block) -> Result<BlockId> {
        let id = block.id;
        let Some(temp) = id.temp_id() else {
            return Err(DocError::DuplicateBlock(id));
        };
        let new = NewBlock {
            content: block.content.clone(),
            order: index as u32,
            provenance: block.provenance,
        };
        self.sequence.insert(index, block)?;
        debug!(document = %self.document_id, block = %id, index, kind = %new.content.kind(), "create");
        self.enqueue(Command::Create { temp, block: new });
        Ok(id)
    }

    fn reorder(&mut self, mutation: Mutation) -> Result<()> {
        let before = self.sequence.ids();
        self.sequence.apply(mutation)?;
        if self.sequence.ids() != before {
            self.enqueue_reorder();
        }
        Ok(())
    }

    fn enqueue_reorder(&mut self) {
        let pairs = self.sequence.order_pairs();
        self.enqueue(Command::Reorder { pairs });
    }

    fn enqueue(&mut self, cmd: Command) {
        self.issued += 1;
        if let Err(e) = self.queue.send(cmd) {
            error!(document = %self.document_id, "cannot persist change: {e}");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
