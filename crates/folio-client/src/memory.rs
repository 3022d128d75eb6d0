//! In-memory [`BlockPersistence`] backend.
//!
//! Used by tests and by callers that do not need durability. Supports
//! one-shot failure injection and per-operation latency so the queue's
//! ordering and rollback paths can be exercised deterministically.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use folio_types::{BlockContent, DocumentId, PermanentId};
use parking_lot::Mutex;

use crate::persistence::{BlockPersistence, NewBlock, PersistError, PersistResult, StoredBlock};

/// Persistence call kinds, for failure injection and call logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Load,
    Create,
    Update,
    Delete,
    Reorder,
}

impl Operation {
    fn name(&self) -> &'static str {
        match self {
            Operation::Load => "load",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Reorder => "reorder",
        }
    }
}

#[derive(Default)]
struct Inner {
    /// Per document, sorted by order.
    documents: HashMap<DocumentId, Vec<StoredBlock>>,
    armed_failures: HashMap<Operation, usize>,
    delays: HashMap<Operation, Duration>,
    calls: Vec<Operation>,
}

impl Inner {
    fn take_failure(&mut self, op: Operation) -> PersistResult<()> {
        if let Some(count) = self.armed_failures.get_mut(&op) {
            if *count > 0 {
                *count -= 1;
                return Err(PersistError::rejected(op.name(), "injected failure"));
            }
        }
        Ok(())
    }

    fn locate(&self, id: PermanentId) -> PersistResult<(DocumentId, usize)> {
        self.documents
            .iter()
            .find_map(|(doc, blocks)| blocks.iter().position(|b| b.id == id).map(|i| (*doc, i)))
            .ok_or(PersistError::UnknownBlock(id))
    }
}

fn renumber(blocks: &mut [StoredBlock]) {
    for (i, block) in blocks.iter_mut().enumerate() {
        block.order = i as u32;
    }
}

/// Block storage held in process memory.
#[derive(Default)]
pub struct MemoryPersistence {
    inner: Mutex<Inner>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls of `op` fail.
    pub fn fail_next(&self, op: Operation, times: usize) {
        *self.inner.lock().armed_failures.entry(op).or_default() += times;
    }

    /// Delay every call of `op` by `delay` before it takes effect.
    pub fn set_delay(&self, op: Operation, delay: Duration) {
        self.inner.lock().delays.insert(op, delay);
    }

    /// Calls received so far, in arrival order.
    pub fn calls(&self) -> Vec<Operation> {
        self.inner.lock().calls.clone()
    }

    /// Snapshot of a document's stored blocks, sorted by order.
    pub fn snapshot(&self, document_id: DocumentId) -> Vec<StoredBlock> {
        self.inner
            .lock()
            .documents
            .get(&document_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Record the call and sleep for any configured delay.
    async fn enter(&self, op: Operation) {
        let delay = {
            let mut inner = self.inner.lock();
            inner.calls.push(op);
            inner.delays.get(&op).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl BlockPersistence for MemoryPersistence {
    async fn load_blocks(&self, document_id: DocumentId) -> PersistResult<Vec<StoredBlock>> {
        self.enter(Operation::Load).await;
        let mut inner = self.inner.lock();
        inner.take_failure(Operation::Load)?;
        Ok(inner.documents.get(&document_id).cloned().unwrap_or_default())
    }

    async fn create_block(
        &self,
        document_id: DocumentId,
        block: NewBlock,
    ) -> PersistResult<StoredBlock> {
        self.enter(Operation::Create).await;
        let mut inner = self.inner.lock();
        inner.take_failure(Operation::Create)?;

        let blocks = inner.documents.entry(document_id).or_default();
        let index = (block.order as usize).min(blocks.len());
        let stored = StoredBlock {
            id: PermanentId::new(),
            document_id,
            content: block.content,
            order: index as u32,
            provenance: block.provenance,
        };
        blocks.insert(index, stored.clone());
        renumber(blocks);
        Ok(stored)
    }

    async fn update_block(
        &self,
        id: PermanentId,
        content: BlockContent,
    ) -> PersistResult<StoredBlock> {
        self.enter(Operation::Update).await;
        let mut inner = self.inner.lock();
        inner.take_failure(Operation::Update)?;

        let (doc, index) = inner.locate(id)?;
        let blocks = inner.documents.entry(doc).or_default();
        blocks[index].content = content;
        Ok(blocks[index].clone())
    }

    async fn delete_block(&self, id: PermanentId) -> PersistResult<()> {
        self.enter(Operation::Delete).await;
        let mut inner = self.inner.lock();
        inner.take_failure(Operation::Delete)?;

        let (doc, index) = inner.locate(id)?;
        let blocks = inner.documents.entry(doc).or_default();
        blocks.remove(index);
        renumber(blocks);
        Ok(())
    }

    async fn reorder_blocks(
        &self,
        document_id: DocumentId,
        pairs: Vec<(PermanentId, u32)>,
    ) -> PersistResult<()> {
        self.enter(Operation::Reorder).await;
        let mut inner = self.inner.lock();
        inner.take_failure(Operation::Reorder)?;

        let blocks = inner.documents.entry(document_id).or_default();
        // Resolve every id before touching anything: all pairs or none.
        let mut targets = Vec::with_capacity(pairs.len());
        for (id, order) in pairs {
            let index = blocks
                .iter()
                .position(|b| b.id == id)
                .ok_or(PersistError::UnknownBlock(id))?;
            targets.push((index, order));
        }
        for (index, order) in targets {
            blocks[index].order = order;
        }
        blocks.sort_by_key(|b| b.order);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn new_text(markup: &str, order: u32) -> NewBlock {
        NewBlock {
            content: BlockContent::text(markup),
            order,
            provenance: None,
        }
    }

    fn markups(blocks: &[StoredBlock]) -> Vec<String> {
        blocks
            .iter()
            .map(|b| b.content.as_text().unwrap().markup().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_create_shifts_siblings() {
        let store = MemoryPersistence::new();
        let doc = DocumentId::new();
        store.create_block(doc, new_text("a", 0)).await.unwrap();
        store.create_block(doc, new_text("c", 1)).await.unwrap();
        let b = store.create_block(doc, new_text("b", 1)).await.unwrap();
        assert_eq!(b.order, 1);

        let blocks = store.snapshot(doc);
        assert_eq!(markups(&blocks), ["a", "b", "c"]);
        assert_eq!(blocks.iter().map(|b| b.order).collect::<Vec<_>>(), [0, 1, 2]);
    }

    #[tokio::test]
    async fn test_create_past_end_appends() {
        let store = MemoryPersistence::new();
        let doc = DocumentId::new();
        let a = store.create_block(doc, new_text("a", 7)).await.unwrap();
        assert_eq!(a.order, 0);
    }

    #[tokio::test]
    async fn test_delete_closes_gap() {
        let store = MemoryPersistence::new();
        let doc = DocumentId::new();
        let a = store.create_block(doc, new_text("a", 0)).await.unwrap();
        store.create_block(doc, new_text("b", 1)).await.unwrap();
        store.delete_block(a.id).await.unwrap();

        let blocks = store.snapshot(doc);
        assert_eq!(markups(&blocks), ["b"]);
        assert_eq!(blocks[0].order, 0);
        assert_eq!(
            store.delete_block(a.id).await.unwrap_err(),
            PersistError::UnknownBlock(a.id)
        );
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let store = MemoryPersistence::new();
        let doc = DocumentId::new();
        store.fail_next(Operation::Create, 1);
        assert!(store.create_block(doc, new_text("a", 0)).await.is_err());
        assert!(store.create_block(doc, new_text("a", 0)).await.is_ok());
        assert_eq!(store.calls(), [Operation::Create, Operation::Create]);
    }

    #[tokio::test]
    async fn test_reorder_applies_pairs() {
        let store = MemoryPersistence::new();
        let doc = DocumentId::new();
        let a = store.create_block(doc, new_text("a", 0)).await.unwrap();
        let b = store.create_block(doc, new_text("b", 1)).await.unwrap();
        store
            .reorder_blocks(doc, vec![(a.id, 1), (b.id, 0)])
            .await
            .unwrap();
        assert_eq!(markups(&store.snapshot(doc)), ["b", "a"]);
    }

    #[tokio::test]
    async fn test_reorder_with_unknown_id_changes_nothing() {
        let store = MemoryPersistence::new();
        let doc = DocumentId::new();
        let a = store.create_block(doc, new_text("a", 0)).await.unwrap();
        store.create_block(doc, new_text("b", 1)).await.unwrap();

        let ghost = PermanentId::new();
        assert_eq!(
            store.reorder_blocks(doc, vec![(a.id, 1), (ghost, 0)]).await,
            Err(PersistError::UnknownBlock(ghost))
        );
        let blocks = store.snapshot(doc);
        assert_eq!(markups(&blocks), ["a", "b"]);
        assert_eq!(blocks.iter().map(|b| b.order).collect::<Vec<_>>(), [0, 1]);

        // Later position-based calls still see consistent state.
        store.create_block(doc, new_text("c", 1)).await.unwrap();
        assert_eq!(markups(&store.snapshot(doc)), ["a", "c", "b"]);
    }
}
