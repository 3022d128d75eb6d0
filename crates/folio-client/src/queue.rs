//! Per-document persistence queue.
//!
//! One actor task per open document drains persistence commands strictly in
//! issue order, so a slow call can never be overtaken by a later one.
//!
//! ```text
//!   OptimisticStore               mpsc            QueueActor (tokio task)
//!   ┌──────────────────┐  ─────────────────▶  ┌──────────────────────────┐
//!   │ create/update/.. │      Command         │ temp → permanent map     │
//!   │ apply_completions│  ◀─────────────────  │ BlockPersistence calls   │
//!   └──────────────────┘      Completion      └──────────────────────────┘
//! ```
//!
//! Commands may reference blocks that are still `Pending`. Because the
//! create for a temporary id is always enqueued before anything that uses
//! it, the actor has resolved it by the time a later command runs: it either
//! translates the id or, if the create failed, drops the command. Once the
//! store has swapped or discarded a temporary id it sends `Release`, and the
//! actor forgets that id.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use folio_types::{Block, BlockContent, BlockId, DocumentId, PermanentId, TempId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::persistence::{BlockPersistence, NewBlock, PersistError};

// ============================================================================
// Commands (internal)
// ============================================================================

/// Sent from the store to the actor. Each mutating command carries what the
/// store needs to undo the local change if the call fails.
pub(crate) enum Command {
    Create {
        temp: TempId,
        block: NewBlock,
    },
    Update {
        id: BlockId,
        content: BlockContent,
        previous: BlockContent,
    },
    Delete {
        index: usize,
        block: Block,
    },
    Reorder {
        pairs: Vec<(BlockId, u32)>,
    },
    /// The store no longer refers to `temp`; forget its resolution.
    Release {
        temp: TempId,
    },
    /// Replies once every earlier command has been processed.
    Flush {
        reply: oneshot::Sender<()>,
    },
}

// ============================================================================
// Completions (public)
// ============================================================================

/// Outcome of a queued persistence call that the store must react to.
///
/// Successful updates, deletes and reorders produce no completion.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// A create resolved; swap the temporary id in place.
    Created {
        temp: TempId,
        permanent: PermanentId,
    },
    CreateFailed {
        temp: TempId,
        error: PersistError,
    },
    /// `id` is already translated to its permanent form when known.
    UpdateFailed {
        id: BlockId,
        attempted: BlockContent,
        previous: BlockContent,
        error: PersistError,
    },
    DeleteFailed {
        index: usize,
        block: Block,
        error: PersistError,
    },
    ReorderFailed {
        error: PersistError,
    },
}

// ============================================================================
// QueueHandle
// ============================================================================

/// Store-side handle to a running queue actor.
pub(crate) struct QueueHandle {
    tx: mpsc::UnboundedSender<Command>,
    depth: Arc<AtomicUsize>,
    document_id: DocumentId,
    capacity_warn: usize,
}

impl QueueHandle {
    /// Enqueue a command. Never blocks.
    pub(crate) fn send(&self, cmd: Command) -> Result<(), PersistError> {
        let depth = self.depth.fetch_add(1, Ordering::AcqRel) + 1;
        if self.capacity_warn > 0 && depth == self.capacity_warn {
            warn!(
                document = %self.document_id,
                depth,
                "persistence queue is backing up"
            );
        }
        self.tx.send(cmd).map_err(|_| {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            PersistError::Shutdown
        })
    }

    /// Wait until every command sent so far has been processed.
    pub(crate) async fn flush(&self) -> Result<(), PersistError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Flush { reply })?;
        rx.await.map_err(|_| PersistError::Shutdown)
    }

    /// Commands enqueued but not yet picked up by the actor.
    pub(crate) fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }
}

// ============================================================================
// QueueActor
// ============================================================================

struct QueueActor {
    persistence: Arc<dyn BlockPersistence>,
    document_id: DocumentId,
    committed: HashMap<TempId, PermanentId>,
    failed: HashSet<TempId>,
    completions: mpsc::UnboundedSender<Completion>,
    depth: Arc<AtomicUsize>,
}

/// How a command's block reference resolves.
enum Resolved {
    Permanent(PermanentId),
    /// Create failed or was never issued; nothing to persist.
    Dropped,
}

impl QueueActor {
    fn resolve(&self, id: &BlockId) -> Resolved {
        match id {
            BlockId::Committed(p) => Resolved::Permanent(*p),
            BlockId::Pending(t) => match self.committed.get(t) {
                Some(p) => Resolved::Permanent(*p),
                None => {
                    if !self.failed.contains(t) {
                        warn!(document = %self.document_id, block = %id, "command references a block with no queued create");
                    }
                    Resolved::Dropped
                }
            },
        }
    }

    fn complete(&self, completion: Completion) {
        if self.completions.send(completion).is_err() {
            debug!(document = %self.document_id, "store dropped; discarding completion");
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            self.handle_command(cmd).await;
        }
        debug!(document = %self.document_id, "persistence queue shutting down: channel closed");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Create { temp, block } => {
                match self.persistence.create_block(self.document_id, block).await {
                    Ok(stored) => {
                        self.committed.insert(temp, stored.id);
                        self.complete(Completion::Created {
                            temp,
                            permanent: stored.id,
                        });
                    }
                    Err(error) => {
                        error!(document = %self.document_id, %temp, "create failed: {error}");
                        self.failed.insert(temp);
                        self.complete(Completion::CreateFailed { temp, error });
                    }
                }
            }

            Command::Update {
                id,
                content,
                previous,
            } => {
                let Resolved::Permanent(permanent) = self.resolve(&id) else {
                    debug!(document = %self.document_id, block = %id, "dropping update for unpersisted block");
                    return;
                };
                if let Err(error) = self
                    .persistence
                    .update_block(permanent, content.clone())
                    .await
                {
                    warn!(document = %self.document_id, block = %permanent, "update failed: {error}");
                    self.complete(Completion::UpdateFailed {
                        id: BlockId::Committed(permanent),
                        attempted: content,
                        previous,
                        error,
                    });
                }
            }

            Command::Delete { index, mut block } => {
                let Resolved::Permanent(permanent) = self.resolve(&block.id) else {
                    debug!(document = %self.document_id, block = %block.id, "dropping delete for unpersisted block");
                    return;
                };
                if let Err(error) = self.persistence.delete_block(permanent).await {
                    warn!(document = %self.document_id, block = %permanent, "delete failed: {error}");
                    block.id = BlockId::Committed(permanent);
                    self.complete(Completion::DeleteFailed {
                        index,
                        block,
                        error,
                    });
                }
            }

            Command::Reorder { pairs } => {
                let mut resolved: Vec<(PermanentId, u32)> = pairs
                    .iter()
                    .filter_map(|(id, order)| match self.resolve(id) {
                        Resolved::Permanent(p) => Some((p, *order)),
                        Resolved::Dropped => None,
                    })
                    .collect();
                // Dropped blocks leave holes; close them so storage stays dense.
                resolved.sort_by_key(|(_, order)| *order);
                for (i, pair) in resolved.iter_mut().enumerate() {
                    pair.1 = i as u32;
                }
                if let Err(error) = self
                    .persistence
                    .reorder_blocks(self.document_id, resolved)
                    .await
                {
                    warn!(document = %self.document_id, "reorder failed: {error}");
                    self.complete(Completion::ReorderFailed { error });
                }
            }

            Command::Release { temp } => {
                self.committed.remove(&temp);
                self.failed.remove(&temp);
            }

            Command::Flush { reply } => {
                let _ = reply.send(());
            }
        }
    }
}

/// Spawn the queue actor for one document on the current tokio runtime.
///
/// Returns the command handle and the receiving end of the completion
/// channel.
pub(crate) fn spawn_queue(
    persistence: Arc<dyn BlockPersistence>,
    document_id: DocumentId,
    capacity_warn: usize,
) -> (QueueHandle, mpsc::UnboundedReceiver<Completion>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (completions, completion_rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    let actor = QueueActor {
        persistence,
        document_id,
        committed: HashMap::new(),
        failed: HashSet::new(),
        completions,
        depth: depth.clone(),
    };
    tokio::spawn(actor.run(rx));
    (
        QueueHandle {
            tx,
            depth,
            document_id,
            capacity_warn,
        },
        completion_rx,
    )
}

// ============================================================================
// Tests
// ============================================================================
