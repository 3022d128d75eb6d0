//! Optimistic editing client for folio documents.
//!
//! [`OptimisticStore`] owns one open document's blocks. Mutations apply
//! locally and immediately; a per-document persistence queue forwards them to
//! a [`BlockPersistence`] backend strictly in issue order and reports back
//! through [`Completion`]s.
//!
//! ```text
//!   UI ──▶ OptimisticStore ──▶ BlockSequence / Selection   (sync, local)
//!                 │
//!                 └──▶ queue ──▶ BlockPersistence          (async, ordered)
//!                        │
//!                        └──▶ Completion ──▶ apply_completions / settle
//! ```

pub mod memory;
pub mod persistence;
mod queue;
pub mod store;

pub use memory::{MemoryPersistence, Operation};
pub use persistence::{BlockPersistence, NewBlock, PersistError, PersistResult, StoredBlock};
pub use queue::Completion;
pub use store::{FocusEdge, FocusRequest, OptimisticStore, StoreConfig};
