//! Ingestion: generation output text into a document.
//!
//! ```text
//! raw text ──parse_generation──► ParsedItem[] ──Materializer──► Block[] ──extend──► OptimisticStore
//! ```
//!
//! Only a payload that is not a block list at all fails the run. Bad items
//! are dropped, lookups that fail become placeholders.

use folio_client::OptimisticStore;
use folio_types::BlockId;
use tracing::{info, warn};

use crate::error::Result;
use crate::materializer::{MaterializeStats, Materializer};
use crate::proposal::parse_generation;

/// Title used when neither the generation output nor the caller has one.
pub const DEFAULT_TITLE: &str = "Untitled summary";

/// Outcome of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub title: String,
    /// Ids of the appended blocks, in document order. Pending until the
    /// store settles.
    pub block_ids: Vec<BlockId>,
    pub stats: MaterializeStats,
    /// `(index, reason)` for every dropped item.
    pub rejected: Vec<(usize, String)>,
}

/// Parse `text`, materialize it, and append the blocks to `store`.
///
/// Persistence happens through the store's queue; call
/// [`OptimisticStore::settle`] to wait for it.
pub async fn ingest(
    text: &str,
    store: &mut OptimisticStore,
    materializer: &Materializer,
    default_title: Option<&str>,
) -> Result<IngestReport> {
    let output = parse_generation(text)?;
    let title = output
        .title_or(default_title.unwrap_or(DEFAULT_TITLE))
        .to_string();
    let rejected: Vec<(usize, String)> = output
        .rejected()
        .map(|(index, reason)| (index, reason.to_string()))
        .collect();
    if !rejected.is_empty() {
        warn!(
            document = %store.document_id(),
            count = rejected.len(),
            "generation output had malformed items"
        );
    }

    let materialized = materializer.materialize(&output.items).await;
    let block_ids = store.extend(materialized.blocks)?;

    info!(
        document = %store.document_id(),
        %title,
        blocks = block_ids.len(),
        "ingested generation output"
    );
    Ok(IngestReport {
        title,
        block_ids,
        stats: materialized.stats,
        rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use folio_client::{MemoryPersistence, Operation, StoreConfig};
    use folio_types::{BlockKind, DocumentId};

    use crate::error::IngestError;
    use crate::materializer::ResolutionPolicy;

    fn store(persistence: Arc<MemoryPersistence>) -> OptimisticStore {
        OptimisticStore::new(DocumentId::new(), persistence, StoreConfig::default())
    }

    #[tokio::test]
    async fn test_ingest_appends_in_output_order() {
        let persistence = Arc::new(MemoryPersistence::new());
        let mut store = store(persistence.clone());
        let materializer = Materializer::new(ResolutionPolicy::Suppress, vec![]);

        let report = ingest(
            r#"{"title": "Op-amps", "blocks": [
                {"type": "text", "content": "<p>intro</p>", "page": 9},
                {"type": "image_request", "content": "inverting amplifier", "page": 2},
                {"type": "formula", "content": "V_o = -R_f/R_i V_i"}
            ]}"#,
            &mut store,
            &materializer,
            None,
        )
        .await
        .unwrap();

        assert_eq!(report.title, "Op-amps");
        assert_eq!(report.block_ids.len(), 3);
        let kinds: Vec<BlockKind> = store.blocks().iter().map(|b| b.kind()).collect();
        assert_eq!(kinds, [BlockKind::Text, BlockKind::Text, BlockKind::Formula]);

        store.settle().await.unwrap();
        assert!(store.blocks().iter().all(|b| b.id.is_committed()));
        assert_eq!(persistence.snapshot(store.document_id()).len(), 3);
    }

    #[tokio::test]
    async fn test_ingest_reports_rejects_and_default_title() {
        let mut store = store(Arc::new(MemoryPersistence::new()));
        let materializer = Materializer::new(ResolutionPolicy::AutoResolve, vec![]);
        let report = ingest(
            r#"[{"type": "video", "content": "x"}, {"content": "<p>kept</p>"}]"#,
            &mut store,
            &materializer,
            Some("Week 3"),
        )
        .await
        .unwrap();
        assert_eq!(report.title, "Week 3");
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].0, 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unusable_payload_fails_without_touching_store() {
        let persistence = Arc::new(MemoryPersistence::new());
        let mut store = store(persistence.clone());
        let materializer = Materializer::new(ResolutionPolicy::Suppress, vec![]);
        let err = ingest(r#"{"summary": "no blocks"}"#, &mut store, &materializer, None)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MissingBlocks));
        assert!(store.is_empty());
        store.settle().await.unwrap();
        assert!(!persistence.calls().contains(&Operation::Create));
    }
}
