//! End to end: generation output → materializer → store → SQLite.

use std::sync::Arc;

use folio_client::{OptimisticStore, StoreConfig};
use folio_kernel::{
    CandidateFile, Materializer, ResolutionPolicy, SqlitePersistence, StaticLookup, ingest,
};
use folio_types::{BlockContent, BlockKind, DocumentId, PendingImage};

const GENERATION: &str = r#"```json
{
  "title": "CMOS inverter",
  "blocks": [
    {"type": "text", "content": "<h1>CMOS inverter</h1>", "page": 3, "source_file": "lecture_03.pdf"},
    {"type": "image_request", "content": "circuit diagram", "page": 4, "source_file": "lecture_03.pdf"},
    {"type": "latex", "content": "V_{out} = V_{DD} - V_{in}", "order": 0},
    {"type": "hologram", "content": "not a block"},
    {"type": "text", "content": "<p>Transfer curve.</p>", "page": 1}
  ]
}
```"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn files() -> Vec<CandidateFile> {
    vec![
        CandidateFile::new("Lecture_03.pdf", "https://files.example/Lecture_03.pdf"),
        CandidateFile::new("exercises.pdf", "https://files.example/exercises.pdf"),
    ]
}

async fn run(materializer: Materializer) -> (Arc<SqlitePersistence>, OptimisticStore) {
    let db = Arc::new(SqlitePersistence::in_memory().unwrap());
    let doc = DocumentId::new();
    let mut store = OptimisticStore::new(doc, db.clone(), StoreConfig::default());
    let report = ingest(GENERATION, &mut store, &materializer, None)
        .await
        .unwrap();
    db.upsert_document(doc, &report.title).unwrap();
    assert_eq!(report.rejected.len(), 1);
    store.settle().await.unwrap();
    (db, store)
}

#[tokio::test]
async fn test_auto_resolve_without_credentials_keeps_a_placeholder() {
    init_tracing();
    let (db, store) = run(Materializer::new(ResolutionPolicy::AutoResolve, files())).await;

    assert_eq!(store.len(), 4);
    let placeholder = &store.blocks()[1];
    assert_eq!(placeholder.kind(), BlockKind::Text);
    let markup = placeholder.content.as_text().unwrap().markup();
    assert!(markup.contains("circuit diagram"));
    assert!(markup.contains("(Page 4)"));
    assert_eq!(db.document_title(store.document_id()).unwrap().as_deref(), Some("CMOS inverter"));
}

#[tokio::test]
async fn test_persisted_order_matches_output_order() {
    init_tracing();
    let lookup = StaticLookup::new().with_answer("circuit diagram", "https://img.example/inv.png");
    let (db, store) = run(
        Materializer::new(ResolutionPolicy::AutoResolve, files()).with_lookup(Some(Arc::new(lookup))),
    )
    .await;

    // Page hints and the stray "order" field never reorder anything.
    let kinds: Vec<BlockKind> = store.blocks().iter().map(|b| b.kind()).collect();
    assert_eq!(
        kinds,
        [BlockKind::Text, BlockKind::Image, BlockKind::Formula, BlockKind::Text]
    );

    let reopened = OptimisticStore::open(store.document_id(), db, StoreConfig::default())
        .await
        .unwrap();
    assert_eq!(reopened.blocks(), store.blocks());
    let orders: Vec<u32> = reopened.blocks().iter().map(|b| b.order).collect();
    assert_eq!(orders, [0, 1, 2, 3]);
    assert_eq!(reopened.blocks()[1].content, BlockContent::image("https://img.example/inv.png"));
}

#[tokio::test]
async fn test_provenance_survives_storage() {
    init_tracing();
    let files = files();
    let lecture = files[0].id;
    let (db, store) = run(Materializer::new(ResolutionPolicy::Suppress, files)).await;

    let reopened = OptimisticStore::open(store.document_id(), db, StoreConfig::default())
        .await
        .unwrap();
    let first = reopened.blocks()[0].provenance.unwrap();
    assert_eq!(first.source_page, Some(3));
    assert_eq!(first.source_file_id, Some(lecture));

    let last = reopened.blocks()[3].provenance.unwrap();
    assert_eq!(last.source_page, Some(1));
    assert_eq!(last.source_file_id, None);
    assert_eq!(reopened.blocks()[2].provenance, None);
}

#[tokio::test]
async fn test_manual_policy_leaves_pending_image_for_a_human() {
    init_tracing();
    let (db, mut store) = run(Materializer::new(ResolutionPolicy::Manual, files())).await;

    let pending = store.blocks()[1].clone();
    assert_eq!(
        pending.content,
        BlockContent::PendingImage(PendingImage {
            description: "circuit diagram".into(),
            page_hint: Some(4),
            candidate_file_url: Some("https://files.example/Lecture_03.pdf".into()),
        })
    );

    store
        .fulfil_pending_image(&pending.id, "https://img.example/uploaded.png")
        .unwrap();
    store.settle().await.unwrap();

    let reopened = OptimisticStore::open(store.document_id(), db, StoreConfig::default())
        .await
        .unwrap();
    assert_eq!(
        reopened.blocks()[1].content,
        BlockContent::image("https://img.example/uploaded.png")
    );
}

#[tokio::test]
async fn test_edits_after_ingest_keep_storage_dense() {
    init_tracing();
    let (db, mut store) = run(Materializer::new(ResolutionPolicy::Suppress, files())).await;

    let formula = store.blocks()[2].id;
    store.delete(&formula).unwrap();
    store.move_block(2, 0).unwrap();
    store.settle().await.unwrap();

    let reopened = OptimisticStore::open(store.document_id(), db, StoreConfig::default())
        .await
        .unwrap();
    assert_eq!(reopened.blocks(), store.blocks());
    let orders: Vec<u32> = reopened.blocks().iter().map(|b| b.order).collect();
    assert_eq!(orders, [0, 1, 2]);
    assert_eq!(
        reopened.blocks()[0].content,
        BlockContent::text("<p>Transfer curve.</p>")
    );
}
