//! SQLite persistence for documents and their blocks.
//!
//! Blocks are stored one row each with their kind, the opaque content
//! payload, and a dense `ord` within the owning document. Every mutating call
//! runs in a single transaction so `ord` never has holes or duplicates that
//! outlive a call.

use std::path::Path;

use async_trait::async_trait;
use folio_client::{BlockPersistence, NewBlock, PersistError, PersistResult, StoredBlock};
use folio_types::{BlockContent, BlockKind, DocumentId, FileId, PermanentId, Provenance};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, params};
use tracing::debug;

const SCHEMA: &str = r#"
-- Documents (summaries, exercise sheets)
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    created_at INTEGER DEFAULT (unixepoch())
);

-- Blocks, ord dense per document
CREATE TABLE IF NOT EXISTS blocks (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    content TEXT NOT NULL,
    ord INTEGER NOT NULL,
    page INTEGER,
    file_id TEXT,
    created_at INTEGER DEFAULT (unixepoch())
);
CREATE INDEX IF NOT EXISTS idx_blocks_document ON blocks(document_id, ord);
"#;

/// Document row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    pub id: DocumentId,
    pub title: String,
    pub created_at: i64,
}

/// SQLite-backed [`BlockPersistence`].
pub struct SqlitePersistence {
    conn: Mutex<Connection>,
}

/// Raw column values of a block row, decoded after the statement finishes.
type BlockRow = (String, String, String, String, i64, Option<i64>, Option<String>);

impl SqlitePersistence {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Create the document or rename it.
    pub fn upsert_document(&self, id: DocumentId, title: &str) -> SqliteResult<()> {
        self.conn.lock().execute(
            "INSERT INTO documents (id, title) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET title = excluded.title",
            params![id.to_hex(), title],
        )?;
        Ok(())
    }

    pub fn document_title(&self, id: DocumentId) -> SqliteResult<Option<String>> {
        self.conn
            .lock()
            .query_row(
                "SELECT title FROM documents WHERE id = ?1",
                params![id.to_hex()],
                |row| row.get(0),
            )
            .optional()
    }

    /// All documents, oldest first. Rows with an unparseable id are skipped.
    pub fn list_documents(&self) -> SqliteResult<Vec<DocumentMeta>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT id, title, created_at FROM documents ORDER BY created_at, id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, title, created_at) = row?;
            match DocumentId::parse(&id) {
                Ok(id) => docs.push(DocumentMeta {
                    id,
                    title,
                    created_at,
                }),
                Err(e) => debug!(%id, "skipping document with bad id: {e}"),
            }
        }
        Ok(docs)
    }

    fn select_document_blocks(conn: &Connection, document_id: DocumentId) -> SqliteResult<Vec<BlockRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, document_id, kind, content, ord, page, file_id
             FROM blocks WHERE document_id = ?1 ORDER BY ord, created_at",
        )?;
        let rows = stmt.query_map(params![document_id.to_hex()], row_tuple)?;
        rows.collect()
    }
}

fn row_tuple(row: &rusqlite::Row<'_>) -> SqliteResult<BlockRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn decode_row(row: BlockRow) -> PersistResult<StoredBlock> {
    let (id, document_id, kind, content, ord, page, file_id) = row;
    let id = PermanentId::parse(&id)
        .map_err(|e| PersistError::rejected("load", format!("bad block id {id:?}: {e}")))?;
    let corrupt = |reason: String| PersistError::Corrupt { id, reason };

    let document_id = DocumentId::parse(&document_id)
        .map_err(|e| corrupt(format!("bad document id: {e}")))?;
    let kind = BlockKind::from_str(&kind).ok_or_else(|| corrupt(format!("unknown kind {kind:?}")))?;
    let content = BlockContent::from_payload(kind, &content).map_err(|e| corrupt(e.to_string()))?;
    let order = u32::try_from(ord).map_err(|_| corrupt(format!("negative order {ord}")))?;
    let source_file_id = file_id
        .map(|f| FileId::parse(&f))
        .transpose()
        .map_err(|e| corrupt(format!("bad file id: {e}")))?;
    let provenance = Provenance {
        source_page: page.and_then(|p| u32::try_from(p).ok()),
        source_file_id,
    };

    Ok(StoredBlock {
        id,
        document_id,
        content,
        order,
        provenance: (!provenance.is_empty()).then_some(provenance),
    })
}

fn sql_error(operation: &'static str) -> impl Fn(rusqlite::Error) -> PersistError {
    move |e| PersistError::rejected(operation, e.to_string())
}

#[async_trait]
impl BlockPersistence for SqlitePersistence {
    async fn load_blocks(&self, document_id: DocumentId) -> PersistResult<Vec<StoredBlock>> {
        let rows = {
            let conn = self.conn.lock();
            Self::select_document_blocks(&conn, document_id).map_err(sql_error("load"))?
        };
        rows.into_iter().map(decode_row).collect()
    }

    async fn create_block(
        &self,
        document_id: DocumentId,
        block: NewBlock,
    ) -> PersistResult<StoredBlock> {
        let err = sql_error("create");
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(&err)?;

        let count: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM blocks WHERE document_id = ?1",
                params![document_id.to_hex()],
                |row| row.get(0),
            )
            .map_err(&err)?;
        let order = i64::from(block.order).min(count);

        tx.execute(
            "UPDATE blocks SET ord = ord + 1 WHERE document_id = ?1 AND ord >= ?2",
            params![document_id.to_hex(), order],
        )
        .map_err(&err)?;

        let id = PermanentId::new();
        let provenance = block.provenance.unwrap_or_default();
        tx.execute(
            "INSERT INTO blocks (id, document_id, kind, content, ord, page, file_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.to_hex(),
                document_id.to_hex(),
                block.content.kind().as_str(),
                block.content.to_payload(),
                order,
                provenance.source_page,
                provenance.source_file_id.map(|f| f.to_hex()),
            ],
        )
        .map_err(&err)?;
        tx.commit().map_err(&err)?;

        debug!(document = %document_id, block = %id, order, "stored block");
        Ok(StoredBlock {
            id,
            document_id,
            content: block.content,
            order: order as u32,
            provenance: block.provenance,
        })
    }

    async fn update_block(
        &self,
        id: PermanentId,
        content: BlockContent,
    ) -> PersistResult<StoredBlock> {
        let err = sql_error("update");
        let row = {
            let conn = self.conn.lock();
            let changed = conn
                .execute(
                    "UPDATE blocks SET kind = ?2, content = ?3 WHERE id = ?1",
                    params![id.to_hex(), content.kind().as_str(), content.to_payload()],
                )
                .map_err(&err)?;
            if changed == 0 {
                return Err(PersistError::UnknownBlock(id));
            }
            conn.query_row(
                "SELECT id, document_id, kind, content, ord, page, file_id
                 FROM blocks WHERE id = ?1",
                params![id.to_hex()],
                row_tuple,
            )
            .map_err(&err)?
        };
        decode_row(row)
    }

    async fn delete_block(&self, id: PermanentId) -> PersistResult<()> {
        let err = sql_error("delete");
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(&err)?;

        let located: Option<(String, i64)> = tx
            .query_row(
                "SELECT document_id, ord FROM blocks WHERE id = ?1",
                params![id.to_hex()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(&err)?;
        let Some((document_id, ord)) = located else {
            return Err(PersistError::UnknownBlock(id));
        };

        tx.execute("DELETE FROM blocks WHERE id = ?1", params![id.to_hex()])
            .map_err(&err)?;
        tx.execute(
            "UPDATE blocks SET ord = ord - 1 WHERE document_id = ?1 AND ord > ?2",
            params![document_id, ord],
        )
        .map_err(&err)?;
        tx.commit().map_err(&err)?;
        Ok(())
    }

    async fn reorder_blocks(
        &self,
        document_id: DocumentId,
        pairs: Vec<(PermanentId, u32)>,
    ) -> PersistResult<()> {
        let err = sql_error("reorder");
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(&err)?;
        for (id, order) in &pairs {
            let changed = tx
                .execute(
                    "UPDATE blocks SET ord = ?3 WHERE id = ?1 AND document_id = ?2",
                    params![id.to_hex(), document_id.to_hex(), order],
                )
                .map_err(&err)?;
            if changed == 0 {
                // Dropping the transaction rolls back the earlier updates.
                return Err(PersistError::UnknownBlock(*id));
            }
        }
        tx.commit().map_err(&err)?;
        debug!(document = %document_id, count = pairs.len(), "reordered blocks");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn new_block(content: BlockContent, order: u32) -> NewBlock {
        NewBlock {
            content,
            order,
            provenance: None,
        }
    }

    fn markups(blocks: &[StoredBlock]) -> Vec<String> {
        blocks
            .iter()
            .map(|b| b.content.to_payload())
            .collect()
    }

    #[tokio::test]
    async fn test_create_shifts_and_clamps() {
        let db = SqlitePersistence::in_memory().unwrap();
        let doc = DocumentId::new();
        db.create_block(doc, new_block(BlockContent::text("a"), 0)).await.unwrap();
        db.create_block(doc, new_block(BlockContent::text("c"), 1)).await.unwrap();
        db.create_block(doc, new_block(BlockContent::text("b"), 1)).await.unwrap();
        let late = db
            .create_block(doc, new_block(BlockContent::text("d"), 99))
            .await
            .unwrap();
        assert_eq!(late.order, 3);

        let blocks = db.load_blocks(doc).await.unwrap();
        assert_eq!(markups(&blocks), ["a", "b", "c", "d"]);
        let orders: Vec<u32> = blocks.iter().map(|b| b.order).collect();
        assert_eq!(orders, [0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_delete_closes_gap() {
        let db = SqlitePersistence::in_memory().unwrap();
        let doc = DocumentId::new();
        let mut ids = Vec::new();
        for (i, m) in ["a", "b", "c"].iter().enumerate() {
            ids.push(db.create_block(doc, new_block(BlockContent::text(*m), i as u32)).await.unwrap().id);
        }
        db.delete_block(ids[1]).await.unwrap();
        let blocks = db.load_blocks(doc).await.unwrap();
        assert_eq!(markups(&blocks), ["a", "c"]);
        assert_eq!(blocks[1].order, 1);

        assert_eq!(db.delete_block(ids[1]).await, Err(PersistError::UnknownBlock(ids[1])));
    }

    #[tokio::test]
    async fn test_update_changes_kind_and_keeps_provenance() {
        let db = SqlitePersistence::in_memory().unwrap();
        let doc = DocumentId::new();
        let file = FileId::new();
        let stored = db
            .create_block(
                doc,
                NewBlock {
                    content: BlockContent::text("<p>x</p>"),
                    order: 0,
                    provenance: Some(Provenance {
                        source_page: Some(4),
                        source_file_id: Some(file),
                    }),
                },
            )
            .await
            .unwrap();

        let updated = db
            .update_block(stored.id, BlockContent::formula("x^2"))
            .await
            .unwrap();
        assert_eq!(updated.content, BlockContent::formula("x^2"));
        assert_eq!(updated.provenance.unwrap().source_file_id, Some(file));
        assert_eq!(updated.provenance.unwrap().source_page, Some(4));

        let missing = PermanentId::new();
        assert_eq!(
            db.update_block(missing, BlockContent::text("y")).await,
            Err(PersistError::UnknownBlock(missing))
        );
    }

    #[tokio::test]
    async fn test_reorder_is_all_or_nothing() {
        let db = SqlitePersistence::in_memory().unwrap();
        let doc = DocumentId::new();
        let a = db.create_block(doc, new_block(BlockContent::text("a"), 0)).await.unwrap().id;
        let b = db.create_block(doc, new_block(BlockContent::text("b"), 1)).await.unwrap().id;

        let ghost = PermanentId::new();
        assert!(db.reorder_blocks(doc, vec![(a, 1), (ghost, 0)]).await.is_err());
        assert_eq!(markups(&db.load_blocks(doc).await.unwrap()), ["a", "b"]);

        db.reorder_blocks(doc, vec![(a, 1), (b, 0)]).await.unwrap();
        assert_eq!(markups(&db.load_blocks(doc).await.unwrap()), ["b", "a"]);
    }

    #[tokio::test]
    async fn test_pending_image_round_trips_through_storage() {
        let db = SqlitePersistence::in_memory().unwrap();
        let doc = DocumentId::new();
        let content = BlockContent::PendingImage(folio_types::PendingImage {
            description: "bode plot".into(),
            page_hint: Some(3),
            candidate_file_url: Some("https://files/l1.pdf".into()),
        });
        db.create_block(doc, new_block(content.clone(), 0)).await.unwrap();
        assert_eq!(db.load_blocks(doc).await.unwrap()[0].content, content);
    }

    #[tokio::test]
    async fn test_unknown_kind_is_corrupt() {
        let db = SqlitePersistence::in_memory().unwrap();
        let doc = DocumentId::new();
        let id = db.create_block(doc, new_block(BlockContent::text("a"), 0)).await.unwrap().id;
        db.conn
            .lock()
            .execute("UPDATE blocks SET kind = 'video' WHERE id = ?1", params![id.to_hex()])
            .unwrap();
        assert!(matches!(
            db.load_blocks(doc).await,
            Err(PersistError::Corrupt { id: bad, .. }) if bad == id
        ));
    }

    #[test]
    fn test_documents() {
        let db = SqlitePersistence::in_memory().unwrap();
        let doc = DocumentId::new();
        assert_eq!(db.document_title(doc).unwrap(), None);
        db.upsert_document(doc, "Draft").unwrap();
        db.upsert_document(doc, "CMOS basics").unwrap();
        assert_eq!(db.document_title(doc).unwrap().as_deref(), Some("CMOS basics"));
        let docs = db.list_documents().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, doc);
    }

    #[tokio::test]
    async fn test_file_database_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.db");
        let doc = DocumentId::new();
        {
            let db = SqlitePersistence::open(&path).unwrap();
            db.create_block(doc, new_block(BlockContent::image("https://img/a.png"), 0))
                .await
                .unwrap();
        }
        let db = SqlitePersistence::open(&path).unwrap();
        assert_eq!(
            db.load_blocks(doc).await.unwrap()[0].content,
            BlockContent::image("https://img/a.png")
        );
    }
}
