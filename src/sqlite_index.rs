//! SQLite-backed [`VectorIndex`] implementation.
//!
//! Vectors are stored as little-endian f32 BLOBs next to the chunk text.
//! Each upsert runs in one transaction whose first statement claims the
//! document row, so concurrent writers serialize on SQLite's write lock and
//! readers in WAL mode see either the old or the new entry set.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use notes_rag_core::embedding::{blob_to_vec, vec_to_blob};
use notes_rag_core::index::{validate_entries, UpsertOutcome, VectorIndex};
use notes_rag_core::models::{ChunkId, IndexEntry, ScoredEntry};
use notes_rag_core::search::rank_entries;
use notes_rag_core::RagError;

use crate::{db, migrate};

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (and migrate) the index database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect_path(path).await?;
        migrate::migrate_pool(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Total number of stored entries across all documents.
    pub async fn entry_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(to_usize(count)?)
    }
}

fn to_usize(value: i64) -> Result<usize, RagError> {
    usize::try_from(value)
        .map_err(|_| RagError::IndexCorruption(format!("negative value in index: {value}")))
}

fn row_to_entry(row: &SqliteRow) -> Result<IndexEntry> {
    let document_path: String = row.get("document_path");
    let blob: Vec<u8> = row.get("embedding");
    Ok(IndexEntry {
        chunk_id: ChunkId {
            document_path: document_path.clone(),
            offset_start: to_usize(row.get("offset_start"))?,
        },
        offset_end: to_usize(row.get("offset_end"))?,
        vector: blob_to_vec(&blob),
        text: row.get("text"),
        document_path,
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn upsert_document(&self, path: &str, entries: Vec<IndexEntry>) -> Result<UpsertOutcome> {
        let Some(stamp) = validate_entries(path, &entries)? else {
            self.delete_document(path).await?;
            return Ok(UpsertOutcome::Applied);
        };

        let mut tx = self.pool.begin().await?;

        // Claim the document row first; a newer stored stamp leaves it untouched.
        let claimed = sqlx::query(
            r#"
            INSERT INTO index_documents (path, updated_at) VALUES (?, ?)
            ON CONFLICT(path) DO UPDATE SET updated_at = excluded.updated_at
            WHERE excluded.updated_at >= index_documents.updated_at
            "#,
        )
        .bind(path)
        .bind(stamp)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            tx.rollback().await?;
            return Ok(UpsertOutcome::SkippedStale);
        }

        sqlx::query("DELETE FROM index_entries WHERE document_path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;

        for entry in &entries {
            sqlx::query(
                r#"
                INSERT INTO index_entries
                    (document_path, offset_start, offset_end, text, embedding, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(path)
            .bind(entry.chunk_id.offset_start as i64)
            .bind(entry.offset_end as i64)
            .bind(&entry.text)
            .bind(vec_to_blob(&entry.vector))
            .bind(entry.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(UpsertOutcome::Applied)
    }

    async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<ScoredEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT document_path, offset_start, offset_end, text, embedding, updated_at
            FROM index_entries
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let entries = rows.iter().map(row_to_entry).collect::<Result<Vec<_>>>()?;
        Ok(rank_entries(query_vector, entries.iter(), top_k))
    }

    async fn delete_document(&self, path: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM index_entries WHERE document_path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM index_documents WHERE path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(removed > 0)
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(to_usize(count)?)
    }

    async fn document_paths(&self) -> Result<Vec<String>> {
        let paths: Vec<String> =
            sqlx::query_scalar("SELECT path FROM index_documents ORDER BY path ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(paths)
    }
}
