
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use super::models::{ChunkRecord, ChunkRow, NewChunkRecord};

pub struct ChunkQueries;

impl ChunkQueries {
    /// Insert a batch of chunk rows in one transaction; a failure inserts
    /// nothing.
    #[inline]
    pub async fn insert_many(pool: &SqlitePool, records: &[NewChunkRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().naive_utc();
        let mut tx = pool.begin().await.context("Failed to begin transaction")?;

        for record in records {
            let chunk_id = record.chunk_id();
            let embedding = serde_json::to_string(&record.embedding)
                .context("Failed to serialize embedding")?;
            let metadata =
                serde_json::to_string(&record.metadata).context("Failed to serialize metadata")?;

            sqlx::query(
                "INSERT INTO chunks (chunk_id, document_id, chunk_index, chunk_text, embedding, metadata, vector_id, created_date) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk_id)
            .bind(&record.document_id)
            .bind(record.chunk_index)
            .bind(&record.chunk_text)
            .bind(embedding)
            .bind(metadata)
            .bind(record.vector_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert chunk {chunk_id}"))?;
        }

        tx.commit().await.context("Failed to commit chunk insert")?;

        debug!("Inserted {} chunk records", records.len());
        Ok(records.len() as u64)
    }

    /// All chunks of a document, ordered by chunk_index.
    #[inline]
    pub async fn list_by_document(pool: &SqlitePool, document_id: &str) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query_as::<_, ChunkRow>(
            "SELECT chunk_id, document_id, chunk_index, chunk_text, embedding, metadata, vector_id, created_date \
             FROM chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(pool)
        .await
        .context("Failed to list chunks by document")?;

        rows.into_iter().map(ChunkRecord::try_from).collect()
    }

    /// Chunks matching a set of derived chunk ids, ordered by chunk_index.
    #[inline]
    pub async fn get_by_chunk_ids(pool: &SqlitePool, chunk_ids: &[String]) -> Result<Vec<ChunkRecord>> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; chunk_ids.len()].join(", ");
        let sql = format!(
            "SELECT chunk_id, document_id, chunk_index, chunk_text, embedding, metadata, vector_id, created_date \
             FROM chunks WHERE chunk_id IN ({placeholders}) ORDER BY chunk_index",
        );

        let mut query = sqlx::query_as::<_, ChunkRow>(&sql);
        for chunk_id in chunk_ids {
            query = query.bind(chunk_id);
        }

        let rows = query
            .fetch_all(pool)
            .await
            .context("Failed to get chunks by chunk ids")?;

        rows.into_iter().map(ChunkRecord::try_from).collect()
    }

    /// Chunks of one document matching a set of vector ids (query path:
    /// index hits reconciled back to text, scoped to the owning document).
    #[inline]
    pub async fn get_by_vector_ids(
        pool: &SqlitePool,
        document_id: &str,
        vector_ids: &[i64],
    ) -> Result<Vec<ChunkRecord>> {
        if vector_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; vector_ids.len()].join(", ");
        let sql = format!(
            "SELECT chunk_id, document_id, chunk_index, chunk_text, embedding, metadata, vector_id, created_date \
             FROM chunks WHERE document_id = ? AND vector_id IN ({placeholders}) ORDER BY chunk_index",
        );

        let mut query = sqlx::query_as::<_, ChunkRow>(&sql).bind(document_id);
        for vector_id in vector_ids {
            query = query.bind(vector_id);
        }

        let rows = query
            .fetch_all(pool)
            .await
            .context("Failed to get chunks by vector ids")?;

        rows.into_iter().map(ChunkRecord::try_from).collect()
    }

    /// Vector ids currently stored for a document.
    #[inline]
    pub async fn vector_ids_for_document(pool: &SqlitePool, document_id: &str) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT vector_id FROM chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(pool)
        .await
        .context("Failed to list vector ids for document")?;

        Ok(ids)
    }

    /// Delete all chunks of a document, returning the deleted count.
    #[inline]
    pub async fn delete_by_document(pool: &SqlitePool, document_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(pool)
            .await
            .context("Failed to delete chunks by document")?;

        Ok(result.rows_affected())
    }

    /// Every stored chunk; used to rebuild the vector index at startup.
    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query_as::<_, ChunkRow>(
            "SELECT chunk_id, document_id, chunk_index, chunk_text, embedding, metadata, vector_id, created_date \
             FROM chunks ORDER BY vector_id",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list all chunks")?;

        rows.into_iter().map(ChunkRecord::try_from).collect()
    }

    /// Highest vector id ever stored; seeds the surrogate-id counter.
    #[inline]
    pub async fn max_vector_id(pool: &SqlitePool) -> Result<Option<i64>> {
        let max = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(vector_id) FROM chunks")
            .fetch_one(pool)
            .await
            .context("Failed to get max vector id")?;

        Ok(max)
    }

    #[inline]
    pub async fn count_by_document(pool: &SqlitePool, document_id: &str) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chunks WHERE document_id = ?")
                .bind(document_id)
                .fetch_one(pool)
                .await
                .context("Failed to count chunks for document")?;

        Ok(count)
    }

    #[inline]
    pub async fn count_all(pool: &SqlitePool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chunks")
            .fetch_one(pool)
            .await
            .context("Failed to count chunks")?;

        Ok(count)
    }
}
