#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;

/// One stored chunk: the atomic retrievable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Derived key `{document_id}_{chunk_index}`
    pub chunk_id: String,
    pub document_id: String,
    /// Zero-based position within the document's chunk sequence
    pub chunk_index: i64,
    pub chunk_text: String,
    /// Copy of the vector held by the index, kept for rebuild and repair
    pub embedding: Vec<f32>,
    /// Caller-supplied metadata, copied verbatim onto every chunk
    pub metadata: HashMap<String, String>,
    /// Surrogate id joining this row to the vector index
    pub vector_id: i64,
    pub created_date: NaiveDateTime,
}

/// Insert payload for a chunk row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunkRecord {
    pub document_id: String,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub embedding: Vec<f32>,
    pub metadata: HashMap<String, String>,
    pub vector_id: i64,
}

impl NewChunkRecord {
    /// Derive the chunk key, globally unique as long as `document_id` is.
    #[inline]
    pub fn chunk_id(&self) -> String {
        format!("{}_{}", self.document_id, self.chunk_index)
    }
}

/// Raw database row; JSON columns decoded into [`ChunkRecord`] on the way
/// out.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ChunkRow {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub embedding: String,
    pub metadata: String,
    pub vector_id: i64,
    pub created_date: NaiveDateTime,
}

impl TryFrom<ChunkRow> for ChunkRecord {
    type Error = anyhow::Error;

    #[inline]
    fn try_from(row: ChunkRow) -> Result<Self> {
        let embedding: Vec<f32> = serde_json::from_str(&row.embedding)
            .with_context(|| format!("Invalid embedding JSON for chunk {}", row.chunk_id))?;
        let metadata: HashMap<String, String> = serde_json::from_str(&row.metadata)
            .with_context(|| format!("Invalid metadata JSON for chunk {}", row.chunk_id))?;

        Ok(Self {
            chunk_id: row.chunk_id,
            document_id: row.document_id,
            chunk_index: row.chunk_index,
            chunk_text: row.chunk_text,
            embedding,
            metadata,
            vector_id: row.vector_id,
            created_date: row.created_date,
        })
    }
}
