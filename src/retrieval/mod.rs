// Retrieval service module
// Orchestrates chunking, embedding, the vector index, and the metadata
// store, and owns the invariant that the two stores agree on which chunk
// ids exist.


pub mod consistency;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, warn};

use crate::chunker::{ChunkingConfig, chunk_text};
use crate::config::Config;
use crate::embeddings::Embedder;
use crate::index::{FlatIndex, MISSING_ID};
use crate::store::Database;
use crate::store::models::NewChunkRecord;
use crate::{Result, RetrievalError};

pub use consistency::{ConsistencyReport, ConsistencyValidator, DocumentConsistencyIssue};

/// One ranked result returned by [`RetrievalService::query`], in document
/// order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_text: String,
    pub chunk_index: i64,
    pub metadata: HashMap<String, String>,
    pub similarity_score: f32,
}

/// Store and index entry counts, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    pub store_chunks: u64,
    pub index_entries: usize,
}

/// Document-scoped vector retrieval over a shared in-process index and a
/// SQLite metadata store.
///
/// Explicitly constructed and passed by handle; one index per process by
/// construction, no global state. Ingest and purge are serialized per
/// document id; different documents proceed in parallel up to the shared
/// index critical section.
pub struct RetrievalService {
    database: Database,
    embedder: Arc<dyn Embedder>,
    index: RwLock<FlatIndex>,
    chunking: ChunkingConfig,
    default_top_k: usize,
    next_vector_id: AtomicI64,
    document_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RetrievalService {
    /// Build the service and rebuild the vector index from the store's
    /// embedding copies. The surrogate-id counter resumes above the highest
    /// id ever stored, so ids never collide across documents or restarts.
    #[inline]
    pub async fn new(
        config: &Config,
        database: Database,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let mut index = FlatIndex::new(embedder.dimension());

        let stored = database.all_chunks().await.map_err(store_err)?;
        if !stored.is_empty() {
            let ids: Vec<i64> = stored.iter().map(|c| c.vector_id).collect();
            let vectors: Vec<Vec<f32>> = stored.iter().map(|c| c.embedding.clone()).collect();
            index.add(&ids, &vectors)?;
            info!("Rebuilt vector index with {} entries", ids.len());
        }

        let max_vector_id = database.max_vector_id().await.map_err(store_err)?;

        Ok(Self {
            database,
            embedder,
            index: RwLock::new(index),
            chunking: config.chunking,
            default_top_k: config.search.default_top_k,
            next_vector_id: AtomicI64::new(max_vector_id.unwrap_or(0) + 1),
            document_locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Chunk, embed, and store a document's text, returning the number of
    /// chunks stored.
    ///
    /// Re-ingesting a document replaces its previous chunk set. Empty text
    /// returns 0 without touching either store. If the metadata insert
    /// fails after the vectors were added, the just-added ids are removed
    /// again before the error surfaces, so a failed ingest is never
    /// partially queryable.
    #[inline]
    pub async fn ingest(
        &self,
        document_id: &str,
        text: &str,
        metadata: HashMap<String, String>,
    ) -> Result<usize> {
        let _guard = self.lock_document(document_id).await;

        let chunks = chunk_text(text, &self.chunking);
        if chunks.is_empty() {
            debug!("Document {document_id} produced no chunks, nothing to store");
            return Ok(0);
        }

        // Re-ingest replaces any earlier chunk set for this document
        self.purge_locked(document_id).await?;

        let embeddings = self.embedder.embed_many(&chunks)?;
        if embeddings.len() != chunks.len() {
            return Err(RetrievalError::Embedding(format!(
                "Embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let first_id = self
            .next_vector_id
            .fetch_add(chunks.len() as i64, Ordering::SeqCst);
        let vector_ids: Vec<i64> = (0..chunks.len() as i64).map(|i| first_id + i).collect();

        let records: Vec<NewChunkRecord> = chunks
            .iter()
            .zip(embeddings.iter())
            .enumerate()
            .map(|(i, (chunk, embedding))| NewChunkRecord {
                document_id: document_id.to_string(),
                chunk_index: i as i64,
                chunk_text: chunk.clone(),
                embedding: embedding.clone(),
                metadata: metadata.clone(),
                vector_id: vector_ids[i],
            })
            .collect();

        {
            let mut index = self.index.write().await;
            index.add(&vector_ids, &embeddings)?;
        }

        if let Err(e) = self.database.insert_chunks(&records).await {
            warn!(
                "Metadata insert failed for document {document_id}, rolling back {} vectors",
                vector_ids.len()
            );
            self.index.write().await.remove(&vector_ids);
            return Err(RetrievalError::Store(format!("{e:#}")));
        }

        self.verify_ingest(document_id, &vector_ids).await?;

        info!("Ingested {} chunks for document {document_id}", chunks.len());
        Ok(chunks.len())
    }

    /// Nearest-neighbor search scoped to one document, using the configured
    /// default top-k.
    #[inline]
    pub async fn query_default(&self, document_id: &str, question: &str) -> Result<Vec<RetrievedChunk>> {
        self.query(document_id, question, self.default_top_k).await
    }

    /// Find the `k` chunks of `document_id` nearest to `question`.
    ///
    /// Search itself is not document-scoped; hits belonging to other
    /// documents are silently excluded at the metadata-lookup step. Results
    /// are sorted ascending by `chunk_index`, restoring document order
    /// rather than relevance order.
    #[inline]
    pub async fn query(
        &self,
        document_id: &str,
        question: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let query_vector = self.embedder.embed_one(question)?;

        let (distances, ids) = {
            let index = self.index.read().await;
            index.search(&query_vector, k)?
        };

        let mut distance_by_id: HashMap<i64, f32> = HashMap::new();
        let mut hit_ids: Vec<i64> = Vec::with_capacity(ids.len());
        for (id, distance) in ids.iter().zip(distances.iter()) {
            if *id != MISSING_ID && distance.is_finite() {
                distance_by_id.insert(*id, *distance);
                hit_ids.push(*id);
            }
        }

        if hit_ids.is_empty() {
            debug!("Query on document {document_id} matched nothing");
            return Ok(Vec::new());
        }

        let records = self
            .database
            .get_chunks_by_vector_ids(document_id, &hit_ids)
            .await
            .map_err(store_err)?;

        let mut results: Vec<RetrievedChunk> = records
            .into_iter()
            .map(|record| {
                let distance = distance_by_id
                    .get(&record.vector_id)
                    .copied()
                    .unwrap_or(f32::INFINITY);
                RetrievedChunk {
                    chunk_id: record.chunk_id,
                    document_id: record.document_id,
                    chunk_text: record.chunk_text,
                    chunk_index: record.chunk_index,
                    metadata: record.metadata,
                    similarity_score: 1.0 / (1.0 + distance),
                }
            })
            .collect();

        results.sort_by_key(|c| c.chunk_index);

        debug!(
            "Query on document {document_id} returned {} of {} index hits",
            results.len(),
            hit_ids.len()
        );
        Ok(results)
    }

    /// Remove a document's chunks from both stores.
    ///
    /// Returns whether anything was deleted; purging a document with no
    /// chunks is success with `false`, and purging twice in a row is safe.
    #[inline]
    pub async fn purge(&self, document_id: &str) -> Result<bool> {
        let _guard = self.lock_document(document_id).await;
        self.purge_locked(document_id).await
    }

    /// Counts across both stores.
    #[inline]
    pub async fn stats(&self) -> Result<ServiceStats> {
        let store_chunks = self.database.count_chunks().await.map_err(store_err)?;
        let index_entries = self.index.read().await.len();

        Ok(ServiceStats {
            store_chunks: store_chunks.max(0) as u64,
            index_entries,
        })
    }

    /// Validate the bidirectional existence invariant between the metadata
    /// store and the vector index.
    #[inline]
    pub async fn validate_consistency(&self) -> Result<ConsistencyReport> {
        let validator = ConsistencyValidator::new(&self.database, &self.index);
        validator.validate().await
    }

    /// Repair a previously detected divergence: orphaned index entries are
    /// removed, store rows missing from the index are re-added from their
    /// embedding copies.
    #[inline]
    pub async fn repair_inconsistencies(&self, report: &ConsistencyReport) -> Result<()> {
        if report.is_consistent {
            info!("Stores are consistent, no repair needed");
            return Ok(());
        }

        let validator = ConsistencyValidator::new(&self.database, &self.index);

        if !report.orphaned_in_index.is_empty() {
            let removed = validator.remove_orphaned(&report.orphaned_in_index).await;
            info!("Removed {removed} orphaned index entries");
        }

        if !report.missing_in_index.is_empty() {
            let restored = validator.restore_missing(&report.missing_in_index).await?;
            info!("Restored {restored} index entries from stored embeddings");
        }

        Ok(())
    }

    async fn purge_locked(&self, document_id: &str) -> Result<bool> {
        let records = self
            .database
            .get_chunks_for_document(document_id)
            .await
            .map_err(store_err)?;

        if records.is_empty() {
            debug!("No chunks stored for document {document_id}");
            return Ok(false);
        }

        let vector_ids: Vec<i64> = records.iter().map(|r| r.vector_id).collect();

        self.index.write().await.remove(&vector_ids);

        match self.database.delete_chunks_for_document(document_id).await {
            Ok(deleted) => {
                let remaining = self
                    .database
                    .count_chunks_for_document(document_id)
                    .await
                    .map_err(store_err)?;
                if remaining != 0 {
                    return Err(RetrievalError::Consistency(format!(
                        "{remaining} chunk rows left for document {document_id} after purge"
                    )));
                }

                info!("Purged {deleted} chunks for document {document_id}");
                Ok(deleted > 0)
            }
            Err(e) => {
                // Restore the removed vectors so both stores still agree
                let embeddings: Vec<Vec<f32>> =
                    records.iter().map(|r| r.embedding.clone()).collect();
                if let Err(restore_err) = self.index.write().await.add(&vector_ids, &embeddings) {
                    error!(
                        "Failed to restore vectors after purge failure for document {document_id}: {restore_err}"
                    );
                }
                Err(RetrievalError::Store(format!("{e:#}")))
            }
        }
    }

    /// Defensive post-ingest check of the bidirectional invariant.
    async fn verify_ingest(&self, document_id: &str, vector_ids: &[i64]) -> Result<()> {
        let stored = self
            .database
            .vector_ids_for_document(document_id)
            .await
            .map_err(store_err)?;

        if stored != vector_ids {
            return Err(RetrievalError::Consistency(format!(
                "Store holds vector ids {stored:?} for document {document_id}, expected {vector_ids:?}"
            )));
        }

        let index = self.index.read().await;
        for id in vector_ids {
            if !index.contains(*id) {
                return Err(RetrievalError::Consistency(format!(
                    "Vector id {id} for document {document_id} missing from the index"
                )));
            }
        }

        Ok(())
    }

    /// Per-document mutual exclusion token; ingest and purge for the same
    /// document id never overlap.
    async fn lock_document(&self, document_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .document_locks
                .lock()
                .expect("document lock map poisoned");
            Arc::clone(locks.entry(document_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

fn store_err(e: anyhow::Error) -> RetrievalError {
    RetrievalError::Store(format!("{e:#}"))
}
