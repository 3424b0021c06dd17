//! Cross-store consistency checking.
//!
//! The metadata store and the vector index must agree on which vector ids
//! exist. This module compares the two and can repair a divergence using
//! the embedding copies kept in the store.

use std::collections::HashSet;

use itertools::Itertools;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::index::FlatIndex;
use crate::store::Database;
use crate::{Result, RetrievalError};

/// Outcome of one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub store_chunks: usize,
    pub index_entries: usize,
    /// Vector ids with a store row but no index entry.
    pub missing_in_index: Vec<i64>,
    /// Index entries with no backing store row.
    pub orphaned_in_index: Vec<i64>,
    pub inconsistent_documents: Vec<DocumentConsistencyIssue>,
    pub is_consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentConsistencyIssue {
    pub document_id: String,
    pub store_chunks: usize,
    pub indexed: usize,
    pub missing_in_index: Vec<i64>,
}

impl ConsistencyReport {
    #[inline]
    pub fn total_issues(&self) -> usize {
        self.missing_in_index.len() + self.orphaned_in_index.len()
    }

    #[inline]
    pub fn summary(&self) -> String {
        if self.is_consistent {
            format!(
                "Consistent: {} chunks in store, {} entries in index",
                self.store_chunks, self.index_entries
            )
        } else {
            format!(
                "Inconsistent: {} store rows missing from index, {} orphaned index entries ({} documents affected)",
                self.missing_in_index.len(),
                self.orphaned_in_index.len(),
                self.inconsistent_documents.len()
            )
        }
    }
}

/// Compares the metadata store against the in-memory index.
pub struct ConsistencyValidator<'a> {
    database: &'a Database,
    index: &'a RwLock<FlatIndex>,
}

impl<'a> ConsistencyValidator<'a> {
    #[inline]
    pub fn new(database: &'a Database, index: &'a RwLock<FlatIndex>) -> Self {
        Self { database, index }
    }

    /// Compare vector id sets in both directions and group the store-side
    /// gaps by document.
    #[inline]
    pub async fn validate(&self) -> Result<ConsistencyReport> {
        let stored = self.database.all_chunks().await.map_err(store_err)?;

        let index_ids: HashSet<i64> = {
            let index = self.index.read().await;
            index.ids().iter().copied().collect()
        };
        let store_ids: HashSet<i64> = stored.iter().map(|c| c.vector_id).collect();

        let missing_in_index: Vec<i64> = store_ids
            .difference(&index_ids)
            .copied()
            .sorted()
            .collect();
        let orphaned_in_index: Vec<i64> = index_ids
            .difference(&store_ids)
            .copied()
            .sorted()
            .collect();

        let missing_set: HashSet<i64> = missing_in_index.iter().copied().collect();
        let mut inconsistent_documents = Vec::new();
        for (document_id, chunks) in &stored
            .iter()
            .sorted_by(|a, b| a.document_id.cmp(&b.document_id))
            .chunk_by(|c| c.document_id.clone())
        {
            let chunks: Vec<_> = chunks.collect();
            let missing: Vec<i64> = chunks
                .iter()
                .map(|c| c.vector_id)
                .filter(|id| missing_set.contains(id))
                .sorted()
                .collect();
            if !missing.is_empty() {
                inconsistent_documents.push(DocumentConsistencyIssue {
                    document_id,
                    store_chunks: chunks.len(),
                    indexed: chunks.len() - missing.len(),
                    missing_in_index: missing,
                });
            }
        }

        let is_consistent = missing_in_index.is_empty() && orphaned_in_index.is_empty();
        if !is_consistent {
            warn!(
                "Store/index divergence: {} missing from index, {} orphaned",
                missing_in_index.len(),
                orphaned_in_index.len()
            );
        }

        Ok(ConsistencyReport {
            store_chunks: stored.len(),
            index_entries: index_ids.len(),
            missing_in_index,
            orphaned_in_index,
            inconsistent_documents,
            is_consistent,
        })
    }

    /// Drop index entries that have no backing store row. Returns the
    /// number of entries removed.
    #[inline]
    pub async fn remove_orphaned(&self, orphaned_ids: &[i64]) -> usize {
        if orphaned_ids.is_empty() {
            return 0;
        }

        self.index.write().await.remove(orphaned_ids);
        debug!("Removed {} orphaned index entries", orphaned_ids.len());
        orphaned_ids.len()
    }

    /// Re-add store rows to the index from their embedding copies. Returns
    /// the number of entries restored.
    #[inline]
    pub async fn restore_missing(&self, missing_ids: &[i64]) -> Result<usize> {
        if missing_ids.is_empty() {
            return Ok(0);
        }

        let wanted: HashSet<i64> = missing_ids.iter().copied().collect();
        let stored = self.database.all_chunks().await.map_err(store_err)?;

        let mut ids = Vec::with_capacity(missing_ids.len());
        let mut vectors = Vec::with_capacity(missing_ids.len());
        for chunk in &stored {
            if wanted.contains(&chunk.vector_id) {
                ids.push(chunk.vector_id);
                vectors.push(chunk.embedding.clone());
            }
        }

        if ids.len() != missing_ids.len() {
            return Err(RetrievalError::Consistency(format!(
                "Only {} of {} missing vector ids still have store rows",
                ids.len(),
                missing_ids.len()
            )));
        }

        self.index.write().await.add(&ids, &vectors)?;
        debug!("Restored {} index entries from stored embeddings", ids.len());
        Ok(ids.len())
    }
}

fn store_err(e: anyhow::Error) -> RetrievalError {
    RetrievalError::Store(format!("{e:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::NewChunkRecord;
    use std::collections::HashMap;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Database, RwLock<FlatIndex>) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let database = Database::new(temp_dir.path().join("metadata.db"))
            .await
            .expect("Failed to create test database");
        let index = RwLock::new(FlatIndex::new(2));
        (temp_dir, database, index)
    }

    fn record(document_id: &str, chunk_index: i64, vector_id: i64) -> NewChunkRecord {
        NewChunkRecord {
            document_id: document_id.to_string(),
            chunk_index,
            chunk_text: format!("chunk {chunk_index}"),
            embedding: vec![vector_id as f32, 0.0],
            metadata: HashMap::new(),
            vector_id,
        }
    }

    #[tokio::test]
    async fn empty_stores_are_consistent() {
        let (_temp_dir, database, index) = setup().await;

        let report = ConsistencyValidator::new(&database, &index)
            .validate()
            .await
            .expect("validation should succeed");

        assert!(report.is_consistent);
        assert_eq!(report.total_issues(), 0);
        assert!(report.summary().starts_with("Consistent"));
    }

    #[tokio::test]
    async fn detects_rows_missing_from_index() {
        let (_temp_dir, database, index) = setup().await;

        database
            .insert_chunks(&[record("doc-a", 0, 1), record("doc-a", 1, 2)])
            .await
            .expect("insert should succeed");
        index
            .write()
            .await
            .add(&[1], &[vec![1.0, 0.0]])
            .expect("index add should succeed");

        let report = ConsistencyValidator::new(&database, &index)
            .validate()
            .await
            .expect("validation should succeed");

        assert!(!report.is_consistent);
        assert_eq!(report.missing_in_index, vec![2]);
        assert!(report.orphaned_in_index.is_empty());
        assert_eq!(report.inconsistent_documents.len(), 1);
        assert_eq!(report.inconsistent_documents[0].document_id, "doc-a");
        assert_eq!(report.inconsistent_documents[0].indexed, 1);
    }

    #[tokio::test]
    async fn detects_orphaned_index_entries() {
        let (_temp_dir, database, index) = setup().await;

        index
            .write()
            .await
            .add(&[7, 8], &[vec![1.0, 0.0], vec![0.0, 1.0]])
            .expect("index add should succeed");

        let report = ConsistencyValidator::new(&database, &index)
            .validate()
            .await
            .expect("validation should succeed");

        assert!(!report.is_consistent);
        assert_eq!(report.orphaned_in_index, vec![7, 8]);
        assert!(report.inconsistent_documents.is_empty());
    }

    #[tokio::test]
    async fn repair_restores_and_removes() {
        let (_temp_dir, database, index) = setup().await;

        database
            .insert_chunks(&[record("doc-a", 0, 1)])
            .await
            .expect("insert should succeed");
        index
            .write()
            .await
            .add(&[9], &[vec![0.5, 0.5]])
            .expect("index add should succeed");

        let validator = ConsistencyValidator::new(&database, &index);
        let report = validator.validate().await.expect("validation should succeed");
        assert_eq!(report.missing_in_index, vec![1]);
        assert_eq!(report.orphaned_in_index, vec![9]);

        let removed = validator.remove_orphaned(&report.orphaned_in_index).await;
        assert_eq!(removed, 1);
        let restored = validator
            .restore_missing(&report.missing_in_index)
            .await
            .expect("restore should succeed");
        assert_eq!(restored, 1);

        let after = validator.validate().await.expect("validation should succeed");
        assert!(after.is_consistent);
    }

    #[tokio::test]
    async fn restore_fails_when_store_row_vanished() {
        let (_temp_dir, database, index) = setup().await;

        let validator = ConsistencyValidator::new(&database, &index);
        let result = validator.restore_missing(&[42]).await;

        assert!(matches!(result, Err(RetrievalError::Consistency(_))));
    }
}
