#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

use std::collections::HashMap;
use std::sync::Arc;

use docvec::Result;
use docvec::config::Config;
use docvec::embeddings::Embedder;
use docvec::retrieval::RetrievalService;
use docvec::store::Database;
use tempfile::TempDir;

/// Hash-seeded embedder so the full pipeline runs without a live Ollama
/// instance. Identical texts always map to identical vectors.
struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut state: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.bytes() {
            state ^= u64::from(byte);
            state = state.wrapping_mul(0x0000_0100_0000_01b3);
        }

        (0..self.dimension)
            .map(|_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                ((state >> 33) as f32 / (1u64 << 31) as f32) - 0.5
            })
            .collect()
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector_for(text))
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.chunking.chunk_size = 160;
    config.chunking.overlap = 20;
    config
}

async fn create_service(temp_dir: &TempDir) -> RetrievalService {
    let database = Database::new(temp_dir.path().join("metadata.db"))
        .await
        .expect("Failed to create database");

    RetrievalService::new(&test_config(), database, Arc::new(HashEmbedder { dimension: 16 }))
        .await
        .expect("Failed to create service")
}

fn manual_text() -> String {
    [
        "Installation requires a working compiler toolchain and network access to fetch dependencies from the registry before the first build.",
        "Configuration lives in a single TOML file; every field has a sensible default and invalid values are rejected with a precise message.",
        "Ingestion splits a document into overlapping chunks, embeds each chunk, and stores the result so later queries can recover the original text.",
        "Queries embed the question, rank stored chunks by distance, and return the nearest matches re-sorted into document order.",
        "Purging removes every chunk of a document from both the vector index and the metadata store in one operation.",
    ]
    .join("\n\n")
}

#[tokio::test]
async fn full_lifecycle_ingest_query_purge() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let service = create_service(&temp_dir).await;

    let metadata = HashMap::from([("source".to_string(), "user-manual".to_string())]);
    let count = service
        .ingest("manual", &manual_text(), metadata)
        .await
        .expect("ingest should succeed");
    assert!(count >= 5, "each section should become at least one chunk");

    // Querying with one section's exact text surfaces that section first
    let question =
        "Purging removes every chunk of a document from both the vector index and the metadata store in one operation.";
    let results = service
        .query("manual", question, 3)
        .await
        .expect("query should succeed");

    assert!(!results.is_empty());
    let best = results
        .iter()
        .max_by(|a, b| a.similarity_score.total_cmp(&b.similarity_score))
        .expect("results are non-empty");
    assert!(best.chunk_text.contains("Purging removes every chunk"));
    assert!((best.similarity_score - 1.0).abs() < 1e-6);
    assert_eq!(best.metadata.get("source"), Some(&"user-manual".to_string()));

    // Results arrive in document order regardless of relevance ranking
    let indices: Vec<i64> = results.iter().map(|r| r.chunk_index).collect();
    let mut sorted = indices.clone();
    sorted.sort_unstable();
    assert_eq!(indices, sorted);

    assert!(service.purge("manual").await.expect("purge should succeed"));
    let after = service
        .query("manual", question, 3)
        .await
        .expect("query should succeed");
    assert!(after.is_empty());

    let report = service
        .validate_consistency()
        .await
        .expect("validation should succeed");
    assert!(report.is_consistent, "{}", report.summary());
}

#[tokio::test]
async fn documents_are_isolated_and_survive_restart() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    {
        let service = create_service(&temp_dir).await;
        service
            .ingest("alpha", "Shared sentence appearing in both documents.", HashMap::new())
            .await
            .expect("ingest should succeed");
        service
            .ingest("beta", "Shared sentence appearing in both documents.", HashMap::new())
            .await
            .expect("ingest should succeed");
    }

    // Fresh service over the same database: index is rebuilt from the
    // stored embedding copies
    let service = create_service(&temp_dir).await;

    let results = service
        .query("alpha", "Shared sentence appearing in both documents.", 10)
        .await
        .expect("query should succeed");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document_id, "alpha");

    // New ingests after the restart keep allocating non-colliding ids
    service
        .ingest("gamma", "A third document added after the restart.", HashMap::new())
        .await
        .expect("ingest should succeed");

    let report = service
        .validate_consistency()
        .await
        .expect("validation should succeed");
    assert!(report.is_consistent, "{}", report.summary());
}
