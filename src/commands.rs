use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, get_config_dir};
use crate::embeddings::ollama::OllamaClient;
use crate::retrieval::RetrievalService;
use crate::store::Database;

/// Show the current configuration
#[inline]
pub fn show_config() -> Result<()> {
    let config_dir = get_config_dir()?;
    let config = Config::load(&config_dir)?;

    println!("Configuration ({}):", config.config_file_path().display());
    println!();
    println!("Ollama:");
    println!(
        "  URL: {}://{}:{}",
        config.ollama.protocol, config.ollama.host, config.ollama.port
    );
    println!("  Model: {}", config.ollama.model);
    println!("  Embedding dimension: {}", config.ollama.embedding_dimension);
    println!("  Batch size: {}", config.ollama.batch_size);
    println!("  Timeout: {}s", config.ollama.timeout_seconds);
    println!();
    println!("Chunking:");
    println!("  Chunk size: {} characters", config.chunking.chunk_size);
    println!("  Overlap: {} characters", config.chunking.overlap);
    println!();
    println!("Search:");
    println!("  Default top-k: {}", config.search.default_top_k);

    Ok(())
}

/// Write the default configuration file if none exists yet
#[inline]
pub fn init_config() -> Result<()> {
    let config_dir = get_config_dir()?;
    let config = Config::load(&config_dir)?;

    if config.config_file_path().exists() {
        println!(
            "Configuration already exists at {}",
            config.config_file_path().display()
        );
        return Ok(());
    }

    config.save()?;
    println!("Wrote {}", config.config_file_path().display());

    Ok(())
}

/// Chunk, embed, and store a document read from a file
#[inline]
pub async fn ingest_document(
    document_id: &str,
    file: &Path,
    metadata_pairs: &[String],
) -> Result<()> {
    let metadata = parse_metadata(metadata_pairs)?;
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let service = build_service().await?;

    info!("Ingesting {} as document {document_id}", file.display());
    let count = service.ingest(document_id, &text, metadata).await?;

    if count == 0 {
        println!("No chunks produced; document {document_id} was not stored.");
    } else {
        println!("Stored {count} chunks for document {document_id}.");
    }

    Ok(())
}

/// Search one document for the chunks nearest to a question
#[inline]
pub async fn query_document(document_id: &str, question: &str, top_k: Option<usize>) -> Result<()> {
    let service = build_service().await?;

    let results = match top_k {
        Some(k) => service.query(document_id, question, k).await?,
        None => service.query_default(document_id, question).await?,
    };

    if results.is_empty() {
        println!("No matching chunks in document {document_id}.");
        return Ok(());
    }

    println!("{} matching chunks (document order):", results.len());
    println!();
    for chunk in &results {
        println!(
            "[{}] score {:.4} ({})",
            chunk.chunk_index, chunk.similarity_score, chunk.chunk_id
        );
        println!("{}", chunk.chunk_text);
        println!();
    }

    Ok(())
}

/// Remove a document's chunks from the index and the metadata store
#[inline]
pub async fn purge_document(document_id: &str) -> Result<()> {
    let service = build_service().await?;

    if service.purge(document_id).await? {
        println!("Purged document {document_id}.");
    } else {
        println!("Document {document_id} had no stored chunks.");
    }

    Ok(())
}

/// Show store/index counts and the result of a consistency check
#[inline]
pub async fn show_status() -> Result<()> {
    let service = build_service().await?;

    let stats = service.stats().await?;
    println!("Chunks in store: {}", stats.store_chunks);
    println!("Entries in index: {}", stats.index_entries);

    let report = service.validate_consistency().await?;
    println!("{}", report.summary());
    for issue in &report.inconsistent_documents {
        println!(
            "  {}: {} of {} chunks indexed",
            issue.document_id, issue.indexed, issue.store_chunks
        );
    }

    Ok(())
}

/// Re-validate consistency and repair any divergence found
#[inline]
pub async fn repair_index() -> Result<()> {
    let service = build_service().await?;

    let report = service.validate_consistency().await?;
    println!("{}", report.summary());

    if !report.is_consistent {
        service.repair_inconsistencies(&report).await?;
        let after = service.validate_consistency().await?;
        println!("After repair: {}", after.summary());
    }

    Ok(())
}

async fn build_service() -> Result<RetrievalService> {
    let config_dir = get_config_dir()?;
    let config = Config::load(&config_dir)?;

    std::fs::create_dir_all(&config.base_dir).with_context(|| {
        format!("Failed to create data directory: {}", config.base_dir.display())
    })?;

    let database = Database::new(config.database_path())
        .await
        .context("Failed to initialize metadata store")?;

    let embedder = OllamaClient::new(&config.ollama)?;
    embedder
        .health_check()
        .context("Ollama is not reachable; check the configured URL and model")?;

    let service = RetrievalService::new(&config, database, Arc::new(embedder)).await?;
    Ok(service)
}

fn parse_metadata(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut metadata = HashMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Invalid metadata pair '{pair}', expected key=value"))?;
        metadata.insert(key.to_string(), value.to_string());
    }
    Ok(metadata)
}
