pub mod ollama;

pub use ollama::OllamaClient;

use crate::Result;

/// Maps text to fixed-dimensionality f32 vectors.
///
/// Implementations must be deterministic for a fixed model: the same input
/// text always yields the same vector. Inputs longer than the model's
/// context window are truncated by the backend rather than rejected, so
/// ingestion stays robust for oversized chunks.
pub trait Embedder: Send + Sync {
    /// Embedding dimensionality, fixed for the lifetime of the embedder.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts in one backend call per configured batch.
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text (query path).
    fn embed_one(&self, text: &str) -> Result<Vec<f32>>;
}
