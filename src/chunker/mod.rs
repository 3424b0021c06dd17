
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for splitting document text into retrievable chunks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap in characters between adjacent chunks; only literally
    /// applied by the fixed-window strategy
    pub overlap: usize,
    /// Which splitting strategy to use
    pub strategy: ChunkStrategy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Accumulate whole paragraphs until the next one would exceed the
    /// target size. Chunks are bounded above by roughly
    /// `chunk_size + len(one paragraph)`.
    #[default]
    Paragraph,
    /// Fixed-width windows of `chunk_size` characters sliding by
    /// `chunk_size - overlap`.
    FixedWindow,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
            strategy: ChunkStrategy::Paragraph,
        }
    }
}

/// Split document text into chunks in document order.
///
/// Empty input produces an empty sequence. A single paragraph longer than
/// `chunk_size` is emitted as its own oversized chunk rather than truncated.
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let chunks = match config.strategy {
        ChunkStrategy::Paragraph => chunk_by_paragraphs(text, config.chunk_size),
        ChunkStrategy::FixedWindow => {
            chunk_fixed_window(text, config.chunk_size, config.overlap)
        }
    };

    debug!(
        "Chunked {} chars into {} chunks ({:?})",
        text.len(),
        chunks.len(),
        config.strategy
    );

    chunks
}

/// Paragraph-accumulating strategy: flush the running buffer whenever
/// appending the next paragraph would push it past `chunk_size`.
fn chunk_by_paragraphs(text: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_chars = 0;

    for paragraph in text.lines().map(str::trim).filter(|p| !p.is_empty()) {
        let paragraph_chars = paragraph.chars().count();

        // +1 accounts for the newline joining paragraphs within a chunk
        if !buffer.is_empty() && buffer_chars + 1 + paragraph_chars > chunk_size {
            chunks.push(std::mem::take(&mut buffer));
            buffer_chars = 0;
        }

        if !buffer.is_empty() {
            buffer.push('\n');
            buffer_chars += 1;
        }
        buffer.push_str(paragraph);
        buffer_chars += paragraph_chars;
    }

    if !buffer.is_empty() {
        chunks.push(buffer);
    }

    chunks
}

/// Fixed-width sliding window over characters, stepping by
/// `chunk_size - overlap`. Char-boundary safe.
fn chunk_fixed_window(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        start += step;
    }

    chunks
}
