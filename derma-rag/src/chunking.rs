//! Chunking strategies for topic reference text.
//!
//! - [`WholeDocumentChunker`]: one chunk per topic (the default)
//! - [`FixedSizeChunker`]: splits by character count with configurable overlap

use crate::corpus::ReferenceEntry;
use crate::document::Chunk;

/// A strategy for splitting a topic's reference text into chunks.
///
/// Implementations produce [`Chunk`]s with text but no embeddings.
/// Embeddings are attached later by [`TopicIndex::build`](crate::TopicIndex::build).
pub trait Chunker: Send + Sync {
    /// Split an entry into chunks.
    ///
    /// Returns an empty `Vec` if the reference text is blank.
    fn chunk(&self, entry: &ReferenceEntry) -> Vec<Chunk>;
}

/// Keeps the whole reference text as a single chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct WholeDocumentChunker;

impl Chunker for WholeDocumentChunker {
    fn chunk(&self, entry: &ReferenceEntry) -> Vec<Chunk> {
        if entry.reference_text.trim().is_empty() {
            return Vec::new();
        }
        vec![Chunk::new(&entry.topic_name, 0, entry.reference_text.clone())]
    }
}

/// Splits text into fixed-size chunks by character count with configurable overlap.
///
/// Sizes count Unicode scalar values, so multi-byte text is never split
/// inside a character.
///
/// # Example
///
/// ```rust,ignore
/// use derma_rag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(256, 50);
/// let chunks = chunker.chunk(&entry);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, entry: &ReferenceEntry) -> Vec<Chunk> {
        let text = &entry.reference_text;
        if text.trim().is_empty() || self.chunk_size == 0 {
            return Vec::new();
        }

        // Byte offsets of every character boundary, plus the end of the text.
        let boundaries: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
        let char_count = boundaries.len() - 1;
        let step = self.chunk_size.saturating_sub(self.chunk_overlap).max(1);

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < char_count {
            let end = (start + self.chunk_size).min(char_count);
            let piece = &text[boundaries[start]..boundaries[end]];
            chunks.push(Chunk::new(&entry.topic_name, chunks.len(), piece));

            if end == char_count {
                break;
            }
            start += step;
        }

        chunks
    }
}
