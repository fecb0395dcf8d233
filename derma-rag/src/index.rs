//! Per-topic in-memory vector index.
//!
//! Each [`TopicIndex`] holds the embedded chunks of exactly one topic, so a
//! search can never return text that belongs to a different disease.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunking::Chunker;
use crate::corpus::ReferenceEntry;
use crate::document::{Chunk, SearchHit};
use crate::embedding::EmbeddingProvider;
use crate::error::{IndexBuildError, RetrievalError};

/// How query and chunk vectors are compared. Higher scores are more similar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Cosine of the angle between the vectors. Zero vectors score 0.0.
    #[default]
    Cosine,
    /// Raw inner product.
    DotProduct,
    /// Negated L2 distance.
    NegativeEuclidean,
}

impl SimilarityMetric {
    /// Score `a` against `b`. Both slices must have the same length.
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(a, b),
            Self::DotProduct => dot(a, b),
            Self::NegativeEuclidean => {
                -a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
            }
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::DotProduct => "dot_product",
            Self::NegativeEuclidean => "negative_euclidean",
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" | "dot_product" => Ok(Self::DotProduct),
            "euclidean" | "negative_euclidean" => Ok(Self::NegativeEuclidean),
            other => Err(format!("unknown similarity metric '{other}'")),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

/// An immutable nearest-neighbour index over one topic's chunks.
///
/// Always holds at least one chunk, and every chunk embedding has the same
/// dimensionality.
#[derive(Debug, Clone)]
pub struct TopicIndex {
    topic: String,
    dimensions: usize,
    chunks: Vec<Chunk>,
}

impl TopicIndex {
    /// Chunk, embed and index a single corpus entry.
    ///
    /// # Errors
    ///
    /// Returns [`IndexBuildError`] if the chunker yields nothing, the
    /// provider fails, or the returned vectors are inconsistent.
    pub async fn build(
        entry: &ReferenceEntry,
        chunker: &dyn Chunker,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Self, IndexBuildError> {
        let topic = entry.topic_name.as_str();
        let mut chunks = chunker.chunk(entry);
        if chunks.is_empty() {
            return Err(IndexBuildError::EmptyReference { topic: topic.to_string() });
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = embedder.embed_batch(&texts).await.map_err(|source| {
            IndexBuildError::Embedding { topic: topic.to_string(), source }
        })?;

        if embeddings.len() != chunks.len() {
            return Err(IndexBuildError::VectorCountMismatch {
                topic: topic.to_string(),
                expected: chunks.len(),
                actual: embeddings.len(),
            });
        }

        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }

        let index = Self::from_chunks(topic, chunks)?;
        debug!(topic, chunk_count = index.len(), dimensions = index.dimensions, "built topic index");
        Ok(index)
    }

    /// Assemble an index from already-embedded chunks.
    ///
    /// # Errors
    ///
    /// Returns [`IndexBuildError`] if `chunks` is empty, a vector is empty,
    /// or dimensions disagree.
    pub fn from_chunks(topic: &str, chunks: Vec<Chunk>) -> Result<Self, IndexBuildError> {
        let Some(first) = chunks.first() else {
            return Err(IndexBuildError::EmptyReference { topic: topic.to_string() });
        };

        let dimensions = first.embedding.len();
        for chunk in &chunks {
            if dimensions == 0 || chunk.embedding.len() != dimensions {
                return Err(IndexBuildError::DimensionMismatch {
                    topic: topic.to_string(),
                    expected: dimensions,
                    actual: chunk.embedding.len(),
                });
            }
        }

        Ok(Self { topic: topic.to_string(), dimensions, chunks })
    }

    /// The topic this index covers.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Dimensionality of the stored vectors.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of chunks. Never zero.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Always `false`; provided for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The indexed chunks in ordinal order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Return up to `top_k` chunks most similar to `query`.
    ///
    /// Results are ordered by descending score; equal scores keep chunk
    /// ordinal order, so the result is deterministic for fixed inputs.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::DimensionMismatch`] if `query` has the wrong length.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        metric: SimilarityMetric,
    ) -> Result<Vec<SearchHit>, RetrievalError> {
        if query.len() != self.dimensions {
            return Err(RetrievalError::DimensionMismatch {
                topic: self.topic.clone(),
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(f32, &Chunk)> =
            self.chunks.iter().map(|chunk| (metric.score(&chunk.embedding, query), chunk)).collect();

        scored.sort_by(|(score_a, a), (score_b, b)| {
            score_b.total_cmp(score_a).then_with(|| a.ordinal.cmp(&b.ordinal))
        });
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, chunk)| SearchHit {
                chunk_id: chunk.id.clone(),
                ordinal: chunk.ordinal,
                text: chunk.text.clone(),
                score,
            })
            .collect())
    }
}
