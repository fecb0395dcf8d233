//! Data types for indexed chunks and search hits.

use serde::{Deserialize, Serialize};

/// A segment of a topic's reference text with its vector embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk, `{topic}_{ordinal}`.
    pub id: String,
    /// The topic this chunk was cut from.
    pub topic: String,
    /// Position of the chunk within the topic's reference text.
    pub ordinal: usize,
    /// The text content of the chunk.
    pub text: String,
    /// The vector embedding for this chunk's text. Empty until embedded.
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// Create an un-embedded chunk.
    pub fn new(topic: &str, ordinal: usize, text: impl Into<String>) -> Self {
        Self {
            id: format!("{topic}_{ordinal}"),
            topic: topic.to_string(),
            ordinal,
            text: text.into(),
            embedding: Vec::new(),
        }
    }
}

/// A retrieved chunk paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    /// ID of the retrieved chunk.
    pub chunk_id: String,
    /// Position of the chunk within its topic.
    pub ordinal: usize,
    /// The chunk's text.
    pub text: String,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}
