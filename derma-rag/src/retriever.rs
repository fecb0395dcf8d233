//! Query-time retrieval against a single topic index.

use std::sync::Arc;

use tracing::{debug, error};

use crate::config::RetrievalConfig;
use crate::document::SearchHit;
use crate::embedding::EmbeddingProvider;
use crate::error::RetrievalError;
use crate::index::TopicIndex;

/// Fragments returned by one similarity search, most relevant first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievedContext {
    hits: Vec<SearchHit>,
}

impl RetrievedContext {
    /// Wrap already-ordered hits.
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }

    /// The scored hits.
    pub fn hits(&self) -> &[SearchHit] {
        &self.hits
    }

    /// Fragment texts in relevance order.
    pub fn fragments(&self) -> impl Iterator<Item = &str> {
        self.hits.iter().map(|hit| hit.text.as_str())
    }

    /// Fragments joined with newlines, order preserved.
    pub fn evidence(&self) -> String {
        self.fragments().collect::<Vec<_>>().join("\n")
    }

    /// Number of fragments.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// `true` if nothing was retrieved.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Embeds queries and searches topic indices.
///
/// Must share its [`EmbeddingProvider`] with the index builder.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
}

impl Retriever {
    /// Create a retriever.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, config: RetrievalConfig) -> Self {
        Self { embedder, config }
    }

    /// The retrieval parameters.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve up to the configured `top_k` fragments for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError`] if the query cannot be embedded or its
    /// dimension does not match the index.
    pub async fn retrieve(
        &self,
        index: &TopicIndex,
        query: &str,
    ) -> Result<RetrievedContext, RetrievalError> {
        self.retrieve_with_k(index, query, self.config.top_k).await
    }

    /// Retrieve up to `k` fragments for `query`, overriding the configured `top_k`.
    pub async fn retrieve_with_k(
        &self,
        index: &TopicIndex,
        query: &str,
        k: usize,
    ) -> Result<RetrievedContext, RetrievalError> {
        let topic = index.topic();
        let query_embedding = self.embedder.embed(query).await.map_err(|source| {
            error!(topic, error = %source, "query embedding failed");
            RetrievalError::Embedding { topic: topic.to_string(), source }
        })?;

        let mut hits = index.search(&query_embedding, k, self.config.metric)?;
        if let Some(threshold) = self.config.min_score {
            hits.retain(|hit| hit.score >= threshold);
        }

        debug!(
            topic,
            k,
            hit_count = hits.len(),
            top_score = hits.first().map(|h| h.score),
            "retrieved context"
        );
        Ok(RetrievedContext::new(hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;
    use crate::testing::LookupEmbedder;

    fn index_with_scores() -> TopicIndex {
        let vectors = [[1.0, 0.0], [0.9, 0.1], [0.5, 0.5], [0.1, 0.9], [0.0, 1.0]];
        let chunks = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut chunk = Chunk::new("eczema", i, format!("fragment {i}"));
                chunk.embedding = v.to_vec();
                chunk
            })
            .collect();
        TopicIndex::from_chunks("eczema", chunks).unwrap()
    }

    fn retriever(config: RetrievalConfig) -> Retriever {
        let embedder = LookupEmbedder::new(vec![0.0, 1.0]).with("dry skin", vec![1.0, 0.0]);
        Retriever::new(Arc::new(embedder), config)
    }

    #[tokio::test]
    async fn default_k_returns_four_of_five_most_relevant_first() {
        let context =
            retriever(RetrievalConfig::default()).retrieve(&index_with_scores(), "dry skin").await.unwrap();

        let fragments: Vec<_> = context.fragments().collect();
        assert_eq!(fragments, vec!["fragment 0", "fragment 1", "fragment 2", "fragment 3"]);
        assert_eq!(context.evidence(), "fragment 0\nfragment 1\nfragment 2\nfragment 3");
    }

    #[tokio::test]
    async fn k_larger_than_index_returns_everything() {
        let context = retriever(RetrievalConfig::default())
            .retrieve_with_k(&index_with_scores(), "other", 50)
            .await
            .unwrap();
        assert_eq!(context.len(), 5);
        assert_eq!(context.hits()[0].text, "fragment 4");
    }

    #[tokio::test]
    async fn min_score_filters_weak_hits() {
        let config = RetrievalConfig::builder().top_k(5).min_score(0.9).build().unwrap();
        let context = retriever(config).retrieve(&index_with_scores(), "dry skin").await.unwrap();
        assert_eq!(context.len(), 2);
    }

    #[tokio::test]
    async fn retrieval_is_deterministic() {
        let retriever = retriever(RetrievalConfig::default());
        let index = index_with_scores();
        let first = retriever.retrieve(&index, "dry skin").await.unwrap();
        let second = retriever.retrieve(&index, "dry skin").await.unwrap();
        assert_eq!(first, second);
    }
}
