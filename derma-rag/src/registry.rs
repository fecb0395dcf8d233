//! The process-wide mapping from topic name to its index.
//!
//! The registry is built once, eagerly, before the service is ready and is
//! never mutated afterwards, so request handlers share it without locking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::{StreamExt, stream};
use tracing::{error, info, warn};

use crate::chunking::Chunker;
use crate::config::{BuildPolicy, IndexingConfig};
use crate::corpus::ReferenceCorpus;
use crate::embedding::EmbeddingProvider;
use crate::error::{IndexBuildError, RegistryBuildError, TopicNotFoundError};
use crate::index::TopicIndex;

/// Outcome of a registry build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    /// Topics that were indexed, sorted.
    pub indexed: Vec<String>,
    /// Topics left out of the registry, sorted by topic.
    pub failed: Vec<IndexBuildError>,
}

impl BuildReport {
    /// `true` if every corpus topic was indexed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Read-only mapping from topic name to [`TopicIndex`].
#[derive(Debug, Clone, Default)]
pub struct IndexRegistry {
    indices: HashMap<String, Arc<TopicIndex>>,
}

impl IndexRegistry {
    /// Build one index per corpus topic.
    ///
    /// Under [`BuildPolicy::DegradeGracefully`] failing topics are logged and
    /// omitted; under [`BuildPolicy::FailFast`] the first failure aborts.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryBuildError`] only under the fail-fast policy.
    pub async fn build(
        corpus: &ReferenceCorpus,
        embedder: &dyn EmbeddingProvider,
        config: &IndexingConfig,
    ) -> Result<(Self, BuildReport), RegistryBuildError> {
        let chunker = config.chunking.chunker();
        Self::build_with_chunker(corpus, embedder, chunker.as_ref(), config).await
    }

    /// Like [`build`](Self::build) with a caller-supplied chunker.
    pub async fn build_with_chunker(
        corpus: &ReferenceCorpus,
        embedder: &dyn EmbeddingProvider,
        chunker: &dyn Chunker,
        config: &IndexingConfig,
    ) -> Result<(Self, BuildReport), RegistryBuildError> {
        let started = Instant::now();
        let mut builds = stream::iter(corpus.entries())
            .map(|entry| TopicIndex::build(entry, chunker, embedder))
            .buffer_unordered(config.concurrency.max(1));

        let mut indices = HashMap::with_capacity(corpus.len());
        let mut report = BuildReport::default();

        while let Some(result) = builds.next().await {
            match result {
                Ok(index) => {
                    let topic = index.topic().to_string();
                    report.indexed.push(topic.clone());
                    indices.insert(topic, Arc::new(index));
                }
                Err(e) => match config.policy {
                    BuildPolicy::FailFast => {
                        error!(topic = e.topic(), error = %e, "topic index build failed, aborting startup");
                        return Err(RegistryBuildError::Index(e));
                    }
                    BuildPolicy::DegradeGracefully => {
                        warn!(topic = e.topic(), error = %e, "topic index build failed, topic omitted");
                        report.failed.push(e);
                    }
                },
            }
        }

        report.indexed.sort();
        report.failed.sort_by(|a, b| a.topic().cmp(b.topic()));

        info!(
            indexed = report.indexed.len(),
            failed = report.failed.len(),
            elapsed = ?started.elapsed(),
            "index registry built"
        );
        Ok((Self { indices }, report))
    }

    /// Assemble a registry from prebuilt indices. Later duplicates replace
    /// earlier ones.
    pub fn from_indices(indices: impl IntoIterator<Item = TopicIndex>) -> Self {
        let indices = indices
            .into_iter()
            .map(|index| (index.topic().to_string(), Arc::new(index)))
            .collect();
        Self { indices }
    }

    /// The index for `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`TopicNotFoundError`] if the topic was not in the corpus or
    /// failed to index.
    pub fn lookup(&self, topic: &str) -> Result<Arc<TopicIndex>, TopicNotFoundError> {
        self.indices
            .get(topic)
            .cloned()
            .ok_or_else(|| TopicNotFoundError { topic: topic.to_string() })
    }

    /// Whether `topic` has an index.
    pub fn contains(&self, topic: &str) -> bool {
        self.indices.contains_key(topic)
    }

    /// Indexed topic names, sorted.
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.indices.keys().map(String::as_str).collect();
        topics.sort_unstable();
        topics
    }

    /// Number of indexed topics.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// `true` if no topic is servable.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
