//! Configuration for indexing, retrieval, generation and provider access.
//!
//! Every parameter that influences retrieval is explicit here with a
//! documented default. [`ServiceConfig::from_env`] reads overrides from
//! `DERMA_*` and `OPENAI_*` environment variables.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunking::{Chunker, FixedSizeChunker, WholeDocumentChunker};
use crate::error::ConfigError;
use crate::index::SimilarityMetric;
use crate::prompt::PromptLanguage;

/// Default number of fragments returned by a retrieval.
pub const DEFAULT_TOP_K: usize = 4;

/// Default number of topics indexed concurrently at startup.
pub const DEFAULT_BUILD_CONCURRENCY: usize = 4;

/// Default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini-2024-07-18";

/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default OpenAI-compatible API base.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Default corpus location, relative to the working directory.
pub const DEFAULT_CORPUS_PATH: &str = "data/medical_dic.json";

/// Environment variable carrying the provider credential.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Retrieval parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum number of fragments per retrieval. Defaults to [`DEFAULT_TOP_K`].
    pub top_k: usize,
    /// How query and chunk vectors are compared. Defaults to cosine.
    pub metric: SimilarityMetric,
    /// Drop hits scoring below this value. Defaults to no threshold.
    pub min_score: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: DEFAULT_TOP_K, metric: SimilarityMetric::Cosine, min_score: None }
    }
}

impl RetrievalConfig {
    /// Create a new builder for constructing a [`RetrievalConfig`].
    pub fn builder() -> RetrievalConfigBuilder {
        RetrievalConfigBuilder::default()
    }

    /// Check that the parameters are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be greater than zero".to_string()));
        }
        if self.min_score.is_some_and(f32::is_nan) {
            return Err(ConfigError::Invalid("min_score must be a number".to_string()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RetrievalConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetrievalConfigBuilder {
    config: RetrievalConfig,
}

impl RetrievalConfigBuilder {
    /// Set the number of fragments to return.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the similarity metric.
    pub fn metric(mut self, metric: SimilarityMetric) -> Self {
        self.config.metric = metric;
        self
    }

    /// Set the minimum score a hit needs to be kept.
    pub fn min_score(mut self, threshold: f32) -> Self {
        self.config.min_score = Some(threshold);
        self
    }

    /// Build the [`RetrievalConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `top_k == 0` or `min_score` is NaN.
    pub fn build(self) -> Result<RetrievalConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// How reference text is split before embedding.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// One chunk holding the whole reference text.
    #[default]
    WholeDocument,
    /// Character windows of `chunk_size` overlapping by `chunk_overlap`.
    FixedSize {
        /// Maximum characters per chunk.
        chunk_size: usize,
        /// Characters shared by consecutive chunks.
        chunk_overlap: usize,
    },
}

impl ChunkingStrategy {
    /// Check that the parameters are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Self::WholeDocument => Ok(()),
            Self::FixedSize { chunk_size, chunk_overlap } => {
                if chunk_size == 0 {
                    return Err(ConfigError::Invalid(
                        "chunk_size must be greater than zero".to_string(),
                    ));
                }
                if chunk_overlap >= chunk_size {
                    return Err(ConfigError::Invalid(format!(
                        "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Instantiate the chunker for this strategy.
    pub fn chunker(&self) -> Arc<dyn Chunker> {
        match *self {
            Self::WholeDocument => Arc::new(WholeDocumentChunker),
            Self::FixedSize { chunk_size, chunk_overlap } => {
                Arc::new(FixedSizeChunker::new(chunk_size, chunk_overlap))
            }
        }
    }
}

/// What to do when a single topic fails to index at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPolicy {
    /// Log the failure and leave the topic out of the registry.
    #[default]
    DegradeGracefully,
    /// Abort startup on the first failure.
    FailFast,
}

impl FromStr for BuildPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "degrade" | "degrade_gracefully" => Ok(Self::DegradeGracefully),
            "fail_fast" | "strict" => Ok(Self::FailFast),
            other => Err(format!("unknown build policy '{other}'")),
        }
    }
}

/// Startup indexing parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexingConfig {
    /// Per-topic failure policy.
    pub policy: BuildPolicy,
    /// Topics embedded concurrently. Defaults to [`DEFAULT_BUILD_CONCURRENCY`].
    pub concurrency: usize,
    /// Chunking strategy. Defaults to one chunk per topic.
    pub chunking: ChunkingStrategy,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            policy: BuildPolicy::default(),
            concurrency: DEFAULT_BUILD_CONCURRENCY,
            chunking: ChunkingStrategy::default(),
        }
    }
}

impl IndexingConfig {
    /// Check that the parameters are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be greater than zero".to_string()));
        }
        self.chunking.validate()
    }
}

/// Language-model call parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Model identifier sent to the provider.
    pub model: String,
    /// Sampling temperature. Defaults to 0 for deterministic output.
    pub temperature: f32,
    /// Optional cap on generated tokens.
    pub max_tokens: Option<u32>,
    /// Extra attempts after a retryable failure. Defaults to 0 (no retry).
    pub max_retries: u32,
    /// Delay before the first retry; later retries back off linearly.
    pub retry_backoff_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: None,
            max_retries: 0,
            retry_backoff_ms: 500,
        }
    }
}

impl GenerationConfig {
    /// Check that the parameters are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("generation model must not be empty".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature ({}) must be within 0.0..=2.0",
                self.temperature
            )));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// A provider credential. Never printed.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a raw key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for building request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

/// Access to the OpenAI-compatible embedding and chat endpoints.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    /// Credential; required by the real providers.
    pub api_key: Option<ApiKey>,
    /// API base URL, without a trailing slash.
    pub base_url: String,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Requested embedding width for models that support shortening.
    /// `None` keeps the model's native width.
    pub embedding_dimensions: Option<usize>,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_API_BASE.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: None,
            request_timeout_secs: 60,
        }
    }
}

impl ProviderConfig {
    /// The credential, or [`ConfigError::MissingCredential`].
    pub fn api_key(&self) -> Result<&ApiKey, ConfigError> {
        self.api_key
            .as_ref()
            .filter(|key| !key.expose().trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredential { var: API_KEY_VAR.to_string() })
    }

    /// HTTP timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Everything needed to start the consultation service.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Location of the JSON reference corpus.
    pub corpus_path: PathBuf,
    /// Startup indexing parameters.
    pub indexing: IndexingConfig,
    /// Retrieval parameters.
    pub retrieval: RetrievalConfig,
    /// Generation parameters.
    pub generation: GenerationConfig,
    /// Provider access.
    pub provider: ProviderConfig,
    /// Wording of the prompt template.
    pub prompt_language: PromptLanguage,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            corpus_path: PathBuf::from(DEFAULT_CORPUS_PATH),
            indexing: IndexingConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            provider: ProviderConfig::default(),
            prompt_language: PromptLanguage::default(),
        }
    }
}

impl ServiceConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] if `OPENAI_API_KEY` is not
    /// set, or [`ConfigError::InvalidValue`] for unparsable overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let api_key = lookup(API_KEY_VAR)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredential { var: API_KEY_VAR.to_string() })?;
        config.provider.api_key = Some(ApiKey::new(api_key));

        if let Some(base_url) = lookup("OPENAI_BASE_URL") {
            config.provider.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(path) = lookup("DERMA_CORPUS_PATH") {
            config.corpus_path = PathBuf::from(path);
        }
        if let Some(model) = lookup("DERMA_EMBEDDING_MODEL") {
            config.provider.embedding_model = model;
        }
        if let Some(dims) = parse_var(&lookup, "DERMA_EMBEDDING_DIMENSIONS")? {
            config.provider.embedding_dimensions = Some(dims);
        }
        if let Some(model) = lookup("DERMA_CHAT_MODEL") {
            config.generation.model = model;
        }
        if let Some(top_k) = parse_var(&lookup, "DERMA_TOP_K")? {
            config.retrieval.top_k = top_k;
        }
        if let Some(metric) = parse_var(&lookup, "DERMA_SIMILARITY")? {
            config.retrieval.metric = metric;
        }
        if let Some(policy) = parse_var(&lookup, "DERMA_BUILD_POLICY")? {
            config.indexing.policy = policy;
        }
        if let Some(concurrency) = parse_var(&lookup, "DERMA_BUILD_CONCURRENCY")? {
            config.indexing.concurrency = concurrency;
        }
        if let Some(retries) = parse_var(&lookup, "DERMA_MAX_RETRIES")? {
            config.generation.max_retries = retries;
        }
        if let Some(secs) = parse_var(&lookup, "DERMA_REQUEST_TIMEOUT_SECS")? {
            config.provider.request_timeout_secs = secs;
        }
        if let Some(language) = parse_var(&lookup, "DERMA_PROMPT_LANGUAGE")? {
            config.prompt_language = language;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.indexing.validate()?;
        self.retrieval.validate()?;
        self.generation.validate()?;
        if self.provider.embedding_dimensions == Some(0) {
            return Err(ConfigError::Invalid(
                "embedding_dimensions must be greater than zero".to_string(),
            ));
        }
        if self.provider.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    raw.trim().parse::<T>().map(Some).map_err(|e| ConfigError::InvalidValue {
        var: var.to_string(),
        value: raw.clone(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn default_top_k_is_four() {
        assert_eq!(RetrievalConfig::default().top_k, 4);
        assert_eq!(RetrievalConfig::default().metric, SimilarityMetric::Cosine);
    }

    #[test]
    fn builder_rejects_zero_top_k() {
        let err = RetrievalConfig::builder().top_k(0).build().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert_eq!(RetrievalConfig::builder().top_k(2).build().unwrap().top_k, 2);
    }

    #[test]
    fn fixed_size_chunking_requires_overlap_below_size() {
        let strategy = ChunkingStrategy::FixedSize { chunk_size: 10, chunk_overlap: 10 };
        assert!(strategy.validate().is_err());
        let strategy = ChunkingStrategy::FixedSize { chunk_size: 10, chunk_overlap: 2 };
        assert!(strategy.validate().is_ok());
    }

    #[test]
    fn generation_defaults_are_deterministic_without_retry() {
        let config = GenerationConfig::default();
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.model, DEFAULT_CHAT_MODEL);
        assert_eq!(config.retry_delay(3), Duration::from_millis(1500));
    }

    #[test]
    fn missing_api_key_fails_configuration() {
        let err = ServiceConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingCredential { var: API_KEY_VAR.to_string() });
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            (API_KEY_VAR, "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:8080/v1/"),
            ("DERMA_TOP_K", "2"),
            ("DERMA_SIMILARITY", "dot"),
            ("DERMA_BUILD_POLICY", "fail-fast"),
            ("DERMA_PROMPT_LANGUAGE", "en"),
            ("DERMA_CORPUS_PATH", "/srv/corpus.json"),
            ("DERMA_EMBEDDING_DIMENSIONS", "256"),
        ]))
        .unwrap();

        assert_eq!(config.provider.api_key().unwrap().expose(), "sk-test");
        assert_eq!(config.provider.base_url, "http://localhost:8080/v1");
        assert_eq!(config.retrieval.top_k, 2);
        assert_eq!(config.retrieval.metric, SimilarityMetric::DotProduct);
        assert_eq!(config.indexing.policy, BuildPolicy::FailFast);
        assert_eq!(config.prompt_language, PromptLanguage::English);
        assert_eq!(config.corpus_path, PathBuf::from("/srv/corpus.json"));
        assert_eq!(config.provider.embedding_dimensions, Some(256));
    }

    #[test]
    fn zero_embedding_dimensions_are_rejected() {
        let err = ServiceConfig::from_lookup(lookup_from(&[
            (API_KEY_VAR, "sk-test"),
            ("DERMA_EMBEDDING_DIMENSIONS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unparsable_override_names_the_variable() {
        let err = ServiceConfig::from_lookup(lookup_from(&[
            (API_KEY_VAR, "sk-test"),
            ("DERMA_TOP_K", "many"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref var, .. } if var == "DERMA_TOP_K"));
    }

    #[test]
    fn api_key_is_redacted_in_debug_output() {
        let rendered = format!("{:?}", ApiKey::new("sk-secret"));
        assert!(!rendered.contains("sk-secret"));
    }
}
