//! Error types for the `derma-rag` crate.
//!
//! Each pipeline stage owns its own error enum so callers can tell startup
//! failures (corpus, index build, configuration) apart from per-request
//! failures (unknown topic, retrieval, prompt composition, generation).

use std::fmt;

use thiserror::Error;

use crate::prompt::PromptSlot;

/// A failure reported by an embedding backend.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Embedding error ({provider}): {message}")]
pub struct EmbeddingError {
    /// The embedding provider that produced the error.
    pub provider: String,
    /// A description of the failure.
    pub message: String,
}

impl EmbeddingError {
    /// Create a new embedding error for the named provider.
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self { provider: provider.into(), message: message.into() }
    }
}

/// Errors raised while reading the reference corpus.
#[derive(Debug, Error)]
pub enum CorpusLoadError {
    /// The corpus file does not exist.
    #[error("Corpus file not found: {path}")]
    NotFound {
        /// The path that was looked up.
        path: String,
    },

    /// The corpus file exists but could not be read.
    #[error("Failed to read corpus file {path}: {source}")]
    Read {
        /// The path that failed to read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The corpus is not well-formed JSON.
    #[error("Corpus {origin} is not valid JSON: {source}")]
    Parse {
        /// Where the corpus came from (a path or `<memory>`).
        origin: String,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The top-level JSON value is not an object.
    #[error("Corpus {origin} must be a flat object of topic -> text, found {found}")]
    NotAnObject {
        /// Where the corpus came from.
        origin: String,
        /// The JSON type that was found instead.
        found: &'static str,
    },

    /// A topic maps to something other than a string.
    #[error("Corpus {origin}: topic '{topic}' must map to a string, found {found}")]
    NonStringValue {
        /// Where the corpus came from.
        origin: String,
        /// The offending topic name.
        topic: String,
        /// The JSON type that was found instead.
        found: &'static str,
    },

    /// The same topic name was supplied twice.
    #[error("Duplicate topic in corpus: {topic}")]
    DuplicateTopic {
        /// The repeated topic name.
        topic: String,
    },
}

/// Errors raised while building the index for a single topic.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IndexBuildError {
    /// The embedding provider failed for this topic.
    #[error("Failed to embed topic '{topic}': {source}")]
    Embedding {
        /// The topic being indexed.
        topic: String,
        /// The provider failure.
        #[source]
        source: EmbeddingError,
    },

    /// The chunker produced nothing to index.
    #[error("Topic '{topic}' has no reference text to index")]
    EmptyReference {
        /// The topic being indexed.
        topic: String,
    },

    /// The provider returned a different number of vectors than chunks sent.
    #[error("Topic '{topic}': expected {expected} embeddings, provider returned {actual}")]
    VectorCountMismatch {
        /// The topic being indexed.
        topic: String,
        /// Number of chunks sent.
        expected: usize,
        /// Number of vectors received.
        actual: usize,
    },

    /// Vectors within one topic disagree on dimensionality, or are empty.
    #[error("Topic '{topic}': embedding dimension {actual} does not match {expected}")]
    DimensionMismatch {
        /// The topic being indexed.
        topic: String,
        /// Dimension of the first vector.
        expected: usize,
        /// Offending dimension.
        actual: usize,
    },
}

impl IndexBuildError {
    /// The topic this failure belongs to.
    pub fn topic(&self) -> &str {
        match self {
            Self::Embedding { topic, .. }
            | Self::EmptyReference { topic }
            | Self::VectorCountMismatch { topic, .. }
            | Self::DimensionMismatch { topic, .. } => topic,
        }
    }
}

/// Registry construction aborted under the fail-fast build policy.
#[derive(Debug, Error)]
pub enum RegistryBuildError {
    /// A topic failed to index.
    #[error("Index registry build aborted: {0}")]
    Index(#[from] IndexBuildError),
}

/// A lookup for a topic that has no index.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Topic not found: {topic}")]
pub struct TopicNotFoundError {
    /// The topic name that was requested.
    pub topic: String,
}

/// Errors raised while retrieving context for a query.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The query could not be embedded.
    #[error("Query embedding failed for topic '{topic}': {source}")]
    Embedding {
        /// The topic being searched.
        topic: String,
        /// The provider failure.
        #[source]
        source: EmbeddingError,
    },

    /// The query vector is incompatible with the topic's index.
    #[error("Query dimension {actual} does not match index dimension {expected} for topic '{topic}'")]
    DimensionMismatch {
        /// The topic being searched.
        topic: String,
        /// Dimension of the stored vectors.
        expected: usize,
        /// Dimension of the query vector.
        actual: usize,
    },
}

/// Errors raised while composing the consultation prompt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PromptCompositionError {
    /// A mandatory template slot was not provided (or was blank).
    #[error("Prompt slot '{0}' is missing")]
    MissingSlot(PromptSlot),
}

/// Errors raised by the language-model capability.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    /// The provider did not answer in time.
    #[error("Generation timed out ({provider})")]
    Timeout {
        /// The provider that timed out.
        provider: String,
    },

    /// The provider rejected the call due to rate limiting.
    #[error("Generation rate limited ({provider}): {message}")]
    RateLimited {
        /// The provider that rejected the call.
        provider: String,
        /// Provider detail.
        message: String,
    },

    /// The provider answered with a non-success status.
    #[error("Generation API error ({provider}) {status}: {message}")]
    Api {
        /// The provider that failed.
        provider: String,
        /// HTTP-like status code.
        status: u16,
        /// Provider detail.
        message: String,
    },

    /// The request never reached the provider or the connection broke.
    #[error("Generation transport error ({provider}): {message}")]
    Transport {
        /// The provider being called.
        provider: String,
        /// Transport detail.
        message: String,
    },

    /// The provider answered with a body that could not be understood.
    #[error("Malformed generation response ({provider}): {message}")]
    MalformedResponse {
        /// The provider that answered.
        provider: String,
        /// Parse detail.
        message: String,
    },

    /// The provider answered without any text.
    #[error("Generation returned no content ({provider})")]
    EmptyResponse {
        /// The provider that answered.
        provider: String,
    },
}

impl GenerationError {
    /// Whether a bounded retry may succeed where this attempt failed.
    ///
    /// Timeouts, rate limits, transport failures and 5xx responses are
    /// transient. Everything else is returned to the caller immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::RateLimited { .. } | Self::Transport { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::MalformedResponse { .. } | Self::EmptyResponse { .. } => false,
        }
    }
}

/// Invalid or incomplete configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A configuration value violates a constraint.
    #[error("Configuration error: {0}")]
    Invalid(String),

    /// An environment variable could not be parsed.
    #[error("Invalid value for {var}: '{value}' ({reason})")]
    InvalidValue {
        /// The environment variable name.
        var: String,
        /// The raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A required provider credential is absent.
    #[error("Missing credential: environment variable {var} is not set")]
    MissingCredential {
        /// The environment variable that should carry the credential.
        var: String,
    },
}

/// Failures that prevent the service from becoming ready.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The corpus could not be loaded.
    #[error(transparent)]
    Corpus(#[from] CorpusLoadError),

    /// The registry could not be built.
    #[error(transparent)]
    Registry(#[from] RegistryBuildError),
}

/// Whether a consultation failure is the caller's fault or the service's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request named an unknown topic.
    NotFound,
    /// The request was malformed.
    InvalidRequest,
    /// Something failed on the service or provider side.
    Internal,
}

impl ErrorKind {
    /// `true` for errors the caller can fix by changing the request.
    pub fn is_client_error(self) -> bool {
        matches!(self, Self::NotFound | Self::InvalidRequest)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotFound => "not_found",
            Self::InvalidRequest => "invalid_request",
            Self::Internal => "internal",
        })
    }
}

/// Errors returned by the consultation facade.
#[derive(Debug, Error)]
pub enum ConsultationError {
    /// The request failed validation before reaching the pipeline.
    #[error("Invalid consultation request: {0}")]
    InvalidRequest(String),

    /// No index exists for the requested disease.
    #[error(transparent)]
    TopicNotFound(#[from] TopicNotFoundError),

    /// Context retrieval failed.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// The prompt could not be composed.
    #[error(transparent)]
    PromptComposition(#[from] PromptCompositionError),

    /// The language model failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl ConsultationError {
    /// Classify the failure for the caller's response mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::TopicNotFound(_) => ErrorKind::NotFound,
            Self::Retrieval(_) | Self::PromptComposition(_) | Self::Generation(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// A convenience result type for consultation operations.
pub type Result<T> = std::result::Result<T, ConsultationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_retryability_follows_status_class() {
        let api = |status| GenerationError::Api {
            provider: "fake".into(),
            status,
            message: String::new(),
        };
        assert!(api(503).is_retryable());
        assert!(!api(400).is_retryable());
        assert!(GenerationError::Timeout { provider: "fake".into() }.is_retryable());
        assert!(!GenerationError::EmptyResponse { provider: "fake".into() }.is_retryable());
    }

    #[test]
    fn consultation_error_kinds() {
        let not_found: ConsultationError =
            TopicNotFoundError { topic: "unknown_disease".into() }.into();
        assert_eq!(not_found.kind(), ErrorKind::NotFound);
        assert!(not_found.kind().is_client_error());

        let composition: ConsultationError =
            PromptCompositionError::MissingSlot(PromptSlot::Context).into();
        assert_eq!(composition.kind(), ErrorKind::Internal);
        assert!(!composition.kind().is_client_error());
    }
}
