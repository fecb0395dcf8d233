//! # derma-rag
//!
//! Retrieval-augmented consultation core for predicted skin conditions.
//!
//! At startup a [`ReferenceCorpus`] (topic name → reference text) is loaded
//! and every topic gets its own [`TopicIndex`], collected into an immutable
//! [`IndexRegistry`]. Each consultation then runs:
//!
//! 1. registry lookup for the predicted disease ([`TopicNotFoundError`] if absent)
//! 2. similarity search with the symptoms as query ([`Retriever`])
//! 3. prompt composition from a fixed template ([`PromptTemplate`])
//! 4. one language-model call ([`Generator`])
//!
//! Indices are partitioned per topic, so a consultation can only ever see
//! the reference text of its own disease.
//!
//! ## Features
//!
//! - `openai`: OpenAI-compatible embedding and chat adapters over `reqwest`
//! - `test-util`: deterministic fakes in [`testing`]

pub mod chunking;
pub mod config;
pub mod corpus;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
#[cfg(feature = "openai")]
pub mod openai;
pub mod prompt;
pub mod registry;
pub mod request;
pub mod retriever;
pub mod service;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use chunking::{Chunker, FixedSizeChunker, WholeDocumentChunker};
pub use config::{
    BuildPolicy, ChunkingStrategy, GenerationConfig, IndexingConfig, ProviderConfig,
    RetrievalConfig, RetrievalConfigBuilder, ServiceConfig,
};
pub use corpus::{ReferenceCorpus, ReferenceEntry, load_corpus};
pub use document::{Chunk, SearchHit};
pub use embedding::EmbeddingProvider;
pub use error::{
    ConfigError, ConsultationError, CorpusLoadError, EmbeddingError, ErrorKind, GenerationError,
    IndexBuildError, PromptCompositionError, RegistryBuildError, RetrievalError, StartupError,
    TopicNotFoundError,
};
pub use generation::{Generator, LanguageModel};
pub use index::{SimilarityMetric, TopicIndex};
#[cfg(feature = "openai")]
pub use openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
pub use prompt::{
    ComposedPrompt, ConsultationPrompt, ConsultationPromptBuilder, PromptLanguage, PromptSlot,
    PromptTemplate,
};
pub use registry::{BuildReport, IndexRegistry};
pub use request::{ConsultationRequest, GeneratedAnswer};
pub use retriever::{RetrievedContext, Retriever};
pub use service::{ConsultationService, ServiceContext, ServiceContextBuilder};
