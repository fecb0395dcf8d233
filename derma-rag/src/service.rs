//! Service context and the consultation facade.
//!
//! # Example
//!
//! ```rust,ignore
//! use derma_rag::{ConsultationService, ServiceConfig, ServiceContext};
//!
//! let config = ServiceConfig::from_env()?;
//! let (context, report) = ServiceContext::startup(&config, embedder, model).await?;
//! let service = ConsultationService::new(Arc::new(context));
//! let answer = service.answer(&request).await?;
//! ```

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::{GenerationConfig, RetrievalConfig, ServiceConfig};
use crate::corpus::{ReferenceCorpus, load_corpus};
use crate::embedding::EmbeddingProvider;
use crate::error::{ConfigError, ConsultationError, StartupError};
use crate::generation::{Generator, LanguageModel};
use crate::prompt::{ConsultationPrompt, PromptTemplate};
use crate::registry::{BuildReport, IndexRegistry};
use crate::request::{ConsultationRequest, GeneratedAnswer};
use crate::retriever::Retriever;

/// Everything a consultation needs, built once at startup and immutable
/// afterwards.
pub struct ServiceContext {
    registry: IndexRegistry,
    retriever: Retriever,
    template: PromptTemplate,
    generator: Generator,
}

impl ServiceContext {
    /// Create a new [`ServiceContextBuilder`].
    pub fn builder() -> ServiceContextBuilder {
        ServiceContextBuilder::default()
    }

    /// Load the corpus, build every topic index, and assemble the context.
    ///
    /// The context only exists once the registry is fully built, which makes
    /// a successful return the readiness signal.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] on invalid configuration, an unreadable
    /// corpus, or (under fail-fast) a topic that cannot be indexed.
    pub async fn startup(
        config: &ServiceConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<(Self, BuildReport), StartupError> {
        config.validate()?;
        let corpus = load_corpus(&config.corpus_path)?;
        Self::from_corpus(config, &corpus, embedder, model).await
    }

    /// Like [`startup`](Self::startup) with an already-loaded corpus.
    pub async fn from_corpus(
        config: &ServiceConfig,
        corpus: &ReferenceCorpus,
        embedder: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<(Self, BuildReport), StartupError> {
        if corpus.is_empty() {
            warn!("reference corpus is empty, every consultation will be rejected");
        }

        let (registry, report) =
            IndexRegistry::build(corpus, embedder.as_ref(), &config.indexing).await?;

        let context = Self::builder()
            .registry(registry)
            .embedding_provider(embedder)
            .retrieval(config.retrieval.clone())
            .template(PromptTemplate::new(config.prompt_language))
            .model(model)
            .generation(config.generation.clone())
            .build()?;

        info!(
            topics = context.registry.len(),
            failed = report.failed.len(),
            top_k = context.retriever.config().top_k,
            metric = %context.retriever.config().metric,
            "consultation service ready"
        );
        Ok((context, report))
    }

    /// The topic registry.
    pub fn registry(&self) -> &IndexRegistry {
        &self.registry
    }

    /// Servable topics, sorted.
    pub fn topics(&self) -> Vec<&str> {
        self.registry.topics()
    }
}

/// Builder for [`ServiceContext`].
///
/// `registry`, `embedding_provider` and `model` are required; the other
/// parts default.
#[derive(Default)]
pub struct ServiceContextBuilder {
    registry: Option<IndexRegistry>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    model: Option<Arc<dyn LanguageModel>>,
    retrieval: RetrievalConfig,
    generation: GenerationConfig,
    template: PromptTemplate,
}

impl ServiceContextBuilder {
    /// Set the topic registry.
    pub fn registry(mut self, registry: IndexRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the embedding provider used for queries. Must be the one the
    /// registry was built with.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the language model.
    pub fn model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Set the retrieval parameters.
    pub fn retrieval(mut self, config: RetrievalConfig) -> Self {
        self.retrieval = config;
        self
    }

    /// Set the generation parameters.
    pub fn generation(mut self, config: GenerationConfig) -> Self {
        self.generation = config;
        self
    }

    /// Set the prompt template.
    pub fn template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Build the [`ServiceContext`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required part is missing or a config
    /// section is invalid.
    pub fn build(self) -> Result<ServiceContext, ConfigError> {
        let registry =
            self.registry.ok_or_else(|| ConfigError::Invalid("registry is required".to_string()))?;
        let embedder = self.embedding_provider.ok_or_else(|| {
            ConfigError::Invalid("embedding_provider is required".to_string())
        })?;
        let model =
            self.model.ok_or_else(|| ConfigError::Invalid("model is required".to_string()))?;
        self.retrieval.validate()?;
        self.generation.validate()?;

        Ok(ServiceContext {
            registry,
            retriever: Retriever::new(embedder, self.retrieval),
            template: self.template,
            generator: Generator::new(model, self.generation),
        })
    }
}

/// The consultation facade: the single externally exposed operation.
#[derive(Clone)]
pub struct ConsultationService {
    context: Arc<ServiceContext>,
}

impl ConsultationService {
    /// Wrap a ready context.
    pub fn new(context: Arc<ServiceContext>) -> Self {
        Self { context }
    }

    /// The underlying context.
    pub fn context(&self) -> &ServiceContext {
        &self.context
    }

    /// Answer one consultation.
    ///
    /// Steps run strictly in order: lookup, retrieval (with `symptoms` as
    /// the query), prompt composition, generation.
    ///
    /// # Errors
    ///
    /// Returns [`ConsultationError::TopicNotFound`] for an unknown disease
    /// (the model is not called), or the typed error of the failing step.
    #[instrument(skip(self, request), fields(topic = %request.disease_name))]
    pub async fn answer(
        &self,
        request: &ConsultationRequest,
    ) -> Result<GeneratedAnswer, ConsultationError> {
        request.validate()?;

        let index = self.context.registry.lookup(&request.disease_name).inspect_err(|e| {
            info!(error = %e, "consultation for unknown topic");
        })?;

        let retrieved = self.context.retriever.retrieve(&index, &request.symptoms).await?;

        let prompt =
            ConsultationPrompt::builder().request(request).context(retrieved.evidence()).build()?;
        let composed = self.context.template.render(&prompt);

        let answer = self.context.generator.invoke(&composed).await?;
        info!(
            fragments = retrieved.len(),
            prompt_len = composed.as_str().len(),
            answer_len = answer.text.len(),
            "consultation answered"
        );
        Ok(answer)
    }
}
