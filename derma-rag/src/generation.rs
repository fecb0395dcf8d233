//! Language-model capability and the generation invoker.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::prompt::ComposedPrompt;
use crate::request::GeneratedAnswer;

/// A text-generation backend.
///
/// Implementations send the prompt as a single user message and return the
/// model's text unchanged.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`.
    async fn generate(
        &self,
        prompt: &ComposedPrompt,
        config: &GenerationConfig,
    ) -> Result<String, GenerationError>;
}

/// Sends composed prompts to a [`LanguageModel`].
///
/// Retries are off unless `max_retries > 0`, and then apply only to
/// [retryable](GenerationError::is_retryable) errors.
#[derive(Clone)]
pub struct Generator {
    model: Arc<dyn LanguageModel>,
    config: GenerationConfig,
}

impl Generator {
    /// Create a generator.
    pub fn new(model: Arc<dyn LanguageModel>, config: GenerationConfig) -> Self {
        Self { model, config }
    }

    /// The generation parameters.
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Invoke the model and return its output verbatim.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`GenerationError`] once retries, if any, are
    /// exhausted.
    pub async fn invoke(&self, prompt: &ComposedPrompt) -> Result<GeneratedAnswer, GenerationError> {
        let mut attempt = 0u32;
        loop {
            match self.model.generate(prompt, &self.config).await {
                Ok(text) => {
                    debug!(
                        backend = self.model.name(),
                        model = %self.config.model,
                        attempt,
                        answer_len = text.len(),
                        "generation completed"
                    );
                    return Ok(GeneratedAnswer { text, model: self.config.model.clone() });
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        backend = self.model.name(),
                        retry = attempt,
                        max_retries = self.config.max_retries,
                        error = %e,
                        "generation failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay(attempt)).await;
                }
                Err(e) => {
                    error!(backend = self.model.name(), attempt, error = %e, "generation failed");
                    return Err(e);
                }
            }
        }
    }
}
