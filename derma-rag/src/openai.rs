//! OpenAI-compatible embedding and chat providers.
//!
//! This module is only available when the `openai` feature is enabled. Both
//! providers call the REST API directly with `reqwest` and work against any
//! endpoint speaking the same protocol (set `base_url`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::{ApiKey, GenerationConfig, ProviderConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{ConfigError, EmbeddingError, GenerationError};
use crate::generation::LanguageModel;
use crate::prompt::ComposedPrompt;

const PROVIDER: &str = "OpenAI";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

fn http_client(config: &ProviderConfig) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {e}")))
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

fn error_detail(body: String) -> String {
    serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body)
}

/// Parse an embeddings response body, restoring input order.
pub fn parse_embedding_response(body: &str) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut response: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| EmbeddingError::new(PROVIDER, format!("failed to parse response: {e}")))?;
    response.data.sort_by_key(|d| d.index);
    Ok(response.data.into_iter().map(|d| d.embedding).collect())
}

/// Parse a chat-completions response body into the first choice's text.
pub fn parse_chat_response(body: &str) -> Result<String, GenerationError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::MalformedResponse {
            provider: PROVIDER.into(),
            message: e.to_string(),
        })?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.is_empty())
        .ok_or_else(|| GenerationError::EmptyResponse { provider: PROVIDER.into() })
}

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// # Example
///
/// ```rust,ignore
/// use derma_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new(&config.provider)?;
/// let embedding = provider.embed("itchy red patches").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: ApiKey,
    url: String,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a provider from the provider configuration.
    ///
    /// `embedding_dimensions`, when set, is forwarded through
    /// [`with_dimensions`](Self::with_dimensions).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] if no API key is configured.
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let provider = Self {
            client: http_client(config)?,
            api_key: config.api_key()?.clone(),
            url: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.embedding_model.clone(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        };
        Ok(match config.embedding_dimensions {
            Some(dims) => provider.with_dimensions(dims),
            None => provider,
        })
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::new(PROVIDER, "API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose())
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                EmbeddingError::new(PROVIDER, format!("request failed: {e}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            EmbeddingError::new(PROVIDER, format!("failed to read response: {e}"))
        })?;

        if !status.is_success() {
            error!(provider = PROVIDER, %status, "API error");
            return Err(EmbeddingError::new(
                PROVIDER,
                format!("API returned {status}: {}", error_detail(body)),
            ));
        }

        parse_embedding_response(&body)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// A [`LanguageModel`] backed by the OpenAI chat-completions API.
///
/// The composed prompt is sent as a single user message.
pub struct OpenAIChatModel {
    client: reqwest::Client,
    api_key: ApiKey,
    url: String,
}

impl OpenAIChatModel {
    /// Create a chat model from the provider configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] if no API key is configured.
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: http_client(config)?,
            api_key: config.api_key()?.clone(),
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate(
        &self,
        prompt: &ComposedPrompt,
        config: &GenerationConfig,
    ) -> Result<String, GenerationError> {
        let request_body = ChatRequest {
            model: &config.model,
            messages: vec![ChatMessage { role: "user", content: prompt.as_str() }],
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose())
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout { provider: PROVIDER.into() }
                } else {
                    GenerationError::Transport { provider: PROVIDER.into(), message: e.to_string() }
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout { provider: PROVIDER.into() }
            } else {
                GenerationError::Transport { provider: PROVIDER.into(), message: e.to_string() }
            }
        })?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::RateLimited {
                provider: PROVIDER.into(),
                message: error_detail(body),
            });
        }
        if !status.is_success() {
            return Err(GenerationError::Api {
                provider: PROVIDER.into(),
                status: status.as_u16(),
                message: error_detail(body),
            });
        }

        parse_chat_response(&body)
    }
}
