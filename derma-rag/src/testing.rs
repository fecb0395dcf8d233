//! Deterministic fakes for the embedding and language-model capabilities.
//!
//! Available under `cfg(test)` and the `test-util` feature.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{EmbeddingError, GenerationError};
use crate::generation::LanguageModel;
use crate::prompt::ComposedPrompt;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(FNV_OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME))
}

/// Bag-of-words embedder: each lowercase word is hashed into a bucket and the
/// counts are L2-normalised. Texts sharing words score higher under cosine.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    calls: std::sync::Arc<AtomicUsize>,
}

impl HashingEmbedder {
    /// Create an embedder producing `dimensions`-long vectors.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, calls: Default::default() }
    }

    /// Number of texts embedded so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Embed synchronously.
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let bucket = (fnv1a(&word.to_lowercase()) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Returns fixed vectors for known texts and delegates the rest.
#[derive(Debug, Clone, Default)]
pub struct LookupEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
}

impl LookupEmbedder {
    /// Create an embedder answering `fallback` for unknown texts.
    pub fn new(fallback: Vec<f32>) -> Self {
        Self { vectors: HashMap::new(), fallback }
    }

    /// Register the vector returned for `text`.
    pub fn with(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for LookupEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.vectors.get(text).cloned().unwrap_or_else(|| self.fallback.clone()))
    }

    fn dimensions(&self) -> usize {
        self.fallback.len()
    }
}

/// Wraps another embedder and fails for any text containing `needle`.
#[derive(Debug, Clone)]
pub struct FailingEmbedder<E> {
    inner: E,
    needle: String,
}

impl<E> FailingEmbedder<E> {
    /// Fail whenever the embedded text contains `needle`.
    pub fn new(inner: E, needle: impl Into<String>) -> Self {
        Self { inner, needle: needle.into() }
    }
}

#[async_trait]
impl<E: EmbeddingProvider> EmbeddingProvider for FailingEmbedder<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.contains(&self.needle) {
            return Err(EmbeddingError::new("fake", format!("refused text containing '{}'", self.needle)));
        }
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

/// Records every prompt and answers from a script of outcomes.
///
/// Once the script is exhausted the model echoes a fixed answer.
#[derive(Debug, Default)]
pub struct RecordingModel {
    prompts: Mutex<Vec<String>>,
    script: Mutex<Vec<Result<String, GenerationError>>>,
    answer: String,
}

impl RecordingModel {
    /// A model that always answers `answer`.
    pub fn answering(answer: impl Into<String>) -> Self {
        Self { answer: answer.into(), ..Self::default() }
    }

    /// Queue outcomes returned (in order) before falling back to the fixed answer.
    pub fn with_script(self, outcomes: Vec<Result<String, GenerationError>>) -> Self {
        let mut script = outcomes;
        script.reverse();
        Self { script: Mutex::new(script), ..self }
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Number of calls received.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for RecordingModel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn generate(
        &self,
        prompt: &ComposedPrompt,
        _config: &GenerationConfig,
    ) -> Result<String, GenerationError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.as_str().to_string());
        }
        let scripted = self.script.lock().ok().and_then(|mut script| script.pop());
        scripted.unwrap_or_else(|| Ok(self.answer.clone()))
    }
}
