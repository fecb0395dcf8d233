//! Command-line arguments.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use derma_rag::{BuildPolicy, ConfigError, ConsultationRequest, PromptLanguage, ServiceConfig};

use crate::telemetry::LogFormat;

/// Answer skin-condition consultations from per-topic reference text.
///
/// Configuration is read from the environment (`OPENAI_API_KEY`,
/// `DERMA_*`, optionally via a `.env` file); flags override it.
#[derive(Debug, Parser)]
#[command(name = "derma", version, about)]
pub struct Cli {
    /// Path of the JSON reference corpus.
    #[arg(long, global = true)]
    pub corpus: Option<PathBuf>,

    /// Fragments retrieved per consultation.
    #[arg(long, global = true)]
    pub top_k: Option<usize>,

    /// Chat model identifier.
    #[arg(long, global = true)]
    pub chat_model: Option<String>,

    /// Prompt wording (`ko` or `en`).
    #[arg(long, global = true)]
    pub language: Option<PromptLanguage>,

    /// Abort startup if any topic fails to index.
    #[arg(long, global = true)]
    pub fail_fast: bool,

    /// Log output format.
    #[arg(long, global = true, env = "DERMA_LOG_FORMAT", value_enum, default_value_t)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Apply flag overrides on top of the environment configuration.
    pub fn apply_overrides(&self, config: &mut ServiceConfig) -> Result<(), ConfigError> {
        if let Some(corpus) = &self.corpus {
            config.corpus_path = corpus.clone();
        }
        if let Some(top_k) = self.top_k {
            config.retrieval.top_k = top_k;
        }
        if let Some(model) = &self.chat_model {
            config.generation.model = model.clone();
        }
        if let Some(language) = self.language {
            config.prompt_language = language;
        }
        if self.fail_fast {
            config.indexing.policy = BuildPolicy::FailFast;
        }
        config.validate()
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Answer one consultation given as flags.
    Consult(ConsultArgs),

    /// Answer JSON-line consultations from stdin, one JSON reply per line.
    ServeStdin(ServeArgs),

    /// Print the servable topics after startup.
    Topics,
}

#[derive(Debug, Args)]
pub struct ConsultArgs {
    /// Predicted disease (a corpus topic name).
    #[arg(long)]
    pub disease: String,

    /// The patient has a fever.
    #[arg(long)]
    pub fever: bool,

    /// The affected area is bleeding.
    #[arg(long)]
    pub blooding: bool,

    /// Patient age in years.
    #[arg(long)]
    pub age: u32,

    /// Symptom description, used as the retrieval query.
    #[arg(long)]
    pub symptoms: String,

    /// Give up waiting for the answer after this many seconds.
    #[arg(long, default_value_t = 120)]
    pub timeout_secs: u64,
}

impl ConsultArgs {
    pub fn request(&self) -> ConsultationRequest {
        ConsultationRequest {
            disease_name: self.disease.clone(),
            fever_status: self.fever,
            blooding_status: self.blooding,
            age: self.age,
            symptoms: self.symptoms.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Consultations processed concurrently. Replies keep input order.
    #[arg(long, default_value_t = 8)]
    pub concurrency: usize,

    /// Per-consultation timeout in seconds.
    #[arg(long, default_value_t = 120)]
    pub timeout_secs: u64,
}

impl ServeArgs {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
