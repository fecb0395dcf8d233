mod cli;
mod serve;
mod telemetry;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use derma_rag::{
    ConsultationService, OpenAIChatModel, OpenAIEmbeddingProvider, ServiceConfig, ServiceContext,
};
use tracing::{error, info};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // A missing .env file is fine; the process environment still applies.
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();
    telemetry::init(cli.log_format);
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "loaded environment file");
    }

    let mut config = ServiceConfig::from_env().context("invalid service configuration")?;
    cli.apply_overrides(&mut config).context("invalid command-line override")?;

    let embedder = Arc::new(OpenAIEmbeddingProvider::new(&config.provider)?);
    let model = Arc::new(OpenAIChatModel::new(&config.provider)?);

    let (context, report) = ServiceContext::startup(&config, embedder, model)
        .await
        .context("consultation service failed to start")?;
    if !report.is_complete() {
        let failed: Vec<&str> = report.failed.iter().map(|e| e.topic()).collect();
        info!(?failed, "serving without topics that failed to index");
    }
    let service = ConsultationService::new(Arc::new(context));

    match cli.command {
        Command::Consult(args) => {
            let request = args.request();
            match tokio::time::timeout(args.timeout(), service.answer(&request)).await {
                Ok(Ok(answer)) => {
                    println!("{}", answer.text);
                    Ok(ExitCode::SUCCESS)
                }
                Ok(Err(e)) => {
                    error!(kind = %e.kind(), error = %e, "consultation failed");
                    eprintln!("error: {e}");
                    Ok(if e.kind().is_client_error() { ExitCode::from(2) } else { ExitCode::FAILURE })
                }
                Err(_) => {
                    eprintln!("error: consultation timed out after {}s", args.timeout_secs);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::ServeStdin(args) => {
            let input = tokio::io::BufReader::new(tokio::io::stdin());
            serve::serve(service, input, tokio::io::stdout(), args.concurrency, args.timeout())
                .await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Topics => {
            for topic in service.context().topics() {
                println!("{topic}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
