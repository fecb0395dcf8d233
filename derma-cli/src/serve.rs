//! JSON-lines consultation loop over stdin/stdout.

use std::time::Duration;

use derma_rag::{ConsultationRequest, ConsultationService, ErrorKind, GeneratedAnswer};
use futures::{StreamExt, stream};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

/// One line written back per consultation line read.
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Reply {
    Answer(GeneratedAnswer),
    Error { error: String, kind: String },
}

impl Reply {
    fn error(kind: ErrorKind, error: impl ToString) -> Self {
        Self::Error { error: error.to_string(), kind: kind.to_string() }
    }
}

/// Answer one raw JSON line.
pub async fn handle_line(service: &ConsultationService, line: &str, timeout: Duration) -> Reply {
    let request: ConsultationRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return Reply::error(ErrorKind::InvalidRequest, e),
    };

    match tokio::time::timeout(timeout, service.answer(&request)).await {
        Ok(Ok(answer)) => Reply::Answer(answer),
        Ok(Err(e)) => Reply::error(e.kind(), e),
        Err(_) => {
            warn!(topic = %request.disease_name, timeout_secs = timeout.as_secs(), "consultation timed out");
            Reply::error(ErrorKind::Internal, "consultation timed out")
        }
    }
}

/// Read consultations line by line from `input` and write replies to
/// `output` in input order, with up to `concurrency` in flight.
pub async fn serve<R, W>(
    service: ConsultationService,
    input: R,
    mut output: W,
    concurrency: usize,
    timeout: Duration,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let lines = stream::unfold(Some(input.lines()), |state| async move {
        let mut lines = state?;
        match lines.next_line().await {
            Ok(Some(line)) => Some((Ok(line), Some(lines))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    });

    let mut replies = std::pin::pin!(lines
        .filter(|line| futures::future::ready(!matches!(line, Ok(l) if l.trim().is_empty())))
        .map(|line| {
            let service = service.clone();
            async move {
                match line {
                    Ok(line) => handle_line(&service, &line, timeout).await,
                    Err(e) => Reply::error(ErrorKind::Internal, format!("failed to read input: {e}")),
                }
            }
        })
        .buffered(concurrency.max(1)));

    let mut served = 0usize;
    while let Some(reply) = replies.next().await {
        let mut encoded = serde_json::to_string(&reply)?;
        encoded.push('\n');
        output.write_all(encoded.as_bytes()).await?;
        output.flush().await?;
        served += 1;
    }

    info!(served, "input closed");
    Ok(())
}
