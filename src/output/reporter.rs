use std::io;
use std::path::Path;
use std::sync::Arc;

use indicatif::ProgressBar;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::{found_line, render_record, Finding, OutputFormat};
use crate::probe::ProbeOutcome;
use crate::stats::RunStats;

pub type Sink = Box<dyn AsyncWrite + Send + Unpin>;

/// Opens `path` for appending, creating it when missing.
pub async fn open_sink(path: impl AsRef<Path>) -> io::Result<Sink> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    Ok(Box::new(file))
}

// the Reporter is the only consumer of probe outcomes, so sink writes never interleave
pub struct Reporter {
    pb: ProgressBar,
    stats: Arc<RunStats>,
    sink: Option<Sink>,
    format: OutputFormat,
}

impl Reporter {
    pub fn new(pb: ProgressBar, stats: Arc<RunStats>) -> Self {
        Self {
            pb,
            stats,
            sink: None,
            format: OutputFormat::Text,
        }
    }

    pub fn with_sink(mut self, sink: Sink, format: OutputFormat) -> Self {
        self.sink = Some(sink);
        self.format = format;
        self
    }

    /// Drains `rx` until every sender is gone and returns the hits in the
    /// order they were reported.
    pub async fn run(mut self, mut rx: mpsc::Receiver<ProbeOutcome>) -> Vec<Finding> {
        let mut findings: Vec<Finding> = Vec::new();
        while let Some(outcome) = rx.recv().await {
            if let Some(finding) = self.handle(outcome).await {
                findings.push(finding);
            }
        }
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.shutdown().await {
                tracing::warn!(error = %e, "failed to close output file");
            }
        }
        findings
    }

    async fn handle(&mut self, outcome: ProbeOutcome) -> Option<Finding> {
        self.pb.inc(1);
        match outcome {
            ProbeOutcome::Skipped { .. } => {
                self.stats.record_skipped();
                None
            }
            ProbeOutcome::Failed { .. } => {
                self.stats.record_error();
                None
            }
            found @ ProbeOutcome::Found { .. } => {
                self.stats.record_found();
                let finding = Finding::from_outcome(&found)?;
                let line = found_line(&finding);
                self.pb.suspend(|| println!("{}", line));
                self.write(&finding).await;
                Some(finding)
            }
        }
    }

    async fn write(&mut self, finding: &Finding) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let line = render_record(finding, self.format);
        let written = match sink.write_all(&line).await {
            Ok(()) => sink.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::warn!(url = %finding.url, error = %e, "failed to write finding to output file");
        }
    }
}
