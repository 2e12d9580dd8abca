use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use indicatif::ProgressBar;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::{self, DispatchError, DispatchSettings};
use crate::enumerator::{self, Mode, Wordlist};
use crate::output::reporter::{self, Reporter};
use crate::output::{Finding, OutputFormat};
use crate::probe::{self, Fetcher, HttpFetcher, ProbeOutcome};
use crate::stats::{RunStats, StatsSnapshot};

pub const DEFAULT_RATE: u32 = 16;

#[derive(Clone, Debug)]
pub enum WordlistSource {
    FilePath(String),
    Inline(Vec<String>),
}

#[derive(Clone, Debug)]
pub struct Options {
    pub url: String,
    pub wordlist: WordlistSource,
    pub mode: Mode,
    pub ignore_status: Option<u16>,
    pub rate: u32,
    pub concurrency: Option<u32>,
    pub timeout_seconds: u64,
    pub output: Option<String>,
    pub output_format: OutputFormat,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub follow_redirects: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            url: String::new(),
            wordlist: WordlistSource::Inline(Vec::new()),
            mode: Mode::Dir,
            ignore_status: None,
            rate: DEFAULT_RATE,
            concurrency: None,
            timeout_seconds: probe::TIMEOUT_FLOOR_SECS,
            output: None,
            output_format: OutputFormat::Text,
            user_agent: None,
            proxy: None,
            follow_redirects: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("no target provided (url is empty)")]
    NoTarget,

    #[error("wordlist path is empty")]
    MissingWordlist,

    #[error("invalid rate limit {value}, expected positive integer")]
    InvalidRate { value: u32 },

    #[error("invalid concurrency {value}, expected positive integer")]
    InvalidConcurrency { value: u32 },

    #[error("invalid user agent: {value}")]
    InvalidUserAgent { value: String },

    #[error("failed to open file for {kind}: {path}: {source}")]
    FileOpen {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read lines for {kind}: {path}: {source}")]
    FileRead {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to setup proxy: {proxy}: {source}")]
    ProxySetup {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("dispatch failed: {source}")]
    Dispatch {
        #[source]
        source: DispatchError,
    },

    #[error("task join failed: {source}")]
    TaskJoin {
        #[source]
        source: tokio::task::JoinError,
    },
}

#[derive(Clone, Debug)]
pub struct ScanResult {
    pub elapsed: Duration,
    pub stats: StatsSnapshot,
    pub findings: Vec<Finding>,
    pub interrupted: bool,
}

#[derive(Clone, Debug)]
pub struct ClientSettings<'a> {
    pub timeout: Duration,
    pub user_agent: Option<&'a str>,
    pub proxy: Option<&'a str>,
    pub follow_redirects: bool,
}

pub fn build_client(settings: ClientSettings<'_>) -> Result<reqwest::Client, RunnerError> {
    let user_agent = settings.user_agent.unwrap_or(probe::DEFAULT_USER_AGENT);
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_str(user_agent).map_err(|_| {
            RunnerError::InvalidUserAgent {
                value: user_agent.to_string(),
            }
        })?,
    );

    let redirect_policy = if settings.follow_redirects {
        reqwest::redirect::Policy::limited(10)
    } else {
        reqwest::redirect::Policy::none()
    };

    let mut builder = reqwest::Client::builder()
        .default_headers(headers)
        .redirect(redirect_policy)
        .timeout(settings.timeout)
        .danger_accept_invalid_hostnames(true)
        .danger_accept_invalid_certs(true);

    if let Some(proxy) = settings.proxy.filter(|p| !p.trim().is_empty()) {
        let proxy = reqwest::Proxy::all(proxy).map_err(|e| RunnerError::ProxySetup {
            proxy: proxy.to_string(),
            source: e,
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| RunnerError::HttpClientBuild { source: e })
}

#[derive(Clone)]
pub struct Runner {
    options: Options,
    fetcher: Option<Arc<dyn Fetcher>>,
}

impl Runner {
    pub fn new(mut options: Options) -> Result<Self, RunnerError> {
        options.url = options.url.trim().to_string();
        if options.url.is_empty() {
            return Err(RunnerError::NoTarget);
        }
        if let WordlistSource::FilePath(path) = &options.wordlist {
            if path.trim().is_empty() {
                return Err(RunnerError::MissingWordlist);
            }
        }
        if options.rate == 0 {
            return Err(RunnerError::InvalidRate {
                value: options.rate,
            });
        }
        if options.concurrency == Some(0) {
            return Err(RunnerError::InvalidConcurrency { value: 0 });
        }
        // 0 disables the ignore code
        options.ignore_status = options.ignore_status.filter(|&code| code != 0);
        Ok(Self {
            options,
            fetcher: None,
        })
    }

    /// Replaces the HTTP transport, e.g. with a test double.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn concurrency(&self) -> u32 {
        self.options.concurrency.unwrap_or(self.options.rate)
    }

    pub fn timeout(&self) -> Duration {
        probe::effective_timeout(self.options.timeout_seconds)
    }

    pub async fn count_candidates(&self) -> Result<usize, RunnerError> {
        match &self.options.wordlist {
            WordlistSource::Inline(values) => Ok(values.len()),
            WordlistSource::FilePath(path) => {
                let path = crate::config::expand_tilde_string(path);
                enumerator::count_candidates(&path)
                    .await
                    .map_err(|e| RunnerError::FileRead {
                        kind: "wordlist",
                        path,
                        source: e,
                    })
            }
        }
    }

    pub async fn run(&self) -> Result<ScanResult, RunnerError> {
        self.run_until(CancellationToken::new(), ProgressBar::hidden())
            .await
    }

    /// Runs the scan until every candidate has an outcome or `cancel` fires.
    pub async fn run_until(
        &self,
        cancel: CancellationToken,
        pb: ProgressBar,
    ) -> Result<ScanResult, RunnerError> {
        let stats = Arc::new(RunStats::new());
        let candidates = self.open_candidates().await?;

        let mut reporter = Reporter::new(pb, stats.clone());
        if let Some(path) = self.options.output.as_deref() {
            let path = crate::config::expand_tilde_string(path);
            let sink = reporter::open_sink(&path)
                .await
                .map_err(|e| RunnerError::FileOpen {
                    kind: "output",
                    path,
                    source: e,
                })?;
            reporter = reporter.with_sink(sink, self.options.output_format);
        }

        let fetcher: Arc<dyn Fetcher> = match &self.fetcher {
            Some(fetcher) => fetcher.clone(),
            None => Arc::new(HttpFetcher::new(build_client(ClientSettings {
                timeout: self.timeout(),
                user_agent: self.options.user_agent.as_deref(),
                proxy: self.options.proxy.as_deref(),
                follow_redirects: self.options.follow_redirects,
            })?)),
        };

        let settings = DispatchSettings {
            base: self.options.url.clone(),
            mode: self.options.mode,
            timeout: self.timeout(),
            ignore_status: self.options.ignore_status,
            rate: self.options.rate,
            concurrency: self.concurrency() as usize,
        };

        let (outcome_tx, outcome_rx) =
            mpsc::channel::<ProbeOutcome>(settings.concurrency.clamp(16, 1024));
        let report_handle = task::spawn(reporter.run(outcome_rx));

        tracing::info!(
            url = %settings.base,
            mode = settings.mode.label(),
            rate = settings.rate,
            concurrency = settings.concurrency,
            "starting scan"
        );
        let dispatched =
            dispatcher::dispatch(candidates, &settings, fetcher, outcome_tx, stats.clone(), cancel)
                .await;

        let findings = report_handle
            .await
            .map_err(|e| RunnerError::TaskJoin { source: e })?;

        let summary = dispatched.map_err(|e| match e {
            DispatchError::Source { source } => RunnerError::FileRead {
                kind: "wordlist",
                path: self.wordlist_label(),
                source,
            },
            other => RunnerError::Dispatch { source: other },
        })?;

        let snapshot = stats.snapshot();
        tracing::info!(
            submitted = snapshot.submitted,
            found = snapshot.found,
            errors = snapshot.errors,
            interrupted = summary.cancelled,
            "scan finished"
        );
        Ok(ScanResult {
            elapsed: snapshot.elapsed,
            stats: snapshot,
            findings,
            interrupted: summary.cancelled,
        })
    }

    async fn open_candidates(
        &self,
    ) -> Result<BoxStream<'static, std::io::Result<String>>, RunnerError> {
        match &self.options.wordlist {
            WordlistSource::Inline(values) => {
                let words: Vec<std::io::Result<String>> =
                    values.iter().map(|s| Ok(s.trim().to_string())).collect();
                Ok(stream::iter(words).boxed())
            }
            WordlistSource::FilePath(path) => {
                let path = crate::config::expand_tilde_string(path);
                let wordlist = Wordlist::open(&path)
                    .await
                    .map_err(|e| RunnerError::FileOpen {
                        kind: "wordlist",
                        path,
                        source: e,
                    })?;
                Ok(wordlist.into_stream().boxed())
            }
        }
    }

    fn wordlist_label(&self) -> String {
        match &self.options.wordlist {
            WordlistSource::FilePath(path) => path.clone(),
            WordlistSource::Inline(_) => "<inline>".to_string(),
        }
    }
}
