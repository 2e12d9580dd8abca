use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};

use crate::enumerator::{self, Mode};

pub const TIMEOUT_FLOOR_SECS: u64 = 10;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:95.0) Gecko/20100101 Firefox/95.0";

/// Per-request timeout; anything below ten seconds is raised to ten.
pub fn effective_timeout(seconds: u64) -> Duration {
    Duration::from_secs(seconds.max(TIMEOUT_FLOOR_SECS))
}

// 200-208, 300-308, 401 and 403 count as hits
pub fn is_accepted_status(status: u16) -> bool {
    matches!(status, 200..=208 | 300..=308 | 401 | 403)
}

// the ProbeRequest struct describes one GET against one candidate URL
#[derive(Clone, Debug)]
pub struct ProbeRequest {
    pub url: String,
    pub candidate: String,
    pub timeout: Duration,
    pub ignore_status: Option<u16>,
}

impl ProbeRequest {
    pub fn new(
        base: &str,
        candidate: String,
        mode: Mode,
        timeout: Duration,
        ignore_status: Option<u16>,
    ) -> Self {
        Self {
            url: enumerator::build_url(base, &candidate, mode),
            candidate,
            timeout,
            ignore_status,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    Connect,
    Timeout,
    Redirect,
    Body,
    Request,
    Aborted,
}

impl FailureKind {
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_builder() {
            FailureKind::InvalidUrl
        } else if err.is_timeout() {
            FailureKind::Timeout
        } else if err.is_connect() {
            FailureKind::Connect
        } else if err.is_redirect() {
            FailureKind::Redirect
        } else if err.is_body() || err.is_decode() {
            FailureKind::Body
        } else {
            FailureKind::Request
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FailureKind::InvalidUrl => "invalid url",
            FailureKind::Connect => "connection error",
            FailureKind::Timeout => "timeout",
            FailureKind::Redirect => "redirect error",
            FailureKind::Body => "body read error",
            FailureKind::Request => "request error",
            FailureKind::Aborted => "aborted",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The classified result of one probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    Found {
        url: String,
        status: u16,
        content_length: usize,
        timestamp: DateTime<Local>,
    },
    Skipped {
        url: String,
        status: u16,
    },
    Failed {
        url: String,
        kind: FailureKind,
    },
}

impl ProbeOutcome {
    pub fn url(&self) -> &str {
        match self {
            ProbeOutcome::Found { url, .. }
            | ProbeOutcome::Skipped { url, .. }
            | ProbeOutcome::Failed { url, .. } => url,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, ProbeOutcome::Found { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ProbeOutcome::Failed { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchedResponse {
    pub status: u16,
    pub content_length: usize,
}

/// Transport seam for the executor. Implementations perform the request and
/// read the full body; they never retry.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &ProbeRequest) -> Result<FetchedResponse, FailureKind>;
}

#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &ProbeRequest) -> Result<FetchedResponse, FailureKind> {
        let resp = self
            .client
            .get(request.url.as_str())
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| FailureKind::from_reqwest(&e))?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| match FailureKind::from_reqwest(&e) {
            FailureKind::Timeout => FailureKind::Timeout,
            _ => FailureKind::Body,
        })?;
        Ok(FetchedResponse {
            status,
            content_length: body.len(),
        })
    }
}

/// Maps a response onto an outcome. The ignore code is checked before the
/// accepted set, so it wins even for a 200.
pub fn classify(
    url: String,
    status: u16,
    content_length: usize,
    ignore_status: Option<u16>,
) -> ProbeOutcome {
    if ignore_status == Some(status) {
        return ProbeOutcome::Skipped { url, status };
    }
    if is_accepted_status(status) {
        return ProbeOutcome::Found {
            url,
            status,
            content_length,
            timestamp: Local::now(),
        };
    }
    ProbeOutcome::Skipped { url, status }
}

/// Runs one probe. Transport errors come back as [`ProbeOutcome::Failed`].
pub async fn probe<F>(fetcher: &F, request: &ProbeRequest) -> ProbeOutcome
where
    F: Fetcher + ?Sized,
{
    match fetcher.fetch(request).await {
        Ok(resp) => classify(
            request.url.clone(),
            resp.status,
            resp.content_length,
            request.ignore_status,
        ),
        Err(kind) => {
            tracing::debug!(url = %request.url, error = %kind, "probe failed");
            ProbeOutcome::Failed {
                url: request.url.clone(),
                kind,
            }
        }
    }
}
