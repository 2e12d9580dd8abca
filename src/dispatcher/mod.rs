use std::io;
use std::num::NonZeroU32;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{Stream, StreamExt};
use futures::FutureExt;
use governor::{Quota, RateLimiter};
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::enumerator::Mode;
use crate::probe::{self, FailureKind, Fetcher, ProbeOutcome, ProbeRequest};
use crate::stats::RunStats;

// the DispatchSettings struct holds everything needed to turn a candidate into a probe
#[derive(Clone, Debug)]
pub struct DispatchSettings {
    pub base: String,
    pub mode: Mode,
    pub timeout: Duration,
    pub ignore_status: Option<u16>,
    pub rate: u32,
    pub concurrency: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchSummary {
    pub submitted: usize,
    pub cancelled: bool,
}

impl DispatchSummary {
    fn cancelled(submitted: usize) -> Self {
        Self {
            submitted,
            cancelled: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid rate {value}, expected at least 1 request per second")]
    InvalidRate { value: u32 },

    #[error("invalid concurrency 0, expected positive integer")]
    InvalidConcurrency,

    #[error("failed to read next candidate: {source}")]
    Source {
        #[source]
        source: io::Error,
    },
}

/// One submission per `1 / rate` seconds with no burst, so the first
/// candidate goes out immediately and every next one waits a full period.
/// Rates above one per nanosecond are clamped to that period.
pub fn submission_quota(rate: u32) -> Option<Quota> {
    let rate = NonZeroU32::new(rate)?;
    let period = (Duration::from_secs(1) / rate.get()).max(Duration::from_nanos(1));
    Quota::with_period(period)
}

/// Submits one probe per candidate and waits for all of them.
///
/// Submissions are throttled by `settings.rate` and at most
/// `settings.concurrency` probes run at once. Every probe sends exactly one
/// outcome into `outcomes`, in completion order. Cancelling `cancel` stops
/// submitting, aborts whatever is still running and returns right away.
pub async fn dispatch<S, F>(
    candidates: S,
    settings: &DispatchSettings,
    fetcher: Arc<F>,
    outcomes: mpsc::Sender<ProbeOutcome>,
    stats: Arc<RunStats>,
    cancel: CancellationToken,
) -> Result<DispatchSummary, DispatchError>
where
    S: Stream<Item = io::Result<String>>,
    F: Fetcher + ?Sized + 'static,
{
    let quota = submission_quota(settings.rate).ok_or(DispatchError::InvalidRate {
        value: settings.rate,
    })?;
    if settings.concurrency == 0 {
        return Err(DispatchError::InvalidConcurrency);
    }

    let lim = RateLimiter::direct(quota);
    let semaphore = Arc::new(Semaphore::new(settings.concurrency));
    let mut tasks: JoinSet<()> = JoinSet::new();
    let mut submitted = 0usize;

    futures::pin_mut!(candidates);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tasks.abort_all();
                return Ok(DispatchSummary::cancelled(submitted));
            }
            next = candidates.next() => next,
        };
        let candidate = match next {
            Some(Ok(candidate)) => candidate,
            Some(Err(e)) => {
                tasks.abort_all();
                return Err(DispatchError::Source { source: e });
            }
            None => break,
        };

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tasks.abort_all();
                return Ok(DispatchSummary::cancelled(submitted));
            }
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        // permit first, then the limiter: starts stay one period apart when the pool frees up
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tasks.abort_all();
                return Ok(DispatchSummary::cancelled(submitted));
            }
            _ = lim.until_ready() => {}
        }

        let request = ProbeRequest::new(
            &settings.base,
            candidate,
            settings.mode,
            settings.timeout,
            settings.ignore_status,
        );
        let fetcher = fetcher.clone();
        let tx = outcomes.clone();
        tasks.spawn(async move {
            let outcome = match AssertUnwindSafe(probe::probe(fetcher.as_ref(), &request))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => ProbeOutcome::Failed {
                    url: request.url.clone(),
                    kind: FailureKind::Aborted,
                },
            };
            let _ = tx.send(outcome).await;
            drop(permit);
        });
        stats.record_submitted();
        submitted += 1;

        // reap finished tasks so the set stays about as large as the pool
        while let Some(Some(_)) = tasks.join_next().now_or_never() {}
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tasks.abort_all();
                return Ok(DispatchSummary::cancelled(submitted));
            }
            next = tasks.join_next() => {
                if next.is_none() {
                    break;
                }
            }
        }
    }

    Ok(DispatchSummary {
        submitted,
        cancelled: false,
    })
}
