//! Deadline-bounded polling with exponential backoff.
//!
//! Cluster state converges asynchronously, so every "wait until X" in a
//! scenario is a [`poll_until`] loop: probe, sleep, probe again, until the
//! probe reports [`Probe::Ready`], the deadline passes, or the run is
//! cancelled.
//!
//! Sleeps grow from `initial` by `multiplier` up to `max_interval`. The last
//! sleep is clipped so one final probe happens at the deadline.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use deploycheck_core::config::WaitConfig;
use deploycheck_core::metrics::{POLL_ATTEMPTS_TOTAL, POLL_TIMEOUTS_TOTAL};

use crate::error::VerifierError;

/// Polling schedule plus overall deadline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub timeout: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&WaitConfig::default())
    }
}

impl Backoff {
    pub fn from_config(config: &WaitConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_interval_ms),
            max_interval: Duration::from_millis(config.max_interval_ms),
            multiplier: config.multiplier,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Same schedule with a different deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Infinite sequence of sleep intervals.
    pub fn intervals(&self) -> Intervals {
        Intervals {
            next: self.initial.min(self.max_interval),
            max: self.max_interval,
            multiplier: self.multiplier.max(1.0),
        }
    }
}

/// Iterator over backoff intervals, see [`Backoff::intervals`].
#[derive(Debug, Clone)]
pub struct Intervals {
    next: Duration,
    max: Duration,
    multiplier: f64,
}

impl Iterator for Intervals {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        // saturate at the cap instead of overflowing Duration
        self.next = Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .map_or(self.max, |grown| grown.min(self.max));
        Some(current)
    }
}

/// Result of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    Ready(T),
    /// Not there yet; the string is the current observation, reported if the
    /// wait times out.
    NotYet(String),
}

/// Polls `probe` until it is ready.
///
/// # Errors
///
/// - deadline passed: [`VerifierError::Timeout`] carrying the last
///   observation
/// - `cancel` fired: [`VerifierError::Cancelled`]
/// - probe returned `Err`: that error, immediately (the probe decides what
///   is retryable by returning `NotYet` instead)
pub async fn poll_until<T, F, Fut>(
    what: &str,
    backoff: &Backoff,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<T, VerifierError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe<T>, VerifierError>>,
{
    let started = Instant::now();
    // a deadline past the end of the clock means no deadline
    let deadline = started.checked_add(backoff.timeout);
    let mut intervals = backoff.intervals();
    let mut last_observed = String::from("<no observation>");
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(VerifierError::Cancelled(what.to_owned()));
        }

        attempt += 1;
        counter!(POLL_ATTEMPTS_TOTAL).increment(1);
        match probe().await? {
            Probe::Ready(value) => {
                debug!(what, attempt, elapsed_ms = elapsed_ms(started), "condition met");
                return Ok(value);
            }
            Probe::NotYet(observed) => {
                debug!(what, attempt, observed = %observed, "condition not met yet");
                last_observed = observed;
            }
        }

        let now = Instant::now();
        if deadline.is_some_and(|deadline| now >= deadline) {
            counter!(POLL_TIMEOUTS_TOTAL).increment(1);
            warn!(what, attempt, last_observed = %last_observed, "wait timed out");
            return Err(VerifierError::Timeout {
                what: what.to_owned(),
                waited: now - started,
                last_observed,
            });
        }

        let mut sleep = intervals.next().unwrap_or(backoff.max_interval);
        if let Some(deadline) = deadline {
            sleep = sleep.min(deadline - now);
        }
        tokio::select! {
            () = cancel.cancelled() => {
                return Err(VerifierError::Cancelled(what.to_owned()));
            }
            () = tokio::time::sleep(sleep) => {}
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
