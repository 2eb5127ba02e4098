//! Backoff for broker writes and log suppression for a failing broker.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Exponential backoff schedule: `base`, `2 * base`, `4 * base` ... capped at `cap`.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Attempts after the first one
    pub retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            retries: 3,
            base: Duration::from_millis(100),
            cap: Duration::from_secs(5),
        }
    }
}

impl Backoff {
    pub fn with_retries(retries: u32) -> Self {
        Self {
            retries,
            ..Default::default()
        }
    }

    pub fn base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    /// Pause before retry number `retry` (1-based).
    fn pause(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Run `op` until it succeeds, fails with an error `retryable` rejects, or
/// the schedule runs out. The last error is returned.
pub async fn retry_async<F, Fut, T, E, R>(
    backoff: &Backoff,
    label: &str,
    retryable: R,
    op: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut retry = 0u32;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if retry >= backoff.retries || !retryable(&err) {
            if retry > 0 {
                warn!(label, attempts = retry + 1, "Giving up: {}", err);
            }
            return Err(err);
        }
        retry += 1;
        let pause = backoff.pause(retry);
        debug!(label, retry, ?pause, "Retrying after error: {}", err);
        tokio::time::sleep(pause).await;
    }
}

/// Counts consecutive failed broker polls so a dead broker logs a few
/// errors and then goes quiet until it recovers.
#[derive(Debug, Default)]
pub struct BrokerHealth {
    failed_polls: u32,
    log_limit: u32,
}

impl BrokerHealth {
    pub fn new(log_limit: u32) -> Self {
        Self {
            failed_polls: 0,
            log_limit,
        }
    }

    pub fn record_ok(&mut self) {
        if self.failed_polls > self.log_limit {
            info!(failed_polls = self.failed_polls, "Broker reachable again");
        }
        self.failed_polls = 0;
    }

    /// Count a failed poll. Returns whether it should be logged.
    pub fn record_error(&mut self) -> bool {
        self.failed_polls = self.failed_polls.saturating_add(1);
        if self.failed_polls == self.log_limit + 1 {
            warn!(
                "Broker failed {} polls in a row, muting until it recovers",
                self.log_limit
            );
        }
        self.failed_polls <= self.log_limit
    }

    pub fn failed_polls(&self) -> u32 {
        self.failed_polls
    }
}
