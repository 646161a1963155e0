//! Polling convergence for asynchronous control-plane operations.
//!
//! [`StateChangeConf`] repeatedly refreshes a remote object until its status
//! reaches one of the target statuses the configured number of consecutive
//! times, the object disappears (when no target status is given), or the
//! deadline passes.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::error::ProviderError;

/// First wait between polls when no fixed interval is configured.
pub const INITIAL_WAIT: Duration = Duration::from_millis(100);
/// Upper bound of the backoff between polls.
pub const MAX_WAIT: Duration = Duration::from_secs(10);
/// Default number of consecutive not-found polls tolerated.
pub const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;

/// Bound used when `now + timeout` cannot be represented.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Instant `timeout` from now, saturating at a far-future bound.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Snapshot returned by a refresh: the object plus its status.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Observation<T> {
    /// Object as reported by the control plane.
    pub value: T,
    /// Status string of the object.
    pub status: String,
}

impl<T> Observation<T> {
    /// Pairs a value with its status.
    pub fn new(value: T, status: impl Into<String>) -> Self {
        Self {
            value,
            status: status.into(),
        }
    }
}

/// Configuration of a single wait.
///
/// `refresh` returns `Ok(None)` when the object is missing.
pub struct StateChangeConf<F> {
    pending: &'static [&'static str],
    target: &'static [&'static str],
    refresh: F,
    timeout: Duration,
    delay: Duration,
    min_timeout: Duration,
    poll_interval: Option<Duration>,
    not_found_checks: u32,
    continuous_target_occurrence: u32,
}

impl<F, Fut, T> StateChangeConf<F>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<Observation<T>>, ProviderError>>,
{
    /// Creates a wait for `target` that tolerates `pending` statuses.
    pub const fn new(
        pending: &'static [&'static str],
        target: &'static [&'static str],
        timeout: Duration,
        refresh: F,
    ) -> Self {
        Self {
            pending,
            target,
            refresh,
            timeout,
            delay: Duration::ZERO,
            min_timeout: Duration::ZERO,
            poll_interval: None,
            not_found_checks: DEFAULT_NOT_FOUND_CHECKS,
            continuous_target_occurrence: 1,
        }
    }

    /// Waits before the first refresh.
    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the lower bound of the backoff.
    #[must_use]
    pub const fn min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    /// Replaces the backoff with a fixed interval when `Some`.
    #[must_use]
    pub const fn poll_interval(mut self, poll_interval: Option<Duration>) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Sets how many consecutive not-found polls are tolerated.
    #[must_use]
    pub const fn not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    /// Sets how many consecutive target observations are required.
    #[must_use]
    pub const fn continuous_target_occurrence(mut self, occurrences: u32) -> Self {
        self.continuous_target_occurrence = if occurrences == 0 { 1 } else { occurrences };
        self
    }

    /// Polls until the target is reached.
    ///
    /// Returns the final object, or `None` when the wait converged on the
    /// object being gone.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Timeout`] when the deadline passes,
    /// [`ProviderError::UnexpectedState`] for a status outside `pending` and
    /// `target`, [`ProviderError::NotFound`] once the object has been missing
    /// for more than `not_found_checks` polls, and any non-transient refresh
    /// error unchanged.
    pub async fn wait_for_state(mut self) -> Result<Option<T>, ProviderError> {
        let deadline = deadline_after(self.timeout);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let mut wait = INITIAL_WAIT;
        let mut target_occurrence = 0_u32;
        let mut not_found_ticks = 0_u32;
        let mut last_state = String::new();
        let mut last_error: Option<String> = None;
        let mut first = true;

        loop {
            if !first {
                let now = Instant::now();
                if now >= deadline {
                    return Err(ProviderError::Timeout {
                        expected: self.expected(),
                        last_state,
                        timeout: self.timeout,
                        last_error,
                    });
                }
                if target_occurrence == 0 {
                    wait = wait.saturating_mul(2);
                }
                wait = self
                    .poll_interval
                    .unwrap_or_else(|| wait.clamp(self.min_timeout, MAX_WAIT.max(self.min_timeout)));
                sleep(wait.min(deadline - now)).await;
            }
            first = false;

            match (self.refresh)().await {
                Err(err) if err.is_transient() => {
                    warn!(error = %err, "transient error while waiting; retrying");
                    last_error = Some(err.to_string());
                }
                Err(err) => return Err(err),
                Ok(None) if self.target.is_empty() => {
                    target_occurrence += 1;
                    if target_occurrence >= self.continuous_target_occurrence {
                        return Ok(None);
                    }
                }
                Ok(None) => {
                    target_occurrence = 0;
                    not_found_ticks += 1;
                    debug!(not_found_ticks, "object not found while waiting");
                    if not_found_ticks > self.not_found_checks {
                        return Err(ProviderError::NotFound {
                            message: format!(
                                "couldn't find resource ({} retries)",
                                self.not_found_checks
                            ),
                            last_error,
                        });
                    }
                }
                Ok(Some(observation)) => {
                    not_found_ticks = 0;
                    debug!(status = %observation.status, "refreshed object status");
                    let status = observation.status.as_str();
                    if self.target.contains(&status) {
                        target_occurrence += 1;
                        if target_occurrence >= self.continuous_target_occurrence {
                            return Ok(Some(observation.value));
                        }
                    } else if self.pending.contains(&status) {
                        target_occurrence = 0;
                    } else {
                        return Err(ProviderError::UnexpectedState {
                            state: observation.status,
                            expected: self.expected(),
                        });
                    }
                    last_state = observation.status;
                }
            }
        }
    }

    fn expected(&self) -> Vec<String> {
        self.target.iter().map(|status| (*status).to_owned()).collect()
    }
}

/// Retries `op` while it fails with a transient error and time remains.
///
/// # Errors
///
/// Returns the last error once it is not transient or the bound is exhausted.
pub async fn retry_when_transient<T, F, Fut>(timeout: Duration, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let deadline = deadline_after(timeout);
    let mut wait = INITIAL_WAIT;
    let mut attempt = 1_u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err)
                if err.is_transient()
                    && Instant::now().checked_add(wait).is_some_and(|at| at < deadline) =>
            {
                warn!(attempt, error = %err, "transient failure; retrying");
                sleep(wait).await;
                wait = wait.saturating_mul(2).min(MAX_WAIT);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
