//! Job status polling.
//!
//! The loop sleeps between status checks according to a [`PollPolicy`],
//! retries transient transport failures with jittered exponential backoff,
//! and gives up with [`ClientError::Timeout`] once the policy's deadline
//! passes. No status request is issued after the deadline.

use crate::error::{ClientError, ClientResult};
use crate::models::{JobId, JobStatus};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Shortest pause between two status requests, whatever the policy says.
pub const MIN_POLL_DELAY: Duration = Duration::from_millis(100);

/// Delay schedule between status checks of a pending job.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay between every check.
    Fixed { interval: Duration },
    /// Delay grows by `multiplier` after each check, capped at `max`.
    Exponential {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Delay after the `attempt`-th pending status (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed { interval } => interval,
            Backoff::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let factor = multiplier.max(1.0).powi(attempt.min(64) as i32);
                let secs = initial.as_secs_f64() * factor;
                if !secs.is_finite() || secs >= max.as_secs_f64() {
                    max
                } else {
                    Duration::from_secs_f64(secs)
                }
            }
        }
    }
}

/// How to wait for a job.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub backoff: Backoff,
    /// Total time allowed for waiting.
    pub timeout: Duration,
    /// First delay after a transient transport failure.
    pub retry_initial: Duration,
    /// Cap on the transport retry delay.
    pub retry_max: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            backoff: Backoff::Exponential {
                initial: Duration::from_secs(2),
                multiplier: 1.5,
                max: Duration::from_secs(30),
            },
            timeout: Duration::from_secs(3600),
            retry_initial: Duration::from_secs(1),
            retry_max: Duration::from_secs(30),
        }
    }
}

impl PollPolicy {
    /// Fixed-interval policy with the given overall timeout.
    pub fn fixed(interval: Duration, timeout: Duration) -> Self {
        Self {
            backoff: Backoff::Fixed { interval },
            timeout,
            retry_initial: interval,
            retry_max: interval.max(Duration::from_secs(30)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Jittered delay after `failures` consecutive transport failures (1-based).
    pub fn retry_delay(&self, failures: u32) -> Duration {
        let base = self
            .retry_initial
            .saturating_mul(1u32 << failures.saturating_sub(1).min(16))
            .min(self.retry_max);
        let jitter: f64 = rand::thread_rng().gen_range(0.9_f64..=1.1_f64);
        let jittered_ms = (base.as_millis() as f64 * jitter).round() as u64;
        Duration::from_millis(jittered_ms).max(MIN_POLL_DELAY)
    }
}

/// Poll `probe` until it reports a terminal status, a non-retryable error
/// occurs, or the policy's timeout elapses.
pub async fn poll_until<F, Fut>(
    job_id: &JobId,
    policy: &PollPolicy,
    mut probe: F,
) -> ClientResult<JobStatus>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<JobStatus>>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut attempt: u32 = 0;
    let mut failures: u32 = 0;

    loop {
        let delay = match probe().await {
            Ok(status) if status.is_terminal() => {
                debug!(job = %job_id, status = %status, polls = attempt + 1, "job settled");
                return Ok(status);
            }
            Ok(status) => {
                failures = 0;
                let delay = policy.backoff.delay(attempt).max(MIN_POLL_DELAY);
                attempt += 1;
                debug!(
                    job = %job_id,
                    status = %status,
                    next_poll_ms = delay.as_millis(),
                    "job still running"
                );
                delay
            }
            Err(e) if e.is_retryable() => {
                failures += 1;
                let delay = policy.retry_delay(failures);
                warn!(
                    job = %job_id,
                    error = %e,
                    retry = failures,
                    backoff_ms = delay.as_millis(),
                    "status check failed, retrying"
                );
                delay
            }
            Err(e) => return Err(e),
        };

        let now = Instant::now();
        let remaining = deadline.saturating_duration_since(now);
        if delay >= remaining {
            tokio::time::sleep(remaining).await;
            return Err(ClientError::Timeout {
                job_id: job_id.to_string(),
                waited: started.elapsed(),
            });
        }

        tokio::time::sleep(delay).await;
    }
}
