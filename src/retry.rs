//! Bounded retry with exponential backoff.
//!
//! The executor knows nothing about the operation it wraps beyond its
//! `Result`. With `retries == 0` the operation still runs exactly once and its
//! error is returned untouched; otherwise it runs up to `retries` times,
//! sleeping between attempts with a delay that doubles each time and never
//! exceeds [`MAX_BACKOFF`].

use std::fmt;
use std::thread;
use std::time::Duration;

/// Upper bound for a single backoff step.
pub const MAX_BACKOFF: Duration = Duration::from_millis(1000);

/// Retry count and initial backoff for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (`0` = single attempt, no retry)
    pub retries: u64,
    /// Delay before the second attempt
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Policy from a retry count and a backoff in milliseconds.
    pub fn new(retries: u64, backoff_ms: u64) -> Self {
        Self {
            retries,
            backoff: Duration::from_millis(backoff_ms),
        }
    }

    /// Single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self {
            retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Number of times the operation will be attempted at most.
    pub fn max_attempts(&self) -> u64 {
        self.retries.max(1)
    }

    /// Delays slept between consecutive attempts, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let steps = self.max_attempts() - 1;
        std::iter::successors(Some(self.backoff.min(MAX_BACKOFF)), |d| Some(next_backoff(*d)))
            .take(steps as usize)
    }
}

/// Doubles `current`, capped at [`MAX_BACKOFF`].
pub fn next_backoff(current: Duration) -> Duration {
    current.saturating_mul(2).min(MAX_BACKOFF)
}

/// Failure of an operation run under a [`RetryPolicy`]
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The only attempt failed (no-retry mode); the raw error
    #[error("{0}")]
    Failed(E),
    /// Every attempt failed; the last error is kept
    #[error("exhausted retries after {attempts} attempts: last error: {last}")]
    Exhausted {
        /// Attempts performed
        attempts: u64,
        /// Error of the final attempt
        last: E,
    },
}

impl<E> RetryError<E> {
    /// Error of the last attempt.
    pub fn last_error(&self) -> &E {
        match self {
            RetryError::Failed(e) => e,
            RetryError::Exhausted { last, .. } => last,
        }
    }

    /// Consume and return the error of the last attempt.
    pub fn into_last_error(self) -> E {
        match self {
            RetryError::Failed(e) => e,
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

/// Run `op` under `policy`, sleeping the current thread between attempts.
pub fn run_with_retry<T, E, F>(op: F, policy: &RetryPolicy) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    E: fmt::Display,
{
    run_with_retry_using(op, policy, thread::sleep)
}

/// Same as [`run_with_retry`] with a caller-provided sleep function.
pub fn run_with_retry_using<T, E, F, S>(
    mut op: F,
    policy: &RetryPolicy,
    mut sleep: S,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    S: FnMut(Duration),
    E: fmt::Display,
{
    if policy.retries == 0 {
        return op().map_err(RetryError::Failed);
    }

    let mut backoff = policy.backoff.min(MAX_BACKOFF);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                log::debug!("Attempt {}/{} failed: {}", attempt, policy.retries, err);
                if attempt == policy.retries {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                log::debug!("Retrying... {} tries left", policy.retries - attempt);
                sleep(backoff);
                backoff = next_backoff(backoff);
                attempt += 1;
            }
        }
    }
}
