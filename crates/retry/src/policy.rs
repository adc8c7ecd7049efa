use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::backoff::ExponentialBackoff;

/// How a failed attempt should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Transient; another attempt may succeed
    Retryable,
    /// Permanent; retrying cannot help
    Fatal,
}

/// Errors that know whether they are worth retrying
pub trait Classify {
    fn classify(&self) -> Classification;
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("fatal error on attempt {attempt}: {error}")]
    Fatal { attempt: u32, error: E },

    #[error("gave up after {attempts} attempts: {error}")]
    Exhausted { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Fatal { attempt, .. } => *attempt,
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn inner(&self) -> &E {
        match self {
            RetryError::Fatal { error, .. } | RetryError::Exhausted { error, .. } => error,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal { error, .. } | RetryError::Exhausted { error, .. } => error,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, RetryError::Fatal { .. })
    }
}

/// Bounded retry executor.
///
/// Attempt `n` (one-based) that fails with a retryable error sleeps
/// `base_delay * multiplier^(n-1)` (capped at `max_delay`) before attempt
/// `n + 1`. Fatal errors return immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }

    /// Default for batch and deployment submission
    pub fn submission() -> Self {
        Self::new(3, Duration::from_secs(1))
    }

    /// Default for ad-hoc status reads after a transient failure
    pub fn status_recheck() -> Self {
        Self::new(2, Duration::from_millis(500))
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.base_delay, self.max_delay).with_multiplier(self.multiplier)
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out
    pub async fn execute<F, Fut, T, E, C>(&self, mut op: F, classify: C) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> Classification,
        E: fmt::Display,
    {
        let mut backoff = self.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if classify(&err) == Classification::Fatal {
                debug!(attempt, error = %err, "fatal error, not retrying");
                return Err(RetryError::Fatal {
                    attempt,
                    error: err,
                });
            }

            if attempt >= self.max_attempts {
                warn!(attempts = attempt, error = %err, "retry attempts exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    error: err,
                });
            }

            let delay = backoff.next_delay();
            warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retryable error, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// [`execute`](Self::execute) using the error's own classification
    pub async fn execute_classified<F, Fut, T, E>(&self, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        self.execute(op, |e: &E| e.classify()).await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::submission()
    }
}
