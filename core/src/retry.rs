//! Explicit retry policy.
//!
//! Callers hand [`RetryPolicy::execute`] a closure producing one attempt.
//! The policy decides whether a failure is retried, optionally sleeps
//! between attempts, and wraps the last failure in a [`RetryError`] once it
//! gives up.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::error::RetryError;

/// Default number of attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Upper bound accepted from configuration.
pub const MAX_ATTEMPTS_LIMIT: u32 = 15;

const DEFAULT_LABEL: &str = "operation failed";

/// Exponential delay between attempts, doubling from `initial` up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    /// Delay after the failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

type Predicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// How many times to try an operation and which failures to retry.
pub struct RetryPolicy<E> {
    max_attempts: u32,
    should_retry: Predicate<E>,
    label: String,
    backoff: Option<Backoff>,
}

impl<E> RetryPolicy<E>
where
    E: std::error::Error + 'static,
{
    /// Retry every failure, up to `max_attempts` attempts in total (at least one).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            should_retry: Arc::new(|_| true),
            label: DEFAULT_LABEL.to_string(),
            backoff: None,
        }
    }

    /// Only retry failures for which `predicate` returns true.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Label used in logs and in the exhaustion error, e.g. "failed to generate a tip".
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into().to_lowercase();
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn backoff(&self) -> Option<Backoff> {
        self.backoff
    }

    pub fn should_retry(&self, err: &E) -> bool {
        (self.should_retry)(err)
    }

    /// Run `attempt` until it succeeds or the policy gives up.
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut number = 1;
        loop {
            match attempt(number).await {
                Ok(value) => {
                    debug!("'{operation}' succeeded on attempt {number}/{}", self.max_attempts);
                    return Ok(value);
                }
                Err(err) => {
                    if !self.can_retry(operation, number, &err) {
                        return Err(self.give_up(operation, number, err));
                    }
                    self.pause(number).await;
                    number += 1;
                }
            }
        }
    }

    /// Whether another attempt may follow the failed attempt `number`.
    pub(crate) fn can_retry(&self, operation: &str, number: u32, err: &E) -> bool {
        if number >= self.max_attempts || !self.should_retry(err) {
            return false;
        }
        warn!(
            "Function '{operation}' {}: {err}. Attempt {number}/{}",
            self.label, self.max_attempts
        );
        true
    }

    pub(crate) async fn pause(&self, number: u32) {
        if let Some(backoff) = &self.backoff {
            let delay = backoff.delay(number);
            debug!("Waiting {delay:?} before attempt {}", number + 1);
            sleep(delay).await;
        }
    }

    pub(crate) fn give_up(&self, operation: &'static str, attempts: u32, source: E) -> RetryError<E> {
        error!(
            "Function '{operation}' {} after {attempts} attempts. Last error: {source}",
            self.label
        );
        RetryError {
            operation,
            label: self.label.clone(),
            attempts,
            source,
        }
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            should_retry: Arc::clone(&self.should_retry),
            label: self.label.clone(),
            backoff: self.backoff,
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("label", &self.label)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl<E> Default for RetryPolicy<E>
where
    E: std::error::Error + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}
