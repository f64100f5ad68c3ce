//! Bounded retry combinator
//!
//! `with_retries` keeps invoking an operation until it succeeds, a classifier
//! marks its failure terminal, the time budget runs out, or the context is
//! cancelled. Delays grow exponentially and never exceed what is left of the
//! budget, so a loop of always-retryable failures returns no later than the
//! budget plus one operation latency.

use crate::context::Context;
use std::future::Future;
use std::time::{Duration, Instant};

/// What to do with a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Retryable,
    /// Retry, waiting at least this long first
    RetryAfter(Duration),
    Terminal,
}

/// Decides whether a failure should be retried
pub trait Classify<E>: Send + Sync {
    fn classify(&self, error: &E) -> Classification;
}

impl<E, F> Classify<E> for F
where
    F: Fn(&E) -> Classification + Send + Sync,
{
    fn classify(&self, error: &E) -> Classification {
        self(error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum elapsed time across all attempts
    pub budget: Duration,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// No two attempts run closer together than this
    pub const MIN_DELAY: Duration = Duration::from_millis(10);

    pub fn with_budget(budget: Duration) -> Self {
        Self {
            budget,
            ..Self::default()
        }
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before the attempt following attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped).max(Self::MIN_DELAY)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            budget: Duration::from_secs(30),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Why `with_retries` gave up
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("{0}")]
    Terminal(E),

    #[error("gave up after {attempts} attempts in {elapsed:?}: {last}")]
    Timeout {
        elapsed: Duration,
        attempts: u32,
        last: E,
    },

    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32, last: Option<E> },
}

impl<E> RetryError<E> {
    /// The most recent failure, if one was observed
    pub fn into_last(self) -> Option<E> {
        match self {
            RetryError::Terminal(e) => Some(e),
            RetryError::Timeout { last, .. } => Some(last),
            RetryError::Cancelled { last, .. } => last,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RetryError::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }
}

/// Run `operation` until it succeeds or retrying stops making sense
pub async fn with_retries<T, E, F, Fut, C>(
    ctx: &Context,
    policy: &RetryPolicy,
    classifier: &C,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Classify<E> + ?Sized,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let mut attempts: u32 = 0;
    let mut last: Option<E> = None;

    loop {
        if ctx.is_cancelled() {
            return Err(RetryError::Cancelled { attempts, last });
        }

        attempts += 1;
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                return Err(RetryError::Cancelled { attempts, last });
            }
            outcome = operation() => outcome,
        };

        let error = match outcome {
            Ok(value) => {
                if attempts > 1 {
                    tracing::debug!("Succeeded after {} attempts", attempts);
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        let delay = match classifier.classify(&error) {
            Classification::Terminal => {
                tracing::debug!("Attempt {} failed terminally: {}", attempts, error);
                return Err(RetryError::Terminal(error));
            }
            Classification::Retryable => policy.delay_for(attempts),
            Classification::RetryAfter(hint) => hint.max(RetryPolicy::MIN_DELAY),
        };

        let elapsed = start.elapsed();
        if elapsed >= policy.budget {
            tracing::warn!(
                "Giving up after {} attempts in {:?}: {}",
                attempts,
                elapsed,
                error
            );
            return Err(RetryError::Timeout {
                elapsed,
                attempts,
                last: error,
            });
        }

        let delay = delay.min(policy.budget - elapsed);
        tracing::debug!(
            "Retrying after {}ms (attempt {}): {}",
            delay.as_millis(),
            attempts,
            error
        );

        tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                return Err(RetryError::Cancelled { attempts, last: Some(error) });
            }
            _ = tokio::time::sleep(delay) => {}
        }

        last = Some(error);
    }
}

/// Ready-made classifiers for remote failures
pub mod classify {
    use super::Classification;
    use crate::error::{RemoteError, RemoteErrorKind};

    /// Rate limits, busy servers and lost connections are retried; everything else is terminal
    pub fn transient(error: &RemoteError) -> Classification {
        match error.kind() {
            RemoteErrorKind::RateLimited => match error.retry_after {
                Some(wait) => Classification::RetryAfter(wait),
                None => Classification::Retryable,
            },
            RemoteErrorKind::ServerBusy | RemoteErrorKind::Transport => Classification::Retryable,
            _ => Classification::Terminal,
        }
    }

    /// Stale version tokens are retried (after a refetch) on top of transient failures
    pub fn version_conflict(error: &RemoteError) -> Classification {
        match error.kind() {
            RemoteErrorKind::VersionConflict => Classification::Retryable,
            _ => transient(error),
        }
    }

    /// 404 while a freshly written entity propagates
    pub fn eventual_consistency(error: &RemoteError) -> Classification {
        match error.kind() {
            RemoteErrorKind::NotFound => Classification::Retryable,
            _ => transient(error),
        }
    }

    /// 400 while referenced entities propagate
    pub fn bad_request(error: &RemoteError) -> Classification {
        match error.kind() {
            RemoteErrorKind::BadRequest => Classification::Retryable,
            _ => transient(error),
        }
    }

    pub fn never(_error: &RemoteError) -> Classification {
        Classification::Terminal
    }
}
