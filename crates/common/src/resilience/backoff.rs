//! Backoff strategies and a bounded async retry helper

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Error returned when a bounded retry loop gives up
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error; the last one is attached.
    #[error("all {attempts} attempts exhausted")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },

    /// The operation failed with an error the policy refuses to retry.
    #[error("non-retryable failure")]
    NonRetryable(#[source] E),
}

impl<E> RetryError<E> {
    /// Unwrap the underlying operation error.
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::NonRetryable(e) => e,
        }
    }
}

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// Linear backoff: initial_delay + (attempt * increment)
    Linear { initial_delay: Duration, increment: Duration },
    /// Exponential backoff: initial_delay * base^attempt, capped at max_delay
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
}

impl BackoffStrategy {
    /// Calculate the delay before the given retry attempt (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Linear { initial_delay, increment } => {
                *initial_delay + increment.saturating_mul(attempt)
            }
            Self::Exponential { initial_delay, base, max_delay } => {
                let delay = initial_delay.as_millis() as f64 * base.powi(attempt as i32);
                Duration::from_millis(delay.min(max_delay.as_millis() as f64) as u64)
            }
        }
    }

    /// Delay with full jitter: a uniform draw from half to all of the
    /// calculated delay, so concurrent retriers spread out.
    pub fn jittered_delay_for(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if delay.is_zero() {
            return delay;
        }
        let millis = delay.as_millis() as u64;
        let low = millis / 2;
        Duration::from_millis(low + rand::random::<u64>() % (millis - low + 1))
    }
}

/// Run `op` up to `max_attempts` times, sleeping per `strategy` between
/// attempts while `is_retryable` approves the error.
///
/// The attempt bound is the caller's defense against retry storms; there is
/// no unbounded waiting anywhere in this crate.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    max_attempts: u32,
    strategy: BackoffStrategy,
    is_retryable: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if !is_retryable(&error) => {
                return Err(RetryError::NonRetryable(error));
            }
            Err(error) => {
                debug!(attempt, error = %error, "retry.attempt_failed");
                last_error = Some(error);
                if attempt + 1 < attempts {
                    tokio::time::sleep(strategy.jittered_delay_for(attempt)).await;
                }
            }
        }
    }

    match last_error {
        Some(last) => Err(RetryError::Exhausted { attempts, last }),
        // attempts >= 1, so the loop ran and either returned or set last_error
        None => unreachable!("retry loop exited without a result"),
    }
}
