//! Bounded retry of receiver operations
//!
//! Every network call towards the receiver goes through a [`RetryPolicy`]:
//! transient failures are retried immediately, up to a fixed number of
//! attempts. Errors that say the receiver is gone are returned at once.

use std::fmt::Display;
use std::future::Future;

use tracing::{debug, warn};

use crate::error::Error;
use crate::sink::SinkError;

/// Default number of attempts per operation
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Errors that know whether another attempt makes sense
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for SinkError {
    fn is_retryable(&self) -> bool {
        SinkError::is_retryable(self)
    }
}

/// Only receiver failures are worth another attempt
impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Sink(err) => err.is_retryable(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; values below 1 are raised to 1
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent. The last error is returned.
    ///
    /// There is no delay between attempts.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => {
                    warn!(operation, attempt, error = %err, "Operation failed, not retrying");
                    return Err(err);
                }
                Err(err) if attempt >= self.max_attempts => {
                    warn!(
                        operation,
                        attempts = attempt,
                        error = %err,
                        "Operation failed, giving up"
                    );
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "Operation failed, retrying"
                    );
                }
            }
        }
    }
}
