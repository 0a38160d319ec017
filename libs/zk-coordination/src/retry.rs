//! Retry policy and outcome classification shared by every read call site.
//!
//! The store's error space is folded into three dispositions: the node is
//! absent, the condition is transient and the same request should be
//! reissued, or the call failed for good. Reads of node data and child
//! listings both go through [`RetryPolicy::run`], so they cannot disagree on
//! retry counts or backoff.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error};

use crate::error::{CoordinationError, CoordinationResult};
use crate::handle::StoreError;

/// Default number of attempts for a read before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// What to do with a failed store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The node is absent. Authoritative, not retried.
    NotFound,
    /// The session or codec is temporarily unusable; reissue the request.
    Retry,
    /// Anything else. Not retried.
    Fail,
}

/// Classify a store error.
pub fn classify(err: &StoreError) -> Disposition {
    match err {
        StoreError::NoNode => Disposition::NotFound,
        StoreError::InvalidState | StoreError::Marshalling => Disposition::Retry,
        _ => Disposition::Fail,
    }
}

/// Bounded retry configuration for transient store faults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first. Zero behaves as one.
    pub max_attempts: u32,
    /// Delay before the second attempt, doubled for each one after it.
    /// Zero retries immediately.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Effective number of attempts.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Run `call` until it succeeds, fails for good, or the attempt budget is
    /// spent on transient faults.
    ///
    /// `op` and `path` only label log lines and errors.
    pub async fn run<T, F, Fut>(
        &self,
        op: &'static str,
        path: &str,
        mut call: F,
    ) -> CoordinationResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let attempts = self.attempts();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            match classify(&err) {
                Disposition::NotFound => {
                    error!(op, path, error = %err, "node does not exist");
                    return Err(CoordinationError::NotFound {
                        path: path.to_owned(),
                    });
                }
                Disposition::Fail => {
                    error!(op, path, error = %err, "coordination call failed");
                    return Err(CoordinationError::RemoteFailure {
                        op,
                        path: path.to_owned(),
                        attempts: attempt,
                        source: err,
                    });
                }
                Disposition::Retry if attempt >= attempts => {
                    error!(
                        op,
                        path,
                        attempts,
                        error = %err,
                        "coordination call failed after retries"
                    );
                    return Err(CoordinationError::RemoteFailure {
                        op,
                        path: path.to_owned(),
                        attempts,
                        source: err,
                    });
                }
                Disposition::Retry => {
                    debug!(op, path, attempt, error = %err, "transient store fault, retrying");
                    let delay = self.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
