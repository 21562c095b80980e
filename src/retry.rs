//! Re-issuing operations that lost the write-lock race.
//!
//! Every mutating operation is atomic, so a [`CoreError::Retryable`] failure
//! left nothing behind and the whole call can simply run again. Other error
//! kinds are terminal and come back on the first attempt.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::CoreError;

/// How many times to run an operation and how long to wait in between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first. Invariant: >= 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; attempt `n` waits `n - 1` times this.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// A policy that runs the operation once.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Wait before attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.saturating_sub(1))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up.
///
/// The last error is returned when every attempt was retryable.
pub fn with_retry<T, F>(policy: RetryPolicy, mut op: F) -> Result<T, CoreError>
where
    F: FnMut() -> Result<T, CoreError>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                attempt += 1;
                let delay = policy.delay_before(attempt);
                tracing::warn!(attempt, max_attempts, delay_ms = delay.as_millis(), error = %err, "retrying");
                std::thread::sleep(delay);
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgehub_db::DbError;

    fn busy() -> CoreError {
        DbError::Busy(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ))
        .into()
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let mut calls = 0;
        let value = with_retry(fast(3), || {
            calls += 1;
            if calls < 3 { Err(busy()) } else { Ok(calls) }
        })
        .unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut calls = 0;
        let err = with_retry(fast(2), || {
            calls += 1;
            Err::<(), _>(busy())
        })
        .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(calls, 2);
    }

    #[test]
    fn terminal_errors_are_not_retried() {
        let mut calls = 0;
        let err = with_retry(fast(5), || {
            calls += 1;
            Err::<(), _>(CoreError::invalid("title", "must not be empty"))
        })
        .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(calls, 1);
    }

    #[test]
    fn delay_grows_linearly() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(50),
        };
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(50));
        assert_eq!(policy.delay_before(4), Duration::from_millis(150));
    }

    #[test]
    fn policy_from_config() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_attempts: 0,
            backoff_ms: 7,
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay, Duration::from_millis(7));
        assert_eq!(RetryPolicy::no_retry().max_attempts, 1);
    }
}
