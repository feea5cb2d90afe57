//! Bounded retry with geometric backoff.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy configuration.
///
/// An attempt fails if the operation returns `Err(_)` **or** `Ok(None)`; both
/// are treated the same so fetchers can signal "no data" without an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of invocations (at least 1).
    pub attempts: u32,
    /// Wait after the first failed attempt.
    pub initial_backoff: Duration,
    /// Factor applied to the wait after every failed attempt.
    pub backoff_multiplier: f64,
    /// Optional cap on any single wait.
    pub max_backoff: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            max_backoff: None,
        }
    }
}

/// Value plus the number of invocations it took.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub value: Option<T>,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn new(attempts: u32, initial_backoff: Duration, backoff_multiplier: f64) -> Self {
        Self {
            attempts,
            initial_backoff,
            backoff_multiplier,
            max_backoff: None,
        }
    }

    /// A single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    pub fn with_max_backoff(mut self, cap: Duration) -> Self {
        self.max_backoff = Some(cap);
        self
    }

    /// Wait after failed attempt `attempt` (1-indexed): `initial * multiplier^(attempt-1)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.max(0.0).powi(attempt as i32 - 1);
        let secs = self.initial_backoff.as_secs_f64() * factor;
        let delay = if secs.is_finite() {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        } else {
            Duration::MAX
        };
        match self.max_backoff {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Run `operation` until it yields a value or the attempts are spent.
    ///
    /// Never returns the operation's error: exhaustion is `None`.
    pub fn run<T, E, F>(&self, operation: F) -> Option<T>
    where
        E: std::fmt::Display,
        F: FnMut() -> Result<Option<T>, E>,
    {
        self.run_counted(operation).value
    }

    /// Like [`run`](Self::run), also reporting how many invocations happened.
    pub fn run_counted<T, E, F>(&self, mut operation: F) -> RetryOutcome<T>
    where
        E: std::fmt::Display,
        F: FnMut() -> Result<Option<T>, E>,
    {
        let attempts = self.attempts.max(1);

        for attempt in 1..=attempts {
            match operation() {
                Ok(Some(value)) => {
                    return RetryOutcome {
                        value: Some(value),
                        attempts: attempt,
                    };
                }
                Ok(None) => {
                    tracing::debug!(attempt, attempts, "attempt returned no data");
                }
                Err(e) => {
                    tracing::debug!(attempt, attempts, error = %e, "attempt failed");
                }
            }

            if attempt < attempts {
                let delay = self.delay_for_attempt(attempt);
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
        }

        RetryOutcome {
            value: None,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), 2.0)
    }

    #[test]
    fn geometric_backoff_calculates_correctly() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), 2.0);

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(800));
    }

    #[test]
    fn fractional_multiplier() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1500), 1.5);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2250));
    }

    #[test]
    fn max_backoff_caps_delay() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), 10.0)
            .with_max_backoff(Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(9), Duration::from_secs(30));
    }

    #[test]
    fn always_failing_operation_is_invoked_exactly_attempts_times() {
        let calls = Cell::new(0);
        let out = fast(3).run_counted(|| {
            calls.set(calls.get() + 1);
            Err::<Option<u32>, _>("boom")
        });

        assert_eq!(calls.get(), 3);
        assert_eq!(out.value, None);
        assert_eq!(out.attempts, 3);
    }

    #[test]
    fn empty_results_count_as_failures() {
        let calls = Cell::new(0);
        let value = fast(3).run(|| {
            calls.set(calls.get() + 1);
            Ok::<Option<u32>, String>(None)
        });

        assert_eq!(calls.get(), 3);
        assert_eq!(value, None);
    }

    #[test]
    fn fails_twice_then_succeeds_on_third() {
        let calls = Cell::new(0);
        let out = fast(3).run_counted(|| {
            calls.set(calls.get() + 1);
            match calls.get() {
                1 => Err("connection reset".to_string()),
                2 => Ok(None),
                _ => Ok(Some(0.00012_f64)),
            }
        });

        assert_eq!(calls.get(), 3);
        assert_eq!(out.value, Some(0.00012));
        assert_eq!(out.attempts, 3);
    }

    #[test]
    fn first_success_short_circuits() {
        let calls = Cell::new(0);
        let value = fast(5).run(|| {
            calls.set(calls.get() + 1);
            Ok::<_, String>(Some("ok"))
        });

        assert_eq!(value, Some("ok"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn zero_attempts_still_invokes_once() {
        let calls = Cell::new(0);
        let _ = RetryPolicy::new(0, Duration::ZERO, 1.0).run(|| {
            calls.set(calls.get() + 1);
            Err::<Option<()>, _>("nope")
        });
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn backoff_actually_waits_between_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(20), 2.0);
        let started = std::time::Instant::now();
        let _ = policy.run(|| Err::<Option<()>, _>("down"));
        // 20ms + 40ms, no wait after the last attempt.
        assert!(started.elapsed() >= Duration::from_millis(60));
    }
}
