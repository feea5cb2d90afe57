//! Minimum-interval throttle for a named upstream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Serializes calls to one upstream so consecutive calls are at least
/// `period / calls` apart.
///
/// The lock is held across the wait and the call itself, and the timestamp is
/// taken when the call *finishes*, so a slow call never shortens the gap before
/// the next one. There is no per-caller fairness.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Budget of `calls` per `period`. `calls == 0` is treated as 1.
    pub fn new(name: impl Into<String>, calls: u32, period: Duration) -> Self {
        Self::with_interval(name, period / calls.max(1))
    }

    pub fn with_interval(name: impl Into<String>, min_interval: Duration) -> Self {
        Self {
            name: name.into(),
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Run `operation` once the interval since the previous call has elapsed.
    pub fn limited<T, F>(&self, operation: F) -> T
    where
        F: FnOnce() -> T,
    {
        let mut last_call = self.last_call.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(limiter = %self.name, wait_ms = wait.as_millis() as u64, "throttling upstream call");
                thread::sleep(wait);
            }
        }

        let result = operation();
        *last_call = Some(Instant::now());
        result
    }
}

/// Named limiters shared by every kind that talks to the same upstream.
#[derive(Debug, Default)]
pub struct LimiterRegistry {
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl LimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The limiter registered under `name`, creating it with this budget if absent.
    ///
    /// The first registration wins; later budgets for the same name are ignored.
    pub fn get_or_create(&self, name: &str, calls: u32, period: Duration) -> Arc<RateLimiter> {
        let mut limiters = self.limiters.lock().unwrap_or_else(PoisonError::into_inner);
        limiters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::new(name, calls, period)))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<RateLimiter>> {
        self.limiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_interval_is_period_over_calls() {
        let limiter = RateLimiter::new("ncbi", 3, Duration::from_secs(1));
        assert_eq!(limiter.min_interval(), Duration::from_nanos(333_333_333));
        assert_eq!(
            RateLimiter::new("x", 0, Duration::from_secs(1)).min_interval(),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn consecutive_calls_are_spaced_by_a_full_period() {
        let limiter = RateLimiter::new("gnomad", 1, Duration::from_secs(1));

        let first = limiter.limited(Instant::now);
        let second = limiter.limited(Instant::now);

        assert!(second.duration_since(first) >= Duration::from_secs(1));
    }

    #[test]
    fn first_call_is_not_delayed() {
        let limiter = RateLimiter::new("ucsc", 1, Duration::from_secs(5));
        let started = Instant::now();
        limiter.limited(|| ());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn spacing_is_measured_from_the_end_of_a_slow_call() {
        let limiter = RateLimiter::with_interval("slow", Duration::from_millis(100));

        let first_end = limiter.limited(|| {
            thread::sleep(Duration::from_millis(50));
            Instant::now()
        });
        let second_start = limiter.limited(Instant::now);

        assert!(second_start.duration_since(first_end) >= Duration::from_millis(100));
    }

    #[test]
    fn concurrent_callers_keep_the_spacing() {
        let limiter = Arc::new(RateLimiter::with_interval("shared", Duration::from_millis(50)));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                thread::spawn(move || limiter.limited(Instant::now))
            })
            .collect();
        let mut starts: Vec<Instant> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        starts.sort();

        for pair in starts.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(50));
        }
    }

    #[test]
    fn registry_shares_limiters_by_name() {
        let registry = LimiterRegistry::new();
        let a = registry.get_or_create("ncbi-eutils", 3, Duration::from_secs(1));
        let b = registry.get_or_create("ncbi-eutils", 10, Duration::from_secs(1));

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.min_interval(), Duration::from_nanos(333_333_333));
        assert!(registry.get("ensembl").is_none());
    }
}
