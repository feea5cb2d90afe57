//! Wrappers that make unreliable upstream calls usable: bounded retry with
//! geometric backoff, and a per-upstream minimum-interval throttle.
//!
//! Both are plain higher-order functions over a closure so the composition
//! order (throttle around the whole retry loop, or around every attempt) is
//! chosen explicitly by the caller; see `sources::Throttle`.

pub mod rate_limit;
pub mod retry;

pub use rate_limit::{LimiterRegistry, RateLimiter};
pub use retry::{RetryOutcome, RetryPolicy};
