//! Per-kind wiring of the source chain.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use cardiovar_core::{CoreError, DataKind, SourceKey};

use super::fallback::FallbackSource;
use super::synthetic::SyntheticSource;
use crate::resilience::{RateLimiter, RetryPolicy};

/// Failure of one live upstream call. Absorbed by the retry layer.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to {service} failed: {message}")]
    Transport { service: &'static str, message: String },
    #[error("{service} returned HTTP {status}")]
    Status { service: &'static str, status: u16 },
    #[error("malformed response from {service}: {message}")]
    Decode { service: &'static str, message: String },
    #[error(transparent)]
    Key(#[from] CoreError),
}

/// Live upstream seam: one request, bounded by `timeout`.
///
/// `Ok(None)` means the upstream answered but has no record for the key.
pub trait LiveSource: Send + Sync {
    fn fetch(&self, key: &SourceKey, timeout: Duration) -> Result<Option<Value>, UpstreamError>;
}

impl<F> LiveSource for F
where
    F: Fn(&SourceKey, Duration) -> Result<Option<Value>, UpstreamError> + Send + Sync,
{
    fn fetch(&self, key: &SourceKey, timeout: Duration) -> Result<Option<Value>, UpstreamError> {
        self(key, timeout)
    }
}

/// Where the rate limiter sits relative to the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Throttle {
    /// One limiter slot covers the whole retry sequence (NCBI style).
    AroundRetries,
    /// Every attempt waits for its own slot.
    #[default]
    EachAttempt,
}

/// Everything the chain needs to serve one [`DataKind`].
#[derive(Clone)]
pub struct KindConfig {
    pub kind: DataKind,
    /// `None` for kinds served from local data only.
    pub live: Option<Arc<dyn LiveSource>>,
    /// Second service asked once when the primary live tier fails.
    pub backup: Option<Arc<dyn LiveSource>>,
    /// `None` uses the cache store's default TTL.
    pub ttl: Option<chrono::Duration>,
    pub retry: RetryPolicy,
    pub limiter: Option<Arc<RateLimiter>>,
    pub throttle: Throttle,
    pub timeout: Duration,
    pub fallback: Option<Arc<dyn FallbackSource>>,
    /// Write static-fallback hits back into the cache.
    pub reseed_cache: bool,
    /// Kind whose whole chain is tried before the static fallback.
    pub delegate: Option<DataKind>,
    pub synthetic: Option<Arc<dyn SyntheticSource>>,
}

impl KindConfig {
    pub fn new(kind: DataKind, live: impl LiveSource + 'static) -> Self {
        Self::from_arc(kind, Arc::new(live))
    }

    pub fn from_arc(kind: DataKind, live: Arc<dyn LiveSource>) -> Self {
        Self::static_only(kind).with_live(live)
    }

    /// Kind with no upstream service: cache, static dataset, synthetic.
    pub fn static_only(kind: DataKind) -> Self {
        Self {
            kind,
            live: None,
            backup: None,
            ttl: None,
            retry: RetryPolicy::default(),
            limiter: None,
            throttle: Throttle::default(),
            timeout: Duration::from_secs(10),
            fallback: None,
            reseed_cache: false,
            delegate: None,
            synthetic: None,
        }
    }

    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>, throttle: Throttle) -> Self {
        self.limiter = Some(limiter);
        self.throttle = throttle;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_live(mut self, live: Arc<dyn LiveSource>) -> Self {
        self.live = Some(live);
        self
    }

    pub fn with_backup(mut self, backup: Arc<dyn LiveSource>) -> Self {
        self.backup = Some(backup);
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackSource>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn reseed_cache(mut self, reseed: bool) -> Self {
        self.reseed_cache = reseed;
        self
    }

    pub fn with_delegate(mut self, kind: DataKind) -> Self {
        self.delegate = Some(kind);
        self
    }

    pub fn with_synthetic(mut self, synthetic: Arc<dyn SyntheticSource>) -> Self {
        self.synthetic = Some(synthetic);
        self
    }
}

impl std::fmt::Debug for KindConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindConfig")
            .field("kind", &self.kind)
            .field("live", &self.live.is_some())
            .field("backup", &self.backup.is_some())
            .field("ttl", &self.ttl)
            .field("retry", &self.retry)
            .field("limiter", &self.limiter.as_ref().map(|l| l.name().to_string()))
            .field("throttle", &self.throttle)
            .field("timeout", &self.timeout)
            .field("fallback", &self.fallback.is_some())
            .field("reseed_cache", &self.reseed_cache)
            .field("delegate", &self.delegate)
            .field("synthetic", &self.synthetic.is_some())
            .finish()
    }
}
