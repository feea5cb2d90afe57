//! Configuration-driven fallback orchestrator.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use cardiovar_core::{DataKind, SourceKey};

use super::config::{KindConfig, Throttle};
use super::provenance::{FetchOutcome, Provenance, ProvenanceReport};
use super::SourceError;
use crate::cache::CacheStore;

/// Longest delegate chain followed before giving up.
const MAX_DELEGATE_DEPTH: usize = 4;

/// One orchestrator for every [`DataKind`]; only the [`KindConfig`] differs.
///
/// Tier order per call: cache, live (throttled + retried), then, unless
/// `force_live`, the backup service, the delegate kind, the static dataset
/// and the synthetic generator.
pub struct SourceChain<C: CacheStore> {
    cache: C,
    kinds: HashMap<DataKind, KindConfig>,
}

impl<C: CacheStore> SourceChain<C> {
    pub fn new(cache: C) -> Self {
        Self {
            cache,
            kinds: HashMap::new(),
        }
    }

    /// Add or replace the configuration for `config.kind`.
    pub fn register(&mut self, config: KindConfig) -> Result<(), SourceError> {
        if let Some(delegate) = config.delegate {
            if delegate == config.kind {
                return Err(SourceError::Config(format!("{} cannot delegate to itself", config.kind)));
            }
            if delegate.key_shape() != config.kind.key_shape() {
                return Err(SourceError::Config(format!(
                    "{} cannot delegate to {}: key shapes differ",
                    config.kind, delegate
                )));
            }
        }
        self.kinds.insert(config.kind, config);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_kind(mut self, config: KindConfig) -> Result<Self, SourceError> {
        self.register(config)?;
        Ok(self)
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn config(&self, kind: DataKind) -> Option<&KindConfig> {
        self.kinds.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = DataKind> + '_ {
        self.kinds.keys().copied()
    }

    /// Resolve `key` for `kind` through the tiers.
    ///
    /// Upstream failures are absorbed; only cache failures and configuration
    /// problems surface as errors.
    pub fn fetch(&self, kind: DataKind, key: &SourceKey, force_live: bool) -> Result<FetchOutcome, SourceError> {
        self.fetch_at_depth(kind, key, force_live, 0)
    }

    /// [`fetch`](Self::fetch) and record the outcome in `report`.
    pub fn fetch_into(
        &self,
        kind: DataKind,
        key: &SourceKey,
        force_live: bool,
        report: &mut ProvenanceReport,
    ) -> Result<FetchOutcome, SourceError> {
        let outcome = self.fetch(kind, key, force_live)?;
        report.record(&outcome);
        Ok(outcome)
    }

    fn fetch_at_depth(
        &self,
        kind: DataKind,
        key: &SourceKey,
        force_live: bool,
        depth: usize,
    ) -> Result<FetchOutcome, SourceError> {
        let config = self.kinds.get(&kind).ok_or(SourceError::Unregistered(kind))?;
        kind.validate(key)?;
        let cache_key = key.cache_key(kind);

        if let Some(value) = self.cache.get(&cache_key)? {
            debug!(kind = %kind, key = %cache_key, "cache hit");
            return Ok(FetchOutcome::new(kind, cache_key, Some(value), Provenance::Cache, false));
        }
        debug!(kind = %kind, key = %cache_key, "cache miss");

        let attempted_live = config.live.is_some();
        if let Some(value) = self.fetch_live(config, key) {
            self.cache.set(&cache_key, &value, config.ttl)?;
            debug!(kind = %kind, key = %cache_key, "live fetch cached");
            return Ok(FetchOutcome::new(kind, cache_key, Some(value), Provenance::Live, true));
        }

        if force_live {
            warn!(kind = %kind, key = %cache_key, "live data unavailable; force_live set, skipping fallbacks");
            return Ok(FetchOutcome::new(kind, cache_key, None, Provenance::None, attempted_live));
        }

        if let Some(backup) = &config.backup {
            match backup.fetch(key, config.timeout) {
                Ok(Some(value)) => {
                    warn!(kind = %kind, key = %cache_key, "served by backup service");
                    return Ok(FetchOutcome::new(kind, cache_key, Some(value), Provenance::Fallback, true));
                }
                Ok(None) => debug!(kind = %kind, key = %cache_key, "backup service has no record"),
                Err(e) => debug!(kind = %kind, key = %cache_key, error = %e, "backup service failed"),
            }
        }

        if let Some(delegate) = config.delegate {
            if let Some(value) = self.fetch_delegate(kind, delegate, key, depth)? {
                return Ok(FetchOutcome::new(
                    kind,
                    cache_key,
                    Some(value),
                    Provenance::Fallback,
                    attempted_live,
                ));
            }
        }

        if let Some(fallback) = &config.fallback {
            if let Some(value) = fallback.lookup(key) {
                warn!(kind = %kind, key = %cache_key, "using static fallback data");
                if config.reseed_cache {
                    self.cache.set(&cache_key, &value, config.ttl)?;
                }
                return Ok(FetchOutcome::new(
                    kind,
                    cache_key,
                    Some(value),
                    Provenance::Fallback,
                    attempted_live,
                ));
            }
        }

        if let Some(synthetic) = &config.synthetic {
            if let Some(value) = synthetic.generate(kind, key) {
                warn!(kind = %kind, key = %cache_key, "using synthetic data");
                return Ok(FetchOutcome::new(
                    kind,
                    cache_key,
                    Some(value),
                    Provenance::Synthetic,
                    attempted_live,
                ));
            }
        }

        debug!(kind = %kind, key = %cache_key, "no tier produced a value");
        Ok(FetchOutcome::new(kind, cache_key, None, Provenance::None, attempted_live))
    }

    fn fetch_delegate(
        &self,
        kind: DataKind,
        delegate: DataKind,
        key: &SourceKey,
        depth: usize,
    ) -> Result<Option<Value>, SourceError> {
        if depth >= MAX_DELEGATE_DEPTH {
            warn!(kind = %kind, delegate = %delegate, "delegate chain too deep; skipping");
            return Ok(None);
        }
        if !self.kinds.contains_key(&delegate) {
            warn!(kind = %kind, delegate = %delegate, "delegate kind not registered; skipping");
            return Ok(None);
        }
        let outcome = self.fetch_at_depth(delegate, key, false, depth + 1)?;
        if outcome.value.is_some() {
            info!(kind = %kind, delegate = %delegate, via = %outcome.provenance, "served by delegate source");
        }
        Ok(outcome.value)
    }

    fn fetch_live(&self, config: &KindConfig, key: &SourceKey) -> Option<Value> {
        let live = config.live.as_ref()?;
        let attempt = || live.fetch(key, config.timeout);

        match (&config.limiter, config.throttle) {
            (None, _) => config.retry.run(attempt),
            (Some(limiter), Throttle::AroundRetries) => limiter.limited(|| config.retry.run(attempt)),
            (Some(limiter), Throttle::EachAttempt) => config.retry.run(|| limiter.limited(&attempt)),
        }
    }
}

impl<C: CacheStore> std::fmt::Debug for SourceChain<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.kinds.keys().map(DataKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("SourceChain").field("kinds", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;
    use crate::resilience::{RateLimiter, RetryPolicy};
    use crate::sources::config::UpstreamError;
    use crate::sources::synthetic::AlleleFrequencySynth;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn quick_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), 2.0)
    }

    fn counting_live(
        calls: Arc<AtomicUsize>,
        answer: Option<Value>,
    ) -> impl Fn(&SourceKey, Duration) -> Result<Option<Value>, UpstreamError> + Send + Sync {
        move |_key: &SourceKey, _timeout: Duration| {
            calls.fetch_add(1, Ordering::SeqCst);
            match &answer {
                Some(v) => Ok(Some(v.clone())),
                None => Err(UpstreamError::Status { service: "test", status: 503 }),
            }
        }
    }

    fn key() -> SourceKey {
        SourceKey::variant("chr1", 100, "A", "T")
    }

    fn chain_with(config: KindConfig) -> SourceChain<Arc<InMemoryCacheStore>> {
        SourceChain::new(InMemoryCacheStore::arc(chrono::Duration::hours(24)))
            .with_kind(config)
            .unwrap()
    }

    #[test]
    fn live_success_is_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = chain_with(
            KindConfig::new(DataKind::GnomadFrequency, counting_live(calls.clone(), Some(json!(0.00012))))
                .with_retry(quick_retry()),
        );

        let out = chain.fetch(DataKind::GnomadFrequency, &key(), false).unwrap();
        assert_eq!(out.provenance, Provenance::Live);
        assert_eq!(out.value, Some(json!(0.00012)));
        assert!(out.attempted_live);
        assert_eq!(chain.cache().get("gnomad:chr1:100:A:T").unwrap(), Some(json!(0.00012)));
    }

    #[test]
    fn cache_hit_skips_live() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = chain_with(
            KindConfig::new(DataKind::GnomadFrequency, counting_live(calls.clone(), Some(json!(0.5))))
                .with_retry(quick_retry()),
        );
        chain.cache().set("gnomad:chr1:100:A:T", &json!(0.25), None).unwrap();

        let out = chain.fetch(DataKind::GnomadFrequency, &key(), true).unwrap();
        assert_eq!(out.provenance, Provenance::Cache);
        assert_eq!(out.value, Some(json!(0.25)));
        assert!(!out.attempted_live);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_live_uses_static_fallback_without_caching() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fallback = |_: &SourceKey| Some(json!(0.003));
        let chain = chain_with(
            KindConfig::new(DataKind::GnomadFrequency, counting_live(calls.clone(), None))
                .with_retry(quick_retry())
                .with_fallback(Arc::new(fallback)),
        );

        let out = chain.fetch(DataKind::GnomadFrequency, &key(), false).unwrap();
        assert_eq!(out.provenance, Provenance::Fallback);
        assert_eq!(out.value, Some(json!(0.003)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(chain.cache().get("gnomad:chr1:100:A:T").unwrap(), None);
    }

    #[test]
    fn reseed_writes_fallback_into_cache() {
        let fallback = |_: &SourceKey| Some(json!({"symbol": "MYH9"}));
        let chain = chain_with(
            KindConfig::new(DataKind::EnsemblGene, counting_live(Arc::default(), None))
                .with_retry(RetryPolicy::no_retry())
                .with_fallback(Arc::new(fallback))
                .reseed_cache(true),
        );

        let gene = SourceKey::gene("MYH9");
        let first = chain.fetch(DataKind::EnsemblGene, &gene, false).unwrap();
        let second = chain.fetch(DataKind::EnsemblGene, &gene, false).unwrap();
        assert_eq!(first.provenance, Provenance::Fallback);
        assert_eq!(second.provenance, Provenance::Cache);
    }

    #[test]
    fn force_live_touches_no_fallback_tier() {
        let touched = Arc::new(AtomicUsize::new(0));
        let fallback = {
            let touched = touched.clone();
            move |_: &SourceKey| {
                touched.fetch_add(1, Ordering::SeqCst);
                Some(json!(0.003))
            }
        };
        let synthetic = {
            let touched = touched.clone();
            move |_: DataKind, _: &SourceKey| {
                touched.fetch_add(1, Ordering::SeqCst);
                Some(json!(0.00005))
            }
        };
        let chain = chain_with(
            KindConfig::new(DataKind::GnomadFrequency, counting_live(Arc::default(), None))
                .with_retry(quick_retry())
                .with_fallback(Arc::new(fallback))
                .with_synthetic(Arc::new(synthetic)),
        );

        let out = chain.fetch(DataKind::GnomadFrequency, &key(), true).unwrap();
        assert_eq!(out.provenance, Provenance::None);
        assert_eq!(out.value, None);
        assert!(out.attempted_live);
        assert_eq!(touched.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn synthetic_is_last_resort_and_deterministic() {
        let chain = chain_with(
            KindConfig::new(DataKind::GnomadFrequency, counting_live(Arc::default(), None))
                .with_retry(RetryPolicy::no_retry())
                .with_fallback(Arc::new(|_: &SourceKey| None::<Value>))
                .with_synthetic(Arc::new(AlleleFrequencySynth::default())),
        );

        let a = chain.fetch(DataKind::GnomadFrequency, &key(), false).unwrap();
        let b = chain.fetch(DataKind::GnomadFrequency, &key(), false).unwrap();
        assert_eq!(a.provenance, Provenance::Synthetic);
        assert_eq!(a.value, b.value);
    }

    #[test]
    fn kind_without_any_fallback_is_none() {
        let chain = chain_with(
            KindConfig::new(DataKind::Clinvar, counting_live(Arc::default(), None))
                .with_retry(RetryPolicy::no_retry()),
        );
        let out = chain.fetch(DataKind::Clinvar, &key(), false).unwrap();
        assert_eq!(out.provenance, Provenance::None);
        assert!(out.value.is_none());
    }

    #[test]
    fn delegate_serves_before_static_fallback() {
        let mut chain = SourceChain::new(InMemoryCacheStore::arc(chrono::Duration::hours(24)));
        chain
            .register(
                KindConfig::new(
                    DataKind::EnsemblGene,
                    counting_live(Arc::default(), Some(json!({"symbol": "TTN", "source": "Ensembl"}))),
                )
                .with_retry(RetryPolicy::no_retry()),
            )
            .unwrap();
        chain
            .register(
                KindConfig::new(DataKind::GnomadGene, counting_live(Arc::default(), None))
                    .with_retry(RetryPolicy::no_retry())
                    .with_delegate(DataKind::EnsemblGene)
                    .with_fallback(Arc::new(|_: &SourceKey| Some(json!({"stale": true})))),
            )
            .unwrap();

        let out = chain.fetch(DataKind::GnomadGene, &SourceKey::gene("TTN"), false).unwrap();
        assert_eq!(out.provenance, Provenance::Fallback);
        assert_eq!(out.value.unwrap()["source"], "Ensembl");
        // The delegate caches under its own key only.
        assert!(chain.cache().get("ensembl_gene:TTN").unwrap().is_some());
        assert!(chain.cache().get("gnomad_gene:TTN").unwrap().is_none());
    }

    #[test]
    fn backup_service_answers_once_and_is_not_cached() {
        let primary = Arc::new(AtomicUsize::new(0));
        let backup = Arc::new(AtomicUsize::new(0));
        let chain = chain_with(
            KindConfig::new(DataKind::GnomadFrequency, counting_live(primary.clone(), None))
                .with_retry(quick_retry())
                .with_backup(Arc::new(counting_live(backup.clone(), Some(json!(0.0021)))))
                .with_fallback(Arc::new(|_: &SourceKey| Some(json!(0.5)))),
        );

        let out = chain.fetch(DataKind::GnomadFrequency, &key(), false).unwrap();
        assert_eq!(out.provenance, Provenance::Fallback);
        assert_eq!(out.value, Some(json!(0.0021)));
        assert_eq!(primary.load(Ordering::SeqCst), 3);
        assert_eq!(backup.load(Ordering::SeqCst), 1);
        assert_eq!(chain.cache().get("gnomad:chr1:100:A:T").unwrap(), None);
    }

    #[test]
    fn failed_backup_falls_through_and_force_live_skips_it() {
        let backup = Arc::new(AtomicUsize::new(0));
        let chain = chain_with(
            KindConfig::new(DataKind::GnomadFrequency, counting_live(Arc::default(), None))
                .with_retry(RetryPolicy::no_retry())
                .with_backup(Arc::new(counting_live(backup.clone(), None)))
                .with_fallback(Arc::new(|_: &SourceKey| Some(json!(0.5)))),
        );

        let out = chain.fetch(DataKind::GnomadFrequency, &key(), false).unwrap();
        assert_eq!(out.value, Some(json!(0.5)));
        assert_eq!(backup.load(Ordering::SeqCst), 1);

        let out = chain.fetch(DataKind::GnomadFrequency, &key(), true).unwrap();
        assert_eq!(out.provenance, Provenance::None);
        assert_eq!(backup.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn static_only_kind_serves_local_data_without_a_live_attempt() {
        let chain = chain_with(
            KindConfig::static_only(DataKind::SingleCell)
                .with_fallback(Arc::new(|key: &SourceKey| {
                    (key.part(0).ok() == Some("TTN")).then(|| json!([{"cell_type": "Cardiomyocyte", "value": 8.1}]))
                }))
                .reseed_cache(true),
        );

        let gene = SourceKey::gene("TTN");
        let first = chain.fetch(DataKind::SingleCell, &gene, false).unwrap();
        assert_eq!(first.provenance, Provenance::Fallback);
        assert!(!first.attempted_live);
        assert_eq!(
            chain.fetch(DataKind::SingleCell, &gene, false).unwrap().provenance,
            Provenance::Cache
        );

        let missing = chain.fetch(DataKind::SingleCell, &SourceKey::gene("MYH9"), true).unwrap();
        assert_eq!(missing.provenance, Provenance::None);
        assert!(!missing.attempted_live);
    }

    #[test]
    fn mismatched_delegate_is_rejected() {
        let mut chain = SourceChain::new(InMemoryCacheStore::arc(chrono::Duration::hours(1)));
        let err = chain
            .register(
                KindConfig::new(DataKind::GnomadFrequency, counting_live(Arc::default(), None))
                    .with_delegate(DataKind::EnsemblGene),
            )
            .unwrap_err();
        assert!(matches!(err, SourceError::Config(_)));
    }

    #[test]
    fn unregistered_kind_and_bad_keys_are_errors() {
        let chain = chain_with(KindConfig::new(DataKind::Clinvar, counting_live(Arc::default(), None)));
        assert!(matches!(
            chain.fetch(DataKind::Dbsnp, &key(), false),
            Err(SourceError::Unregistered(DataKind::Dbsnp))
        ));
        assert!(matches!(
            chain.fetch(DataKind::Clinvar, &SourceKey::gene("MYH9"), false),
            Err(SourceError::Key(_))
        ));
    }

    #[test]
    fn report_accumulates_per_request() {
        let chain = chain_with(
            KindConfig::new(DataKind::GnomadFrequency, counting_live(Arc::default(), None))
                .with_retry(RetryPolicy::no_retry())
                .with_synthetic(Arc::new(AlleleFrequencySynth::default())),
        );

        let mut first = ProvenanceReport::new();
        chain.fetch_into(DataKind::GnomadFrequency, &key(), false, &mut first).unwrap();
        let second = ProvenanceReport::new();

        assert!(first.fallback_used());
        assert!(!second.fallback_used());
    }

    #[test]
    fn around_retries_takes_one_limiter_slot() {
        let limiter = Arc::new(RateLimiter::with_interval("ncbi", Duration::from_millis(200)));
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = chain_with(
            KindConfig::new(DataKind::Clinvar, counting_live(calls.clone(), None))
                .with_retry(RetryPolicy::new(3, Duration::ZERO, 1.0))
                .with_limiter(limiter, Throttle::AroundRetries),
        );

        let started = Instant::now();
        chain.fetch(DataKind::Clinvar, &key(), true).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[test]
    fn each_attempt_waits_for_its_own_slot() {
        let limiter = Arc::new(RateLimiter::with_interval("ucsc", Duration::from_millis(50)));
        let chain = chain_with(
            KindConfig::new(DataKind::Clinvar, counting_live(Arc::default(), None))
                .with_retry(RetryPolicy::new(3, Duration::ZERO, 1.0))
                .with_limiter(limiter, Throttle::EachAttempt),
        );

        let started = Instant::now();
        chain.fetch(DataKind::Clinvar, &key(), true).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
    }
}
