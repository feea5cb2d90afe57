//! Default per-kind wiring of the source chain.
//!
//! Every [`DataKind`] gets its live adapter, backup service, retry budget,
//! shared limiter, timeout, static dataset and synthetic generator here.
//! `[kinds.<kind>]` settings override the numbers. Local-only kinds get no
//! live tier and no limiter.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use cardiovar_core::{DataKind, SourceKey};
use cardiovar_infra::cache::CacheStore;
use cardiovar_infra::resilience::{LimiterRegistry, RetryPolicy};
use cardiovar_infra::settings::Settings;
use cardiovar_infra::sources::{
    AlleleFrequencySynth, ConservationSynth, FallbackSource, KindConfig, LiveSource, SourceChain, SourceError,
    StaticDataset, SyntheticSource, Throttle, TissueExpressionSynth, load_fallback_datasets,
};

use crate::client::{Endpoints, HttpClient};
use crate::ensembl::{self, EnsemblGene, GeneStructure, ProteinDomains};
use crate::gnomad::{GnomadGene, GnomadVariant};
use crate::gtex::GtexExpression;
use crate::mygene::MyGene;
use crate::myvariant::{MyVariantClinvar, MyVariantFrequency};
use crate::ncbi::{Clinvar, Dbsnp};
use crate::ucsc::{Phylop, Sequence};

/// Built-in numbers for one kind before settings overrides.
#[derive(Debug, Clone)]
pub struct KindDefaults {
    pub kind: DataKind,
    /// Limiter name; kinds with the same name share one throttle.
    pub service: &'static str,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub rate: (u32, Duration),
    pub throttle: Throttle,
    pub delegate: Option<DataKind>,
    /// Default for writing static-fallback hits back into the cache.
    pub reseed: bool,
}

impl KindDefaults {
    pub fn for_kind(kind: DataKind) -> Self {
        let per_200ms = (1, Duration::from_millis(200));
        let (service, timeout) = match kind {
            DataKind::GnomadFrequency | DataKind::GnomadGene => ("gnomad", 10),
            DataKind::EnsemblGene | DataKind::ProteinDomains | DataKind::GeneStructure => ("ensembl", 15),
            DataKind::Phylop => ("ucsc", 20),
            DataKind::Sequence => ("ucsc", 15),
            DataKind::GtexExpression => ("gtex", 15),
            DataKind::Clinvar => ("ncbi", 15),
            DataKind::Dbsnp => ("ncbi", 10),
            DataKind::SingleCell | DataKind::RelatedVariants => ("local", 10),
        };

        let mut defaults = Self {
            kind,
            service,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(timeout),
            rate: per_200ms,
            throttle: Throttle::EachAttempt,
            delegate: None,
            reseed: true,
        };
        match kind {
            DataKind::GnomadGene => {
                defaults.retry = RetryPolicy::new(2, Duration::from_millis(1500), 1.5);
                defaults.delegate = Some(DataKind::EnsemblGene);
            }
            DataKind::Clinvar | DataKind::Dbsnp => {
                defaults.rate = (3, Duration::from_secs(1));
                defaults.throttle = Throttle::AroundRetries;
            }
            DataKind::RelatedVariants => defaults.reseed = false,
            _ => {}
        }
        defaults
    }
}

fn live_source(kind: DataKind, client: Arc<HttpClient>) -> Option<Arc<dyn LiveSource>> {
    let live: Arc<dyn LiveSource> = match kind {
        DataKind::GnomadFrequency => Arc::new(GnomadVariant::new(client)),
        DataKind::GnomadGene => Arc::new(GnomadGene::new(client)),
        DataKind::EnsemblGene => Arc::new(EnsemblGene::new(client)),
        DataKind::ProteinDomains => Arc::new(ProteinDomains::new(client)),
        DataKind::Phylop => Arc::new(Phylop::new(client)),
        DataKind::GtexExpression => Arc::new(GtexExpression::new(client)),
        DataKind::Sequence => Arc::new(Sequence::new(client)),
        DataKind::GeneStructure => Arc::new(GeneStructure::new(client)),
        DataKind::Clinvar => Arc::new(Clinvar::new(client)),
        DataKind::Dbsnp => Arc::new(Dbsnp::new(client)),
        DataKind::SingleCell | DataKind::RelatedVariants => return None,
    };
    Some(live)
}

/// Aggregator services asked once when the primary service fails.
fn backup_source(kind: DataKind, client: Arc<HttpClient>) -> Option<Arc<dyn LiveSource>> {
    match kind {
        DataKind::GnomadFrequency => Some(Arc::new(MyVariantFrequency::new(client))),
        DataKind::Clinvar => Some(Arc::new(MyVariantClinvar::new(client))),
        DataKind::EnsemblGene => Some(Arc::new(MyGene::new(client))),
        _ => None,
    }
}

fn synthetic_source(kind: DataKind) -> Option<Arc<dyn SyntheticSource>> {
    match kind {
        DataKind::GnomadFrequency => Some(Arc::new(AlleleFrequencySynth::default())),
        DataKind::Phylop => Some(Arc::new(ConservationSynth::default())),
        DataKind::GtexExpression => Some(Arc::new(TissueExpressionSynth::default())),
        _ => None,
    }
}

/// Local gene records carry the same outbound links as live ones.
fn linked_gene_fallback(dataset: Arc<StaticDataset>) -> Arc<dyn FallbackSource> {
    Arc::new(move |key: &SourceKey| -> Option<Value> {
        let record = dataset.lookup(key)?;
        let symbol = key.part(0).ok()?;
        Some(ensembl::decorate_gene(record, symbol, "ensembl_id", "Local Fallback"))
    })
}

/// Chain over the public endpoints.
pub fn default_chain<C: CacheStore>(settings: &Settings, cache: C) -> Result<SourceChain<C>, SourceError> {
    let client = HttpClient::new(Endpoints::default()).map_err(|e| SourceError::Config(e.to_string()))?;
    chain_with_client(settings, cache, Arc::new(client))
}

/// Chain over `client`'s endpoints, one [`KindConfig`] per kind.
pub fn chain_with_client<C: CacheStore>(
    settings: &Settings,
    cache: C,
    client: Arc<HttpClient>,
) -> Result<SourceChain<C>, SourceError> {
    let limiters = LimiterRegistry::new();
    let mut datasets = load_fallback_datasets(&settings.fallback.data_dir);
    let mut chain = SourceChain::new(cache);

    for kind in DataKind::ALL {
        let defaults = KindDefaults::for_kind(kind);
        let overrides = settings.kind(kind);

        let mut config = KindConfig::static_only(kind)
            .with_ttl(overrides.ttl(settings.default_ttl()))
            .with_timeout(overrides.timeout(defaults.timeout));

        if let Some(live) = live_source(kind, client.clone()) {
            let (calls, period) = overrides.rate(defaults.rate.0, defaults.rate.1);
            // A kind with its own budget gets its own limiter.
            let limiter_name = if (calls, period) == defaults.rate {
                defaults.service.to_string()
            } else {
                format!("{}:{kind}", defaults.service)
            };
            let limiter = limiters.get_or_create(&limiter_name, calls, period);
            tracing::debug!(%kind, limiter = %limiter_name, "live tier configured");

            config = config
                .with_live(live)
                .with_retry(overrides.retry(defaults.retry.clone()))
                .with_limiter(limiter, defaults.throttle);
        }
        if let Some(backup) = backup_source(kind, client.clone()) {
            config = config.with_backup(backup);
        }

        if let Some(dataset) = datasets.remove(&kind) {
            let fallback: Arc<dyn FallbackSource> = if kind == DataKind::EnsemblGene {
                linked_gene_fallback(dataset)
            } else {
                dataset
            };
            config = config
                .with_fallback(fallback)
                .reseed_cache(overrides.reseed_cache(defaults.reseed));
        }
        if let Some(delegate) = defaults.delegate {
            config = config.with_delegate(delegate);
        }
        if let Some(synthetic) = synthetic_source(kind) {
            config = config.with_synthetic(synthetic);
        }

        tracing::debug!(%kind, live = config.live.is_some(), "registered source kind");
        chain.register(config)?;
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardiovar_infra::cache::InMemoryCacheStore;

    fn settings_with_data(dir: &std::path::Path) -> Settings {
        let mut settings = Settings::default();
        settings.fallback.data_dir = dir.to_path_buf();
        settings
    }

    #[test]
    fn every_kind_is_registered() {
        let dir = tempfile::tempdir().unwrap();
        let chain = default_chain(&settings_with_data(dir.path()), InMemoryCacheStore::new(chrono::Duration::hours(24)))
            .unwrap();

        let mut kinds: Vec<_> = chain.kinds().collect();
        kinds.sort();
        assert_eq!(kinds, DataKind::ALL.to_vec());
    }

    #[test]
    fn built_in_budgets() {
        let dir = tempfile::tempdir().unwrap();
        let chain = default_chain(&settings_with_data(dir.path()), InMemoryCacheStore::new(chrono::Duration::hours(24)))
            .unwrap();

        let gene = chain.config(DataKind::GnomadGene).unwrap();
        assert_eq!(gene.retry.attempts, 2);
        assert_eq!(gene.delegate, Some(DataKind::EnsemblGene));

        let clinvar = chain.config(DataKind::Clinvar).unwrap();
        assert_eq!(clinvar.throttle, Throttle::AroundRetries);
        assert_eq!(clinvar.timeout, Duration::from_secs(15));

        // ClinVar and dbSNP share the NCBI limiter.
        let dbsnp = chain.config(DataKind::Dbsnp).unwrap();
        assert!(Arc::ptr_eq(
            clinvar.limiter.as_ref().unwrap(),
            dbsnp.limiter.as_ref().unwrap()
        ));

        assert!(chain.config(DataKind::Phylop).unwrap().synthetic.is_some());
        assert!(chain.config(DataKind::Sequence).unwrap().synthetic.is_none());
        // No data directory contents, no static tier.
        assert!(chain.config(DataKind::EnsemblGene).unwrap().fallback.is_none());
    }

    #[test]
    fn backup_services_and_local_only_kinds() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("related_data_fallback.json"),
            r#"[{"chrom": "chr1", "pos": 55039974, "ref": "G", "alt": "T", "title": "PCSK9 gain of function"}]"#,
        )
        .unwrap();
        let chain = default_chain(&settings_with_data(dir.path()), InMemoryCacheStore::new(chrono::Duration::hours(24)))
            .unwrap();

        for kind in [DataKind::GnomadFrequency, DataKind::Clinvar, DataKind::EnsemblGene] {
            assert!(chain.config(kind).unwrap().backup.is_some(), "{kind} has no backup");
        }
        assert!(chain.config(DataKind::Dbsnp).unwrap().backup.is_none());

        let cells = chain.config(DataKind::SingleCell).unwrap();
        assert!(cells.live.is_none());
        assert!(cells.limiter.is_none());

        let related = chain.config(DataKind::RelatedVariants).unwrap();
        assert!(related.live.is_none());
        assert!(!related.reseed_cache);

        // Local-only kinds answer without any network call.
        let out = chain
            .fetch(DataKind::RelatedVariants, &SourceKey::variant("chr1", 55_039_974, "G", "T"), false)
            .unwrap();
        assert_eq!(out.provenance, cardiovar_infra::sources::Provenance::Fallback);
        assert!(!out.attempted_live);
        assert_eq!(out.value.unwrap()[0]["title"], "PCSK9 gain of function");
    }

    #[test]
    fn overrides_apply_and_split_limiters() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::from_toml(
            r#"
            [kinds.dbsnp]
            attempts = 5
            timeout_ms = 2500
            rate_calls = 10
            ttl_hours = 1
            "#,
        )
        .unwrap();
        settings.fallback.data_dir = dir.path().to_path_buf();

        let chain = default_chain(&settings, InMemoryCacheStore::new(chrono::Duration::hours(24))).unwrap();
        let dbsnp = chain.config(DataKind::Dbsnp).unwrap();
        assert_eq!(dbsnp.retry.attempts, 5);
        assert_eq!(dbsnp.timeout, Duration::from_millis(2500));
        assert_eq!(dbsnp.ttl, Some(chrono::Duration::hours(1)));
        assert_eq!(dbsnp.limiter.as_ref().unwrap().name(), "ncbi:dbsnp");

        let clinvar = chain.config(DataKind::Clinvar).unwrap();
        assert_eq!(clinvar.limiter.as_ref().unwrap().name(), "ncbi");
    }

    #[test]
    fn local_gene_records_are_linked_and_reseeded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("gene_annotations.json"),
            r#"[{"symbol": "MYH9", "ensembl_id": "ENSG00000100345", "description": "myosin"}]"#,
        )
        .unwrap();

        let chain = default_chain(&settings_with_data(dir.path()), InMemoryCacheStore::new(chrono::Duration::hours(24)))
            .unwrap();
        let config = chain.config(DataKind::EnsemblGene).unwrap();
        assert!(config.reseed_cache);

        let record = config.fallback.as_ref().unwrap().lookup(&SourceKey::gene("MYH9")).unwrap();
        assert_eq!(record["source"], "Local Fallback");
        assert_eq!(
            record["links"]["gnomAD"],
            "https://gnomad.broadinstitute.org/gene/ENSG00000100345?dataset=gnomad_r4"
        );
    }
}
