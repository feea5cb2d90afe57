//! Variant annotation producer run by annotate and batch jobs.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use cardiovar_core::{DataKind, SourceKey};
use cardiovar_infra::cache::CacheStore;
use cardiovar_infra::jobs::{Produce, ProduceError};
use cardiovar_infra::sources::{ProvenanceReport, SourceChain};

/// Half-width of the conservation and exon windows around the variant.
pub const WINDOW: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VariantInput {
    pub chrom: String,
    pub pos: u64,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(rename = "alt")]
    pub alternate: String,
    #[serde(default)]
    pub gene: Option<String>,
}

impl VariantInput {
    /// Every `(kind, key)` this variant is annotated with.
    pub fn requests(&self) -> Vec<(DataKind, SourceKey)> {
        let variant = SourceKey::variant(&self.chrom, self.pos, &self.reference, &self.alternate);
        let mut requests = vec![
            (DataKind::GnomadFrequency, variant.clone()),
            (DataKind::Clinvar, variant.clone()),
            (DataKind::Dbsnp, variant.clone()),
            (DataKind::RelatedVariants, variant),
            (
                DataKind::Phylop,
                SourceKey::region(
                    &self.chrom,
                    self.pos.saturating_sub(WINDOW),
                    self.pos.saturating_add(WINDOW + 1),
                ),
            ),
            (DataKind::GeneStructure, SourceKey::locus(&self.chrom, self.pos, WINDOW)),
        ];
        if let Some(gene) = self.gene.as_deref().filter(|g| !g.is_empty()) {
            let gene = SourceKey::gene(gene);
            requests.extend([
                (DataKind::GnomadGene, gene.clone()),
                (DataKind::ProteinDomains, gene.clone()),
                (DataKind::GtexExpression, gene.clone()),
                (DataKind::SingleCell, gene),
            ]);
        }
        requests
    }
}

/// Runs the source chain for one variant and returns every value together
/// with a provenance report scoped to that variant.
pub struct VariantAnnotator<C: CacheStore> {
    chain: Arc<SourceChain<C>>,
    force_live: bool,
}

impl<C: CacheStore> VariantAnnotator<C> {
    pub fn new(chain: Arc<SourceChain<C>>, force_live: bool) -> Self {
        Self { chain, force_live }
    }

    pub fn annotate(&self, variant: &VariantInput) -> Result<Value, ProduceError> {
        let mut report = ProvenanceReport::new();
        let mut annotations = Map::new();

        for (kind, key) in variant.requests() {
            if self.chain.config(kind).is_none() {
                tracing::debug!(%kind, "kind not configured; skipping");
                continue;
            }
            let outcome = self
                .chain
                .fetch_into(kind, &key, self.force_live, &mut report)
                .map_err(|e| ProduceError::new(format!("{kind}: {e}")))?;
            annotations.insert(kind.as_str().to_string(), outcome.value.unwrap_or(Value::Null));
        }

        Ok(json!({
            "variant": {
                "chrom": variant.chrom,
                "pos": variant.pos,
                "ref": variant.reference,
                "alt": variant.alternate,
                "gene": variant.gene,
            },
            "annotations": annotations,
            "fallback_used": report.fallback_used(),
            "provenance": report.summary(),
            "sources": report.entries(),
        }))
    }
}

impl<C: CacheStore + 'static> Produce for VariantAnnotator<C> {
    fn produce(&self, input: &Value) -> Result<Value, ProduceError> {
        let variant = VariantInput::deserialize(input).map_err(|e| ProduceError::new(format!("invalid variant: {e}")))?;
        self.annotate(&variant)
    }
}
