//! Fetch outcomes and the request-scoped provenance report.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cardiovar_core::DataKind;

/// Which tier produced a value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Live,
    Cache,
    Fallback,
    Synthetic,
    None,
}

impl Provenance {
    /// `true` for every tier other than live and cache.
    pub fn is_degraded(&self) -> bool {
        !matches!(self, Provenance::Live | Provenance::Cache)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Live => "live",
            Provenance::Cache => "cache",
            Provenance::Fallback => "fallback",
            Provenance::Synthetic => "synthetic",
            Provenance::None => "none",
        }
    }
}

impl core::fmt::Display for Provenance {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one source-chain invocation. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchOutcome {
    pub kind: DataKind,
    pub cache_key: String,
    pub value: Option<Value>,
    pub provenance: Provenance,
    pub attempted_live: bool,
}

impl FetchOutcome {
    pub(crate) fn new(
        kind: DataKind,
        cache_key: String,
        value: Option<Value>,
        provenance: Provenance,
        attempted_live: bool,
    ) -> Self {
        Self {
            kind,
            cache_key,
            value,
            provenance,
            attempted_live,
        }
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    /// Value decoded into `T`; `None` if absent or of another shape.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        self.value
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn into_value(self) -> Option<Value> {
        self.value
    }
}

/// One line of a [`ProvenanceReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub kind: DataKind,
    pub cache_key: String,
    pub provenance: Provenance,
    /// `false` for cache hits and for kinds served from local data only.
    #[serde(default)]
    pub attempted_live: bool,
}

/// Provenance of every fetch made while answering one top-level request.
///
/// Created fresh per request and passed explicitly down the call chain, so two
/// concurrent requests never see each other's fallback use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceReport {
    entries: Vec<ProvenanceEntry>,
}

impl ProvenanceReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &FetchOutcome) {
        self.entries.push(ProvenanceEntry {
            kind: outcome.kind,
            cache_key: outcome.cache_key.clone(),
            provenance: outcome.provenance,
            attempted_live: outcome.attempted_live,
        });
    }

    /// Coarse trust signal: some of the answer came from non-live data where
    /// live data was asked for. Local-only kinds never flip it.
    pub fn fallback_used(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.attempted_live && e.provenance.is_degraded())
    }

    pub fn entries(&self) -> &[ProvenanceEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of fetches per tier.
    pub fn summary(&self) -> BTreeMap<Provenance, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.provenance).or_insert(0) += 1;
        }
        counts
    }

    pub fn merge(&mut self, other: ProvenanceReport) {
        self.entries.extend(other.entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(provenance: Provenance) -> FetchOutcome {
        FetchOutcome::new(
            DataKind::GnomadFrequency,
            "gnomad:1:1:A:T".to_string(),
            Some(json!(0.1)),
            provenance,
            provenance != Provenance::Cache,
        )
    }

    #[test]
    fn live_and_cache_are_trusted() {
        let mut report = ProvenanceReport::new();
        report.record(&outcome(Provenance::Live));
        report.record(&outcome(Provenance::Cache));
        assert!(!report.fallback_used());
    }

    #[test]
    fn any_degraded_tier_flips_the_flag() {
        for tier in [Provenance::Fallback, Provenance::Synthetic, Provenance::None] {
            let mut report = ProvenanceReport::new();
            report.record(&outcome(Provenance::Live));
            report.record(&outcome(tier));
            assert!(report.fallback_used(), "{tier}");
        }
    }

    #[test]
    fn local_only_kinds_do_not_flip_the_flag() {
        let mut report = ProvenanceReport::new();
        for provenance in [Provenance::Fallback, Provenance::None] {
            report.record(&FetchOutcome::new(
                DataKind::SingleCell,
                "single_cell:TTN".to_string(),
                None,
                provenance,
                false,
            ));
        }
        assert!(!report.fallback_used());
        assert_eq!(report.summary()[&Provenance::Fallback], 1);
    }

    #[test]
    fn summary_counts_per_tier() {
        let mut report = ProvenanceReport::new();
        report.record(&outcome(Provenance::Live));
        report.record(&outcome(Provenance::Live));
        report.record(&outcome(Provenance::Synthetic));

        let summary = report.summary();
        assert_eq!(summary[&Provenance::Live], 2);
        assert_eq!(summary[&Provenance::Synthetic], 1);
        assert!(!summary.contains_key(&Provenance::Cache));
    }

    #[test]
    fn decode_reads_typed_values() {
        assert_eq!(outcome(Provenance::Live).decode::<f64>(), Some(0.1));
        assert_eq!(outcome(Provenance::Live).decode::<String>(), None);
    }
}
