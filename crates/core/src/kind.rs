//! Data kinds served by the source chain and the keys that address them.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A category of upstream data.
///
/// Each kind owns a cache prefix and a fixed key shape; the source chain keeps
/// one configuration per kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    /// Population allele frequency (gnomAD exome `ac / an`).
    GnomadFrequency,
    /// Gene record from the gnomAD GraphQL API.
    GnomadGene,
    /// Gene record from the Ensembl REST API.
    EnsemblGene,
    /// Protein domain annotations for a gene's canonical translation.
    ProteinDomains,
    /// Per-base PhyloP conservation scores over a region.
    Phylop,
    /// Median tissue expression (GTEx).
    GtexExpression,
    /// Reference DNA sequence over a region.
    Sequence,
    /// Exon coordinates around a locus.
    GeneStructure,
    /// Clinical significance record (ClinVar).
    Clinvar,
    /// dbSNP identifier and minor allele frequency.
    Dbsnp,
    /// Per-cell-type expression profile; local data only.
    SingleCell,
    /// Curated records linked to a variant; local data only.
    RelatedVariants,
}

impl DataKind {
    pub const ALL: [DataKind; 12] = [
        DataKind::GnomadFrequency,
        DataKind::GnomadGene,
        DataKind::EnsemblGene,
        DataKind::ProteinDomains,
        DataKind::Phylop,
        DataKind::GtexExpression,
        DataKind::Sequence,
        DataKind::GeneStructure,
        DataKind::Clinvar,
        DataKind::Dbsnp,
        DataKind::SingleCell,
        DataKind::RelatedVariants,
    ];

    /// Stable external name (config sections, CLI arguments).
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::GnomadFrequency => "gnomad_frequency",
            DataKind::GnomadGene => "gnomad_gene",
            DataKind::EnsemblGene => "ensembl_gene",
            DataKind::ProteinDomains => "protein_domains",
            DataKind::Phylop => "phylop",
            DataKind::GtexExpression => "gtex_expression",
            DataKind::Sequence => "sequence",
            DataKind::GeneStructure => "gene_structure",
            DataKind::Clinvar => "clinvar",
            DataKind::Dbsnp => "dbsnp",
            DataKind::SingleCell => "single_cell",
            DataKind::RelatedVariants => "related_variants",
        }
    }

    /// Leading segment of every cache key written for this kind.
    pub fn cache_prefix(&self) -> &'static str {
        match self {
            DataKind::GnomadFrequency => "gnomad",
            DataKind::GtexExpression => "gtex",
            other => other.as_str(),
        }
    }

    /// Names of the key parts, in order.
    pub fn key_shape(&self) -> &'static [&'static str] {
        match self {
            DataKind::GnomadFrequency
            | DataKind::Clinvar
            | DataKind::Dbsnp
            | DataKind::RelatedVariants => &["chrom", "pos", "ref", "alt"],
            DataKind::GnomadGene
            | DataKind::EnsemblGene
            | DataKind::ProteinDomains
            | DataKind::GtexExpression
            | DataKind::SingleCell => &["gene"],
            DataKind::Phylop | DataKind::Sequence => &["chrom", "start", "end"],
            DataKind::GeneStructure => &["chrom", "pos", "window"],
        }
    }

    /// Check that `key` has the shape this kind expects.
    pub fn validate(&self, key: &SourceKey) -> CoreResult<()> {
        let shape = self.key_shape();
        if key.parts().len() != shape.len() {
            return Err(CoreError::validation(format!(
                "{} expects key <{}>, got {} part(s)",
                self.as_str(),
                shape.join(":"),
                key.parts().len()
            )));
        }
        if let Some(empty) = shape
            .iter()
            .zip(key.parts())
            .find(|(_, part)| part.is_empty())
            .map(|(name, _)| name)
        {
            return Err(CoreError::validation(format!(
                "{}: key part `{empty}` is empty",
                self.as_str()
            )));
        }
        Ok(())
    }
}

impl core::fmt::Display for DataKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        DataKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted || k.cache_prefix() == wanted)
            .ok_or_else(|| CoreError::UnknownKind(s.to_string()))
    }
}

/// Logical identity of one upstream record, independent of the kind.
///
/// The cache key for a kind is `"<prefix>:<part1>:<part2>:..."`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceKey {
    parts: Vec<String>,
}

impl SourceKey {
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    /// `chrom:pos:ref:alt` key for variant-level kinds.
    pub fn variant(chrom: &str, pos: u64, reference: &str, alternate: &str) -> Self {
        Self::from_parts([
            chrom.to_string(),
            pos.to_string(),
            reference.to_string(),
            alternate.to_string(),
        ])
    }

    /// Gene-symbol key for gene-level kinds.
    pub fn gene(symbol: &str) -> Self {
        Self::from_parts([symbol])
    }

    /// `chrom:start:end` key for region kinds.
    pub fn region(chrom: &str, start: u64, end: u64) -> Self {
        Self::from_parts([chrom.to_string(), start.to_string(), end.to_string()])
    }

    /// `chrom:pos:window` key for locus kinds.
    pub fn locus(chrom: &str, pos: u64, window: u64) -> Self {
        Self::from_parts([chrom.to_string(), pos.to_string(), window.to_string()])
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Part `index`, or a validation error naming it.
    pub fn part(&self, index: usize) -> CoreResult<&str> {
        self.parts
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| CoreError::validation(format!("missing key part #{index}")))
    }

    /// Part `index` parsed as an unsigned integer.
    pub fn part_u64(&self, index: usize) -> CoreResult<u64> {
        let raw = self.part(index)?;
        raw.parse::<u64>()
            .map_err(|e| CoreError::validation(format!("key part #{index} `{raw}`: {e}")))
    }

    /// Chromosome in part 0 without a leading `chr`.
    pub fn bare_chrom(&self) -> CoreResult<&str> {
        let chrom = self.part(0)?;
        Ok(chrom.strip_prefix("chr").unwrap_or(chrom))
    }

    /// Cache key under `kind`'s prefix.
    pub fn cache_key(&self, kind: DataKind) -> String {
        let mut key = String::from(kind.cache_prefix());
        for part in &self.parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }
}

impl core::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.parts.join(":"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keys_follow_prefix_convention() {
        let key = SourceKey::variant("1", 100, "A", "T");
        assert_eq!(key.cache_key(DataKind::GnomadFrequency), "gnomad:1:100:A:T");
        assert_eq!(key.cache_key(DataKind::Clinvar), "clinvar:1:100:A:T");
        assert_eq!(
            SourceKey::gene("BRCA1").cache_key(DataKind::EnsemblGene),
            "ensembl_gene:BRCA1"
        );
        assert_eq!(SourceKey::gene("MYH9").cache_key(DataKind::GtexExpression), "gtex:MYH9");
    }

    #[test]
    fn kind_parses_from_name_or_prefix() {
        assert_eq!("gnomad_frequency".parse::<DataKind>().unwrap(), DataKind::GnomadFrequency);
        assert_eq!("gnomad".parse::<DataKind>().unwrap(), DataKind::GnomadFrequency);
        assert_eq!("GTEX".parse::<DataKind>().unwrap(), DataKind::GtexExpression);
        assert_eq!("gene-structure".parse::<DataKind>().unwrap(), DataKind::GeneStructure);
        assert!(matches!("omim".parse::<DataKind>(), Err(CoreError::UnknownKind(_))));
    }

    #[test]
    fn local_only_kinds_have_their_own_prefixes() {
        assert_eq!(SourceKey::gene("TTN").cache_key(DataKind::SingleCell), "single_cell:TTN");
        assert_eq!(
            SourceKey::variant("chr1", 5, "G", "A").cache_key(DataKind::RelatedVariants),
            "related_variants:chr1:5:G:A"
        );
        assert_eq!("single-cell".parse::<DataKind>().unwrap(), DataKind::SingleCell);
    }

    #[test]
    fn validate_checks_arity_and_empties() {
        assert!(DataKind::Phylop.validate(&SourceKey::region("chr1", 10, 20)).is_ok());
        assert!(DataKind::Phylop.validate(&SourceKey::gene("TTN")).is_err());
        assert!(
            DataKind::EnsemblGene
                .validate(&SourceKey::from_parts([""]))
                .is_err()
        );
    }

    #[test]
    fn bare_chrom_strips_prefix() {
        assert_eq!(SourceKey::variant("chr22", 1, "A", "C").bare_chrom().unwrap(), "22");
        assert_eq!(SourceKey::variant("X", 1, "A", "C").bare_chrom().unwrap(), "X");
    }

    #[test]
    fn every_kind_round_trips_through_its_name() {
        for kind in DataKind::ALL {
            assert_eq!(kind.as_str().parse::<DataKind>().unwrap(), kind);
        }
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: a variant key maps to `<prefix>:<chrom>:<pos>:<ref>:<alt>`
            /// and passes validation for every variant-level kind.
            #[test]
            fn variant_cache_keys_are_prefixed_and_valid(
                chrom in "(chr)?([1-9]|1[0-9]|2[0-2]|X|Y)",
                pos in 1u64..250_000_000,
                reference in "[ACGT]{1,5}",
                alternate in "[ACGT]{1,5}",
            ) {
                let key = SourceKey::variant(&chrom, pos, &reference, &alternate);
                for kind in [DataKind::GnomadFrequency, DataKind::Clinvar, DataKind::Dbsnp, DataKind::RelatedVariants] {
                    prop_assert!(kind.validate(&key).is_ok());
                    prop_assert_eq!(
                        key.cache_key(kind),
                        format!("{}:{chrom}:{pos}:{reference}:{alternate}", kind.cache_prefix())
                    );
                }
                prop_assert_eq!(key.part_u64(1).unwrap(), pos);
            }
        }
    }
}
