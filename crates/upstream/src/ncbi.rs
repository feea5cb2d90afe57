//! NCBI E-utilities: ClinVar and dbSNP lookups by GRCh38 position.
//!
//! Both run `esearch` for ids at the position, then `esummary` on the hits.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use cardiovar_core::SourceKey;
use cardiovar_infra::sources::{LiveSource, UpstreamError};

use crate::client::HttpClient;

const SERVICE: &str = "ncbi";
const CLINVAR_SUMMARY_LIMIT: usize = 5;

/// GRCh38 RefSeq accessions for the chromosomes ClinVar is queried on.
const REFSEQ_GRCH38: [(&str, &str); 24] = [
    ("1", "NC_000001.11"),
    ("2", "NC_000002.12"),
    ("3", "NC_000003.12"),
    ("4", "NC_000004.12"),
    ("5", "NC_000005.10"),
    ("6", "NC_000006.12"),
    ("7", "NC_000007.14"),
    ("8", "NC_000008.11"),
    ("9", "NC_000009.12"),
    ("10", "NC_000010.11"),
    ("11", "NC_000011.10"),
    ("12", "NC_000012.12"),
    ("13", "NC_000013.11"),
    ("14", "NC_000014.9"),
    ("15", "NC_000015.10"),
    ("16", "NC_000016.10"),
    ("17", "NC_000017.11"),
    ("18", "NC_000018.10"),
    ("19", "NC_000019.10"),
    ("20", "NC_000020.11"),
    ("21", "NC_000021.9"),
    ("22", "NC_000022.11"),
    ("X", "NC_000023.11"),
    ("Y", "NC_000024.10"),
];

pub fn refseq_accession(chrom: &str) -> Option<&'static str> {
    REFSEQ_GRCH38
        .iter()
        .find(|(name, _)| *name == chrom)
        .map(|(_, accession)| *accession)
}

fn esearch(
    client: &HttpClient,
    db: &str,
    term: String,
    retmax: u32,
    timeout: Duration,
) -> Result<Vec<String>, UpstreamError> {
    let url = format!("{}/esearch.fcgi", client.endpoints().ncbi_eutils);
    let body = client.get_json(
        SERVICE,
        &url,
        &[
            ("db", db.to_string()),
            ("term", term),
            ("retmode", "json".to_string()),
            ("retmax", retmax.to_string()),
        ],
        timeout,
    )?;
    Ok(parse_id_list(&body))
}

fn esummary(client: &HttpClient, db: &str, ids: &[String], timeout: Duration) -> Result<Value, UpstreamError> {
    let url = format!("{}/esummary.fcgi", client.endpoints().ncbi_eutils);
    client.get_json(
        SERVICE,
        &url,
        &[("db", db.to_string()), ("id", ids.join(",")), ("retmode", "json".to_string())],
        timeout,
    )
}

pub fn parse_id_list(body: &Value) -> Vec<String> {
    body.pointer("/esearchresult/idlist")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Clinical significance of the first ClinVar record at the position.
#[derive(Debug, Clone)]
pub struct Clinvar {
    client: Arc<HttpClient>,
}

impl Clinvar {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

impl LiveSource for Clinvar {
    fn fetch(&self, key: &SourceKey, timeout: Duration) -> Result<Option<Value>, UpstreamError> {
        let chrom = key.bare_chrom()?;
        let pos = key.part_u64(1)?;
        if refseq_accession(chrom).is_none() {
            tracing::debug!(chrom, "no RefSeq accession for chromosome; skipping ClinVar");
            return Ok(None);
        }

        let term = format!("{chrom}[CHR] AND {pos}[CHRPOS38]");
        tracing::debug!(%term, "clinvar search");
        let ids = esearch(&self.client, "clinvar", term, 10, timeout)?;
        if ids.is_empty() {
            return Ok(None);
        }

        let ids = &ids[..ids.len().min(CLINVAR_SUMMARY_LIMIT)];
        let summary = esummary(&self.client, "clinvar", ids, timeout)?;
        Ok(parse_clinvar(&summary, ids))
    }
}

/// First summary with a non-empty `variation_set`, reduced to the fields we keep.
pub fn parse_clinvar(summary: &Value, ids: &[String]) -> Option<Value> {
    let result = summary.get("result")?;
    ids.iter().find_map(|uid| {
        let item = result.get(uid)?;
        let has_variations = item
            .get("variation_set")
            .and_then(Value::as_array)
            .is_some_and(|set| !set.is_empty());
        if !has_variations {
            return None;
        }

        let text = |pointer: &str| item.pointer(pointer).and_then(Value::as_str).unwrap_or("");
        Some(json!({
            "variation_id": uid,
            "title": text("/title"),
            "clinical_significance": text("/clinical_significance/description"),
            "review_status": text("/clinical_significance/review_status"),
            "last_evaluated": text("/clinical_significance/last_evaluated"),
            "germline_classification": text("/germline_classification/description"),
            "variation_type": text("/variation_type"),
            "molecular_consequence": item.get("molecular_consequence").cloned().unwrap_or_else(|| json!([])),
            "gene_symbol": item.pointer("/genes/0/symbol"),
            "accession": text("/accession"),
            "source": "NCBI ClinVar",
        }))
    })
}

/// rsID and global MAF of the first dbSNP record at the position.
#[derive(Debug, Clone)]
pub struct Dbsnp {
    client: Arc<HttpClient>,
}

impl Dbsnp {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

impl LiveSource for Dbsnp {
    fn fetch(&self, key: &SourceKey, timeout: Duration) -> Result<Option<Value>, UpstreamError> {
        let chrom = key.bare_chrom()?;
        let pos = key.part_u64(1)?;
        let ids = esearch(&self.client, "snp", format!("{chrom}[CHR] AND {pos}[POS]"), 5, timeout)?;
        if ids.is_empty() {
            return Ok(None);
        }
        let summary = esummary(&self.client, "snp", &ids, timeout)?;
        Ok(parse_dbsnp(&summary, &ids))
    }
}

pub fn parse_dbsnp(summary: &Value, ids: &[String]) -> Option<Value> {
    let result = summary.get("result")?;
    ids.iter().find_map(|uid| {
        let item = result.get(uid).filter(|item| item.is_object())?;
        Some(json!({
            "rsid": format!("rs{uid}"),
            "global_maf": item.get("global_maf"),
            "clinical_significance": item.get("clinical_significance"),
            "gene": item.pointer("/genes/0/name"),
        }))
    })
}
