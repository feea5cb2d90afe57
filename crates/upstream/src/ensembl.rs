//! Ensembl REST: gene lookup, protein domains and exon structure.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};

use cardiovar_core::SourceKey;
use cardiovar_infra::sources::{LiveSource, UpstreamError};

use crate::client::{HttpClient, decode};

const SERVICE: &str = "ensembl";

/// Outbound links attached to every gene record.
pub fn gene_links(symbol: &str, gene_id: Option<&str>) -> Value {
    let id = gene_id.unwrap_or("None");
    json!({
        "GeneCards": format!("https://www.genecards.org/cgi-bin/carddisp.pl?gene={symbol}"),
        "UniProt": format!("https://www.uniprot.org/uniprot/?query={symbol}&sort=score"),
        "gnomAD": format!("https://gnomad.broadinstitute.org/gene/{id}?dataset=gnomad_r4"),
        "Ensembl": format!("https://www.ensembl.org/Homo_sapiens/Gene/Summary?g={id}"),
        "OMIM": format!(
            "https://www.omim.org/search?index=entry&start=1&limit=10&sort=score+desc%2C+prefix_sort+desc&search={symbol}"
        ),
    })
}

/// Add `links` and `source` to a gene object; `id_field` names the Ensembl id.
pub fn decorate_gene(mut record: Value, symbol: &str, id_field: &str, source: &str) -> Value {
    if let Value::Object(map) = &mut record {
        let links = gene_links(symbol, map.get(id_field).and_then(Value::as_str));
        map.insert("links".to_string(), links);
        map.insert("source".to_string(), Value::from(source));
    }
    record
}

fn lookup_symbol(
    client: &HttpClient,
    symbol: &str,
    timeout: Duration,
) -> Result<Value, UpstreamError> {
    let url = format!("{}/lookup/symbol/homo_sapiens/{symbol}", client.endpoints().ensembl);
    client.get_json(SERVICE, &url, &[("expand", "1".to_string())], timeout)
}

#[derive(Debug, Clone)]
pub struct EnsemblGene {
    client: Arc<HttpClient>,
}

impl EnsemblGene {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

impl LiveSource for EnsemblGene {
    fn fetch(&self, key: &SourceKey, timeout: Duration) -> Result<Option<Value>, UpstreamError> {
        let symbol = key.part(0)?;
        let body = lookup_symbol(&self.client, symbol, timeout)?;
        if !body.is_object() {
            return Err(decode(SERVICE, "gene lookup did not return an object"));
        }
        Ok(Some(decorate_gene(body, symbol, "id", "Ensembl")))
    }
}

/// Domain annotations on the canonical translation of a gene.
#[derive(Debug, Clone)]
pub struct ProteinDomains {
    client: Arc<HttpClient>,
}

impl ProteinDomains {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

impl LiveSource for ProteinDomains {
    fn fetch(&self, key: &SourceKey, timeout: Duration) -> Result<Option<Value>, UpstreamError> {
        let gene = lookup_symbol(&self.client, key.part(0)?, timeout)?;
        let Some(canonical) = gene.get("canonical_transcript").and_then(Value::as_str) else {
            return Err(decode(SERVICE, "gene has no canonical transcript"));
        };
        // Versioned ids ("ENST...5") are accepted by the overlap endpoint as is.
        let url = format!("{}/overlap/translation/{canonical}", self.client.endpoints().ensembl);
        let features = self.client.get_json(
            SERVICE,
            &url,
            &[("feature", "protein_feature".to_string())],
            timeout,
        )?;
        Ok(parse_protein_domains(&features))
    }
}

/// Keep `domain` and `pfam` features; protein length is the largest end.
pub fn parse_protein_domains(features: &Value) -> Option<Value> {
    let mut protein_length = 0;
    let domains: Vec<Value> = features
        .as_array()?
        .iter()
        .filter(|f| matches!(f.get("type").and_then(Value::as_str), Some("domain" | "pfam")))
        .map(|f| {
            let end = f.get("end").and_then(Value::as_u64).unwrap_or(0);
            protein_length = protein_length.max(end);
            json!({
                "name": f.get("id").and_then(Value::as_str).unwrap_or("Unknown"),
                "start": f.get("start").and_then(Value::as_u64).unwrap_or(0),
                "end": end,
                "type": f.get("type"),
            })
        })
        .collect();

    if domains.is_empty() {
        return None;
    }
    Some(json!({"protein_length": protein_length, "protein_domains": domains}))
}

/// Exons overlapping `pos ± window`, relative to `pos`.
#[derive(Debug, Clone)]
pub struct GeneStructure {
    client: Arc<HttpClient>,
}

impl GeneStructure {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

impl LiveSource for GeneStructure {
    fn fetch(&self, key: &SourceKey, timeout: Duration) -> Result<Option<Value>, UpstreamError> {
        let chrom = key.bare_chrom()?;
        let pos = key.part_u64(1)?;
        let window = key.part_u64(2)?;
        let url = format!(
            "{}/overlap/region/human/{chrom}:{}-{}",
            self.client.endpoints().ensembl,
            pos.saturating_sub(window),
            pos + window
        );
        let features = self.client.get_json(SERVICE, &url, &[("feature", "exon".to_string())], timeout)?;
        parse_exons(&features, pos).map(Some)
    }
}

pub fn parse_exons(features: &Value, pos: u64) -> Result<Value, UpstreamError> {
    let features = features
        .as_array()
        .ok_or_else(|| decode(SERVICE, "exon overlap did not return a list"))?;
    let pos = pos as i64;

    let mut exons = Vec::with_capacity(features.len());
    for feature in features {
        let coord = |field: &str| {
            feature
                .get(field)
                .and_then(Value::as_i64)
                .ok_or_else(|| decode(SERVICE, format!("exon without `{field}`")))
        };
        let mut exon = Map::new();
        exon.insert("start".into(), json!(coord("start")? - pos));
        exon.insert("end".into(), json!(coord("end")? - pos));
        exon.insert("id".into(), feature.get("id").cloned().unwrap_or(Value::Null));
        exon.insert("gene_id".into(), feature.get("Parent").cloned().unwrap_or(Value::Null));
        exons.push(Value::Object(exon));
    }
    Ok(Value::Array(exons))
}
