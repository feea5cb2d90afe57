//! gnomAD: variant allele frequency (REST) and gene records (GraphQL).

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use cardiovar_core::SourceKey;
use cardiovar_infra::sources::{LiveSource, UpstreamError};

use crate::client::{HttpClient, decode};
use crate::ensembl::gene_links;

const SERVICE: &str = "gnomad";

const GENE_QUERY: &str = r#"
query GeneInfo($geneSymbol: String!, $referenceGenome: ReferenceGenomeId!) {
  gene(gene_symbol: $geneSymbol, reference_genome: $referenceGenome) {
    gene_id
    symbol
    name
    chrom
    start
    stop
    strand
    canonical_transcript_id
    mane_select_transcript { ensembl_id ensembl_version refseq_id refseq_version }
  }
}
"#;

/// Exome allele frequency `ac / an` for a `chrom:pos:ref:alt` key.
#[derive(Debug, Clone)]
pub struct GnomadVariant {
    client: Arc<HttpClient>,
}

impl GnomadVariant {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

impl LiveSource for GnomadVariant {
    fn fetch(&self, key: &SourceKey, timeout: Duration) -> Result<Option<Value>, UpstreamError> {
        let chrom = key.bare_chrom()?;
        let url = format!(
            "{}/variant/{chrom}-{}-{}-{}",
            self.client.endpoints().gnomad,
            key.part(1)?,
            key.part(2)?,
            key.part(3)?
        );
        let body = self.client.get_json(SERVICE, &url, &[], timeout)?;
        Ok(parse_variant_frequency(&body))
    }
}

/// `variant.exome.ac / max(variant.exome.an, 1)`; missing counts read as
/// `ac = 0`, `an = 1`. No `variant` object means no record.
pub fn parse_variant_frequency(body: &Value) -> Option<Value> {
    let variant = body.get("variant").filter(|v| v.is_object())?;
    let exome = variant.get("exome");
    let count = |field: &str| exome.and_then(|e| e.get(field)).and_then(Value::as_f64);
    let ac = count("ac").unwrap_or(0.0);
    let an = count("an").unwrap_or(1.0).max(1.0);
    Some(json!(ac / an))
}

/// Gene record in Ensembl lookup shape, from the gnomAD GraphQL API.
#[derive(Debug, Clone)]
pub struct GnomadGene {
    client: Arc<HttpClient>,
}

impl GnomadGene {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

impl LiveSource for GnomadGene {
    fn fetch(&self, key: &SourceKey, timeout: Duration) -> Result<Option<Value>, UpstreamError> {
        let symbol = key.part(0)?;
        let request = json!({
            "query": GENE_QUERY,
            "variables": { "geneSymbol": symbol, "referenceGenome": "GRCh38" },
        });
        let body = self.client.post_json(SERVICE, &self.client.endpoints().gnomad, &request, timeout)?;
        parse_gene(symbol, &body)
    }
}

pub fn parse_gene(symbol: &str, body: &Value) -> Result<Option<Value>, UpstreamError> {
    if let Some(errors) = body.get("errors") {
        return Err(decode(SERVICE, format!("graphql errors: {errors}")));
    }
    let Some(gene) = body.pointer("/data/gene").filter(|g| g.is_object()) else {
        return Ok(None);
    };

    let gene_id = gene.get("gene_id").and_then(Value::as_str);
    let strand = if gene.get("strand").and_then(Value::as_str) == Some("+") { 1 } else { -1 };
    Ok(Some(json!({
        "id": gene_id,
        "symbol": gene.get("symbol"),
        "description": gene
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Gene {symbol}")),
        "seq_region_name": gene.get("chrom"),
        "start": gene.get("start"),
        "end": gene.get("stop"),
        "strand": strand,
        "canonical_transcript": gene.get("canonical_transcript_id"),
        "mane_select": gene.get("mane_select_transcript"),
        "source": "gnomAD",
        "links": gene_links(symbol, gene_id),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_is_exome_ac_over_an() {
        let body = json!({"variant": {"exome": {"ac": 3, "an": 250000}}});
        assert_eq!(parse_variant_frequency(&body), Some(json!(3.0 / 250000.0)));
    }

    #[test]
    fn missing_counts_read_as_zero_frequency() {
        let body = json!({"variant": {"genome": {"ac": 1, "an": 10}}});
        assert_eq!(parse_variant_frequency(&body), Some(json!(0.0)));
        assert_eq!(parse_variant_frequency(&json!({"variant": null})), None);
        assert_eq!(parse_variant_frequency(&json!({})), None);
    }

    #[test]
    fn graphql_gene_is_reshaped() {
        let body = json!({"data": {"gene": {
            "gene_id": "ENSG00000100345",
            "symbol": "MYH9",
            "name": "myosin heavy chain 9",
            "chrom": "22",
            "start": 36281000,
            "stop": 36388000,
            "strand": "-",
            "canonical_transcript_id": "ENST00000216181",
            "mane_select_transcript": null
        }}});

        let gene = parse_gene("MYH9", &body).unwrap().unwrap();
        assert_eq!(gene["id"], "ENSG00000100345");
        assert_eq!(gene["end"], 36388000);
        assert_eq!(gene["strand"], -1);
        assert_eq!(gene["source"], "gnomAD");
        assert!(gene["links"]["gnomAD"].as_str().unwrap().contains("ENSG00000100345"));
    }

    #[test]
    fn graphql_errors_and_missing_genes() {
        let errors = json!({"errors": [{"message": "Gene not found"}]});
        assert!(matches!(parse_gene("XYZ", &errors), Err(UpstreamError::Decode { .. })));
        assert_eq!(parse_gene("XYZ", &json!({"data": {"gene": null}})).unwrap(), None);
    }
}
