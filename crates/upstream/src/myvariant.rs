//! MyVariant.info: backup allele frequency and ClinVar records.
//!
//! One query per variant returns the aggregated `gnomad_*`, `clinvar` and
//! `dbsnp` sections; each adapter projects the part its kind needs.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use cardiovar_core::SourceKey;
use cardiovar_infra::sources::{LiveSource, UpstreamError};

use crate::client::HttpClient;

const SERVICE: &str = "myvariant";

const FIELDS: &str = "clinvar,gnomad_exome,gnomad_genome,dbsnp";

/// First hit for a `chrom:pos:ref:alt` key on GRCh38, if any.
fn query_variant(client: &HttpClient, key: &SourceKey, timeout: Duration) -> Result<Option<Value>, UpstreamError> {
    let chrom = key.bare_chrom()?;
    let q = format!(
        "hg38.chr:{chrom} AND hg38.start:{} AND vcf.ref:{} AND vcf.alt:{}",
        key.part(1)?,
        key.part(2)?,
        key.part(3)?
    );
    let url = format!("{}/query", client.endpoints().myvariant);
    let query = [("q", q), ("fields", FIELDS.to_string()), ("size", "1".to_string())];
    let body = client.get_json(SERVICE, &url, &query, timeout)?;
    Ok(first_hit(&body))
}

pub fn first_hit(body: &Value) -> Option<Value> {
    body.pointer("/hits/0").filter(|h| h.is_object()).cloned()
}

/// Allele frequency from the gnomAD sections of a hit.
#[derive(Debug, Clone)]
pub struct MyVariantFrequency {
    client: Arc<HttpClient>,
}

impl MyVariantFrequency {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

impl LiveSource for MyVariantFrequency {
    fn fetch(&self, key: &SourceKey, timeout: Duration) -> Result<Option<Value>, UpstreamError> {
        let hit = query_variant(&self.client, key, timeout)?;
        Ok(hit.as_ref().and_then(frequency_from_hit))
    }
}

/// Genome AF, else exome AF.
pub fn frequency_from_hit(hit: &Value) -> Option<Value> {
    ["/gnomad_genome/af/af", "/gnomad_exome/af/af"]
        .iter()
        .find_map(|pointer| hit.pointer(pointer).and_then(Value::as_f64))
        .map(|af| json!(af))
}

/// ClinVar record from the `clinvar` section of a hit.
#[derive(Debug, Clone)]
pub struct MyVariantClinvar {
    client: Arc<HttpClient>,
}

impl MyVariantClinvar {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

impl LiveSource for MyVariantClinvar {
    fn fetch(&self, key: &SourceKey, timeout: Duration) -> Result<Option<Value>, UpstreamError> {
        let hit = query_variant(&self.client, key, timeout)?;
        Ok(hit.as_ref().and_then(clinvar_from_hit))
    }
}

/// Same fields as the E-utilities record. `rcv` is an object for a single
/// submission and a list otherwise; the first one is used.
pub fn clinvar_from_hit(hit: &Value) -> Option<Value> {
    let clinvar = hit.get("clinvar").filter(|c| c.is_object())?;
    let rcv = match clinvar.get("rcv") {
        Some(Value::Array(list)) => list.first(),
        other => other,
    };
    let text = |field: &str| rcv.and_then(|r| r.get(field)).and_then(Value::as_str).unwrap_or("");
    let variation_id = match clinvar.get("variant_id") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    };

    Some(json!({
        "variation_id": variation_id,
        "title": rcv.and_then(|r| r.pointer("/conditions/name")).and_then(Value::as_str).unwrap_or(""),
        "clinical_significance": text("clinical_significance"),
        "review_status": text("review_status"),
        "last_evaluated": text("last_evaluated"),
        "germline_classification": "",
        "variation_type": clinvar.get("type").and_then(Value::as_str).unwrap_or(""),
        "molecular_consequence": [],
        "gene_symbol": clinvar.pointer("/gene/symbol"),
        "accession": text("accession"),
        "source": "MyVariant.info",
    }))
}
