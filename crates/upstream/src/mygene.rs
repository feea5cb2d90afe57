//! MyGene.info: backup gene records when Ensembl is unreachable.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use cardiovar_core::SourceKey;
use cardiovar_infra::sources::{LiveSource, UpstreamError};

use crate::client::HttpClient;
use crate::ensembl::gene_links;

const SERVICE: &str = "mygene";

const FIELDS: &str = "symbol,name,summary,genomic_pos,type_of_gene,alias,ensembl.gene";

/// Gene record in Ensembl lookup shape from the MyGene.info query API.
#[derive(Debug, Clone)]
pub struct MyGene {
    client: Arc<HttpClient>,
}

impl MyGene {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

impl LiveSource for MyGene {
    fn fetch(&self, key: &SourceKey, timeout: Duration) -> Result<Option<Value>, UpstreamError> {
        let symbol = key.part(0)?;
        let url = format!("{}/query", self.client.endpoints().mygene);
        let query = [
            ("q", format!("symbol:{symbol}")),
            ("species", "human".to_string()),
            ("fields", FIELDS.to_string()),
        ];
        let body = self.client.get_json(SERVICE, &url, &query, timeout)?;
        Ok(parse_gene_hit(symbol, &body))
    }
}

/// Reshape the first hit. `genomic_pos` may be a list when the gene maps to
/// several loci; the first one is used.
pub fn parse_gene_hit(symbol: &str, body: &Value) -> Option<Value> {
    let hit = body.pointer("/hits/0").filter(|h| h.is_object())?;
    let locus = match hit.get("genomic_pos") {
        Some(Value::Array(loci)) => loci.first(),
        other => other,
    };
    let at = |field: &str| locus.and_then(|l| l.get(field)).cloned().unwrap_or(Value::Null);
    let ensembl_id = match hit.pointer("/ensembl/gene") {
        Some(Value::String(id)) => Some(id.as_str()),
        _ => hit.pointer("/ensembl/0/gene").and_then(Value::as_str),
    };

    Some(json!({
        "id": hit.get("_id"),
        "display_name": symbol,
        "description": hit.get("name"),
        "seq_region_name": at("chr"),
        "start": at("start"),
        "end": at("end"),
        "biotype": hit.get("type_of_gene"),
        "summary": hit.get("summary"),
        "ensembl_id": ensembl_id,
        "source": "MyGene.info",
        "links": gene_links(symbol, ensembl_id),
    }))
}
