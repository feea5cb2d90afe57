//! GTEx median gene expression per tissue.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use cardiovar_core::SourceKey;
use cardiovar_infra::sources::{LiveSource, UpstreamError};

use crate::client::{HttpClient, decode};

const SERVICE: &str = "gtex";
const DATASET: &str = "gtex_v8";

#[derive(Debug, Clone)]
pub struct GtexExpression {
    client: Arc<HttpClient>,
}

impl GtexExpression {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

impl LiveSource for GtexExpression {
    fn fetch(&self, key: &SourceKey, timeout: Duration) -> Result<Option<Value>, UpstreamError> {
        let url = format!("{}/expression/medianGeneExpression", self.client.endpoints().gtex);
        let body = self.client.get_json(
            SERVICE,
            &url,
            &[("geneId", key.part(0)?.to_string()), ("datasetId", DATASET.to_string())],
            timeout,
        )?;
        parse_expression(&body)
    }
}

/// `[{tissue, tpm}]` from `medianGeneExpression`; absent list means no record.
pub fn parse_expression(body: &Value) -> Result<Option<Value>, UpstreamError> {
    let Some(rows) = body.get("medianGeneExpression").and_then(Value::as_array) else {
        return Ok(None);
    };
    rows.iter()
        .map(|row| -> Result<Value, UpstreamError> {
            let tissue = row
                .get("tissueSiteDetailId")
                .and_then(Value::as_str)
                .ok_or_else(|| decode(SERVICE, "row without tissueSiteDetailId"))?;
            let tpm = row
                .get("median")
                .and_then(Value::as_f64)
                .ok_or_else(|| decode(SERVICE, format!("{tissue}: row without median")))?;
            Ok(json!({"tissue": tissue, "tpm": tpm}))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(|rows| Some(Value::Array(rows)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_reduced_to_tissue_and_tpm() {
        let body = json!({"medianGeneExpression": [
            {"tissueSiteDetailId": "Heart_Left_Ventricle", "median": 210.4, "gencodeId": "ENSG1"},
            {"tissueSiteDetailId": "Liver", "median": 3}
        ]});
        assert_eq!(
            parse_expression(&body).unwrap(),
            Some(json!([
                {"tissue": "Heart_Left_Ventricle", "tpm": 210.4},
                {"tissue": "Liver", "tpm": 3.0}
            ]))
        );
    }

    #[test]
    fn missing_list_is_no_record_and_bad_rows_fail() {
        assert_eq!(parse_expression(&json!({"data": []})).unwrap(), None);
        let bad = json!({"medianGeneExpression": [{"tissueSiteDetailId": "Liver"}]});
        assert!(matches!(parse_expression(&bad), Err(UpstreamError::Decode { .. })));
    }
}
