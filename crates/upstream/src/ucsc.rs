//! UCSC Genome Browser: PhyloP conservation track and reference sequence.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use cardiovar_core::SourceKey;
use cardiovar_infra::sources::{LiveSource, UpstreamError};

use crate::client::{HttpClient, decode, ucsc_chrom};

const SERVICE: &str = "ucsc";
const PHYLOP_TRACK: &str = "phyloP100way";

fn region(key: &SourceKey) -> Result<(String, u64, u64), UpstreamError> {
    let chrom = ucsc_chrom(key.part(0)?);
    let start = key.part_u64(1)?;
    let end = key.part_u64(2)?;
    Ok((chrom, start, end))
}

/// Per-base PhyloP scores, one per position in `[start, end)`.
#[derive(Debug, Clone)]
pub struct Phylop {
    client: Arc<HttpClient>,
}

impl Phylop {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

impl LiveSource for Phylop {
    fn fetch(&self, key: &SourceKey, timeout: Duration) -> Result<Option<Value>, UpstreamError> {
        let (chrom, start, end) = region(key)?;
        let url = format!("{}/getData/track", self.client.endpoints().ucsc);
        let body = self.client.get_json(
            SERVICE,
            &url,
            &[
                ("genome", "hg38".to_string()),
                ("track", PHYLOP_TRACK.to_string()),
                ("chrom", chrom),
                ("start", start.to_string()),
                ("end", end.to_string()),
            ],
            timeout,
        )?;
        Ok(parse_phylop(&body, end.saturating_sub(start) as usize))
    }
}

/// Track values resampled to `expected` points by linear interpolation.
pub fn parse_phylop(body: &Value, expected: usize) -> Option<Value> {
    let scores: Vec<f64> = body
        .get(PHYLOP_TRACK)?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("value").and_then(Value::as_f64))
        .collect();
    if scores.is_empty() || expected == 0 {
        return None;
    }
    Some(json!(resample(&scores, expected)))
}

/// Linear interpolation of `values` onto `len` evenly spaced points.
pub fn resample(values: &[f64], len: usize) -> Vec<f64> {
    if values.len() == len {
        return values.to_vec();
    }
    if values.len() == 1 || len == 1 {
        return vec![values[0]; len];
    }

    let last = (values.len() - 1) as f64;
    (0..len)
        .map(|i| {
            let x = i as f64 * last / (len - 1) as f64;
            let lo = x.floor() as usize;
            let hi = (lo + 1).min(values.len() - 1);
            let frac = x - lo as f64;
            values[lo] + (values[hi] - values[lo]) * frac
        })
        .collect()
}

/// Upper-cased hg38 DNA over `[start, end)`.
#[derive(Debug, Clone)]
pub struct Sequence {
    client: Arc<HttpClient>,
}

impl Sequence {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

impl LiveSource for Sequence {
    fn fetch(&self, key: &SourceKey, timeout: Duration) -> Result<Option<Value>, UpstreamError> {
        let (chrom, start, end) = region(key)?;
        let url = format!("{}/getData/sequence", self.client.endpoints().ucsc);
        let body = self.client.get_json(
            SERVICE,
            &url,
            &[
                ("genome", "hg38".to_string()),
                ("chrom", chrom),
                ("start", start.to_string()),
                ("end", end.to_string()),
            ],
            timeout,
        )?;
        parse_sequence(&body).map(Some)
    }
}

pub fn parse_sequence(body: &Value) -> Result<Value, UpstreamError> {
    match body.get("dna") {
        Some(Value::String(dna)) => Ok(Value::from(dna.to_ascii_uppercase())),
        None => Ok(Value::from("")),
        Some(other) => Err(decode(SERVICE, format!("unexpected dna field: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_lengths_pass_through() {
        let body = json!({"phyloP100way": [{"value": 1.5}, {"value": -0.25}, {"start": 3}]});
        assert_eq!(parse_phylop(&body, 2), Some(json!([1.5, -0.25])));
    }

    #[test]
    fn sparse_tracks_are_interpolated() {
        assert_eq!(resample(&[0.0, 4.0], 5), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(resample(&[2.0], 3), vec![2.0, 2.0, 2.0]);

        let dense = resample(&[0.0, 1.0, 0.0, 1.0, 0.0], 3);
        assert_eq!(dense, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn empty_tracks_are_no_record() {
        assert_eq!(parse_phylop(&json!({"phyloP100way": []}), 10), None);
        assert_eq!(parse_phylop(&json!({"error": "no data"}), 10), None);
    }

    #[test]
    fn sequence_is_upper_cased() {
        assert_eq!(parse_sequence(&json!({"dna": "acgtN"})).unwrap(), json!("ACGTN"));
        assert_eq!(parse_sequence(&json!({})).unwrap(), json!(""));
        assert!(parse_sequence(&json!({"dna": 3})).is_err());
    }
}
