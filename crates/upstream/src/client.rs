//! Shared blocking HTTP client for every upstream.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde_json::Value;

use cardiovar_infra::sources::UpstreamError;

pub const USER_AGENT: &str = "CardioVar/1.0 (+https://github.com/cardiovar/cardiovar)";

/// Base URLs; overridable for mirrors and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub gnomad: String,
    pub ensembl: String,
    pub ucsc: String,
    pub gtex: String,
    pub ncbi_eutils: String,
    pub mygene: String,
    pub myvariant: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            gnomad: "https://gnomad.broadinstitute.org/api".to_string(),
            ensembl: "https://rest.ensembl.org".to_string(),
            ucsc: "https://api.genome.ucsc.edu".to_string(),
            gtex: "https://gtexportal.org/rest/v1".to_string(),
            ncbi_eutils: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string(),
            mygene: "https://mygene.info/v3".to_string(),
            myvariant: "https://myvariant.info/v1".to_string(),
        }
    }
}

/// JSON-over-HTTP client. Timeouts are per request, never client-wide.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: Client,
    endpoints: Endpoints,
}

impl HttpClient {
    pub fn new(endpoints: Endpoints) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| UpstreamError::Transport {
                service: "http-client",
                message: e.to_string(),
            })?;
        Ok(Self { http, endpoints })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn get_json(
        &self,
        service: &'static str,
        url: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<Value, UpstreamError> {
        let request = self
            .http
            .get(url)
            .query(query)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(timeout);
        send(service, request)
    }

    pub fn post_json(
        &self,
        service: &'static str,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, UpstreamError> {
        let request = self.http.post(url).json(body).timeout(timeout);
        send(service, request)
    }
}

fn send(service: &'static str, request: RequestBuilder) -> Result<Value, UpstreamError> {
    let response = request.send().map_err(|e| UpstreamError::Transport {
        service,
        message: e.to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
        tracing::debug!(service, status = status.as_u16(), "upstream returned an error status");
        return Err(UpstreamError::Status {
            service,
            status: status.as_u16(),
        });
    }

    response.json::<Value>().map_err(|e| decode(service, e))
}

pub(crate) fn decode(service: &'static str, message: impl std::fmt::Display) -> UpstreamError {
    UpstreamError::Decode {
        service,
        message: message.to_string(),
    }
}

/// Chromosome with a `chr` prefix, as UCSC expects.
pub(crate) fn ucsc_chrom(chrom: &str) -> String {
    if chrom.starts_with("chr") {
        chrom.to_string()
    } else {
        format!("chr{chrom}")
    }
}
