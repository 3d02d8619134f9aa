//! Request/response calls to the research service that sit beside a live
//! session: health, document export and stored-research statistics. Nothing
//! here reads or changes session state.

use anyhow::{Context, Result};
use papersio_session::{ResearchError, ResearchResponse, SourceKind};
use papersio_wire::{
    CitationStyle, ErrorDetail, ExportRequest, HealthResponse, StatsResponse, WireSource,
    WireSourceType,
};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{info, warn};

#[derive(Clone)]
pub struct ResearchApiClient {
    base_url: String,
    client: Client,
}

impl ResearchApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn check_health(&self) -> Result<HealthResponse> {
        let url = format!("{}/", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        if !resp.status().is_success() {
            anyhow::bail!("health check failed ({})", resp.status());
        }
        Ok(resp.json::<HealthResponse>().await?)
    }

    pub async fn stats(&self) -> Result<StatsResponse> {
        let url = format!("{}/api/stats", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{}", describe_failure(status, &body));
        }
        Ok(resp.json::<StatsResponse>().await?)
    }

    /// Renders `response` as a PDF. Failures come back as
    /// [`ResearchError::Export`] and never touch the session the response
    /// came from.
    pub async fn export_pdf(
        &self,
        response: &ResearchResponse,
        style: CitationStyle,
        quality_assessment: Option<Value>,
    ) -> Result<Vec<u8>, ResearchError> {
        let url = format!("{}/api/research/export/pdf", self.base_url);
        let body = export_request(response, quality_assessment);

        let resp = self
            .client
            .post(&url)
            .query(&[("citation_style", style.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ResearchError::Export(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let detail = describe_failure(status, &text);
            warn!("export ({}) failed: {detail}", style.as_str());
            return Err(ResearchError::Export(detail));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ResearchError::Export(format!("reading document failed: {e}")))?;
        info!("exported {} bytes ({})", bytes.len(), style.as_str());
        Ok(bytes.to_vec())
    }
}

pub fn export_request(
    response: &ResearchResponse,
    quality_assessment: Option<Value>,
) -> ExportRequest {
    ExportRequest {
        query: response.query().to_string(),
        answer: response.answer().to_string(),
        sources: response
            .sources()
            .iter()
            .map(|source| WireSource {
                title: source.title.clone(),
                url: source.url.clone(),
                source_type: match source.kind {
                    SourceKind::Academic => WireSourceType::Arxiv,
                    SourceKind::Web => WireSourceType::Web,
                },
                authors: (!source.authors.is_empty()).then(|| source.authors.clone()),
            })
            .collect(),
        quality_assessment,
    }
}

/// Prefers the service's `{"detail": ...}` text, then the raw body, then the
/// status line.
pub fn describe_failure(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorDetail>(body) {
        if !parsed.detail.trim().is_empty() {
            return parsed.detail;
        }
    }
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    }
}
