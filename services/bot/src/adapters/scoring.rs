//! services/bot/src/adapters/scoring.rs
//!
//! This module contains the adapter for the Originality.ai scan API.
//! It implements the `ScoringService` port from the `core` crate.

use std::time::Duration;

use async_trait::async_trait;
use originality_core::domain::ScoreResult;
use originality_core::ports::{PortError, PortResult, ScoringService};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const API_KEY_HEADER: &str = "X-OAI-API-KEY";

#[derive(Debug, Serialize)]
struct ScanRequest<'a> {
    title: &'a str,
    check_ai: bool,
    check_plagiarism: bool,
    check_facts: bool,
    check_readability: bool,
    check_grammar: bool,
    #[serde(rename = "check_contentOptimizer")]
    check_content_optimizer: bool,
    #[serde(rename = "storeScan")]
    store_scan: bool,
    #[serde(rename = "excludedUrls")]
    excluded_urls: Vec<String>,
    #[serde(rename = "aiModelVersion")]
    ai_model_version: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ScanResponse {
    results: ScanResults,
}

#[derive(Debug, Deserialize)]
struct ScanResults {
    properties: ScanProperties,
    ai: AiSection,
}

#[derive(Debug, Deserialize)]
struct ScanProperties {
    id: String,
    #[serde(rename = "publicLink", default)]
    public_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AiSection {
    classification: AiSplit,
    confidence: AiSplit,
}

#[derive(Debug, Deserialize)]
struct AiSplit {
    #[serde(rename = "AI")]
    ai: f64,
}

/// Pulls the fields we keep out of a raw scan response.
fn normalize(raw: serde_json::Value) -> PortResult<ScoreResult> {
    let parsed: ScanResponse = serde_json::from_value(raw.clone())
        .map_err(|e| PortError::Unexpected(format!("unreadable scan response: {}", e)))?;
    Ok(ScoreResult {
        ai_score: parsed.results.ai.classification.ai,
        ai_confidence: parsed.results.ai.confidence.ai,
        public_link: parsed
            .results
            .properties
            .public_link
            .filter(|link| !link.is_empty()),
        scan_id: parsed.results.properties.id,
        raw_response: raw,
    })
}

/// An adapter that implements `ScoringService` against the Originality.ai HTTP API.
#[derive(Clone)]
pub struct OriginalityScorer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model_version: String,
}

impl OriginalityScorer {
    /// Creates a new `OriginalityScorer`. The timeout bounds the whole request.
    pub fn new(
        api_url: String,
        api_key: String,
        model_version: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url,
            api_key,
            model_version,
        })
    }
}

#[async_trait]
impl ScoringService for OriginalityScorer {
    async fn scan(&self, title: &str, content: &str) -> PortResult<ScoreResult> {
        let request = ScanRequest {
            title,
            check_ai: true,
            check_plagiarism: false,
            check_facts: false,
            check_readability: false,
            check_grammar: false,
            check_content_optimizer: false,
            store_scan: true,
            excluded_urls: Vec::new(),
            ai_model_version: &self.model_version,
            content,
        };

        let resp = self
            .client
            .post(&self.api_url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("scan request failed: {}", e)))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| PortError::Unexpected(format!("scan response unreadable: {}", e)))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), %title, "Scan API rejected the request");
            return Err(PortError::ScoringApi {
                status: status.as_u16(),
                body,
            });
        }

        let raw: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| PortError::Unexpected(format!("scan response is not JSON: {}", e)))?;
        let result = normalize(raw)?;
        info!(scan_id = %result.scan_id, ai_score = result.ai_score, "Scan completed");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_uses_api_field_names() {
        let body = serde_json::to_value(ScanRequest {
            title: "essay.docx",
            check_ai: true,
            check_plagiarism: false,
            check_facts: false,
            check_readability: false,
            check_grammar: false,
            check_content_optimizer: false,
            store_scan: true,
            excluded_urls: Vec::new(),
            ai_model_version: "lite-102",
            content: "some words",
        })
        .unwrap();
        assert_eq!(body["check_contentOptimizer"], false);
        assert_eq!(body["storeScan"], true);
        assert_eq!(body["aiModelVersion"], "lite-102");
        assert_eq!(body["excludedUrls"], json!([]));
    }

    #[test]
    fn response_is_normalized() {
        let raw = json!({
            "results": {
                "properties": {
                    "privateID": 12,
                    "id": "scan-abc",
                    "title": "essay.docx",
                    "publicLink": "https://app.originality.ai/share/xyz"
                },
                "credits": { "used": 3 },
                "ai": {
                    "aiModel": "lite",
                    "classification": { "AI": 0.82, "Original": 0.18 },
                    "confidence": { "AI": 0.91, "Original": 0.09 },
                    "blocks": []
                }
            }
        });
        let result = normalize(raw.clone()).unwrap();
        assert_eq!(result.scan_id, "scan-abc");
        assert!((result.ai_score - 0.82).abs() < f64::EPSILON);
        assert!((result.ai_confidence - 0.91).abs() < f64::EPSILON);
        assert_eq!(
            result.public_link.as_deref(),
            Some("https://app.originality.ai/share/xyz")
        );
        assert_eq!(result.raw_response, raw);
    }

    #[test]
    fn missing_ai_section_is_an_error() {
        let raw = json!({ "results": { "properties": { "id": "scan-abc" } } });
        assert!(matches!(normalize(raw), Err(PortError::Unexpected(_))));
    }
}
