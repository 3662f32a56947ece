//! Shared state and wire types for the HTTP API.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::dispute::{DisputeDraft, DisputeEmail};
use crate::pins::{build_pins, page_for_pin, page_overlays, PageOverlay, Pin, PinKind};
use crate::pipeline::analysis::{
    AnalysisError, AnalysisRecord, AnalysisReport, Attempt, GeminiClient, LlmClient, SavingsTip,
};

/// Builds a model client for one request. Called on a blocking worker.
pub type LlmFactory = Arc<dyn Fn() -> Result<Arc<dyn LlmClient>, AnalysisError> + Send + Sync>;

// ═══════════════════════════════════════════════════════════
// API context: immutable, shared by every request
// ═══════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct ApiContext {
    pub config: Arc<AppConfig>,
    llm_factory: LlmFactory,
}

impl ApiContext {
    /// Context backed by the Gemini client described by `config`.
    pub fn new(config: AppConfig) -> Self {
        let config = Arc::new(config);
        let factory_config = Arc::clone(&config);
        let llm_factory: LlmFactory = Arc::new(move || {
            let key = factory_config
                .api_key
                .as_deref()
                .ok_or(AnalysisError::MissingApiKey)?;
            let client = GeminiClient::new(
                &factory_config.api_base,
                key,
                &factory_config.model,
                factory_config.timeout_secs,
            )?;
            Ok(Arc::new(client) as Arc<dyn LlmClient>)
        });
        Self {
            config,
            llm_factory,
        }
    }

    pub fn with_llm_factory(config: AppConfig, llm_factory: LlmFactory) -> Self {
        Self {
            config: Arc::new(config),
            llm_factory,
        }
    }

    pub fn llm_factory(&self) -> LlmFactory {
        Arc::clone(&self.llm_factory)
    }
}

// ═══════════════════════════════════════════════════════════
// Request / response bodies
// ═══════════════════════════════════════════════════════════

/// Uploaded bill: raw base64 or a `data:` URL, and an optional MIME type.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRequest {
    pub file: String,
    #[serde(default)]
    pub mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub analysis_id: Uuid,
    pub record: AnalysisRecord,
    pub attempt: Attempt,
    pub model_calls: u8,
    /// Likelihood at or above the suspicious threshold.
    pub suspicious: bool,
    pub pins: Vec<Pin>,
    pub pages: Vec<PageOverlay>,
    /// Page to open first: the one holding error pin 1.
    pub initial_page: u32,
    /// Savings tips, largest estimate first.
    pub ranked_tips: Vec<SavingsTip>,
    /// Present when the record lists suspected issues.
    pub dispute_email: Option<DisputeDraft>,
}

impl From<AnalysisReport> for AnalyzeResponse {
    fn from(report: AnalysisReport) -> Self {
        let record = report.record;
        let pins = build_pins(&record);
        let dispute_email = if record.error_analysis.suspected_issues.is_empty() {
            None
        } else {
            Some(DisputeEmail::from_record(&record).into())
        };
        Self {
            analysis_id: report.analysis_id,
            attempt: report.attempt,
            model_calls: report.model_calls,
            suspicious: record.is_suspicious(),
            pages: page_overlays(&pins),
            initial_page: page_for_pin(&pins, PinKind::Error, 1),
            ranked_tips: record.tips_by_savings().into_iter().cloned().collect(),
            pins,
            dispute_email,
            record,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analysis::sanitize_analysis;
    use serde_json::json;

    fn report(raw: serde_json::Value) -> AnalysisReport {
        AnalysisReport {
            analysis_id: Uuid::new_v4(),
            record: sanitize_analysis(&raw),
            attempt: Attempt::Primary,
            model_calls: 1,
        }
    }

    #[test]
    fn response_carries_pins_and_dispute() {
        let response = AnalyzeResponse::from(report(json!({
            "errorAnalysis": {"suspectedIssues": [{"issue": "Late fee", "amount": 12}]},
            "regionalComparison": {"providerName": "Acme"}
        })));
        assert_eq!(response.pins.len(), 1);
        let draft = response.dispute_email.unwrap();
        assert_eq!(draft.email.subject, "Billing Errors on Account - Acme");
        assert!(draft.clipboard_text.starts_with("Subject: Billing Errors"));
        assert!(draft.mailto_link.starts_with("mailto:?subject="));
    }

    #[test]
    fn response_ranks_tips_and_picks_initial_page() {
        let response = AnalyzeResponse::from(report(json!({
            "errorAnalysis": {
                "likelihoodPct": 85,
                "suspectedIssues": [{"issue": "Meter misread", "pageNumber": 3, "pinX": 1, "pinY": 50}]
            },
            "savingsTips": [
                {"title": "Small", "action": "a", "estimatedMonthlySavings": 4},
                {"title": "Unknown", "action": "b"},
                {"title": "Large", "action": "c", "estimatedMonthlySavings": 25}
            ]
        })));
        assert!(response.suspicious);
        assert_eq!(response.initial_page, 3);
        let titles: Vec<&str> = response.ranked_tips.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Large", "Small", "Unknown"]);
        assert_eq!(response.record.savings_tips[0].title, "Small");
        assert_eq!(response.pins[0].display_position(), (3.0, 50.0));
        let pages: Vec<u32> = response.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(pages, vec![1, 3]);
    }

    #[test]
    fn no_issues_means_no_dispute_draft() {
        let response = AnalyzeResponse::from(report(json!({})));
        assert!(response.dispute_email.is_none());
        assert!(!response.suspicious);
        assert_eq!(response.initial_page, 1);
        let value = serde_json::to_value(&response).unwrap();
        assert!(value["disputeEmail"].is_null());
        assert_eq!(value["attempt"], "primary");
        assert_eq!(value["modelCalls"], 1);
    }

    #[test]
    fn document_request_mime_is_optional() {
        let req: DocumentRequest = serde_json::from_str(r#"{"file":"abc"}"#).unwrap();
        assert!(req.mime_type.is_empty());
        let req: DocumentRequest =
            serde_json::from_str(r#"{"file":"abc","mimeType":"image/png"}"#).unwrap();
        assert_eq!(req.mime_type, "image/png");
    }

    #[test]
    fn missing_key_fails_at_client_build() {
        let ctx = ApiContext::new(AppConfig::default());
        let result = (ctx.llm_factory())();
        assert!(matches!(result, Err(AnalysisError::MissingApiKey)));
    }
}
