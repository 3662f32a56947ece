use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::document::DocumentPayload;
use super::extract::parse_model_json;
use super::lifecycle::{AnalysisEvent, LifecycleSink};
use super::prompt::{build_analysis_prompt, build_repair_prompt, METRICS_PROMPT};
use super::sanitize::{sanitize_analysis, sanitize_metrics};
use super::types::{AnalysisRecord, BillMetrics, LlmClient};
use super::AnalysisError;

/// Which model call produced (or failed to produce) the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Attempt {
    Primary,
    Repair,
}

impl Attempt {
    pub fn prompt(&self) -> String {
        match self {
            Self::Primary => build_analysis_prompt(),
            Self::Repair => build_repair_prompt(),
        }
    }

    /// The attempt to fall back to after a malformed answer. Repair is final.
    pub fn next(&self) -> Option<Attempt> {
        match self {
            Self::Primary => Some(Self::Repair),
            Self::Repair => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Repair => "repair",
        }
    }
}

/// Successful analysis plus how it was obtained.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub analysis_id: Uuid,
    pub record: AnalysisRecord,
    pub attempt: Attempt,
    pub model_calls: u8,
}

/// Runs the extract → parse → sanitize pipeline against the hosted model,
/// with a single repair retry on malformed output.
pub struct BillAnalyzer {
    llm: Arc<dyn LlmClient>,
    sink: LifecycleSink,
    cancel: Arc<AtomicBool>,
}

impl BillAnalyzer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            sink: LifecycleSink::noop(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_sink(mut self, sink: LifecycleSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    fn check_cancelled(&self) -> Result<(), AnalysisError> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(AnalysisError::Cancelled);
        }
        Ok(())
    }

    /// Analyze one document. Returns a canonical record or a typed failure,
    /// after at most two model calls.
    pub fn analyze(&self, document: &DocumentPayload) -> Result<AnalysisReport, AnalysisError> {
        let analysis_id = Uuid::new_v4();
        let _span = tracing::info_span!(
            "analyze_bill",
            analysis_id = %analysis_id,
            model = %self.llm.model_name(),
            mime = %document.mime_type(),
            size = document.byte_len(),
        )
        .entered();

        let result = self.run_attempts(analysis_id, document);
        match &result {
            Ok(report) => {
                tracing::info!(
                    attempt = report.attempt.as_str(),
                    model_calls = report.model_calls,
                    likelihood_pct = report.record.error_analysis.likelihood_pct,
                    issues = report.record.error_analysis.suspected_issues.len(),
                    tips = report.record.savings_tips.len(),
                    "Bill analysis complete"
                );
                self.sink.emit(AnalysisEvent::Completed {
                    attempt: report.attempt,
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "Bill analysis failed");
                self.sink.emit(AnalysisEvent::Failed {
                    message: e.to_string(),
                });
            }
        }
        result
    }

    fn run_attempts(
        &self,
        analysis_id: Uuid,
        document: &DocumentPayload,
    ) -> Result<AnalysisReport, AnalysisError> {
        let mut attempt = Attempt::Primary;
        let mut model_calls: u8 = 0;
        self.sink.emit(AnalysisEvent::PrimaryStarted);

        loop {
            self.check_cancelled()?;

            // Transport failures propagate without a repair attempt.
            let raw = self.llm.generate(&attempt.prompt(), document)?;
            model_calls += 1;

            match parse_model_json(&raw) {
                Ok(value) => {
                    return Ok(AnalysisReport {
                        analysis_id,
                        record: sanitize_analysis(&value),
                        attempt,
                        model_calls,
                    });
                }
                Err(e) if e.is_repairable() => match attempt.next() {
                    Some(next) => {
                        tracing::warn!(
                            attempt = attempt.as_str(),
                            error = %e,
                            response_len = raw.len(),
                            "Model response unusable, retrying with repair prompt"
                        );
                        self.sink.emit(AnalysisEvent::RepairStarted {
                            reason: e.to_string(),
                        });
                        attempt = next;
                    }
                    None => {
                        return Err(AnalysisError::Terminal {
                            raw_response: raw,
                            source: Box::new(e),
                        });
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Metrics-only extraction: one call, no repair, parse failure is fatal.
    pub fn extract_metrics(&self, document: &DocumentPayload) -> Result<BillMetrics, AnalysisError> {
        let _span = tracing::info_span!(
            "extract_bill_metrics",
            model = %self.llm.model_name(),
            mime = %document.mime_type(),
            size = document.byte_len(),
        )
        .entered();
        self.check_cancelled()?;

        let raw = self.llm.generate(METRICS_PROMPT, document)?;
        let value = parse_model_json(&raw)?;
        let metrics = sanitize_metrics(&value)?;

        tracing::info!(
            bill_type = %metrics.bill_type,
            has_month = metrics.bill_month.is_some(),
            "Bill metrics extracted"
        );
        Ok(metrics)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::pipeline::analysis::lifecycle::{AnalysisPhase, AnalysisSession};
    use crate::pipeline::analysis::sanitize::DEFAULT_DISPUTE_LETTER;
    use crate::pipeline::analysis::types::BillType;

    /// Replays scripted responses and records the prompts it was sent.
    pub(crate) struct MockLlmClient {
        responses: Mutex<VecDeque<Result<String, AnalysisError>>>,
        prompts: Mutex<Vec<String>>,
        delay: Option<std::time::Duration>,
    }

    impl MockLlmClient {
        pub(crate) fn new(responses: Vec<Result<String, AnalysisError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                prompts: Mutex::new(Vec::new()),
                delay: None,
            }
        }

        /// Each call blocks this long before answering.
        pub(crate) fn with_delay(mut self, delay: std::time::Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub(crate) fn replying(texts: &[&str]) -> Self {
            Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
        }

        pub(crate) fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        pub(crate) fn prompt(&self, index: usize) -> String {
            self.prompts.lock().unwrap()[index].clone()
        }
    }

    impl LlmClient for MockLlmClient {
        fn generate(&self, prompt: &str, _document: &DocumentPayload) -> Result<String, AnalysisError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AnalysisError::HttpClient("no scripted response".into())))
        }

        fn model_name(&self) -> &str {
            "mock-model"
        }
    }

    pub(crate) fn sample_document() -> DocumentPayload {
        DocumentPayload::from_bytes(b"%PDF-1.4 fake bill", "application/pdf").unwrap()
    }

    pub(crate) const VALID_RESPONSE: &str = r#"```json
{"errorAnalysis":{"likelihoodPct":72,"verdict":"high","reasons":["math error"],"suspectedIssues":[{"issue":"double charge","evidence":"line 3","amount":40,"pageNumber":1,"pinX":80,"pinY":20}]},"mockEmail":null,"regionalComparison":{"providerName":"Acme Power","providerEmail":null,"billType":"electric","totalAmount":200,"comparison":"above","estimatedAverageRange":"$150-180","explanation":"higher usage","estimatedAnnualSavings":120,"annualCO2ReductionTons":1.2,"comparisonStatement":"15% above average"},"savingsTips":[{"title":"Shift laundry","action":"Run after 9pm","estimatedMonthlySavings":10,"whyItFits":"off-peak rates","pageNumber":1,"pinX":50,"pinY":50}]}
```"#;

    #[test]
    fn primary_success_makes_one_call() {
        let mock = Arc::new(MockLlmClient::replying(&[VALID_RESPONSE]));
        let analyzer = BillAnalyzer::new(mock.clone());

        let report = analyzer.analyze(&sample_document()).unwrap();
        assert_eq!(report.attempt, Attempt::Primary);
        assert_eq!(report.model_calls, 1);
        assert_eq!(mock.calls(), 1);
        assert_eq!(report.record.regional_comparison.bill_type, BillType::Electric);
        assert_eq!(report.record.mock_email.as_deref(), Some(DEFAULT_DISPUTE_LETTER));
    }

    #[test]
    fn prose_then_valid_json_uses_repair() {
        let mock = Arc::new(MockLlmClient::replying(&[
            "I'm sorry, I can't read that bill clearly.",
            VALID_RESPONSE,
        ]));
        let analyzer = BillAnalyzer::new(mock.clone());

        let report = analyzer.analyze(&sample_document()).unwrap();
        assert_eq!(report.attempt, Attempt::Repair);
        assert_eq!(report.model_calls, 2);
        assert!(mock.prompt(0).contains("RULES:"));
        assert!(mock.prompt(1).contains("previous response was NOT valid JSON"));
    }

    #[test]
    fn invalid_json_triggers_repair() {
        let mock = Arc::new(MockLlmClient::replying(&["{not: json,}", VALID_RESPONSE]));
        let report = BillAnalyzer::new(mock.clone())
            .analyze(&sample_document())
            .unwrap();
        assert_eq!(report.attempt, Attempt::Repair);
    }

    #[test]
    fn repair_failure_is_terminal_with_raw_text() {
        let mock = Arc::new(MockLlmClient::replying(&[
            "No braces here.",
            "Still nothing structured.",
        ]));
        let err = BillAnalyzer::new(mock.clone())
            .analyze(&sample_document())
            .unwrap_err();

        assert_eq!(mock.calls(), 2);
        match err {
            AnalysisError::Terminal {
                raw_response,
                source,
            } => {
                assert_eq!(raw_response, "Still nothing structured.");
                assert!(matches!(*source, AnalysisError::Extraction(_)));
            }
            other => panic!("expected terminal error, got {other:?}"),
        }
    }

    #[test]
    fn never_more_than_two_calls() {
        let mock = Arc::new(MockLlmClient::replying(&["x", "y", "z", VALID_RESPONSE]));
        let result = BillAnalyzer::new(mock.clone()).analyze(&sample_document());
        assert!(result.is_err());
        assert_eq!(mock.calls(), 2);
    }

    #[test]
    fn timeout_is_not_retried() {
        let mock = Arc::new(MockLlmClient::new(vec![
            Err(AnalysisError::Timeout(120)),
            Ok(VALID_RESPONSE.to_string()),
        ]));
        let err = BillAnalyzer::new(mock.clone())
            .analyze(&sample_document())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Timeout(120)));
        assert_eq!(mock.calls(), 1);
    }

    #[test]
    fn transport_error_on_repair_propagates_unwrapped() {
        let mock = Arc::new(MockLlmClient::new(vec![
            Ok("garbage".to_string()),
            Err(AnalysisError::Auth(401)),
        ]));
        let err = BillAnalyzer::new(mock)
            .analyze(&sample_document())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Auth(401)));
    }

    #[test]
    fn cancelled_before_first_call() {
        let mock = Arc::new(MockLlmClient::replying(&[VALID_RESPONSE]));
        let cancel = Arc::new(AtomicBool::new(true));
        let err = BillAnalyzer::new(mock.clone())
            .with_cancel_flag(cancel)
            .analyze(&sample_document())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Cancelled));
        assert_eq!(mock.calls(), 0);
    }

    #[test]
    fn lifecycle_follows_repair_path() {
        let mut session = AnalysisSession::new();
        session.submit().unwrap();
        let mock = Arc::new(MockLlmClient::replying(&["prose", VALID_RESPONSE]));
        BillAnalyzer::new(mock)
            .with_sink(session.sink())
            .analyze(&sample_document())
            .unwrap();
        assert_eq!(session.drain().unwrap(), AnalysisPhase::Succeeded);
    }

    #[tokio::test]
    async fn session_run_tracks_terminal_failure() {
        let mut session = AnalysisSession::new();
        let mock = Arc::new(MockLlmClient::replying(&["prose", "more prose"]));
        let result = session
            .run(move |sink, cancel| {
                BillAnalyzer::new(mock)
                    .with_sink(sink)
                    .with_cancel_flag(cancel)
                    .analyze(&sample_document())
            })
            .await;
        assert!(matches!(result, Err(AnalysisError::Terminal { .. })));
        assert_eq!(session.phase(), AnalysisPhase::Failed);
    }

    #[tokio::test]
    async fn abandoned_run_skips_repair_call() {
        let mock = Arc::new(
            MockLlmClient::replying(&["not json", VALID_RESPONSE])
                .with_delay(std::time::Duration::from_millis(200)),
        );
        let job_mock = Arc::clone(&mock);
        let mut session = AnalysisSession::new();

        let run = session.run(move |sink, cancel| {
            BillAnalyzer::new(job_mock)
                .with_sink(sink)
                .with_cancel_flag(cancel)
                .analyze(&sample_document())
        });
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(50), run).await;
        assert!(timed_out.is_err());
        drop(session);

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert_eq!(mock.calls(), 1);
    }

    #[test]
    fn empty_reply_gets_repair_attempt() {
        let mock = Arc::new(MockLlmClient::replying(&["", VALID_RESPONSE]));
        let report = BillAnalyzer::new(mock.clone())
            .analyze(&sample_document())
            .unwrap();
        assert_eq!(report.attempt, Attempt::Repair);
        assert_eq!(mock.calls(), 2);
    }

    #[test]
    fn metrics_single_call_no_retry() {
        let mock = Arc::new(MockLlmClient::replying(&[
            r#"{"billMonth":"2024-05","billType":"water","provider":"City Water","totalAmount":61.2,"usageAmount":4200,"usageUnit":"gallons"}"#,
        ]));
        let metrics = BillAnalyzer::new(mock.clone())
            .extract_metrics(&sample_document())
            .unwrap();
        assert_eq!(metrics.bill_type, BillType::Water);
        assert_eq!(metrics.usage_unit.as_deref(), Some("gallons"));
        assert_eq!(mock.calls(), 1);
        assert_eq!(mock.prompt(0), METRICS_PROMPT);
    }

    #[test]
    fn metrics_parse_failure_is_fatal() {
        let mock = Arc::new(MockLlmClient::replying(&["no json", VALID_RESPONSE]));
        let err = BillAnalyzer::new(mock.clone())
            .extract_metrics(&sample_document())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Extraction(_)));
        assert_eq!(mock.calls(), 1);
    }
}
