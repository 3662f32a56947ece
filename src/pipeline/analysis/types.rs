use serde::{Deserialize, Serialize};

use super::document::DocumentPayload;
use super::AnalysisError;

/// Likelihood at or above which a bill counts as suspicious and needs a dispute email.
pub const SUSPICIOUS_LIKELIHOOD_PCT: u8 = 50;

/// Maximum number of savings tips kept after sanitization.
pub const MAX_SAVINGS_TIPS: usize = 5;

/// Maximum number of error-analysis reasons kept after sanitization.
pub const MAX_REASONS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillType {
    Water,
    Electric,
    Gas,
    Internet,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Below,
    AboutAverage,
    Above,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl BillType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Water => "water",
            Self::Electric => "electric",
            Self::Gas => "gas",
            Self::Internet => "internet",
            Self::Unknown => "unknown",
        }
    }
}

impl Comparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Below => "below",
            Self::AboutAverage => "about_average",
            Self::Above => "above",
        }
    }
}

impl std::fmt::Display for BillType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical, UI-ready result of sanitizing one model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub error_analysis: ErrorAnalysis,
    pub mock_email: Option<String>,
    pub regional_comparison: RegionalComparison,
    pub savings_tips: Vec<SavingsTip>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorAnalysis {
    pub likelihood_pct: u8,
    pub verdict: Verdict,
    pub reasons: Vec<String>,
    pub suspected_issues: Vec<Issue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub issue: String,
    pub evidence: String,
    pub amount: Option<f64>,
    pub page_number: u32,
    /// Percent of page width, nominally 0–100.
    pub pin_x: f64,
    /// Percent of page height, nominally 0–100.
    pub pin_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionalComparison {
    pub provider_name: Option<String>,
    pub provider_email: Option<String>,
    pub bill_type: BillType,
    pub total_amount: Option<f64>,
    pub comparison: Comparison,
    pub estimated_average_range: String,
    pub explanation: String,
    pub estimated_annual_savings: Option<f64>,
    #[serde(rename = "annualCO2ReductionTons")]
    pub annual_co2_reduction_tons: Option<f64>,
    pub comparison_statement: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsTip {
    pub title: String,
    pub action: String,
    pub estimated_monthly_savings: Option<f64>,
    pub why_it_fits: String,
    pub page_number: u32,
    pub pin_x: f64,
    pub pin_y: f64,
}

impl AnalysisRecord {
    pub fn is_suspicious(&self) -> bool {
        self.error_analysis.likelihood_pct >= SUSPICIOUS_LIKELIHOOD_PCT
    }

    /// Tips ordered by estimated monthly savings, highest first; tips without an
    /// estimate go last. Ties keep record order.
    pub fn tips_by_savings(&self) -> Vec<&SavingsTip> {
        let mut tips: Vec<&SavingsTip> = self.savings_tips.iter().collect();
        tips.sort_by(|a, b| {
            let a = a.estimated_monthly_savings.unwrap_or(f64::NEG_INFINITY);
            let b = b.estimated_monthly_savings.unwrap_or(f64::NEG_INFINITY);
            b.total_cmp(&a)
        });
        tips
    }
}

/// Smaller record from the metrics-only extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillMetrics {
    /// `YYYY-MM`
    pub bill_month: Option<String>,
    pub bill_type: BillType,
    pub provider: Option<String>,
    pub total_amount: Option<f64>,
    pub usage_amount: Option<f64>,
    pub usage_unit: Option<String>,
}

/// Hosted model abstraction (allows mocking).
///
/// One call sends one instruction plus the attached document and returns the
/// model's text. No structure is promised.
pub trait LlmClient: Send + Sync {
    fn generate(&self, prompt: &str, document: &DocumentPayload) -> Result<String, AnalysisError>;

    fn model_name(&self) -> &str;
}
