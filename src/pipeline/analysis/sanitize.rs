// Turn an untrusted parsed model answer into the canonical analysis record.
// Total: any JSON value yields a fully defaulted record, nothing here fails.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use super::normalize::{
    clamp_pct, normalize_bill_type, normalize_comparison, normalize_verdict, number_or_null,
    object_field, object_items, page_number, pin_coord, string_array, text_of, trimmed_or,
    trimmed_or_none,
};
use super::types::{
    AnalysisRecord, BillMetrics, Comparison, ErrorAnalysis, Issue, RegionalComparison,
    SavingsTip, MAX_REASONS, MAX_SAVINGS_TIPS, SUSPICIOUS_LIKELIHOOD_PCT,
};
use super::AnalysisError;

/// Shortest supplied dispute email that is kept as-is (characters, trimmed).
pub const MIN_DISPUTE_EMAIL_CHARS: usize = 20;

/// Substituted when a dispute email is required but the model gave nothing usable.
pub const DEFAULT_DISPUTE_LETTER: &str = "Dear Customer Service,\n\n\
I’m reaching out regarding my recent utility bill. I noticed charges and/or usage that appear \
unusual and I would appreciate a review of the bill for potential errors or miscalculations. \
Please provide an itemized explanation of any fees or adjustments, and let me know if a \
correction or credit is warranted.\n\n\
Thank you,\n[Your Name]\n[Address]\n[Account Number]";

const ISSUE_FALLBACK: &str = "Unspecified issue";
const EVIDENCE_FALLBACK: &str = "No evidence provided";
const TIP_TITLE_FALLBACK: &str = "Tip";
const AVERAGE_RANGE_FALLBACK: &str = "Unknown";
const EXPLANATION_FALLBACK: &str = "No comparison explanation provided.";

/// Sanitize a parsed model response into an [`AnalysisRecord`].
pub fn sanitize_analysis(raw: &Value) -> AnalysisRecord {
    // Step 1: sub-objects, empty when absent or mis-shaped
    let error_analysis = object_field(raw, "errorAnalysis");
    let regional = object_field(raw, "regionalComparison");

    // Step 2: suspected issues
    let suspected_issues: Vec<Issue> = object_items(error_analysis, "suspectedIssues")
        .into_iter()
        .map(sanitize_issue)
        .collect();

    // Step 3: savings tips (truncate first, then drop action-less tips)
    let savings_tips: Vec<SavingsTip> = match raw.as_object() {
        Some(root) => object_items(root, "savingsTips")
            .into_iter()
            .take(MAX_SAVINGS_TIPS)
            .map(sanitize_tip)
            .filter(|tip| !tip.action.is_empty())
            .collect(),
        None => vec![],
    };

    // Step 4: headline error analysis
    let likelihood_pct = clamp_pct(error_analysis.get("likelihoodPct"));
    let verdict = normalize_verdict(error_analysis.get("verdict"));
    let mut reasons = string_array(error_analysis.get("reasons"));
    reasons.truncate(MAX_REASONS);

    // Step 5: regional comparison
    let regional_comparison = sanitize_regional(regional);

    // Step 6: dispute email, decided from the already-normalized fields above
    let mock_email = resolve_mock_email(raw.get("mockEmail"), likelihood_pct, &suspected_issues);

    AnalysisRecord {
        error_analysis: ErrorAnalysis {
            likelihood_pct,
            verdict,
            reasons,
            suspected_issues,
        },
        mock_email,
        regional_comparison,
        savings_tips,
    }
}

fn sanitize_issue(item: &Map<String, Value>) -> Issue {
    Issue {
        issue: trimmed_or(item.get("issue"), ISSUE_FALLBACK),
        evidence: trimmed_or(item.get("evidence"), EVIDENCE_FALLBACK),
        amount: number_or_null(item.get("amount")),
        page_number: page_number(item.get("pageNumber")),
        pin_x: pin_coord(item.get("pinX")),
        pin_y: pin_coord(item.get("pinY")),
    }
}

fn sanitize_tip(item: &Map<String, Value>) -> SavingsTip {
    SavingsTip {
        title: trimmed_or(item.get("title"), TIP_TITLE_FALLBACK),
        action: trimmed_or(item.get("action"), ""),
        estimated_monthly_savings: number_or_null(item.get("estimatedMonthlySavings")),
        why_it_fits: trimmed_or(item.get("whyItFits"), ""),
        page_number: page_number(item.get("pageNumber")),
        pin_x: pin_coord(item.get("pinX")),
        pin_y: pin_coord(item.get("pinY")),
    }
}

fn sanitize_regional(regional: &Map<String, Value>) -> RegionalComparison {
    let comparison = normalize_comparison(regional.get("comparison"));
    let comparison_statement = trimmed_or_none(regional.get("comparisonStatement"))
        .unwrap_or_else(|| default_comparison_statement(comparison).to_string());

    RegionalComparison {
        provider_name: trimmed_or_none(regional.get("providerName")),
        provider_email: trimmed_or_none(regional.get("providerEmail")),
        bill_type: normalize_bill_type(regional.get("billType")),
        total_amount: number_or_null(regional.get("totalAmount")),
        comparison,
        estimated_average_range: trimmed_or(
            regional.get("estimatedAverageRange"),
            AVERAGE_RANGE_FALLBACK,
        ),
        explanation: trimmed_or(regional.get("explanation"), EXPLANATION_FALLBACK),
        estimated_annual_savings: number_or_null(regional.get("estimatedAnnualSavings")),
        annual_co2_reduction_tons: number_or_null(regional.get("annualCO2ReductionTons")),
        comparison_statement,
    }
}

fn default_comparison_statement(comparison: Comparison) -> &'static str {
    match comparison {
        Comparison::Above => "Above average for your region",
        Comparison::Below | Comparison::AboutAverage => "About average for your region",
    }
}

/// A dispute email exists iff the bill is suspicious or has suspected issues.
pub fn dispute_email_required(likelihood_pct: u8, suspected_issues: &[Issue]) -> bool {
    likelihood_pct >= SUSPICIOUS_LIKELIHOOD_PCT || !suspected_issues.is_empty()
}

fn resolve_mock_email(
    supplied: Option<&Value>,
    likelihood_pct: u8,
    suspected_issues: &[Issue],
) -> Option<String> {
    if !dispute_email_required(likelihood_pct, suspected_issues) {
        return None;
    }

    let supplied = match supplied {
        None | Some(Value::Null) => None,
        Some(v) => Some(text_of(Some(v))),
    };

    match supplied {
        Some(text) if text.trim().chars().count() >= MIN_DISPUTE_EMAIL_CHARS => Some(text),
        _ => Some(DEFAULT_DISPUTE_LETTER.to_string()),
    }
}

/// Coerce a parsed metrics response. Unlike the analysis record, a top-level
/// value that is not an object is a hard failure.
pub fn sanitize_metrics(raw: &Value) -> Result<BillMetrics, AnalysisError> {
    let map = raw
        .as_object()
        .ok_or_else(|| AnalysisError::Parse("metrics response is not a JSON object".into()))?;

    Ok(BillMetrics {
        bill_month: trimmed_or_none(map.get("billMonth")).filter(|m| is_bill_month(m)),
        bill_type: normalize_bill_type(map.get("billType")),
        provider: trimmed_or_none(map.get("provider")),
        total_amount: number_or_null(map.get("totalAmount")),
        usage_amount: number_or_null(map.get("usageAmount")),
        usage_unit: trimmed_or_none(map.get("usageUnit"))
            .filter(|u| !u.eq_ignore_ascii_case("unknown") && !u.eq_ignore_ascii_case("null")),
    })
}

/// `YYYY-MM` with a real month.
fn is_bill_month(text: &str) -> bool {
    text.len() == 7 && NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d").is_ok()
}
