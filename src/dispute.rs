//! Dispute email draft built from the suspected issues, with clipboard and
//! `mailto:` exports.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::pipeline::analysis::{AnalysisRecord, Issue};

/// One plain address, nothing a `mailto:` URL would read as extra fields.
static EMAIL_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap());

const PROVIDER_FALLBACK: &str = "Utility Provider";

const OPENING: &str = "I am writing to report the following billing errors found on my recent \
utility bill. I kindly request a review and correction of these charges.";

const CLOSING: &str = "I would appreciate a prompt resolution and a corrected bill. Please \
contact me at your earliest convenience to discuss these discrepancies.\n\n\
Thank you for your attention to this matter.\n\n\
Sincerely,\n[Your Name]\n[Your Account Number]";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeEmail {
    /// Provider customer-service address, when the bill shows one.
    pub to: Option<String>,
    pub subject: String,
    pub body: String,
}

/// Draft plus its ready-made exports, as sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeDraft {
    #[serde(flatten)]
    pub email: DisputeEmail,
    pub mailto_link: String,
    pub clipboard_text: String,
}

impl From<DisputeEmail> for DisputeDraft {
    fn from(email: DisputeEmail) -> Self {
        Self {
            mailto_link: email.mailto_link(),
            clipboard_text: email.clipboard_text(),
            email,
        }
    }
}

impl DisputeEmail {
    pub fn from_record(record: &AnalysisRecord) -> Self {
        let comparison = &record.regional_comparison;
        Self::compose(
            comparison.provider_name.as_deref(),
            comparison.provider_email.as_deref(),
            &record.error_analysis.suspected_issues,
        )
    }

    pub fn compose(provider: Option<&str>, to: Option<&str>, issues: &[Issue]) -> Self {
        let provider = provider
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(PROVIDER_FALLBACK);

        let listed = issues
            .iter()
            .zip(1..)
            .map(|(issue, n)| format_issue(n, issue))
            .collect::<Vec<_>>()
            .join("\n\n");

        Self {
            to: to
                .map(str::trim)
                .filter(|t| EMAIL_ADDRESS.is_match(t))
                .map(String::from),
            subject: format!("Billing Errors on Account - {provider}"),
            body: format!("Dear {provider} Customer Service,\n\n{OPENING}\n\n{listed}\n\n{CLOSING}"),
        }
    }

    /// Plain-text form for pasting into a mail client.
    pub fn clipboard_text(&self) -> String {
        format!("Subject: {}\n\n{}", self.subject, self.body)
    }

    pub fn mailto_link(&self) -> String {
        format!(
            "mailto:{}?subject={}&body={}",
            self.to.as_deref().unwrap_or_default(),
            urlencoding::encode(&self.subject),
            urlencoding::encode(&self.body)
        )
    }
}

fn format_issue(n: usize, issue: &Issue) -> String {
    let amount = match issue.amount {
        Some(amount) if amount != 0.0 => format!(" (${amount:.2})"),
        _ => String::new(),
    };
    format!("{n}. {}{amount}\n   {}", issue.issue, issue.evidence)
}
