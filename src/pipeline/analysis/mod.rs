pub mod types;
pub mod document;
pub mod extract;
pub mod normalize;
pub mod sanitize;
pub mod prompt;
pub mod gemini;
pub mod lifecycle;
pub mod orchestrator;

pub use types::*;
pub use document::*;
pub use extract::*;
pub use sanitize::*;
pub use prompt::*;
pub use gemini::*;
pub use lifecycle::*;
pub use orchestrator::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("No JSON object found in model output: {0}")]
    Extraction(String),

    #[error("Model output is not valid JSON: {0}")]
    Parse(String),

    #[error("Repair attempt failed: {source}")]
    Terminal {
        raw_response: String,
        #[source]
        source: Box<AnalysisError>,
    },

    #[error("Model API is not reachable at {0}")]
    Connection(String),

    #[error("Model API rejected the credentials (status {0})")]
    Auth(u16),

    #[error("Model API returned error (status {status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Malformed model API response: {0}")]
    UpstreamFormat(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Unsupported document type: {0}")]
    UnsupportedMime(String),

    #[error("Invalid document payload: {0}")]
    InvalidDocument(String),

    #[error("Document too large ({0} bytes), maximum is 20 MB")]
    DocumentTooLarge(usize),

    #[error("Document is empty")]
    EmptyDocument,

    #[error("No model API key configured")]
    MissingApiKey,

    #[error("Analysis was cancelled")]
    Cancelled,

    #[error("Analysis lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Analysis task failed: {0}")]
    TaskFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalysisError {
    /// Errors that a second, stricter prompt can plausibly fix.
    pub fn is_repairable(&self) -> bool {
        matches!(self, AnalysisError::Extraction(_) | AnalysisError::Parse(_))
    }

    /// Failures talking to the model provider, as opposed to failures in its answer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AnalysisError::Connection(_)
                | AnalysisError::Auth(_)
                | AnalysisError::Upstream { .. }
                | AnalysisError::UpstreamFormat(_)
                | AnalysisError::Timeout(_)
                | AnalysisError::HttpClient(_)
        )
    }

    /// Raw model text attached to a terminal failure, for diagnostics.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            AnalysisError::Terminal { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}
