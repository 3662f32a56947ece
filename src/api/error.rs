//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::analysis::AnalysisError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    /// Last raw model answer, only for terminal analysis failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Analysis failed: {message}")]
    AnalysisFailed {
        message: String,
        raw: Option<String>,
    },
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("Model timed out after {0}s")]
    ModelTimeout(u64),
    #[error("Model API key not configured")]
    NotConfigured,
    #[error("Analysis cancelled")]
    Cancelled,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, raw) = match self {
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail, None)
            }
            ApiError::AnalysisFailed { message, raw } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "ANALYSIS_FAILED",
                message,
                raw,
            ),
            ApiError::ModelUnavailable(detail) => {
                tracing::warn!(detail = %detail, "Model provider unavailable");
                (
                    StatusCode::BAD_GATEWAY,
                    "MODEL_UNAVAILABLE",
                    detail,
                    None,
                )
            }
            ApiError::ModelTimeout(secs) => (
                StatusCode::GATEWAY_TIMEOUT,
                "MODEL_TIMEOUT",
                format!("Model did not answer within {secs}s"),
                None,
            ),
            ApiError::NotConfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                "MODEL_NOT_CONFIGURED",
                "No model API key is configured on the server".to_string(),
                None,
            ),
            ApiError::Cancelled => (
                StatusCode::CONFLICT,
                "CANCELLED",
                "Analysis was cancelled".to_string(),
                None,
            ),
            ApiError::Internal(detail) => {
                tracing::error!(detail = %detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message, raw },
        };
        (status, Json(body)).into_response()
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::UnsupportedMime(_)
            | AnalysisError::InvalidDocument(_)
            | AnalysisError::DocumentTooLarge(_)
            | AnalysisError::EmptyDocument => ApiError::BadRequest(err.to_string()),
            AnalysisError::Terminal { .. } => ApiError::AnalysisFailed {
                message: err.to_string(),
                raw: err.raw_response().map(String::from),
            },
            AnalysisError::Extraction(_) | AnalysisError::Parse(_) => ApiError::AnalysisFailed {
                message: err.to_string(),
                raw: None,
            },
            AnalysisError::Timeout(secs) => ApiError::ModelTimeout(secs),
            AnalysisError::MissingApiKey => ApiError::NotConfigured,
            AnalysisError::Cancelled => ApiError::Cancelled,
            e if e.is_transport() => ApiError::ModelUnavailable(e.to_string()),
            e => ApiError::Internal(e.to_string()),
        }
    }
}
