use serde::{Deserialize, Serialize};

use super::document::DocumentPayload;
use super::types::LlmClient;
use super::AnalysisError;

/// Default Generative Language API endpoint.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Default model for bill analysis.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Gemini `generateContent` client with an inline document part.
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout_secs: u64,
    ) -> Result<Self, AnalysisError> {
        if api_key.trim().is_empty() {
            return Err(AnalysisError::MissingApiKey);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AnalysisError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

/// Request body for `models/{model}:generateContent`
#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
struct InlineData<'a> {
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
    data: &'a str,
}

/// Response body from `generateContent`
#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

fn build_request<'a>(prompt: &'a str, document: &'a DocumentPayload) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![
                Part::Text { text: prompt },
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: document.mime_type(),
                        data: document.base64_data(),
                    },
                },
            ],
        }],
    }
}

/// Concatenate the text parts of the first candidate. Blank text is
/// returned as-is and left to extraction; only a missing candidate fails here.
fn response_text(parsed: GenerateContentResponse) -> Result<String, AnalysisError> {
    let candidate = parsed.candidates.into_iter().next().ok_or_else(|| {
        AnalysisError::UpstreamFormat("response has no candidates".into())
    })?;

    Ok(candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default())
}

fn status_error(status: u16, body: String) -> AnalysisError {
    match status {
        401 | 403 => AnalysisError::Auth(status),
        _ => AnalysisError::Upstream { status, body },
    }
}

impl LlmClient for GeminiClient {
    fn generate(&self, prompt: &str, document: &DocumentPayload) -> Result<String, AnalysisError> {
        let body = build_request(prompt, document);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    AnalysisError::Connection(self.base_url.clone())
                } else {
                    AnalysisError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(status_error(status.as_u16(), body));
        }

        let parsed: GenerateContentResponse = response.json().map_err(|e| {
            if e.is_timeout() {
                AnalysisError::Timeout(self.timeout_secs)
            } else {
                AnalysisError::UpstreamFormat(e.to_string())
            }
        })?;

        response_text(parsed)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
