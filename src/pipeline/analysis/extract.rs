// Isolate the JSON object in free-form model output.
// Heuristic, not a tokenizer: the first `{` and the last `}` are assumed to
// delimit the answer, so prose carrying its own braces can corrupt the slice.

use std::sync::LazyLock;

use regex::Regex;

use super::AnalysisError;

static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)```json\s*").unwrap());
static BARE_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```\s*").unwrap());

/// Remove fenced code-block markers, with or without a `json` language tag.
pub fn strip_code_fences(text: &str) -> String {
    let without_tagged = JSON_FENCE.replace_all(text, "");
    BARE_FENCE.replace_all(&without_tagged, "").trim().to_string()
}

/// Return the substring from the first `{` to the last `}` inclusive, after
/// fence stripping.
pub fn extract_json_object(text: &str) -> Result<String, AnalysisError> {
    let cleaned = strip_code_fences(text);

    let first = cleaned
        .find('{')
        .ok_or_else(|| AnalysisError::Extraction("no opening brace".into()))?;
    let last = cleaned
        .rfind('}')
        .ok_or_else(|| AnalysisError::Extraction("no closing brace".into()))?;
    if last <= first {
        return Err(AnalysisError::Extraction(
            "closing brace precedes opening brace".into(),
        ));
    }

    Ok(cleaned[first..=last].to_string())
}

/// Extract and JSON-parse in one step.
pub fn parse_model_json(text: &str) -> Result<serde_json::Value, AnalysisError> {
    let json_text = extract_json_object(text)?;
    serde_json::from_str(&json_text).map_err(|e| AnalysisError::Parse(e.to_string()))
}
