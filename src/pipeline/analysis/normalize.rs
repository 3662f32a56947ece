//! Field normalizers: total functions from untrusted JSON to typed values.
//!
//! `serde_json::Value` is the untrusted sum type (null / bool / number / string /
//! array / object). Every function here takes `Option<&Value>`. `None` means the
//! key was absent. They never fail; each has a deterministic default.

use serde_json::Value;

use super::types::{BillType, Comparison, Verdict};

/// Default pin coordinate (page centre, in percent).
pub const DEFAULT_PIN_COORD: f64 = 50.0;

/// Default page for issues and tips.
pub const DEFAULT_PAGE_NUMBER: u32 = 1;

/// Substring table for bill types, checked in order.
const BILL_TYPE_TOKENS: &[(&str, BillType)] = &[
    ("water", BillType::Water),
    ("electric", BillType::Electric),
    ("electricity", BillType::Electric),
    ("gas", BillType::Gas),
    ("internet", BillType::Internet),
];

const COMPARISON_TOKENS: &[(&str, Comparison)] = &[
    ("below", Comparison::Below),
    ("above", Comparison::Above),
];

/// Textual form of a scalar. Containers and null read as empty.
pub fn text_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Numeric form of a value; NaN when there is none.
pub fn number_of(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::Bool(true)) => 1.0,
        Some(Value::Bool(false)) | Some(Value::Null) => 0.0,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                f64::NAN
            } else {
                trimmed.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        _ => f64::NAN,
    }
}

/// Round and clamp to an integer percentage; non-finite or missing is 0.
pub fn clamp_pct(value: Option<&Value>) -> u8 {
    let n = number_of(value);
    if !n.is_finite() {
        return 0;
    }
    n.round().clamp(0.0, 100.0) as u8
}

/// Lower-case substring match against a priority-ordered table.
pub fn match_enum<T: Copy>(value: Option<&Value>, table: &[(&str, T)], default: T) -> T {
    let text = text_of(value).to_lowercase();
    table
        .iter()
        .find(|(needle, _)| text.contains(needle))
        .map(|(_, member)| *member)
        .unwrap_or(default)
}

pub fn normalize_bill_type(value: Option<&Value>) -> BillType {
    match_enum(value, BILL_TYPE_TOKENS, BillType::Unknown)
}

pub fn normalize_comparison(value: Option<&Value>) -> Comparison {
    match_enum(value, COMPARISON_TOKENS, Comparison::AboutAverage)
}

/// Verdicts match whole tokens only: "highly unlikely" must not read as high.
pub fn normalize_verdict(value: Option<&Value>) -> Verdict {
    match text_of(value).trim().to_lowercase().as_str() {
        "high" => Verdict::High,
        "medium" => Verdict::Medium,
        _ => Verdict::Low,
    }
}

/// Missing or null is `None`; otherwise numeric coercion, `None` if not finite.
pub fn number_or_null(value: Option<&Value>) -> Option<f64> {
    match value {
        None | Some(Value::Null) => None,
        Some(v) => {
            let n = number_of(Some(v));
            n.is_finite().then_some(n)
        }
    }
}

/// String elements only, trimmed, empties dropped, order kept.
pub fn string_array(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => vec![],
    }
}

pub fn trimmed_or(value: Option<&Value>, default: &str) -> String {
    trimmed_or_none(value).unwrap_or_else(|| default.to_string())
}

pub fn trimmed_or_none(value: Option<&Value>) -> Option<String> {
    let text = text_of(value);
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Positive page number; anything unusable is page 1.
pub fn page_number(value: Option<&Value>) -> u32 {
    match value {
        None | Some(Value::Null) => DEFAULT_PAGE_NUMBER,
        Some(v) => {
            let n = number_of(Some(v));
            if !n.is_finite() || n < 1.0 {
                DEFAULT_PAGE_NUMBER
            } else {
                n.trunc() as u32
            }
        }
    }
}

/// Pin coordinate in percent. Stored unclamped; display clamps.
pub fn pin_coord(value: Option<&Value>) -> f64 {
    match value {
        None | Some(Value::Null) => DEFAULT_PIN_COORD,
        Some(v) => {
            let n = number_of(Some(v));
            if n.is_finite() {
                n
            } else {
                DEFAULT_PIN_COORD
            }
        }
    }
}

/// Sub-object by key; absent or non-object reads as an empty object.
pub fn object_field<'a>(value: &'a Value, key: &str) -> &'a serde_json::Map<String, Value> {
    static EMPTY: std::sync::LazyLock<serde_json::Map<String, Value>> =
        std::sync::LazyLock::new(serde_json::Map::new);
    value.get(key).and_then(Value::as_object).unwrap_or(&EMPTY)
}

/// Object elements of an array field; anything else reads as empty.
pub fn object_items<'a>(
    map: &'a serde_json::Map<String, Value>,
    key: &str,
) -> Vec<&'a serde_json::Map<String, Value>> {
    match map.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
        _ => vec![],
    }
}
