/// Output schema shared by the primary and repair prompts.
const ANALYSIS_SCHEMA: &str = r#"{
  "errorAnalysis": {
    "likelihoodPct": number,
    "verdict": "low" | "medium" | "high",
    "reasons": string[],
    "suspectedIssues": [
      {
        "issue": string, "evidence": string, "amount": number | null,
        "pageNumber": number, "pinX": number (0-100), "pinY": number (0-100)
      }
    ]
  },
  "mockEmail": string | null,
  "regionalComparison": {
    "providerName": string | null,
    "providerEmail": string | null,
    "billType": "water" | "electric" | "gas" | "internet" | "unknown",
    "totalAmount": number | null,
    "comparison": "below" | "about_average" | "above",
    "estimatedAverageRange": string,
    "explanation": string,
    "estimatedAnnualSavings": number | null,
    "annualCO2ReductionTons": number | null,
    "comparisonStatement": string
  },
  "savingsTips": [
    {
      "title": string, "action": string, "estimatedMonthlySavings": number | null, "whyItFits": string,
      "pageNumber": number, "pinX": number (0-100), "pinY": number (0-100)
    }
  ]
}"#;

const ANALYSIS_PREAMBLE: &str = "\
You are an expert utility bill auditor and sustainability consultant.

Analyze the attached utility bill image/PDF.

IMPORTANT:
- First, identify the service ZIP code from the bill (service address / mailing address). \
If missing or unreadable, use \"unknown\".

Return ONLY a valid JSON object matching EXACTLY the schema below (no extra keys):
";

const ANALYSIS_RULES: &str = "\
RULES:
- likelihoodPct is the probability (0-100) that this bill contains an error or suspicious charge based on what you can see.
- If likelihoodPct >= 50 OR suspectedIssues has at least 1 item, mockEmail MUST be a complete dispute email. Otherwise null.
- providerName is the full name of the utility provider (e.g. Pacific Gas & Electric). providerEmail is the customer service email if found on the bill, or null.
- regionalComparison MUST be based on the ZIP code found on the bill. If ZIP is unknown, say it is an estimate and use a broad average range.
- estimatedAnnualSavings is the TOTAL expected annual savings if ALL savingsTips are implemented.
- annualCO2ReductionTons is the TOTAL expected annual CO2 reduction in tons (e.g. 6.5) if eco-friendly tips are followed.
- comparisonStatement should be a VERY brief comparison (max 6 words) like \"12% above Northern California average\" or \"About average for Miami\".
- savingsTips MUST be based on billType and the regionalComparison outcome (if above average, focus on reducing the main driver).
- savingsTips must contain 3 to 5 items.
- Output ONLY the JSON. No markdown. No commentary.
- For the (pinX, pinY) coordinates, choose a location in the WHITESPACE or MARGIN near the relevant text. \
Do NOT place the pin directly on top of the text; offset it slightly so the numbered marker does not cover any letters or numbers.
";

const REPAIR_PREAMBLE: &str = "\
Your previous response was NOT valid JSON or did not follow the required schema.

Return ONLY the JSON object with EXACTLY this structure (no extra keys):
";

/// Metrics-only extraction prompt.
pub const METRICS_PROMPT: &str = r#"You will receive a utility bill image/PDF.

Extract ONLY these metrics and return ONLY valid JSON:
{
  "billMonth": "YYYY-MM or null (derive from billing period, statement date, or due date; choose the month the bill is issued)",
  "billType": "water|electric|gas|internet|unknown",
  "provider": "string or null",
  "totalAmount": number or null,
  "usageAmount": number or null,
  "usageUnit": "kWh|gallons|therms|ccf|m3|minutes|GB|unknown|null"
}

Rules:
- Output ONLY the JSON object. No markdown, no extra keys.
- If you cannot find a field, return null.
"#;

/// Full first-attempt prompt: schema, business rules and formatting instructions.
pub fn build_analysis_prompt() -> String {
    format!("{ANALYSIS_PREAMBLE}\n{ANALYSIS_SCHEMA}\n\n{ANALYSIS_RULES}")
}

/// Stricter second-attempt prompt: schema only, flagging the previous answer as invalid.
pub fn build_repair_prompt() -> String {
    format!("{REPAIR_PREAMBLE}{ANALYSIS_SCHEMA}\nNo markdown. No extra text.\n")
}
