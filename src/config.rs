use crate::pipeline::analysis::{DEFAULT_API_BASE, DEFAULT_MODEL};

/// Application-level constants
pub const APP_NAME: &str = "billcheck";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default model call timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default listen address for `billcheck serve`
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";

/// Log filter used when `RUST_LOG` is unset
pub fn default_log_filter() -> &'static str {
    "billcheck=info,tower_http=info"
}

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub timeout_secs: u64,
    pub bind_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let timeout_secs = match get("BILLCHECK_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    tracing::warn!(value = %raw, "Invalid BILLCHECK_TIMEOUT_SECS, using default");
                    defaults.timeout_secs
                }
            },
            None => defaults.timeout_secs,
        };

        Self {
            api_key: get("GOOGLE_GENERATIVE_AI_API_KEY").or_else(|| get("GEMINI_API_KEY")),
            model: get("BILLCHECK_MODEL").unwrap_or(defaults.model),
            api_base: get("BILLCHECK_API_BASE").unwrap_or(defaults.api_base),
            timeout_secs,
            bind_addr: get("BILLCHECK_BIND").unwrap_or(defaults.bind_addr),
        }
    }
}
