use std::env;
use std::time::Duration;

use cucaypy_contracts::models::DEFAULT_TEXT_MODEL;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub request_timeout: Duration,
    /// Extra attempts after a transport-level failure. API errors are never retried.
    pub transport_retries: usize,
    pub retry_backoff: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            model: DEFAULT_TEXT_MODEL.to_string(),
            request_timeout: Duration::from_secs(90),
            transport_retries: 2,
            retry_backoff: Duration::from_secs_f64(1.2),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: non_empty_env("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            api_key: non_empty_env("GEMINI_API_KEY")
                .or_else(|| non_empty_env("GOOGLE_API_KEY"))
                .or_else(|| non_empty_env("API_KEY")),
            model: non_empty_env("CUCAYPY_MODEL").unwrap_or(defaults.model),
            request_timeout: Duration::from_secs_f64(env_f64(
                "CUCAYPY_REQUEST_TIMEOUT_S",
                90.0,
                5.0,
                300.0,
            )),
            transport_retries: env_f64("CUCAYPY_TRANSPORT_RETRIES", 2.0, 0.0, 4.0).round()
                as usize,
            retry_backoff: Duration::from_secs_f64(env_f64(
                "CUCAYPY_RETRY_BACKOFF_S",
                1.2,
                0.1,
                10.0,
            )),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_f64(key: &str, default: f64, min: f64, max: f64) -> f64 {
    parse_clamped(non_empty_env(key).as_deref(), default, min, max)
}

fn parse_clamped(raw: Option<&str>, default: f64, min: f64, max: f64) -> f64 {
    raw.and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
        .clamp(min, max)
}
