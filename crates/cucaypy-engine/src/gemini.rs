use std::thread;

use anyhow::{bail, Context, Result};
use cucaypy_contracts::prompts::InferenceRequest;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};

use crate::config::GatewayConfig;
use crate::InferenceGateway;

pub struct GeminiGateway {
    config: GatewayConfig,
    http: HttpClient,
}

impl GeminiGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.config.api_base, model_path)
    }

    fn post_with_transport_retries(
        &self,
        endpoint: &str,
        api_key: &str,
        payload: &Value,
    ) -> Result<HttpResponse> {
        let max_retries = self.config.transport_retries;
        for attempt in 0..=max_retries {
            let response = self
                .http
                .post(endpoint)
                .header("x-goog-api-key", api_key)
                .timeout(self.config.request_timeout)
                .json(payload)
                .send();

            match response {
                Ok(ok) => return Ok(ok),
                Err(raw) => {
                    let err = anyhow::Error::new(raw)
                        .context(format!("Gemini request failed ({endpoint})"));
                    if !is_retryable_transport_error(&err) || attempt >= max_retries {
                        return Err(err);
                    }
                    log::warn!(
                        "Gemini transport retry {}/{} after transient request failure: {}",
                        attempt + 1,
                        max_retries,
                        error_chain_text(&err, 240)
                    );
                    let delay = self.config.retry_backoff.mul_f64(attempt as f64 + 1.0);
                    thread::sleep(delay);
                }
            }
        }

        bail!("Gemini transport retry loop exhausted ({endpoint})")
    }
}

impl InferenceGateway for GeminiGateway {
    fn name(&self) -> &str {
        "gemini"
    }

    fn send(&self, request: &InferenceRequest) -> Result<String> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY or API_KEY not set");
        };
        let endpoint = self.endpoint_for_model(&self.config.model);
        let payload = build_payload(request);
        log::debug!(
            "Gemini {} request to model {} (image: {})",
            request.kind.as_str(),
            self.config.model,
            request.image().is_some()
        );

        let response = self.post_with_transport_retries(&endpoint, api_key, &payload)?;
        let parsed = response_json_or_error("Gemini", response)?;
        Ok(extract_text(&parsed))
    }
}

/// Request body for `models/{model}:generateContent`: the text part first,
/// then the image as `inlineData` when one is attached.
pub fn build_payload(request: &InferenceRequest) -> Value {
    let mut parts = vec![json!({ "text": request.text() })];
    if let Some(image) = request.image() {
        parts.push(json!({
            "inlineData": {
                "mimeType": image.mime_type,
                "data": image.base64_data(),
            }
        }));
    }
    let mut payload = Map::new();
    payload.insert(
        "contents".to_string(),
        Value::Array(vec![json!({
            "role": "user",
            "parts": parts,
        })]),
    );
    Value::Object(payload)
}

/// Concatenated `text` parts of the first candidate. Empty when there are none.
pub fn extract_text(response_payload: &Value) -> String {
    let parts = response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("")
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn is_retryable_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .map(|reqwest_err| {
                reqwest_err.is_timeout() || reqwest_err.is_connect() || reqwest_err.is_request()
            })
            .unwrap_or(false)
    })
}

/// Flattens an error chain into one line, skipping repeated causes.
pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().map(|existing| existing == trimmed).unwrap_or(false) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
