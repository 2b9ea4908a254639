use std::env;
use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};

use crate::error::RemoteError;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const ERROR_BODY_MAX_CHARS: usize = 512;

/// One multimodal "generate content" call: the photo first, then the prompt.
#[derive(Debug, Clone, Copy)]
pub struct GenerateContentRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub mime_type: &'a str,
    pub data_base64: &'a str,
}

/// Remote model seam. Returns the model's free-form text.
pub trait ContentGenerator {
    fn name(&self) -> &str;
    fn generate_content(
        &self,
        request: &GenerateContentRequest<'_>,
        api_key: &str,
    ) -> Result<String, RemoteError>;
}

pub struct GeminiClient {
    api_base: String,
    timeout: Option<Duration>,
    http: HttpClient,
}

impl GeminiClient {
    /// Reads `GEMINI_API_BASE` and `GEMINI_REQUEST_TIMEOUT` (seconds).
    pub fn from_env() -> Self {
        let api_base = env::var("GEMINI_API_BASE")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let timeout = env::var("GEMINI_REQUEST_TIMEOUT")
            .ok()
            .and_then(|value| {
                let parsed = parse_timeout(&value);
                if parsed.is_none() && !value.trim().is_empty() {
                    tracing::warn!(value = %value, "ignoring invalid GEMINI_REQUEST_TIMEOUT");
                }
                parsed
            });
        Self::new(api_base, timeout)
    }

    pub fn new(api_base: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            timeout,
            http: HttpClient::new(),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }
}

impl ContentGenerator for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_content(
        &self,
        request: &GenerateContentRequest<'_>,
        api_key: &str,
    ) -> Result<String, RemoteError> {
        let endpoint = self.endpoint_for_model(request.model);
        let payload = build_payload(request);
        tracing::debug!(endpoint = %endpoint, mime_type = request.mime_type, "sending generateContent");

        let mut builder = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .json(&payload);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        // `without_url` keeps the key query parameter out of error text.
        let response = builder.send().map_err(|err| {
            RemoteError::new(format!(
                "Gemini request failed ({endpoint}): {}",
                err.without_url()
            ))
        })?;
        let payload = response_json_or_error(response)?;
        extract_response_text(&payload)
    }
}

/// Positive seconds that fit in a `Duration`; anything else means no timeout.
pub fn parse_timeout(raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|seconds| *seconds > 0.0)
        .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
}

pub fn build_payload(request: &GenerateContentRequest<'_>) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                {
                    "inlineData": {
                        "mimeType": request.mime_type,
                        "data": request.data_base64,
                    }
                },
                { "text": request.prompt },
            ],
        }],
    })
}

fn response_json_or_error(response: HttpResponse) -> Result<Value, RemoteError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .map_err(|err| RemoteError::with_status(code, format!("Gemini response body read failed: {err}")))?;
    if !status.is_success() {
        return Err(RemoteError::with_status(
            code,
            format!("Gemini request failed ({code}): {}", error_message_from_body(&body)),
        ));
    }
    serde_json::from_str(&body).map_err(|err| {
        RemoteError::with_status(code, format!("Gemini returned an invalid JSON envelope: {err}"))
    })
}

/// Pulls `error.message` out of a Gemini error envelope, falling back to the
/// truncated body.
pub fn error_message_from_body(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|parsed| {
            parsed
                .get("error")
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| truncate_text(body.trim(), ERROR_BODY_MAX_CHARS))
}

/// Concatenates the text parts of the first candidate. A response without
/// candidates but with a block reason is reported as a remote failure.
pub fn extract_response_text(payload: &Value) -> Result<String, RemoteError> {
    let first_candidate = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first());
    let Some(candidate) = first_candidate else {
        if let Some(reason) = payload
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
        {
            return Err(RemoteError::new(format!(
                "Gemini blocked the request: {reason}"
            )));
        }
        return Ok(String::new());
    };

    let text = candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<&str>>()
                .join("")
        })
        .unwrap_or_default();
    Ok(text)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
