//! HTTP client for the Gemini `generateContent` endpoint.
//!
//! Wraps `reqwest` with API key handling, request shaping and the shared
//! retry policy. Only the concatenated text of the first candidate is
//! returned; turning that text into a decision is the caller's job.

use std::time::Duration;

use async_trait::async_trait;
use cartpilot_core::{retry, AppConfig, RetryPolicy};
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::Value;

use crate::error::LlmError;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/";
const TEMPERATURE: f64 = 0.2;

/// Anything that can answer a prompt with text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// # Errors
    ///
    /// Implementations return [`LlmError`] on transport, API or empty-output
    /// failures.
    async fn generate_content(&self, prompt: &str, system_instruction: &str) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    response_mime_type: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    system_instruction: Content<'a>,
    generation_config: GenerationConfig,
}

impl<'a> GenerateRequest<'a> {
    fn new(prompt: &'a str, system_instruction: &'a str) -> Self {
        Self {
            contents: [Content {
                role: Some("user"),
                parts: [Part { text: prompt }],
            }],
            system_instruction: Content {
                role: None,
                parts: [Part {
                    text: system_instruction,
                }],
            },
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                response_mime_type: "application/json",
            },
        }
    }
}

/// Client for the Gemini REST API.
///
/// Use [`GeminiClient::new`] for production or
/// [`GeminiClient::with_base_url`] to point at a mock server in tests.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: Url,
    retry: RetryPolicy,
}

impl GeminiClient {
    /// Creates a client pointed at the production API.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Http`] if the underlying `reqwest::Client` cannot
    /// be constructed.
    pub fn new(api_key: &str, model: &str, timeout_secs: u64) -> Result<Self, LlmError> {
        Self::with_base_url(api_key, model, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Http`] if the `reqwest::Client` cannot be
    /// constructed, or [`LlmError::InvalidBaseUrl`] if `base_url` does not
    /// parse.
    pub fn with_base_url(
        api_key: &str,
        model: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("cartpilot/0.1")
            .build()?;

        // Exactly one trailing slash, so joins append to the path.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| LlmError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            model: model.to_owned(),
            base_url,
            retry: RetryPolicy::default(),
        })
    }

    /// Builds a client from configuration. `Ok(None)` when no API key is set,
    /// which disables the fallback path.
    ///
    /// # Errors
    ///
    /// See [`GeminiClient::new`].
    pub fn from_config(config: &AppConfig) -> Result<Option<Self>, LlmError> {
        let Some(api_key) = config.gemini_api_key.as_deref() else {
            return Ok(None);
        };
        let client = Self::new(api_key, &config.llm_model, config.llm_timeout_secs)?
            .with_retry_policy(config.llm_retry_policy());
        Ok(Some(client))
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&format!(
            "{}v1beta/models/{}:generateContent",
            self.base_url.path(),
            self.model
        ));
        url.query_pairs_mut().append_pair("key", &self.api_key);
        url
    }

    async fn generate_once(&self, prompt: &str, system_instruction: &str) -> Result<String, LlmError> {
        let response = self
            .client
            .post(self.endpoint())
            .json(&GenerateRequest::new(prompt, system_instruction))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_owned))
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = serde_json::from_str(&body).map_err(|e| LlmError::Deserialize {
            context: format!("generateContent(model={})", self.model),
            source: e,
        })?;
        let text = candidate_text(&body);
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Concatenated text parts of the first candidate.
fn candidate_text(body: &Value) -> String {
    body.pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate_content(&self, prompt: &str, system_instruction: &str) -> Result<String, LlmError> {
        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "calling language model");
        let text = retry(&self.retry, || self.generate_once(prompt, system_instruction)).await?;
        tracing::debug!(model = %self.model, response_chars = text.len(), "language model answered");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn test_client(base_url: &str) -> GeminiClient {
        GeminiClient::with_base_url("test-key", "gemini-1.5-flash", 30, base_url)
            .expect("client construction should not fail")
    }

    #[test]
    fn endpoint_includes_model_and_key() {
        let client = test_client("https://generativelanguage.googleapis.com");
        assert_eq!(
            client.endpoint().as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent?key=test-key"
        );
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let client = test_client("http://127.0.0.1:9000/proxy/");
        assert_eq!(
            client.endpoint().as_str(),
            "http://127.0.0.1:9000/proxy/v1beta/models/gemini-1.5-flash:generateContent?key=test-key"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            GeminiClient::with_base_url("k", "m", 5, "not a url"),
            Err(LlmError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn request_body_has_expected_shape() {
        let body = serde_json::to_value(GenerateRequest::new("hello", "be brief")).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [{"role": "user", "parts": [{"text": "hello"}]}],
                "systemInstruction": {"parts": [{"text": "be brief"}]},
                "generationConfig": {"temperature": 0.2, "responseMimeType": "application/json"}
            })
        );
    }

    #[test]
    fn candidate_text_joins_parts_of_first_candidate() {
        let body = json!({"candidates": [
            {"content": {"parts": [{"text": "{\"action\":"}, {"text": "\"completed\"}"}]}},
            {"content": {"parts": [{"text": "ignored"}]}}
        ]});
        assert_eq!(candidate_text(&body), "{\"action\":\"completed\"}");
        assert_eq!(candidate_text(&json!({"candidates": []})), "");
    }
}
