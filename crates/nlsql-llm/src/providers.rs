//! Chat-completion providers
//!
//! [`OpenRouterClient`] speaks the OpenAI-compatible `/chat/completions`
//! protocol (OpenRouter by default; any compatible gateway via
//! `OPENROUTER_BASE_URL`). [`MockProvider`] is a scripted stand-in for tests.

use super::*;
use parking_lot::Mutex;
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ============================================================================
// Configuration
// ============================================================================

pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const MODEL_ENV: &str = "OPENROUTER_MODEL";
pub const BASE_URL_ENV: &str = "OPENROUTER_BASE_URL";
pub const TIMEOUT_ENV: &str = "LLM_TIMEOUT_SECS";

pub const DEFAULT_MODEL: &str = "deepseek/deepseek-r1:free";
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Clone)]
pub struct LLMConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Whole-request timeout. `None` leaves latency to the upstream service.
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for LLMConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LLMConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LLMConfig {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = non_empty(API_KEY_ENV).ok_or(ConfigError::MissingApiKey)?;
        let model = non_empty(MODEL_ENV).unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = non_empty(BASE_URL_ENV).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout = non_empty(TIMEOUT_ENV)
            .map(|raw| {
                raw.parse::<u64>().map(Duration::from_secs).map_err(|_| {
                    ConfigError::Invalid(format!("{TIMEOUT_ENV} must be whole seconds, got `{raw}`"))
                })
            })
            .transpose()?;

        Ok(Self::new(&api_key, &model).with_base_url(&base_url).with_timeout(timeout))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No API key configured. Set OPENROUTER_API_KEY")]
    MissingApiKey,
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

// ============================================================================
// OpenRouter / OpenAI-compatible provider
// ============================================================================

pub struct OpenRouterClient {
    client: Client,
    config: LLMConfig,
}

impl OpenRouterClient {
    pub fn new(config: LLMConfig) -> Result<Self, ConfigError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(LLMConfig::from_env()?)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }
}

#[async_trait]
impl ChatProvider for OpenRouterClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LLMError> {
        let body = chat_request_body(&self.config.model, request);

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LLMError::RateLimited {
                retry_after_ms: retry_after * 1000,
            });
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LLMError::Api {
                status: status.as_u16(),
                message: upstream_error_detail(&error_text),
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::InvalidResponse(e.to_string()))?;

        parse_chat_response(&data, &self.config.model)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// JSON body for an OpenAI-style chat completion.
pub fn chat_request_body(model: &str, request: &CompletionRequest) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": request.messages,
    })
}

/// Pull the first choice's content out of a chat-completion payload.
///
/// Some gateways answer `200 OK` with an `{"error": ...}` body; that is
/// reported as an API error rather than an empty completion.
pub fn parse_chat_response(
    data: &serde_json::Value,
    fallback_model: &str,
) -> Result<CompletionResponse, LLMError> {
    if let Some(err) = data.get("error").filter(|e| !e.is_null()) {
        let status = err["code"].as_u64().unwrap_or(200) as u16;
        return Err(LLMError::Api {
            status,
            message: error_value_detail(err),
        });
    }

    let content = data["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| {
            LLMError::InvalidResponse("missing choices[0].message.content".to_string())
        })?
        .to_string();

    Ok(CompletionResponse {
        content,
        model: data["model"]
            .as_str()
            .unwrap_or(fallback_model)
            .to_string(),
        usage: Usage {
            prompt_tokens: data["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as usize,
            completion_tokens: data["usage"]["completion_tokens"].as_u64().unwrap_or(0) as usize,
        },
    })
}

fn upstream_error_detail(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(v) if v.get("error").is_some() => error_value_detail(&v["error"]),
        _ if body.trim().is_empty() => "empty error body".to_string(),
        _ => body.trim().to_string(),
    }
}

fn error_value_detail(err: &serde_json::Value) -> String {
    match err {
        serde_json::Value::String(s) => s.clone(),
        other => other["message"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    }
}

// ============================================================================
// Mock provider
// ============================================================================

/// Scripted provider: replies cycle through `responses`, and every request is
/// recorded for inspection.
pub struct MockProvider {
    responses: Vec<Result<String, LLMError>>,
    response_idx: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    pub fn new(responses: Vec<Result<String, LLMError>>) -> Self {
        Self {
            responses,
            response_idx: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(response: &str) -> Self {
        Self::new(vec![Ok(response.to_string())])
    }

    pub fn failing(error: LLMError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LLMError> {
        self.requests.lock().push(request.clone());
        if self.responses.is_empty() {
            return Err(LLMError::InvalidResponse("mock has no responses".to_string()));
        }
        let idx = self.response_idx.fetch_add(1, Ordering::SeqCst);
        self.responses[idx % self.responses.len()]
            .clone()
            .map(|content| CompletionResponse {
                content,
                model: "mock".to_string(),
                usage: Usage::default(),
            })
    }

    fn model(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn config_requires_api_key() {
        let err = LLMConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));
        let err = LLMConfig::from_lookup(lookup(&[(API_KEY_ENV, "   ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));
    }

    #[test]
    fn config_defaults_and_overrides() {
        let config = LLMConfig::from_lookup(lookup(&[(API_KEY_ENV, "k")])).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, None);

        let config = LLMConfig::from_lookup(lookup(&[
            (API_KEY_ENV, "k"),
            (MODEL_ENV, "openai/gpt-4o-mini"),
            (BASE_URL_ENV, "http://localhost:9999/v1/"),
            (TIMEOUT_ENV, "30"),
        ]))
        .unwrap();
        assert_eq!(config.model, "openai/gpt-4o-mini");
        assert_eq!(config.base_url, "http://localhost:9999/v1");
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn config_rejects_bad_timeout() {
        let err = LLMConfig::from_lookup(lookup(&[(API_KEY_ENV, "k"), (TIMEOUT_ENV, "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn debug_output_redacts_key() {
        let config = LLMConfig::new("sk-secret", "m");
        assert!(!format!("{config:?}").contains("sk-secret"));
    }

    #[test]
    fn request_body_shape() {
        let request = CompletionRequest::new(vec![Message::system("sys"), Message::user("hi")]);
        let body = chat_request_body("m", &request);
        assert_eq!(body["model"], "m");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body.as_object().map(|o| o.len()), Some(2));
    }

    #[test]
    fn parses_first_choice() {
        let data = serde_json::json!({
            "model": "deepseek/deepseek-r1:free",
            "choices": [{"message": {"role": "assistant", "content": "SELECT 1;"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        });
        let resp = parse_chat_response(&data, "fallback").unwrap();
        assert_eq!(resp.content, "SELECT 1;");
        assert_eq!(resp.model, "deepseek/deepseek-r1:free");
        assert_eq!(resp.usage.prompt_tokens, 12);
    }

    #[test]
    fn malformed_payload_is_invalid_response() {
        let data = serde_json::json!({"choices": []});
        assert!(matches!(
            parse_chat_response(&data, "m"),
            Err(LLMError::InvalidResponse(_))
        ));
    }

    #[test]
    fn error_payload_in_success_body() {
        let data = serde_json::json!({"error": {"message": "Provider returned error", "code": 502}});
        assert_eq!(
            parse_chat_response(&data, "m").unwrap_err(),
            LLMError::Api {
                status: 502,
                message: "Provider returned error".to_string()
            }
        );
    }

    #[test]
    fn upstream_error_detail_prefers_error_message() {
        assert_eq!(
            upstream_error_detail(r#"{"error":{"message":"No auth credentials found","code":401}}"#),
            "No auth credentials found"
        );
        assert_eq!(upstream_error_detail(r#"{"error":"bad key"}"#), "bad key");
        assert_eq!(upstream_error_detail("gateway timeout"), "gateway timeout");
        assert_eq!(upstream_error_detail(""), "empty error body");
    }

    #[tokio::test]
    async fn mock_provider_cycles_and_records() {
        let provider = MockProvider::new(vec![
            Ok("SELECT 1".to_string()),
            Err(LLMError::Network("down".to_string())),
        ]);
        let request = CompletionRequest::new(vec![Message::user("q")]);

        assert_eq!(provider.complete(&request).await.unwrap().content, "SELECT 1");
        assert!(provider.complete(&request).await.is_err());
        assert_eq!(provider.complete(&request).await.unwrap().content, "SELECT 1");
        assert_eq!(provider.calls(), 3);
        assert_eq!(provider.requests()[0].messages[0].content, "q");
    }
}
