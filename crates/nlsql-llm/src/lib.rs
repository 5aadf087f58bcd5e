//! Chat-completion integration for nlsql
//!
//! ```text
//!   command + schema text
//!          │
//!          ▼
//!   ┌──────────────┐  CompletionRequest   ┌────────────────┐
//!   │  Translator  │─────────────────────►│  ChatProvider  │──► OpenRouter / OpenAI-compatible
//!   │              │◄─────────────────────│  (or Mock)     │
//!   └──────────────┘  CompletionResponse  └────────────────┘
//!          │
//!          ▼  clean_sql (fences, <think> blocks, whitespace)
//!     single SQL statement
//! ```
//!
//! Failures never escape as panics: every provider error is an [`LLMError`]
//! the caller has to look at. There are no retries; a rate limit or upstream
//! outage is reported as-is.

pub mod prompt;
pub mod providers;
pub mod translate;

use async_trait::async_trait;
use serde::Serialize;

pub use providers::{ConfigError, LLMConfig, MockProvider, OpenRouterClient};
pub use translate::{clean_sql, TranslationRequest, Translator};

// ============================================================================
// Provider interface
// ============================================================================

/// A chat-completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LLMError>;

    /// Model identifier sent with each request.
    fn model(&self) -> &str;
}

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LLMError {
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("model returned an empty statement")]
    EmptyCompletion,
}
