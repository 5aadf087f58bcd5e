//! Natural-language → SQL translation.

use crate::prompt::system_prompt;
use crate::{ChatProvider, CompletionRequest, LLMError, Message};
use regex::Regex;
use std::sync::{Arc, OnceLock};

/// One translation: the user's command plus the schema text it is grounded in.
#[derive(Debug, Clone, Copy)]
pub struct TranslationRequest<'a> {
    pub command: &'a str,
    pub schema: &'a str,
}

impl<'a> TranslationRequest<'a> {
    pub fn new(command: &'a str, schema: &'a str) -> Self {
        Self { command, schema }
    }

    pub fn to_completion_request(&self) -> CompletionRequest {
        CompletionRequest::new(vec![
            Message::system(system_prompt(self.schema)),
            Message::user(self.command),
        ])
    }
}

/// Turns commands into SQL via a [`ChatProvider`]. One upstream call per
/// translation, no retries.
#[derive(Clone)]
pub struct Translator {
    provider: Arc<dyn ChatProvider>,
}

impl Translator {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider }
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Translate `command`. On success the SQL is trimmed and free of code
    /// fences; an empty reply is [`LLMError::EmptyCompletion`].
    pub async fn translate(&self, command: &str, schema: &str) -> Result<String, LLMError> {
        let request = TranslationRequest::new(command, schema).to_completion_request();

        let response = self.provider.complete(&request).await.map_err(|e| {
            tracing::error!(model = self.provider.model(), error = %e, "translation request failed");
            e
        })?;

        let sql = clean_sql(&response.content);
        if sql.is_empty() {
            tracing::error!(model = %response.model, "translation returned no SQL");
            return Err(LLMError::EmptyCompletion);
        }

        tracing::info!(
            model = %response.model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            sql = %sql,
            "generated SQL"
        );
        Ok(sql)
    }
}

fn think_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^\s*<think>.*?</think>").expect("valid regex"))
}

fn embedded_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").expect("valid regex")
    })
}

/// Normalise a model reply into a bare statement.
///
/// - drops a leading `<think>...</think>` reasoning block
/// - strips a surrounding ```` ``` ```` / ```` ```sql ```` fence
/// - if prose surrounds a fenced block, keeps only the block
/// - trims whitespace
pub fn clean_sql(raw: &str) -> String {
    let text = think_block().replace(raw, "");
    let text = text.trim();

    let unfenced = if text.starts_with("```") {
        strip_surrounding_fence(text)
    } else if let Some(block) = embedded_fence().captures(text).and_then(|c| c.get(1)) {
        block.as_str()
    } else {
        text
    };

    unfenced.trim().to_string()
}

fn strip_surrounding_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    let body = match rest.split_once('\n') {
        Some((first_line, after)) if is_language_tag(first_line.trim()) => after,
        _ => strip_inline_sql_tag(rest),
    };

    // Anything after the closing fence is prose.
    match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    }
}

fn is_language_tag(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+'))
}

// "```sql SELECT 1```" on a single line.
fn strip_inline_sql_tag(rest: &str) -> &str {
    let is_sql_tag = rest
        .get(..3)
        .is_some_and(|tag| tag.eq_ignore_ascii_case("sql"))
        && rest[3..].starts_with(char::is_whitespace);
    if is_sql_tag {
        &rest[3..]
    } else {
        rest
    }
}
