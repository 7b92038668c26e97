//! LLM provider adapters behind one `chat(request) -> text` capability.
//!
//! Two concrete shapes are supported end-to-end: OpenAI-compatible APIs
//! (chat-completions and responses endpoints) and a generic templated HTTP
//! call. Both share the retry classification in [`ProviderError`] and an
//! exponential backoff bounded by [`RetryPolicy`].

pub mod custom_http;
pub mod error;
pub mod openai_compat;
pub mod registry;

mod http;

pub use custom_http::{CustomHttpClient, CustomHttpConfig};
pub use error::ProviderError;
pub use openai_compat::{Endpoint, OpenAiCompatClient, OpenAiCompatConfig};
pub use registry::{build, BuildOptions};

use std::time::Duration;

use async_trait::async_trait;

/// One chat invocation: model, prompts, and decoded preset parameters.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: i64,
    pub temperature: f64,
    pub allow_tools: bool,
}

/// The extracted reply text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    pub text: String,
}

/// The capability every adapter implements.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Bounded retry with exponential backoff: `base * 2^attempt` sleeps, at
/// most `max_retries` retries (so `max_retries + 1` total attempts).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_millis(400),
        }
    }
}

impl RetryPolicy {
    pub(crate) fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt)
    }
}

/// Substitute the literal `{{api_key}}` placeholder in a user-supplied
/// header value.
pub(crate) fn substitute_api_key(value: &str, api_key: &str) -> String {
    value.replace("{{api_key}}", api_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(400));
        assert_eq!(policy.backoff(1), Duration::from_millis(800));
        assert_eq!(policy.backoff(2), Duration::from_millis(1600));
    }

    #[test]
    fn api_key_substitution() {
        assert_eq!(substitute_api_key("Bearer {{api_key}}", "sk-1"), "Bearer sk-1");
        assert_eq!(substitute_api_key("static", "sk-1"), "static");
        assert_eq!(substitute_api_key("{{api_key}}{{api_key}}", "x"), "xx");
    }
}
