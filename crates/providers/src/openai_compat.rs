//! Adapter for OpenAI-compatible APIs (chat-completions and responses).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ProviderError;
use crate::http::{check_status, read_body_capped};
use crate::{substitute_api_key, ChatProvider, ChatRequest, ChatResponse, RetryPolicy};

/// Which wire shape the endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endpoint {
    #[default]
    ChatCompletions,
    Responses,
}

impl Endpoint {
    /// Interpret the stored `config_json.endpoint` value. Anything that is
    /// not a responses spelling means chat-completions.
    pub fn from_config_value(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "responses" | "/v1/responses" => Self::Responses,
            _ => Self::ChatCompletions,
        }
    }

    fn path(&self) -> &'static str {
        match self {
            Self::ChatCompletions => "/chat/completions",
            Self::Responses => "/responses",
        }
    }
}

/// Configuration for one OpenAI-compatible provider instance.
#[derive(Debug, Clone, Default)]
pub struct OpenAiCompatConfig {
    pub base_url: String,
    pub api_key: String,
    pub headers: HashMap<String, String>,
    pub endpoint: Endpoint,
    pub retry: RetryPolicy,
}

pub struct OpenAiCompatClient {
    http: reqwest::Client,
    cfg: OpenAiCompatConfig,
}

impl OpenAiCompatClient {
    pub fn new(http: reqwest::Client, cfg: OpenAiCompatConfig) -> Self {
        Self { http, cfg }
    }

    /// Derive the URL to call: a base that already names one of the two
    /// endpoints is used verbatim, otherwise the endpoint path is appended.
    fn endpoint_url(&self) -> Result<String, ProviderError> {
        let base = self.cfg.base_url.trim();
        if base.is_empty() {
            return Err(ProviderError::Config("base url is empty".to_string()));
        }
        if base.ends_with("/chat/completions") || base.ends_with("/responses") {
            return Ok(base.to_string());
        }
        Ok(format!("{}{}", base.trim_end_matches('/'), self.cfg.endpoint.path()))
    }

    fn build_payload(&self, req: &ChatRequest) -> Value {
        match self.cfg.endpoint {
            Endpoint::Responses => {
                let mut payload = json!({
                    "model": req.model,
                    "input": [
                        {"role": "system", "content": req.system_prompt},
                        {"role": "user", "content": req.user_prompt},
                    ],
                });
                if req.max_tokens > 0 {
                    payload["max_output_tokens"] = json!(req.max_tokens);
                }
                if req.temperature > 0.0 {
                    payload["temperature"] = json!(req.temperature);
                }
                payload
            }
            Endpoint::ChatCompletions => {
                let mut messages = Vec::new();
                if !req.system_prompt.trim().is_empty() {
                    messages.push(json!({"role": "system", "content": req.system_prompt}));
                }
                messages.push(json!({"role": "user", "content": req.user_prompt}));

                let mut payload = json!({
                    "model": req.model,
                    "messages": messages,
                });
                if req.max_tokens > 0 {
                    payload["max_tokens"] = json!(req.max_tokens);
                }
                if req.temperature > 0.0 {
                    payload["temperature"] = json!(req.temperature);
                }
                payload
            }
        }
    }

    async fn call_once(&self, url: &str, payload: &Value) -> Result<String, ProviderError> {
        let mut request = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .json(payload);
        if !self.cfg.api_key.trim().is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.cfg.api_key));
        }
        for (name, value) in &self.cfg.headers {
            request = request.header(name, substitute_api_key(value, &self.cfg.api_key));
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        check_status(resp.status())?;
        let body = read_body_capped(resp).await?;

        match self.cfg.endpoint {
            Endpoint::Responses => parse_responses(&body),
            Endpoint::ChatCompletions => parse_chat_completions(&body),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatClient {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = self.endpoint_url()?;
        let payload = self.build_payload(req);

        let mut attempt = 0;
        loop {
            match self.call_once(&url, &payload).await {
                Ok(text) => return Ok(ChatResponse { text }),
                Err(e) if e.is_retryable() && attempt < self.cfg.retry.max_retries => {
                    debug!(attempt, error = %e, "retrying openai-compatible call");
                    tokio::time::sleep(self.cfg.retry.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletionsReply {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Default)]
struct Choice {
    #[serde(default)]
    text: String,
    #[serde(default)]
    message: ChoiceMessage,
}

#[derive(Deserialize, Default)]
struct ChoiceMessage {
    #[serde(default)]
    content: Value,
}

fn parse_chat_completions(body: &[u8]) -> Result<String, ProviderError> {
    let reply: ChatCompletionsReply =
        serde_json::from_slice(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    let first = reply
        .choices
        .first()
        .ok_or_else(|| ProviderError::Parse("empty choices in chat completion response".into()))?;

    if !first.text.is_empty() {
        return Ok(first.text.clone());
    }
    let content = content_to_text(&first.message.content);
    if !content.trim().is_empty() {
        return Ok(content);
    }
    Err(ProviderError::Parse(
        "missing message content in chat completion response".into(),
    ))
}

/// Message content may be a plain string or an array of `{text}` parts.
fn content_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

#[derive(Deserialize)]
struct ResponsesReply {
    #[serde(default)]
    output_text: String,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize, Default)]
struct OutputItem {
    #[serde(default)]
    content: Vec<ContentItem>,
}

#[derive(Deserialize, Default)]
struct ContentItem {
    #[serde(default)]
    text: String,
}

fn parse_responses(body: &[u8]) -> Result<String, ProviderError> {
    let reply: ResponsesReply =
        serde_json::from_slice(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    if !reply.output_text.trim().is_empty() {
        return Ok(reply.output_text);
    }
    if let Some(text) = reply
        .output
        .first()
        .and_then(|o| o.content.first())
        .map(|c| c.text.as_str())
    {
        if !text.trim().is_empty() {
            return Ok(text.to_string());
        }
    }
    Err(ProviderError::Parse(
        "missing output text in responses api response".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str, endpoint: Endpoint) -> OpenAiCompatClient {
        OpenAiCompatClient::new(
            reqwest::Client::new(),
            OpenAiCompatConfig {
                base_url: base_url.to_string(),
                endpoint,
                ..Default::default()
            },
        )
    }

    #[test]
    fn endpoint_derivation() {
        let c = client("https://api.x.ai/v1", Endpoint::ChatCompletions);
        assert_eq!(c.endpoint_url().unwrap(), "https://api.x.ai/v1/chat/completions");

        let c = client("https://api.openai.com/v1", Endpoint::Responses);
        assert_eq!(c.endpoint_url().unwrap(), "https://api.openai.com/v1/responses");

        // Bases already naming an endpoint are used verbatim.
        let c = client("https://proxy.local/v1/chat/completions", Endpoint::Responses);
        assert_eq!(c.endpoint_url().unwrap(), "https://proxy.local/v1/chat/completions");

        let c = client("https://proxy.local/v1/", Endpoint::ChatCompletions);
        assert_eq!(c.endpoint_url().unwrap(), "https://proxy.local/v1/chat/completions");

        assert!(client("  ", Endpoint::ChatCompletions).endpoint_url().is_err());
    }

    #[test]
    fn endpoint_config_value_parsing() {
        assert_eq!(Endpoint::from_config_value("responses"), Endpoint::Responses);
        assert_eq!(Endpoint::from_config_value(" /v1/responses "), Endpoint::Responses);
        assert_eq!(Endpoint::from_config_value("chat_completions"), Endpoint::ChatCompletions);
        assert_eq!(Endpoint::from_config_value(""), Endpoint::ChatCompletions);
        assert_eq!(Endpoint::from_config_value("anything"), Endpoint::ChatCompletions);
    }

    #[test]
    fn chat_completions_payload() {
        let c = client("https://api.x.ai/v1", Endpoint::ChatCompletions);
        let payload = c.build_payload(&ChatRequest {
            model: "grok-beta".into(),
            system_prompt: "You are concise".into(),
            user_prompt: "hello".into(),
            max_tokens: 123,
            temperature: 0.4,
            allow_tools: false,
        });

        assert_eq!(payload["model"], "grok-beta");
        let messages = payload["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "hello");
        assert_eq!(payload["max_tokens"], 123);
        assert_eq!(payload["temperature"], 0.4);
    }

    #[test]
    fn chat_completions_payload_omissions() {
        let c = client("https://api.x.ai/v1", Endpoint::ChatCompletions);
        let payload = c.build_payload(&ChatRequest {
            model: "m".into(),
            system_prompt: "   ".into(),
            user_prompt: "q".into(),
            max_tokens: 0,
            temperature: 0.0,
            allow_tools: false,
        });

        // Blank system prompt drops the system message; non-positive knobs
        // are omitted entirely.
        let messages = payload["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert!(payload.get("max_tokens").is_none());
        assert!(payload.get("temperature").is_none());
    }

    #[test]
    fn responses_payload() {
        let c = client("https://api.openai.com/v1", Endpoint::Responses);
        let payload = c.build_payload(&ChatRequest {
            model: "gpt-4.1".into(),
            system_prompt: "sys".into(),
            user_prompt: "hello".into(),
            max_tokens: 256,
            temperature: 0.7,
            allow_tools: false,
        });

        let input = payload["input"].as_array().unwrap();
        assert_eq!(input.len(), 2);
        assert_eq!(input[0]["role"], "system");
        assert_eq!(payload["max_output_tokens"], 256);
        assert!(payload.get("max_tokens").is_none());
    }

    #[test]
    fn parse_chat_completions_variants() {
        let text = parse_chat_completions(br#"{"choices":[{"text":"direct"}]}"#).unwrap();
        assert_eq!(text, "direct");

        let text =
            parse_chat_completions(br#"{"choices":[{"message":{"content":"Hi!"}}]}"#).unwrap();
        assert_eq!(text, "Hi!");

        let text = parse_chat_completions(
            br#"{"choices":[{"message":{"content":[{"text":"a"},{"text":"b"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(text, "a\nb");

        assert!(parse_chat_completions(br#"{"choices":[]}"#).is_err());
        assert!(parse_chat_completions(br#"{"choices":[{"message":{"content":""}}]}"#).is_err());
        assert!(parse_chat_completions(b"not json").is_err());
    }

    #[test]
    fn parse_responses_variants() {
        assert_eq!(parse_responses(br#"{"output_text":"done"}"#).unwrap(), "done");
        assert_eq!(
            parse_responses(br#"{"output":[{"content":[{"text":"nested"}]}]}"#).unwrap(),
            "nested"
        );
        assert!(parse_responses(br#"{"output":[]}"#).is_err());
    }
}
