//! Adapter for arbitrary HTTP endpoints with a templated body.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ProviderError;
use crate::http::{check_status, read_body_capped};
use crate::{substitute_api_key, ChatProvider, ChatRequest, ChatResponse, RetryPolicy};

/// Configuration for one custom-HTTP provider instance.
#[derive(Debug, Clone, Default)]
pub struct CustomHttpConfig {
    pub url: String,
    pub api_key: String,
    pub headers: HashMap<String, String>,
    /// Body template with `{{Model}}`, `{{SystemPrompt}}`, `{{UserPrompt}}`,
    /// `{{MaxTokens}}`, `{{Temperature}}`, `{{AllowTools}}`, `{{APIKey}}`
    /// placeholders. Empty means the default JSON payload.
    pub body_template: String,
    /// HTTP method, default POST.
    pub method: String,
    pub retry: RetryPolicy,
}

pub struct CustomHttpClient {
    http: reqwest::Client,
    cfg: CustomHttpConfig,
}

impl CustomHttpClient {
    pub fn new(http: reqwest::Client, cfg: CustomHttpConfig) -> Self {
        Self { http, cfg }
    }

    fn method(&self) -> Result<reqwest::Method, ProviderError> {
        let name = self.cfg.method.trim();
        if name.is_empty() {
            return Ok(reqwest::Method::POST);
        }
        reqwest::Method::from_bytes(name.to_ascii_uppercase().as_bytes())
            .map_err(|_| ProviderError::Config(format!("invalid http method {name:?}")))
    }

    fn render_body(&self, req: &ChatRequest) -> String {
        if self.cfg.body_template.trim().is_empty() {
            let payload = json!({
                "model": req.model,
                "system_prompt": req.system_prompt,
                "prompt": req.user_prompt,
                "max_tokens": req.max_tokens,
                "temperature": req.temperature,
                "allow_tools": req.allow_tools,
            });
            return payload.to_string();
        }

        self.cfg
            .body_template
            .replace("{{Model}}", &req.model)
            .replace("{{SystemPrompt}}", &req.system_prompt)
            .replace("{{UserPrompt}}", &req.user_prompt)
            .replace("{{MaxTokens}}", &req.max_tokens.to_string())
            .replace("{{Temperature}}", &req.temperature.to_string())
            .replace("{{AllowTools}}", &req.allow_tools.to_string())
            .replace("{{APIKey}}", &self.cfg.api_key)
    }

    async fn call_once(&self, body: &str) -> Result<String, ProviderError> {
        let url = self.cfg.url.trim();
        if url.is_empty() {
            return Err(ProviderError::Config("custom http url is empty".to_string()));
        }

        let mut request = self.http.request(self.method()?, url).body(body.to_string());
        if self.cfg.headers.is_empty() {
            request = request.header("Content-Type", "application/json");
        } else {
            for (name, value) in &self.cfg.headers {
                request = request.header(name, substitute_api_key(value, &self.cfg.api_key));
            }
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        check_status(resp.status())?;
        let bytes = read_body_capped(resp).await?;
        extract_text(&bytes)
    }
}

#[async_trait]
impl ChatProvider for CustomHttpClient {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = self.render_body(req);

        let mut attempt = 0;
        loop {
            match self.call_once(&body).await {
                Ok(text) => return Ok(ChatResponse { text }),
                Err(e) if e.is_retryable() && attempt < self.cfg.retry.max_retries => {
                    debug!(attempt, error = %e, "retrying custom http call");
                    tokio::time::sleep(self.cfg.retry.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Pull reply text out of whatever shape the endpoint returned: well-known
/// top-level string keys first, then the OpenAI-compatible shapes, then the
/// raw body when it is non-JSON text.
fn extract_text(body: &[u8]) -> Result<String, ProviderError> {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            let trimmed = String::from_utf8_lossy(body).trim().to_string();
            if !trimmed.is_empty() {
                return Ok(trimmed);
            }
            return Err(ProviderError::Parse(e.to_string()));
        }
    };

    for key in ["text", "response", "answer", "output_text"] {
        if let Some(s) = value.get(key).and_then(Value::as_str) {
            if !s.trim().is_empty() {
                return Ok(s.to_string());
            }
        }
    }

    if let Some(first) = value.get("choices").and_then(Value::as_array).and_then(|c| c.first()) {
        if let Some(content) = first
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
        {
            if !content.trim().is_empty() {
                return Ok(content.to_string());
            }
        }
        if let Some(text) = first.get("text").and_then(Value::as_str) {
            if !text.trim().is_empty() {
                return Ok(text.to_string());
            }
        }
    }

    if let Some(text) = value
        .get("output")
        .and_then(Value::as_array)
        .and_then(|o| o.first())
        .and_then(|o| o.get("content"))
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("text"))
        .and_then(Value::as_str)
    {
        if !text.trim().is_empty() {
            return Ok(text.to_string());
        }
    }

    Err(ProviderError::Parse(
        "custom response does not contain text field".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(cfg: CustomHttpConfig) -> CustomHttpClient {
        CustomHttpClient::new(reqwest::Client::new(), cfg)
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "llama3".into(),
            system_prompt: "be brief".into(),
            user_prompt: "hi".into(),
            max_tokens: 64,
            temperature: 0.5,
            allow_tools: true,
        }
    }

    #[test]
    fn default_body_is_json_payload() {
        let c = client(CustomHttpConfig::default());
        let body: Value = serde_json::from_str(&c.render_body(&request())).unwrap();
        assert_eq!(body["model"], "llama3");
        assert_eq!(body["system_prompt"], "be brief");
        assert_eq!(body["prompt"], "hi");
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["allow_tools"], true);
    }

    #[test]
    fn template_substitution() {
        let c = client(CustomHttpConfig {
            body_template: r#"{"m":"{{Model}}","q":"{{UserPrompt}}","k":"{{APIKey}}","t":{{MaxTokens}}}"#
                .into(),
            api_key: "sk-x".into(),
            ..Default::default()
        });
        assert_eq!(
            c.render_body(&request()),
            r#"{"m":"llama3","q":"hi","k":"sk-x","t":64}"#
        );
    }

    #[test]
    fn method_defaults_to_post() {
        let c = client(CustomHttpConfig::default());
        assert_eq!(c.method().unwrap(), reqwest::Method::POST);

        let c = client(CustomHttpConfig {
            method: "put".into(),
            ..Default::default()
        });
        assert_eq!(c.method().unwrap(), reqwest::Method::PUT);
    }

    #[test]
    fn extract_top_level_keys() {
        assert_eq!(extract_text(br#"{"text":"a"}"#).unwrap(), "a");
        assert_eq!(extract_text(br#"{"response":"b"}"#).unwrap(), "b");
        assert_eq!(extract_text(br#"{"answer":"c"}"#).unwrap(), "c");
        assert_eq!(extract_text(br#"{"output_text":"d"}"#).unwrap(), "d");
        // Blank values fall through to the error.
        assert!(extract_text(br#"{"text":"  "}"#).is_err());
    }

    #[test]
    fn extract_openai_shapes() {
        assert_eq!(
            extract_text(br#"{"choices":[{"message":{"content":"Hi"}}]}"#).unwrap(),
            "Hi"
        );
        assert_eq!(extract_text(br#"{"choices":[{"text":"T"}]}"#).unwrap(), "T");
        assert_eq!(
            extract_text(br#"{"output":[{"content":[{"text":"N"}]}]}"#).unwrap(),
            "N"
        );
    }

    #[test]
    fn extract_plain_text_fallback() {
        assert_eq!(extract_text(b"  plain reply \n").unwrap(), "plain reply");
        assert!(extract_text(b"").is_err());
        assert!(extract_text(br#"{"unrelated":1}"#).is_err());
    }
}
