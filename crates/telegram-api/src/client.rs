//! Bot API HTTP client.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TelegramError;
use crate::types::{
    ChatMember, DeleteWebhookParams, GetChatMemberParams, GetUpdatesParams, Message,
    ReplyParameters, SendMessageParams, SetWebhookParams, Update, User,
};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Generic Bot API response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

/// Client for the Telegram Bot API. Cheap to clone.
#[derive(Clone)]
pub struct BotClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl BotClient {
    /// Build a client with a 30s per-call timeout.
    pub fn new(token: impl Into<String>) -> Result<Self, TelegramError> {
        let token = token.into();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TelegramError::http(e, &token))?;
        Ok(Self::with_http(http, token))
    }

    /// Build a client around an existing reqwest client.
    pub fn with_http(http: reqwest::Client, token: impl Into<String>) -> Self {
        Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.into(),
        }
    }

    /// Point the client at a different API host (tests, local bot servers).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call<P: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        params: &P,
        timeout: Option<Duration>,
    ) -> Result<T, TelegramError> {
        let mut request = self.http.post(self.method_url(method)).json(params);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| TelegramError::http(e, &self.token))?;
        let envelope: ApiResponse<T> = resp
            .json()
            .await
            .map_err(|e| TelegramError::http(e, &self.token))?;

        if !envelope.ok {
            return Err(TelegramError::Api {
                code: envelope.error_code.unwrap_or(0),
                description: envelope
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        envelope
            .result
            .ok_or_else(|| TelegramError::Decode(format!("{method}: ok without result")))
    }

    /// Identify the bot account.
    pub async fn get_me(&self) -> Result<User, TelegramError> {
        self.call("getMe", &serde_json::json!({}), None).await
    }

    /// Send a text message, optionally as a threaded reply.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<Message, TelegramError> {
        let params = SendMessageParams {
            chat_id,
            text,
            reply_parameters: reply_to_message_id.map(|message_id| ReplyParameters { message_id }),
        };
        self.call("sendMessage", &params, None).await
    }

    /// Fetch a user's membership in a chat.
    pub async fn get_chat_member(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<ChatMember, TelegramError> {
        let params = GetChatMemberParams { chat_id, user_id };
        self.call("getChatMember", &params, None).await
    }

    /// Long-poll for updates. The HTTP timeout is stretched past the poll
    /// timeout so the server controls the wait.
    pub async fn get_updates(
        &self,
        offset: i64,
        poll_timeout: Duration,
    ) -> Result<Vec<Update>, TelegramError> {
        let params = GetUpdatesParams {
            offset,
            timeout: poll_timeout.as_secs(),
        };
        let request_timeout = poll_timeout + Duration::from_secs(10);
        self.call("getUpdates", &params, Some(request_timeout)).await
    }

    /// Register the webhook sink.
    pub async fn set_webhook(
        &self,
        url: &str,
        secret_token: &str,
        drop_pending_updates: bool,
    ) -> Result<bool, TelegramError> {
        let params = SetWebhookParams {
            url,
            secret_token,
            drop_pending_updates,
        };
        debug!(url, "registering webhook");
        self.call("setWebhook", &params, None).await
    }

    /// Remove any registered webhook (polling mode does this first).
    pub async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<bool, TelegramError> {
        let params = DeleteWebhookParams {
            drop_pending_updates,
        };
        self.call("deleteWebhook", &params, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_url_embeds_token() {
        let client = BotClient::with_http(reqwest::Client::new(), "12345:AAA");
        assert_eq!(
            client.method_url("sendMessage"),
            "https://api.telegram.org/bot12345:AAA/sendMessage"
        );

        let client = client.with_api_base("http://127.0.0.1:8081");
        assert_eq!(
            client.method_url("getMe"),
            "http://127.0.0.1:8081/bot12345:AAA/getMe"
        );
    }

    #[test]
    fn api_envelope_error_path() {
        let raw = r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked"}"#;
        let envelope: ApiResponse<Message> = serde_json::from_str(raw).unwrap();
        assert!(!envelope.ok);
        assert_eq!(envelope.error_code, Some(403));
        assert!(envelope.result.is_none());
    }

    #[test]
    fn api_envelope_ok_path() {
        let raw = r#"{"ok":true,"result":{"id":99,"is_bot":true,"first_name":"hyprbot","username":"hyprbot_bot"}}"#;
        let envelope: ApiResponse<User> = serde_json::from_str(raw).unwrap();
        assert!(envelope.ok);
        assert_eq!(envelope.result.unwrap().username.as_deref(), Some("hyprbot_bot"));
    }
}
