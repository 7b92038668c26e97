//! Bot API error types.
//!
//! The bot token is part of every request URL, so transport errors are
//! rendered through [`scrub_token`] before they are stored; nothing holding
//! a `TelegramError` can leak the token into logs.

use thiserror::Error;

/// Errors from the Bot API client.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// Transport-level failure, message already scrubbed.
    #[error("telegram http error: {0}")]
    Http(String),

    /// The API answered `ok=false`.
    #[error("telegram api error {code}: {description}")]
    Api { code: i64, description: String },

    /// The API answered `ok=true` without a result, or undecodable JSON.
    #[error("telegram decode error: {0}")]
    Decode(String),
}

impl TelegramError {
    pub(crate) fn http(err: reqwest::Error, token: &str) -> Self {
        Self::Http(scrub_token(&err.to_string(), token))
    }
}

/// Replace the literal bot token and any `/bot<id>:` / `bot<id>/` substring
/// with redacted placeholders.
pub fn scrub_token(message: &str, token: &str) -> String {
    if token.trim().is_empty() {
        return message.to_string();
    }
    let mut out = message.replace(token, "<redacted-token>");
    if let Some((bot_id, _)) = token.split_once(':') {
        if !bot_id.is_empty() {
            out = out.replace(&format!("/bot{bot_id}:"), "/bot<redacted>:");
            out = out.replace(&format!("bot{bot_id}/"), "bot<redacted>/");
        }
    }
    out
}
