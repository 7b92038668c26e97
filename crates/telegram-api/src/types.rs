//! Bot API wire types, limited to the fields the pipeline consumes.

use serde::{Deserialize, Serialize};

/// One incoming update. Only message updates are routed; everything else is
/// carried for counting and dropped.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

impl Message {
    /// Message text, empty when the message carries none.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Sender id, 0 for channel posts and service messages.
    pub fn from_id(&self) -> i64 {
        self.from.as_ref().map(|u| u.id).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl Chat {
    pub fn is_private(&self) -> bool {
        self.kind == "private"
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
}

/// Result of `getChatMember`; only the status matters here.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMember {
    pub status: String,
}

impl ChatMember {
    /// `administrator` and `creator` count as admin, everything else does
    /// not.
    pub fn is_admin(&self) -> bool {
        self.status == "administrator" || self.status == "creator"
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SendMessageParams<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_parameters: Option<ReplyParameters>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReplyParameters {
    pub message_id: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct GetChatMemberParams {
    pub chat_id: i64,
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct GetUpdatesParams {
    pub offset: i64,
    pub timeout: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct SetWebhookParams<'a> {
    pub url: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub secret_token: &'a str,
    pub drop_pending_updates: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteWebhookParams {
    pub drop_pending_updates: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_decodes_message() {
        let raw = r#"{
            "update_id": 900,
            "message": {
                "message_id": 42,
                "from": {"id": 7, "is_bot": false, "first_name": "Ada", "username": "ada"},
                "chat": {"id": 111, "type": "group", "title": "Lab"},
                "text": "/ask hello"
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert_eq!(update.update_id, 900);
        let msg = update.message.unwrap();
        assert_eq!(msg.text(), "/ask hello");
        assert_eq!(msg.from_id(), 7);
        assert_eq!(msg.chat.kind, "group");
        assert!(!msg.chat.is_private());
    }

    #[test]
    fn update_without_message_decodes() {
        let update: Update = serde_json::from_str(r#"{"update_id": 901}"#).unwrap();
        assert!(update.message.is_none());
    }

    #[test]
    fn chat_member_admin_statuses() {
        for (status, admin) in [
            ("administrator", true),
            ("creator", true),
            ("member", false),
            ("left", false),
            ("kicked", false),
            ("restricted", false),
        ] {
            let member = ChatMember {
                status: status.to_string(),
            };
            assert_eq!(member.is_admin(), admin, "status {status}");
        }
    }

    #[test]
    fn send_params_omit_reply_when_unthreaded() {
        let params = SendMessageParams {
            chat_id: 1,
            text: "hi",
            reply_parameters: None,
        };
        let raw = serde_json::to_string(&params).unwrap();
        assert!(!raw.contains("reply_parameters"));

        let params = SendMessageParams {
            chat_id: 1,
            text: "hi",
            reply_parameters: Some(ReplyParameters { message_id: 42 }),
        };
        let raw = serde_json::to_string(&params).unwrap();
        assert!(raw.contains(r#""message_id":42"#));
    }
}
