//! The work item carried by the stream.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// One queued ask. Lives only inside the stream; `attempts` counts prior
/// failed deliveries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    #[serde(default)]
    pub job_id: String,
    pub chat_id: i64,
    #[serde(default)]
    pub chat_type: String,
    pub user_id: i64,
    #[serde(default)]
    pub message_id: i64,
    pub prompt: String,
    #[serde(default)]
    pub preset_name: String,
    #[serde(default)]
    pub enqueued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: u32,
}

impl Job {
    /// A fresh 64-bit random id, lowercase hex.
    pub fn new_job_id() -> String {
        let mut buf = [0u8; 8];
        OsRng.fill_bytes(&mut buf);
        hex::encode(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_is_hex64() {
        let id = Job::new_job_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, Job::new_job_id());
    }

    #[test]
    fn wire_field_names() {
        let job = Job {
            job_id: "abc123".to_string(),
            chat_id: 111,
            chat_type: "group".to_string(),
            user_id: 7,
            message_id: 42,
            prompt: "hello".to_string(),
            preset_name: String::new(),
            enqueued_at: None,
            attempts: 2,
        };
        let value: serde_json::Value = serde_json::from_str(&serde_json::to_string(&job).unwrap()).unwrap();
        assert_eq!(value["job_id"], "abc123");
        assert_eq!(value["chat_id"], 111);
        assert_eq!(value["chat_type"], "group");
        assert_eq!(value["user_id"], 7);
        assert_eq!(value["message_id"], 42);
        assert_eq!(value["prompt"], "hello");
        assert_eq!(value["preset_name"], "");
        assert_eq!(value["attempts"], 2);
    }

    #[test]
    fn missing_optional_fields_default() {
        let job: Job =
            serde_json::from_str(r#"{"chat_id":1,"user_id":2,"prompt":"p"}"#).unwrap();
        assert_eq!(job.job_id, "");
        assert_eq!(job.preset_name, "");
        assert_eq!(job.attempts, 0);
        assert!(job.enqueued_at.is_none());
    }
}
