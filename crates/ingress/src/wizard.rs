//! Provider onboarding wizard.
//!
//! A short-TTL per-user session collected over private messages:
//! kind -> name -> base_url -> (endpoint | headers) -> api_key. Invalid
//! input re-prompts without advancing; the session TTL is refreshed on each
//! transition. Secrets are sealed before anything touches the store.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use queue::TtlCache;

/// Where the session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Kind,
    Name,
    BaseUrl,
    Endpoint,
    Headers,
    ApiKey,
}

/// Collected wizard inputs so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardState {
    pub target_chat_id: i64,
    pub step: WizardStep,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub headers_json: String,
}

impl WizardState {
    pub fn begin(target_chat_id: i64) -> Self {
        Self {
            target_chat_id,
            step: WizardStep::Kind,
            kind: String::new(),
            name: String::new(),
            base_url: String::new(),
            endpoint: String::new(),
            headers_json: String::new(),
        }
    }
}

/// What a single wizard turn decided.
#[derive(Debug, PartialEq)]
pub enum WizardOutcome {
    /// Invalid input: reply and keep the stored state untouched.
    Reprompt(&'static str),
    /// Valid input: persist the new state and send the next prompt.
    Advance(WizardState, &'static str),
    /// Final input: persist the provider and clear the session.
    Complete { state: WizardState, api_key: String },
}

pub const PROMPT_KIND: &str = "Send provider type: openai-compat or custom-http";
pub const PROMPT_NAME: &str = "Send provider name (letters, digits, _ or -, max 64).";
pub const PROMPT_BASE_URL_OPENAI: &str = "Send base URL (example: https://api.x.ai/v1)";
pub const PROMPT_BASE_URL_CUSTOM: &str = "Send custom endpoint URL";
pub const PROMPT_ENDPOINT: &str = "Send endpoint mode: chat_completions or responses";
pub const PROMPT_HEADERS: &str =
    r#"Send headers JSON template (example: {"Authorization":"Bearer {{api_key}}"}) or '-'"#;
pub const PROMPT_API_KEY: &str = "Send API key (or '-' for empty).";

const INVALID_NAME: &str = "Invalid provider name. Use letters, digits, _ or -.";
const INVALID_ENDPOINT: &str = "Supported endpoint modes: chat_completions or responses";
const INVALID_HEADERS: &str = "Invalid JSON. Example: {\"Authorization\":\"Bearer {{api_key}}\"}";

/// Accepted alias spellings for the two provider kinds.
pub fn normalize_provider_kind(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_lowercase().as_str() {
        "openai" | "openai_compat" | "openai-compatible" | "openai-compat" => Some("openai_compat"),
        "custom_http" | "custom-http" | "custom" => Some("custom_http"),
        _ => None,
    }
}

/// `^[A-Za-z0-9_-]{1,64}$`
pub fn valid_provider_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Apply one user message to the session. Pure: the caller persists or
/// clears state and sends the reply.
pub fn transition(state: &WizardState, input: &str) -> WizardOutcome {
    let mut next = state.clone();
    match state.step {
        WizardStep::Kind => match normalize_provider_kind(input) {
            Some(kind) => {
                next.kind = kind.to_string();
                next.step = WizardStep::Name;
                WizardOutcome::Advance(next, PROMPT_NAME)
            }
            None => WizardOutcome::Reprompt(PROMPT_KIND),
        },

        WizardStep::Name => {
            if !valid_provider_name(input) {
                return WizardOutcome::Reprompt(INVALID_NAME);
            }
            next.name = input.to_string();
            next.step = WizardStep::BaseUrl;
            let prompt = if next.kind == "openai_compat" {
                PROMPT_BASE_URL_OPENAI
            } else {
                PROMPT_BASE_URL_CUSTOM
            };
            WizardOutcome::Advance(next, prompt)
        }

        WizardStep::BaseUrl => {
            next.base_url = input.to_string();
            if next.kind == "openai_compat" {
                next.step = WizardStep::Endpoint;
                WizardOutcome::Advance(next, PROMPT_ENDPOINT)
            } else {
                next.step = WizardStep::Headers;
                WizardOutcome::Advance(next, PROMPT_HEADERS)
            }
        }

        WizardStep::Endpoint => {
            let mode = input.trim().to_ascii_lowercase();
            if mode != "chat_completions" && mode != "responses" {
                return WizardOutcome::Reprompt(INVALID_ENDPOINT);
            }
            next.endpoint = mode;
            next.step = WizardStep::ApiKey;
            WizardOutcome::Advance(next, PROMPT_API_KEY)
        }

        WizardStep::Headers => {
            if input == "-" {
                next.headers_json = String::new();
            } else {
                let parsed: std::result::Result<
                    std::collections::HashMap<String, String>,
                    _,
                > = serde_json::from_str(input);
                if parsed.is_err() {
                    return WizardOutcome::Reprompt(INVALID_HEADERS);
                }
                next.headers_json = input.to_string();
            }
            next.step = WizardStep::ApiKey;
            WizardOutcome::Advance(next, PROMPT_API_KEY)
        }

        WizardStep::ApiKey => {
            let api_key = if input == "-" { String::new() } else { input.to_string() };
            WizardOutcome::Complete {
                state: state.clone(),
                api_key,
            }
        }
    }
}

/// TTL'd per-user session storage.
#[derive(Clone)]
pub struct WizardStore {
    cache: TtlCache,
    ttl: Duration,
}

impl WizardStore {
    pub fn new(cache: TtlCache, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    fn key(user_id: i64) -> String {
        format!("hyprbot:wizard:{user_id}")
    }

    pub async fn get(&self, user_id: i64) -> Result<Option<WizardState>> {
        Ok(self.cache.get_json(&Self::key(user_id)).await?)
    }

    pub async fn set(&self, user_id: i64, state: &WizardState) -> Result<()> {
        Ok(self.cache.put_json(&Self::key(user_id), state, self.ttl).await?)
    }

    pub async fn clear(&self, user_id: i64) -> Result<()> {
        Ok(self.cache.remove(&Self::key(user_id)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_aliases() {
        for alias in ["openai", "openai-compat", "OPENAI-COMPATIBLE", " openai_compat "] {
            assert_eq!(normalize_provider_kind(alias), Some("openai_compat"));
        }
        for alias in ["custom", "custom-http", "Custom_HTTP"] {
            assert_eq!(normalize_provider_kind(alias), Some("custom_http"));
        }
        assert_eq!(normalize_provider_kind("anthropic"), None);
        assert_eq!(normalize_provider_kind(""), None);
    }

    #[test]
    fn provider_name_validation() {
        assert!(valid_provider_name("grok"));
        assert!(valid_provider_name("my-provider_2"));
        assert!(valid_provider_name(&"a".repeat(64)));
        assert!(!valid_provider_name(""));
        assert!(!valid_provider_name(&"a".repeat(65)));
        assert!(!valid_provider_name("has space"));
        assert!(!valid_provider_name("ünïcode"));
    }

    #[test]
    fn step_names_on_the_wire() {
        let state = WizardState::begin(222);
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&state).unwrap()).unwrap();
        assert_eq!(value["step"], "kind");
        assert_eq!(value["target_chat_id"], 222);
    }

    #[test]
    fn openai_compat_happy_path() {
        let state = WizardState::begin(222);

        let WizardOutcome::Advance(state, prompt) = transition(&state, "openai-compat") else {
            panic!("kind step should advance");
        };
        assert_eq!(state.kind, "openai_compat");
        assert_eq!(prompt, PROMPT_NAME);

        let WizardOutcome::Advance(state, prompt) = transition(&state, "grok") else {
            panic!("name step should advance");
        };
        assert_eq!(prompt, PROMPT_BASE_URL_OPENAI);

        let WizardOutcome::Advance(state, prompt) = transition(&state, "https://api.x.ai/v1") else {
            panic!("base_url step should advance");
        };
        assert_eq!(prompt, PROMPT_ENDPOINT);

        let WizardOutcome::Advance(state, prompt) = transition(&state, "chat_completions") else {
            panic!("endpoint step should advance");
        };
        assert_eq!(prompt, PROMPT_API_KEY);

        let WizardOutcome::Complete { state, api_key } = transition(&state, "sk-xai") else {
            panic!("api_key step should complete");
        };
        assert_eq!(api_key, "sk-xai");
        assert_eq!(state.kind, "openai_compat");
        assert_eq!(state.name, "grok");
        assert_eq!(state.base_url, "https://api.x.ai/v1");
        assert_eq!(state.endpoint, "chat_completions");
    }

    #[test]
    fn custom_http_goes_through_headers() {
        let mut state = WizardState::begin(1);
        state.kind = "custom_http".to_string();
        state.step = WizardStep::BaseUrl;

        let WizardOutcome::Advance(state, prompt) = transition(&state, "https://llm.local/api") else {
            panic!("base_url step should advance");
        };
        assert_eq!(state.step, WizardStep::Headers);
        assert_eq!(prompt, PROMPT_HEADERS);

        // Valid headers JSON advances; "-" clears.
        let WizardOutcome::Advance(with_headers, _) =
            transition(&state, r#"{"Authorization":"Bearer {{api_key}}"}"#)
        else {
            panic!("headers step should advance");
        };
        assert_eq!(
            with_headers.headers_json,
            r#"{"Authorization":"Bearer {{api_key}}"}"#
        );

        let WizardOutcome::Advance(no_headers, _) = transition(&state, "-") else {
            panic!("dash should advance");
        };
        assert_eq!(no_headers.headers_json, "");
    }

    #[test]
    fn invalid_inputs_reprompt_without_advancing() {
        let state = WizardState::begin(1);
        assert_eq!(transition(&state, "vendor-x"), WizardOutcome::Reprompt(PROMPT_KIND));

        let mut state = WizardState::begin(1);
        state.step = WizardStep::Name;
        assert!(matches!(transition(&state, "bad name!"), WizardOutcome::Reprompt(_)));

        state.step = WizardStep::Endpoint;
        assert!(matches!(transition(&state, "completions"), WizardOutcome::Reprompt(_)));

        state.step = WizardStep::Headers;
        assert!(matches!(transition(&state, "{not json"), WizardOutcome::Reprompt(_)));
        // Header values must be strings.
        assert!(matches!(
            transition(&state, r#"{"a": 1}"#),
            WizardOutcome::Reprompt(_)
        ));
    }

    #[test]
    fn dash_api_key_means_empty() {
        let mut state = WizardState::begin(1);
        state.step = WizardStep::ApiKey;
        let WizardOutcome::Complete { api_key, .. } = transition(&state, "-") else {
            panic!("should complete");
        };
        assert_eq!(api_key, "");
    }
}
