//! Row types for the configuration store.

/// A chat observed by the bot. `default_preset_name` points at one of the
/// chat's presets, or is unset.
#[derive(Debug, Clone)]
pub struct Chat {
    pub id: i64,
    pub kind: String,
    pub title: String,
    pub default_preset_name: Option<String>,
}

/// An LLM endpoint configured for one chat. `enc_api_key` and
/// `enc_headers_json` are serialized envelopes, never plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInstance {
    pub id: i64,
    pub chat_id: i64,
    pub name: String,
    pub kind: String,
    pub base_url: String,
    pub enc_api_key: Option<String>,
    pub enc_headers_json: Option<String>,
    pub config_json: String,
}

/// A named bundle of provider + model + prompt + parameters, scoped to a
/// chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub chat_id: i64,
    pub name: String,
    pub provider_instance_id: i64,
    pub model: String,
    pub system_prompt: String,
    pub params_json: String,
}

/// A preset joined with the provider it references.
#[derive(Debug, Clone)]
pub struct PresetWithProvider {
    pub preset: Preset,
    pub provider: ProviderInstance,
}

/// One append-only audit record.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub chat_id: i64,
    pub user_id: i64,
    pub action: String,
    pub meta_json: String,
}
