//! Per-job processing: preset resolution, credential decryption, the
//! provider call, and the reply.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use providers::{ChatProvider, ChatRequest};
use queue::Job;

use crate::error::{Result, WorkerError};
use crate::Worker;

/// Reply length cap in Unicode scalar values, matching the platform's
/// message limit.
const MAX_REPLY_CHARS: usize = 4000;

/// Decoded `params_json`. Unknown keys are ignored; a malformed document
/// falls back to the defaults wholesale.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PresetParams {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub allow_tools: bool,
}

impl Default for PresetParams {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            allow_tools: false,
        }
    }
}

fn default_max_tokens() -> i64 {
    1024
}

fn default_temperature() -> f64 {
    0.7
}

impl PresetParams {
    /// Parse stored params. Silent fallback to defaults on malformed JSON.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::default();
        }
        serde_json::from_str(raw).unwrap_or_else(|e| {
            debug!(error = %e, "malformed params_json, using defaults");
            Self::default()
        })
    }
}

/// Trim, substitute the canned text for empty replies, and cap to the
/// platform limit by characters, not bytes.
pub(crate) fn shape_reply(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return "Provider returned an empty response.".to_string();
    }
    if text.chars().count() <= MAX_REPLY_CHARS {
        return text.to_string();
    }
    text.chars().take(MAX_REPLY_CHARS).collect()
}

impl Worker {
    pub(crate) async fn process_job(&self, job: &Job) -> Result<()> {
        let resolved = match self.resolve_preset(job.chat_id, &job.preset_name).await {
            Ok(resolved) => resolved,
            Err(e) if e_is_not_found(&e) => {
                // Terminal but user-visible: guide and ack without retry.
                self.send_error(
                    job.chat_id,
                    job.message_id,
                    "Preset not found. Configure /ai_default or use /ai <preset>.",
                )
                .await;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let (preset, provider) = (resolved.preset, resolved.provider);

        let api_key = self.decrypt_optional(provider.enc_api_key.as_deref())?;
        let headers = match self.decrypt_optional(provider.enc_headers_json.as_deref())? {
            raw if raw.trim().is_empty() => HashMap::new(),
            raw => serde_json::from_str::<HashMap<String, String>>(&raw)
                .map_err(|e| WorkerError::BadProviderRow(format!("parse headers json: {e}")))?,
        };

        let config: Map<String, Value> = match provider.config_json.trim() {
            "" => Map::new(),
            raw => serde_json::from_str(raw)
                .map_err(|e| WorkerError::BadProviderRow(format!("parse provider config: {e}")))?,
        };

        let params = PresetParams::parse(&preset.params_json);

        let adapter = providers::build(providers::BuildOptions {
            kind: provider.kind,
            base_url: provider.base_url,
            api_key,
            headers,
            config,
            http: self.http.clone(),
            retry: self.provider_retry,
        })?;

        let response = adapter
            .chat(&ChatRequest {
                model: preset.model,
                system_prompt: preset.system_prompt,
                user_prompt: job.prompt.clone(),
                max_tokens: params.max_tokens,
                temperature: params.temperature,
                allow_tools: params.allow_tools,
            })
            .await?;

        let text = shape_reply(&response.text);
        let reply_to = (job.message_id > 0).then_some(job.message_id);
        self.bot.send_message(job.chat_id, &text, reply_to).await?;
        Ok(())
    }

    async fn resolve_preset(
        &self,
        chat_id: i64,
        preset_name: &str,
    ) -> Result<storage::PresetWithProvider> {
        if preset_name.trim().is_empty() {
            Ok(storage::preset::get_default_preset_with_provider(self.store.pool(), chat_id).await?)
        } else {
            Ok(storage::preset::get_preset_with_provider_by_name(
                self.store.pool(),
                chat_id,
                preset_name,
            )
            .await?)
        }
    }

    fn decrypt_optional(&self, raw: Option<&str>) -> Result<String> {
        match raw {
            Some(raw) if !raw.trim().is_empty() => Ok(self.keyring.open_string(raw)?),
            _ => Ok(String::new()),
        }
    }
}

fn e_is_not_found(e: &WorkerError) -> bool {
    matches!(e, WorkerError::Storage(inner) if inner.is_not_found())
}
