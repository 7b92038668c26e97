//! Command handlers.

use chrono::Utc;
use serde_json::json;
use tracing::{error, warn};

use storage::{AuditEntry, Preset, ProviderInstance};
use telegram_api::Message;

use crate::error::Result;
use crate::ui;
use crate::wizard::{self, WizardOutcome, WizardState};
use crate::{split_first_word, Service};

const DEFAULT_PARAMS_JSON: &str = r#"{"max_tokens":1024,"temperature":0.7,"allow_tools":false}"#;

impl Service {
    pub(crate) async fn help(&self, msg: &Message) -> Result<()> {
        self.reply(msg, &ui::help_text()).await
    }

    pub(crate) async fn menu(&self, msg: &Message) -> Result<()> {
        self.reply(msg, &ui::menu_text(&msg.chat.kind, self.cfg.access_mode.as_str()))
            .await
    }

    pub(crate) async fn setup(&self, msg: &Message) -> Result<()> {
        self.reply(msg, &ui::setup_text()).await
    }

    pub(crate) async fn status(&self, msg: &Message) -> Result<()> {
        let chat_id = msg.chat.id;
        let providers = storage::provider::list_providers(self.store.pool(), chat_id)
            .await
            .map(|p| p.len())
            .unwrap_or(0);
        let presets = storage::preset::list_presets(self.store.pool(), chat_id)
            .await
            .map(|p| p.len())
            .unwrap_or(0);
        let default_preset = storage::chat::get_default_preset_name(self.store.pool(), chat_id)
            .await
            .ok();

        let text = ui::status_text(
            chat_id,
            &msg.chat.kind,
            providers,
            presets,
            default_preset.as_deref(),
            self.cfg.access_mode.as_str(),
        );
        self.reply(msg, &text).await
    }

    pub(crate) async fn start(&self, msg: &Message, payload: &str) -> Result<()> {
        if msg.chat.is_private() {
            if let Some(raw) = payload.split_whitespace().next() {
                if let Some(chat_id) = raw.strip_prefix("llmadd_") {
                    return match chat_id.parse::<i64>() {
                        Ok(chat_id) => self.begin_llm_add_wizard(msg, chat_id).await,
                        Err(_) => self.reply(msg, "Invalid deep-link payload.").await,
                    };
                }
            }
        }
        self.help(msg).await
    }

    pub(crate) async fn cancel_wizard(&self, msg: &Message) -> Result<()> {
        if !msg.chat.is_private() {
            return Ok(());
        }
        if let Err(e) = self.wizard.clear(msg.from_id()).await {
            warn!(error = %e, "failed to clear wizard session");
            return self.reply(msg, "Failed to cancel wizard right now.").await;
        }
        self.reply(msg, "Wizard canceled.").await
    }

    pub(crate) async fn ask(&self, msg: &Message, rest: &str) -> Result<()> {
        let prompt = rest.trim();
        if prompt.is_empty() {
            return self.reply(msg, "Usage: /ask <text>").await;
        }
        self.enqueue_ask(msg, "", prompt).await
    }

    pub(crate) async fn ai(&self, msg: &Message, rest: &str) -> Result<()> {
        let (preset, prompt) = split_first_word(rest);
        if preset.is_empty() || prompt.is_empty() {
            return self.reply(msg, "Usage: /ai <preset> <text>").await;
        }
        self.enqueue_ask(msg, preset, prompt).await
    }

    async fn enqueue_ask(&self, msg: &Message, preset_name: &str, prompt: &str) -> Result<()> {
        if !self.allow_rate(msg).await? {
            return Ok(());
        }
        self.ensure_chat(msg).await;

        let job = queue::Job {
            job_id: String::new(),
            chat_id: msg.chat.id,
            chat_type: msg.chat.kind.clone(),
            user_id: msg.from_id(),
            message_id: msg.message_id,
            prompt: prompt.to_string(),
            preset_name: preset_name.to_string(),
            enqueued_at: None,
            attempts: 0,
        };
        if let Err(e) = self.queue.enqueue(job).await {
            error!(component = "ingress", error = %e, "failed to enqueue job");
            return self.reply(msg, "Queue is unavailable right now.").await;
        }
        self.metrics.enqueued_jobs.inc();
        self.reply(msg, "Accepted. Processing in queue.").await
    }

    /// Rate gate. Denials reply with the reset time; limiter failures fail
    /// open.
    async fn allow_rate(&self, msg: &Message) -> Result<bool> {
        let user_id = msg.from_id();
        if user_id == 0 {
            return Ok(true);
        }
        let decision = match self.rate.allow(msg.chat.id, user_id, Utc::now()).await {
            Ok(decision) => decision,
            Err(e) => {
                error!(component = "ingress", error = %e, "rate limiter failed");
                return Ok(true);
            }
        };
        if decision.allowed {
            return Ok(true);
        }
        let text = format!(
            "Rate limit exceeded. Try again after {}",
            decision.reset_at.format("%H:%M UTC")
        );
        self.reply(msg, &text).await?;
        Ok(false)
    }

    pub(crate) async fn ai_list(&self, msg: &Message) -> Result<()> {
        let chat_id = msg.chat.id;
        let presets = match storage::preset::list_presets(self.store.pool(), chat_id).await {
            Ok(presets) => presets,
            Err(e) => {
                error!(component = "ingress", error = %e, "list presets failed");
                return self.reply(msg, "Failed to load presets.").await;
            }
        };
        if presets.is_empty() {
            return self.reply(msg, "No presets configured.").await;
        }

        let default_name = storage::chat::get_default_preset_name(self.store.pool(), chat_id)
            .await
            .unwrap_or_default();

        let mut lines = vec!["Presets:".to_string()];
        for p in presets {
            let mut line = format!("- {} ({})", p.name, p.model);
            if p.name == default_name {
                line.push_str(" [default]");
            }
            lines.push(line);
        }
        self.reply(msg, &lines.join("\n")).await
    }

    pub(crate) async fn ai_preset_add(&self, msg: &Message, rest: &str) -> Result<()> {
        let Some((chat_id, user_id)) = self.require_admin(msg).await? else {
            return Ok(());
        };

        let (name, rest) = split_first_word(rest);
        let (provider_name, rest) = split_first_word(rest);
        let (model, system_prompt) = split_first_word(rest);
        let system_prompt = system_prompt.trim();
        if name.is_empty() || provider_name.is_empty() || model.is_empty() || system_prompt.is_empty() {
            return self
                .reply(msg, "Usage: /ai_preset_add <name> <provider> <model> <system_prompt...>")
                .await;
        }

        let provider =
            match storage::provider::get_provider_by_name(self.store.pool(), chat_id, provider_name)
                .await
            {
                Ok(provider) => provider,
                Err(e) if e.is_not_found() => {
                    return self.reply(msg, "Provider not found.").await;
                }
                Err(e) => {
                    error!(component = "ingress", error = %e, "get provider failed");
                    return self.reply(msg, "Failed to read provider.").await;
                }
            };

        let preset = Preset {
            chat_id,
            name: name.to_string(),
            provider_instance_id: provider.id,
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
            params_json: DEFAULT_PARAMS_JSON.to_string(),
        };
        if let Err(e) = storage::preset::upsert_preset(self.store.pool(), &preset).await {
            error!(component = "ingress", error = %e, "upsert preset failed");
            return self.reply(msg, "Failed to save preset.").await;
        }

        // First preset of a chat becomes the default.
        if let Err(e) = storage::chat::get_default_preset_name(self.store.pool(), chat_id).await {
            if e.is_not_found() {
                if let Err(e) =
                    storage::chat::set_default_preset(self.store.pool(), chat_id, name).await
                {
                    warn!(error = %e, "failed to set initial default preset");
                }
            }
        }

        self.audit(
            chat_id,
            user_id,
            "preset_add",
            json!({"name": name, "provider": provider_name, "model": model}),
        )
        .await;
        self.reply(msg, "Preset saved.").await
    }

    pub(crate) async fn ai_preset_del(&self, msg: &Message, rest: &str) -> Result<()> {
        let Some((chat_id, user_id)) = self.require_admin(msg).await? else {
            return Ok(());
        };
        let name = rest.trim();
        if name.is_empty() {
            return self.reply(msg, "Usage: /ai_preset_del <name>").await;
        }

        match storage::preset::delete_preset(self.store.pool(), chat_id, name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                return self.reply(msg, "Preset not found.").await;
            }
            Err(e) => {
                error!(component = "ingress", error = %e, "delete preset failed");
                return self.reply(msg, "Failed to delete preset.").await;
            }
        }

        // Deleting the default clears the pointer.
        if let Ok(default_name) =
            storage::chat::get_default_preset_name(self.store.pool(), chat_id).await
        {
            if default_name == name {
                if let Err(e) = storage::chat::clear_default_preset(self.store.pool(), chat_id).await
                {
                    warn!(error = %e, "failed to clear default preset");
                }
            }
        }

        self.audit(chat_id, user_id, "preset_del", json!({"name": name})).await;
        self.reply(msg, "Preset deleted.").await
    }

    pub(crate) async fn ai_default(&self, msg: &Message, rest: &str) -> Result<()> {
        let Some((chat_id, user_id)) = self.require_admin(msg).await? else {
            return Ok(());
        };
        let name = rest.trim();
        if name.is_empty() {
            return self.reply(msg, "Usage: /ai_default <name>").await;
        }

        match storage::preset::get_preset_with_provider_by_name(self.store.pool(), chat_id, name)
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                return self.reply(msg, "Preset not found.").await;
            }
            Err(e) => {
                error!(component = "ingress", error = %e, "read preset failed");
                return self.reply(msg, "Failed to read preset.").await;
            }
        }

        if let Err(e) = storage::chat::set_default_preset(self.store.pool(), chat_id, name).await {
            error!(component = "ingress", error = %e, "set default preset failed");
            return self.reply(msg, "Failed to set default preset.").await;
        }
        self.audit(chat_id, user_id, "preset_default", json!({"name": name})).await;
        self.reply(msg, "Default preset updated.").await
    }

    pub(crate) async fn llm_add(&self, msg: &Message) -> Result<()> {
        if msg.chat.is_private() {
            return self.reply(msg, "Run /llm_add in your group/supergroup first.").await;
        }
        let Some((chat_id, _)) = self.require_admin(msg).await? else {
            return Ok(());
        };

        let Some(link) = self.deep_link(&format!("llmadd_{chat_id}")) else {
            return self
                .reply(msg, "Unable to generate deep-link. Check bot username.")
                .await;
        };
        self.reply(msg, &format!("Continue in private chat: {link}")).await
    }

    pub(crate) async fn llm_list(&self, msg: &Message) -> Result<()> {
        let Some((chat_id, _)) = self.require_admin(msg).await? else {
            return Ok(());
        };
        let providers = match storage::provider::list_providers(self.store.pool(), chat_id).await {
            Ok(providers) => providers,
            Err(e) => {
                error!(component = "ingress", error = %e, "list providers failed");
                return self.reply(msg, "Failed to list providers.").await;
            }
        };
        if providers.is_empty() {
            return self.reply(msg, "No providers configured.").await;
        }
        let mut lines = vec!["Providers:".to_string()];
        for p in providers {
            lines.push(format!("- {} [{}] {}", p.name, p.kind, p.base_url));
        }
        self.reply(msg, &lines.join("\n")).await
    }

    pub(crate) async fn llm_del(&self, msg: &Message, rest: &str) -> Result<()> {
        let Some((chat_id, user_id)) = self.require_admin(msg).await? else {
            return Ok(());
        };
        let name = rest.trim();
        if name.is_empty() {
            return self.reply(msg, "Usage: /llm_del <name>").await;
        }

        match storage::provider::delete_provider_by_name(self.store.pool(), chat_id, name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                return self.reply(msg, "Provider not found.").await;
            }
            Err(e) => {
                error!(component = "ingress", error = %e, "delete provider failed");
                return self.reply(msg, "Failed to delete provider.").await;
            }
        }
        self.audit(chat_id, user_id, "provider_del", json!({"name": name})).await;
        self.reply(msg, "Provider deleted.").await
    }

    /// `/start llmadd_<chat>` in private chat: verify the caller is an
    /// admin of the target chat, then open the session.
    async fn begin_llm_add_wizard(&self, msg: &Message, target_chat_id: i64) -> Result<()> {
        let user_id = msg.from_id();
        match self.is_admin(target_chat_id, user_id).await {
            Ok(true) => {}
            Ok(false) => {
                return self.reply(msg, "You are not an admin in that chat.").await;
            }
            Err(e) => {
                error!(component = "ingress", chat_id = target_chat_id, error = %e, "admin check failed in dm wizard");
                return self.reply(msg, "Could not verify admin rights. Please retry.").await;
            }
        }

        if let Err(e) =
            storage::chat::ensure_chat(self.store.pool(), target_chat_id, "group", "").await
        {
            warn!(chat_id = target_chat_id, error = %e, "failed to upsert target chat");
        }

        let state = WizardState::begin(target_chat_id);
        if let Err(e) = self.wizard.set(user_id, &state).await {
            error!(component = "ingress", error = %e, "failed to start wizard");
            return self.reply(msg, "Failed to start wizard.").await;
        }
        self.reply(msg, &format!("Wizard started. {}", wizard::PROMPT_KIND)).await
    }

    /// Non-command private text drives the wizard, if a session exists.
    pub(crate) async fn private_text(&self, msg: &Message) -> Result<()> {
        let user_id = msg.from_id();
        let state = match self.wizard.get(user_id).await {
            Ok(state) => state,
            Err(e) => {
                error!(component = "ingress", error = %e, "wizard load failed");
                return self.reply(msg, "Wizard state error. Start again with /llm_add.").await;
            }
        };
        let Some(state) = state else {
            return Ok(());
        };

        match wizard::transition(&state, msg.text().trim()) {
            WizardOutcome::Reprompt(prompt) => self.reply(msg, prompt).await,
            WizardOutcome::Advance(next, prompt) => {
                if let Err(e) = self.wizard.set(user_id, &next).await {
                    error!(component = "ingress", error = %e, "wizard persist failed");
                    return self.reply(msg, "Failed to persist wizard state.").await;
                }
                self.reply(msg, prompt).await
            }
            WizardOutcome::Complete { state, api_key } => {
                if let Err(e) = self.finish_wizard(user_id, &state, &api_key).await {
                    error!(component = "ingress", error = %e, "finish wizard failed");
                    return self.reply(msg, "Failed to save provider. Try again with /llm_add.").await;
                }
                if let Err(e) = self.wizard.clear(user_id).await {
                    warn!(error = %e, "failed to clear finished wizard session");
                }
                self.reply(msg, "Provider saved. Use /llm_list in group.").await
            }
        }
    }

    /// Seal the collected secrets and persist the provider row.
    async fn finish_wizard(&self, actor_user_id: i64, state: &WizardState, api_key: &str) -> Result<()> {
        let enc_api_key = if api_key.trim().is_empty() {
            None
        } else {
            Some(self.keyring.seal_string(api_key)?)
        };
        let enc_headers_json = if state.headers_json.trim().is_empty() {
            None
        } else {
            Some(self.keyring.seal_string(&state.headers_json)?)
        };

        let config = if state.kind == "openai_compat" {
            json!({"endpoint": state.endpoint})
        } else {
            json!({})
        };

        let provider = ProviderInstance {
            id: 0,
            chat_id: state.target_chat_id,
            name: state.name.clone(),
            kind: state.kind.clone(),
            base_url: state.base_url.clone(),
            enc_api_key,
            enc_headers_json,
            config_json: config.to_string(),
        };
        storage::provider::upsert_provider_instance(self.store.pool(), &provider).await?;

        self.audit(
            state.target_chat_id,
            actor_user_id,
            "provider_add",
            json!({"name": state.name, "kind": state.kind}),
        )
        .await;
        Ok(())
    }

    async fn audit(&self, chat_id: i64, user_id: i64, action: &str, meta: serde_json::Value) {
        let entry = AuditEntry {
            chat_id,
            user_id,
            action: action.to_string(),
            meta_json: meta.to_string(),
        };
        if let Err(e) = storage::audit::log_action(self.store.pool(), &entry).await {
            warn!(action = entry.action, error = %e, "failed to write audit entry");
        }
    }
}
