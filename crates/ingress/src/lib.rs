//! Ingress: decodes platform updates and turns eligible requests into
//! queued jobs.
//!
//! Every update flows through the pre-filter (count, access gate, dedup)
//! and then the command router. Queue-triggering commands validate, rate
//! limit, upsert the chat, and enqueue; configuration-mutating commands sit
//! behind the admin resolver; the provider onboarding wizard runs over
//! private messages.

pub mod error;
pub mod wizard;

mod admin;
mod commands;
mod ui;

pub use error::{IngressError, Result};
pub use wizard::{WizardState, WizardStep};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{error, warn};

use botmetrics::Metrics;
use envelope::Keyring;
use queue::{RateLimiter, StreamQueue, TtlCache, UpdateDeduplicator};
use storage::Store;
use telegram_api::{BotClient, Message, Update};

use crate::wizard::WizardStore;

/// Who may talk to the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Everyone.
    Public,
    /// Only the configured admin user; other updates are dropped before any
    /// handler runs.
    Private,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// Tunables for the ingress service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bot_username: String,
    pub access_mode: AccessMode,
    pub admin_user_id: i64,
    pub admin_cache_ttl: Duration,
    pub wizard_ttl: Duration,
}

/// Collaborators the service is wired with.
pub struct ServiceDeps {
    pub bot: BotClient,
    pub store: Store,
    pub queue: StreamQueue,
    pub keyring: Keyring,
    pub rate: RateLimiter,
    pub dedupe: UpdateDeduplicator,
    pub cache: TtlCache,
    pub config: ServiceConfig,
}

/// The command service. One instance serves all chats.
pub struct Service {
    pub(crate) bot: BotClient,
    pub(crate) store: Store,
    pub(crate) queue: StreamQueue,
    pub(crate) keyring: Keyring,
    pub(crate) rate: RateLimiter,
    pub(crate) dedupe: UpdateDeduplicator,
    pub(crate) wizard: WizardStore,
    pub(crate) cache: TtlCache,
    pub(crate) metrics: &'static Metrics,
    pub(crate) cfg: ServiceConfig,
}

impl Service {
    pub fn new(deps: ServiceDeps) -> Self {
        let wizard = WizardStore::new(deps.cache.clone(), deps.config.wizard_ttl);
        Self {
            bot: deps.bot,
            store: deps.store,
            queue: deps.queue,
            keyring: deps.keyring,
            rate: deps.rate,
            dedupe: deps.dedupe,
            wizard,
            cache: deps.cache,
            metrics: botmetrics::global(),
            cfg: deps.config,
        }
    }

    /// Pre-filter and route one update: count it, enforce the access mode,
    /// drop duplicates, then dispatch the message.
    pub async fn handle_update(&self, update: Update) -> Result<()> {
        self.metrics.updates_total.inc();

        if self.cfg.access_mode == AccessMode::Private {
            let from = update.message.as_ref().map(|m| m.from_id()).unwrap_or(0);
            if from != self.cfg.admin_user_id {
                return Ok(());
            }
        }

        match self.dedupe.mark_first(update.update_id).await {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => {
                // Dedup is best-effort: fail open.
                warn!(update_id = update.update_id, error = %e, "failed to dedupe update");
            }
        }

        let Some(message) = update.message else {
            return Ok(());
        };
        self.route_message(&message).await
    }

    async fn route_message(&self, msg: &Message) -> Result<()> {
        let text = msg.text();
        if let Some((command, rest)) = parse_command(text) {
            return match command {
                "help" => self.help(msg).await,
                "start" => self.start(msg, rest).await,
                "menu" => self.menu(msg).await,
                "setup" => self.setup(msg).await,
                "status" => self.status(msg).await,
                "cancel" => self.cancel_wizard(msg).await,
                "ask" => self.ask(msg, rest).await,
                "ai" => self.ai(msg, rest).await,
                "ai_list" => self.ai_list(msg).await,
                "ai_preset_add" => self.ai_preset_add(msg, rest).await,
                "ai_preset_del" => self.ai_preset_del(msg, rest).await,
                "ai_default" => self.ai_default(msg, rest).await,
                "llm_add" => self.llm_add(msg).await,
                "llm_list" => self.llm_list(msg).await,
                "llm_del" => self.llm_del(msg, rest).await,
                _ => Ok(()),
            };
        }

        if msg.chat.is_private() && !text.trim().is_empty() {
            return self.private_text(msg).await;
        }
        Ok(())
    }

    pub(crate) async fn reply(&self, msg: &Message, text: &str) -> Result<()> {
        self.bot.send_message(msg.chat.id, text, None).await?;
        Ok(())
    }

    pub(crate) async fn ensure_chat(&self, msg: &Message) {
        if let Err(e) =
            storage::chat::ensure_chat(self.store.pool(), msg.chat.id, &msg.chat.kind, msg.chat.title())
                .await
        {
            warn!(chat_id = msg.chat.id, error = %e, "failed to upsert chat");
        }
    }

    /// Deep link opening the bot's private chat with a start payload.
    pub(crate) fn deep_link(&self, param: &str) -> Option<String> {
        let username = self.cfg.bot_username.trim();
        if username.is_empty() {
            return None;
        }
        Some(format!("https://t.me/{username}?start={param}"))
    }
}

/// Parse a `/command rest` message. Returns the command name with any
/// `@botname` suffix removed, and the trimmed remainder.
pub(crate) fn parse_command(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    let stripped = text.strip_prefix('/')?;
    let (token, rest) = split_first_word(stripped);
    if token.is_empty() {
        return None;
    }
    let name = token.split('@').next().unwrap_or(token);
    Some((name, rest))
}

/// Split off the first whitespace-delimited word.
pub(crate) fn split_first_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.find(char::is_whitespace) {
        Some(idx) => (&s[..idx], s[idx..].trim_start()),
        None => (s, ""),
    }
}

/// Fans updates out to handler tasks, bounded by a permit pool.
pub struct UpdateDispatcher {
    service: Arc<Service>,
    permits: Arc<Semaphore>,
}

impl UpdateDispatcher {
    pub fn new(service: Arc<Service>, max_in_flight: usize) -> Self {
        Self {
            service,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Handle one update on its own task. Handler errors are logged, never
    /// propagated.
    pub fn dispatch(&self, update: Update) {
        let service = Arc::clone(&self.service);
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let update_id = update.update_id;
            if let Err(e) = service.handle_update(update).await {
                error!(component = "ingress", update_id, error = %e, "update handler failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_parsing() {
        assert_eq!(parse_command("/ask hello world"), Some(("ask", "hello world")));
        assert_eq!(parse_command("/ask"), Some(("ask", "")));
        assert_eq!(parse_command("/ask@hyprbot_bot hi"), Some(("ask", "hi")));
        assert_eq!(parse_command("/ai grok hi"), Some(("ai", "grok hi")));
        assert_eq!(parse_command("plain text"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("/"), None);
    }

    #[test]
    fn commands_are_case_sensitive() {
        // `/ASK` parses as command name "ASK", which matches no handler.
        assert_eq!(parse_command("/ASK hi"), Some(("ASK", "hi")));
    }

    #[test]
    fn first_word_split() {
        assert_eq!(split_first_word("grok rest of it"), ("grok", "rest of it"));
        assert_eq!(split_first_word("  solo  "), ("solo", ""));
        assert_eq!(split_first_word(""), ("", ""));
    }
}
