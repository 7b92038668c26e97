//! Two-tier admin resolution: short-TTL cache in front of the platform
//! API, with a durable hint row written after every decision.

use tracing::warn;

use telegram_api::Message;

use crate::error::Result;
use crate::Service;

impl Service {
    /// Resolve whether `user_id` administers `chat_id`. Cached decisions
    /// ("0"/"1") are honored for the configured TTL; misses hit the
    /// platform API and write both cache tiers.
    pub(crate) async fn is_admin(&self, chat_id: i64, user_id: i64) -> Result<bool> {
        let cache_key = format!("hyprbot:admin:{chat_id}:{user_id}");
        match self.cache.get_string(&cache_key).await {
            Ok(Some(value)) => return Ok(value == "1"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to read admin cache"),
        }

        let member = self.bot.get_chat_member(chat_id, user_id).await?;
        let admin = member.is_admin();

        let value = if admin { "1" } else { "0" };
        if let Err(e) = self
            .cache
            .put_string(&cache_key, value, self.cfg.admin_cache_ttl)
            .await
        {
            warn!(error = %e, "failed to write admin cache");
        }
        if let Err(e) =
            storage::admin::set_admin_cache(self.store.pool(), chat_id, user_id, admin).await
        {
            warn!(error = %e, "failed to write durable admin hint");
        }

        Ok(admin)
    }

    /// Gate for configuration-mutating commands: non-private chat and an
    /// admin caller. Replies with the specific denial and returns `None`
    /// when the gate fails.
    pub(crate) async fn require_admin(&self, msg: &Message) -> Result<Option<(i64, i64)>> {
        if msg.chat.is_private() {
            self.reply(msg, "Run this command in group/supergroup.").await?;
            return Ok(None);
        }

        let chat_id = msg.chat.id;
        let user_id = msg.from_id();
        match self.is_admin(chat_id, user_id).await {
            Ok(true) => {}
            Ok(false) => {
                self.reply(msg, "Only chat admins can run this command.").await?;
                return Ok(None);
            }
            Err(e) => {
                warn!(chat_id, user_id, error = %e, "admin check failed");
                self.reply(msg, "Failed to verify admin rights.").await?;
                return Ok(None);
            }
        }

        self.ensure_chat(msg).await;
        Ok(Some((chat_id, user_id)))
    }
}
