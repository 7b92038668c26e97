//! At-most-once filter on platform update ids.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ExistenceCheck, SetExpiry, SetOptions};

use crate::error::Result;

/// Create-if-absent marker per update id with a bounded TTL.
#[derive(Clone)]
pub struct UpdateDeduplicator {
    conn: ConnectionManager,
    ttl: Duration,
}

impl UpdateDeduplicator {
    pub fn new(conn: ConnectionManager, ttl: Duration) -> Self {
        Self { conn, ttl }
    }

    /// Returns true only for the writer that actually created the key;
    /// repeated deliveries of the same update id within the TTL see false.
    pub async fn mark_first(&self, update_id: i64) -> Result<bool> {
        let key = format!("hyprbot:update:{update_id}");
        let options = SetOptions::default()
            .conditional_set(ExistenceCheck::NX)
            .with_expiration(SetExpiry::EX(self.ttl.as_secs()));

        let mut conn = self.conn.clone();
        let created: bool = conn.set_options(key, "1", options).await?;
        Ok(created)
    }
}
