//! Append-only audit log for configuration mutations.

use sqlx::{AnyPool, Row};

use crate::error::Result;
use crate::models::AuditEntry;

/// Append an entry. `meta_json` is sanitized to `"{}"` when empty or not
/// valid JSON.
pub async fn log_action(pool: &AnyPool, entry: &AuditEntry) -> Result<()> {
    let meta = entry.meta_json.trim();
    let meta = if meta.is_empty() || serde_json::from_str::<serde_json::Value>(meta).is_err() {
        "{}"
    } else {
        meta
    };

    sqlx::query(
        r#"
        INSERT INTO audit_log (chat_id, user_id, action, meta_json)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(entry.chat_id)
    .bind(entry.user_id)
    .bind(&entry.action)
    .bind(meta)
    .execute(pool)
    .await?;
    Ok(())
}

/// Most recent entries for a chat, newest first.
pub async fn list_actions(pool: &AnyPool, chat_id: i64, limit: i64) -> Result<Vec<AuditEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT chat_id, user_id, action, meta_json
        FROM audit_log
        WHERE chat_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2
        "#,
    )
    .bind(chat_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(AuditEntry {
                chat_id: row.try_get("chat_id")?,
                user_id: row.try_get("user_id")?,
                action: row.try_get("action")?,
                meta_json: row.try_get("meta_json")?,
            })
        })
        .collect()
}
