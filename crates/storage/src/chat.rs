//! Chat upserts and default-preset pointer maintenance.

use sqlx::{AnyPool, Row};

use crate::error::{Result, StorageError};
use crate::models::Chat;

/// Blind upsert: creates the chat on first observation and refreshes
/// `type` and `title` afterwards.
pub async fn ensure_chat(pool: &AnyPool, chat_id: i64, kind: &str, title: &str) -> Result<()> {
    let kind = if kind.is_empty() { "unknown" } else { kind };
    sqlx::query(
        r#"
        INSERT INTO chats (id, type, title)
        VALUES ($1, $2, $3)
        ON CONFLICT(id) DO UPDATE SET type = excluded.type, title = excluded.title
        "#,
    )
    .bind(chat_id)
    .bind(kind)
    .bind(title)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch a chat row.
pub async fn get_chat(pool: &AnyPool, chat_id: i64) -> Result<Chat> {
    let row = sqlx::query(
        r#"
        SELECT id, type, title, default_preset_name
        FROM chats
        WHERE id = $1
        "#,
    )
    .bind(chat_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StorageError::not_found("Chat", chat_id.to_string()))?;

    Ok(Chat {
        id: row.try_get("id")?,
        kind: row.try_get("type")?,
        title: row.try_get("title")?,
        default_preset_name: row.try_get("default_preset_name")?,
    })
}

/// Point the chat at one of its presets. The chat must already exist; the
/// caller is responsible for having verified the preset.
pub async fn set_default_preset(pool: &AnyPool, chat_id: i64, name: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE chats SET default_preset_name = $1 WHERE id = $2
        "#,
    )
    .bind(name)
    .bind(chat_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("Chat", chat_id.to_string()));
    }
    Ok(())
}

/// Clear the default pointer. Idempotent.
pub async fn clear_default_preset(pool: &AnyPool, chat_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE chats SET default_preset_name = NULL WHERE id = $1
        "#,
    )
    .bind(chat_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Resolve the default preset name; `NotFound` when the chat is missing or
/// the pointer is unset.
pub async fn get_default_preset_name(pool: &AnyPool, chat_id: i64) -> Result<String> {
    let row = sqlx::query(
        r#"
        SELECT default_preset_name FROM chats WHERE id = $1
        "#,
    )
    .bind(chat_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StorageError::not_found("Chat", chat_id.to_string()))?;

    let name: Option<String> = row.try_get("default_preset_name")?;
    match name {
        Some(name) if !name.trim().is_empty() => Ok(name),
        _ => Err(StorageError::not_found("DefaultPreset", chat_id.to_string())),
    }
}
