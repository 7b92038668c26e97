//! Durable admin-cache hints.
//!
//! Written after every positive or negative admin decision; read only as a
//! hint. The short-TTL cache in front of this lives in the shared key/value
//! store.

use sqlx::{AnyPool, Row};

use crate::error::Result;

/// Record the latest admin decision for `(chat, user)`.
pub async fn set_admin_cache(pool: &AnyPool, chat_id: i64, user_id: i64, is_admin: bool) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO chat_admin_cache (chat_id, user_id, is_admin, updated_at)
        VALUES ($1, $2, $3, CURRENT_TIMESTAMP)
        ON CONFLICT(chat_id, user_id) DO UPDATE SET
            is_admin = excluded.is_admin,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(chat_id)
    .bind(user_id)
    .bind(if is_admin { 1i64 } else { 0i64 })
    .execute(pool)
    .await?;
    Ok(())
}

/// Read the hint, if any.
pub async fn get_admin_cache(pool: &AnyPool, chat_id: i64, user_id: i64) -> Result<Option<bool>> {
    let row = sqlx::query(
        r#"
        SELECT is_admin FROM chat_admin_cache WHERE chat_id = $1 AND user_id = $2
        "#,
    )
    .bind(chat_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let flag: i64 = row.try_get("is_admin")?;
            Ok(Some(flag != 0))
        }
        None => Ok(None),
    }
}
