//! Provider-instance persistence.

use sqlx::any::AnyRow;
use sqlx::{AnyPool, Row};

use crate::error::{Result, StorageError};
use crate::models::ProviderInstance;

pub(crate) fn provider_from_row(row: &AnyRow, prefix: &str) -> Result<ProviderInstance> {
    let col = |name: &str| format!("{prefix}{name}");
    Ok(ProviderInstance {
        id: row.try_get(col("id").as_str())?,
        chat_id: row.try_get(col("chat_id").as_str())?,
        name: row.try_get(col("name").as_str())?,
        kind: row.try_get(col("kind").as_str())?,
        base_url: row.try_get(col("base_url").as_str())?,
        enc_api_key: row.try_get(col("enc_api_key").as_str())?,
        enc_headers_json: row.try_get(col("enc_headers_json").as_str())?,
        config_json: row.try_get(col("config_json").as_str())?,
    })
}

/// Insert or update by `(chat_id, name)` and return the surrogate id.
///
/// `NotFound` on the follow-up id lookup only happens if the row was
/// concurrently deleted.
pub async fn upsert_provider_instance(pool: &AnyPool, p: &ProviderInstance) -> Result<i64> {
    let config_json = if p.config_json.is_empty() {
        "{}"
    } else {
        p.config_json.as_str()
    };

    sqlx::query(
        r#"
        INSERT INTO provider_instances
            (chat_id, name, kind, base_url, enc_api_key, enc_headers_json, config_json)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT(chat_id, name) DO UPDATE SET
            kind = excluded.kind,
            base_url = excluded.base_url,
            enc_api_key = excluded.enc_api_key,
            enc_headers_json = excluded.enc_headers_json,
            config_json = excluded.config_json
        "#,
    )
    .bind(p.chat_id)
    .bind(&p.name)
    .bind(&p.kind)
    .bind(&p.base_url)
    .bind(&p.enc_api_key)
    .bind(&p.enc_headers_json)
    .bind(config_json)
    .execute(pool)
    .await?;

    get_provider_instance_id(pool, p.chat_id, &p.name).await
}

/// Look up the surrogate id for a `(chat_id, name)` pair.
pub async fn get_provider_instance_id(pool: &AnyPool, chat_id: i64, name: &str) -> Result<i64> {
    let row = sqlx::query(
        r#"
        SELECT id FROM provider_instances WHERE chat_id = $1 AND name = $2
        "#,
    )
    .bind(chat_id)
    .bind(name)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StorageError::not_found("ProviderInstance", name))?;

    Ok(row.try_get("id")?)
}

/// Fetch a provider by name within a chat.
pub async fn get_provider_by_name(
    pool: &AnyPool,
    chat_id: i64,
    name: &str,
) -> Result<ProviderInstance> {
    let row = sqlx::query(
        r#"
        SELECT id, chat_id, name, kind, base_url, enc_api_key, enc_headers_json, config_json
        FROM provider_instances
        WHERE chat_id = $1 AND name = $2
        "#,
    )
    .bind(chat_id)
    .bind(name)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StorageError::not_found("ProviderInstance", name))?;

    provider_from_row(&row, "")
}

/// List a chat's providers in creation order.
pub async fn list_providers(pool: &AnyPool, chat_id: i64) -> Result<Vec<ProviderInstance>> {
    let rows = sqlx::query(
        r#"
        SELECT id, chat_id, name, kind, base_url, enc_api_key, enc_headers_json, config_json
        FROM provider_instances
        WHERE chat_id = $1
        ORDER BY created_at ASC, name ASC
        "#,
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(|row| provider_from_row(row, "")).collect()
}

/// Delete a provider by name; `NotFound` when nothing was deleted.
pub async fn delete_provider_by_name(pool: &AnyPool, chat_id: i64, name: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM provider_instances WHERE chat_id = $1 AND name = $2
        "#,
    )
    .bind(chat_id)
    .bind(name)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("ProviderInstance", name));
    }
    Ok(())
}
