//! Preset persistence and the joined preset+provider read used by workers.

use sqlx::any::AnyRow;
use sqlx::{AnyPool, Row};

use crate::chat;
use crate::error::{Result, StorageError};
use crate::models::{Preset, PresetWithProvider};
use crate::provider::provider_from_row;

/// Insert or update by the `(chat_id, name)` primary key.
pub async fn upsert_preset(pool: &AnyPool, p: &Preset) -> Result<()> {
    let params_json = if p.params_json.is_empty() {
        "{}"
    } else {
        p.params_json.as_str()
    };

    sqlx::query(
        r#"
        INSERT INTO presets (chat_id, name, provider_instance_id, model, system_prompt, params_json)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT(chat_id, name) DO UPDATE SET
            provider_instance_id = excluded.provider_instance_id,
            model = excluded.model,
            system_prompt = excluded.system_prompt,
            params_json = excluded.params_json
        "#,
    )
    .bind(p.chat_id)
    .bind(&p.name)
    .bind(p.provider_instance_id)
    .bind(&p.model)
    .bind(&p.system_prompt)
    .bind(params_json)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete a preset; `NotFound` when nothing was deleted.
pub async fn delete_preset(pool: &AnyPool, chat_id: i64, name: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM presets WHERE chat_id = $1 AND name = $2
        "#,
    )
    .bind(chat_id)
    .bind(name)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("Preset", name));
    }
    Ok(())
}

/// List a chat's presets in creation order.
pub async fn list_presets(pool: &AnyPool, chat_id: i64) -> Result<Vec<Preset>> {
    let rows = sqlx::query(
        r#"
        SELECT chat_id, name, provider_instance_id, model, system_prompt, params_json
        FROM presets
        WHERE chat_id = $1
        ORDER BY created_at ASC, name ASC
        "#,
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(preset_from_row).collect()
}

fn preset_from_row(row: &AnyRow) -> Result<Preset> {
    Ok(Preset {
        chat_id: row.try_get("chat_id")?,
        name: row.try_get("name")?,
        provider_instance_id: row.try_get("provider_instance_id")?,
        model: row.try_get("model")?,
        system_prompt: row.try_get("system_prompt")?,
        params_json: row.try_get("params_json")?,
    })
}

/// One-read join of a preset with its provider.
pub async fn get_preset_with_provider_by_name(
    pool: &AnyPool,
    chat_id: i64,
    name: &str,
) -> Result<PresetWithProvider> {
    let row = sqlx::query(
        r#"
        SELECT
            p.chat_id, p.name, p.provider_instance_id, p.model, p.system_prompt, p.params_json,
            pr.id AS pr_id, pr.chat_id AS pr_chat_id, pr.name AS pr_name, pr.kind AS pr_kind,
            pr.base_url AS pr_base_url, pr.enc_api_key AS pr_enc_api_key,
            pr.enc_headers_json AS pr_enc_headers_json, pr.config_json AS pr_config_json
        FROM presets p
        JOIN provider_instances pr ON p.provider_instance_id = pr.id
        WHERE p.chat_id = $1 AND p.name = $2
        "#,
    )
    .bind(chat_id)
    .bind(name)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StorageError::not_found("Preset", name))?;

    Ok(PresetWithProvider {
        preset: preset_from_row(&row)?,
        provider: provider_from_row(&row, "pr_")?,
    })
}

/// Resolve the chat's default-preset pointer, then delegate to the by-name
/// join. `NotFound` when the pointer is unset or the preset vanished.
pub async fn get_default_preset_with_provider(
    pool: &AnyPool,
    chat_id: i64,
) -> Result<PresetWithProvider> {
    let name = chat::get_default_preset_name(pool, chat_id).await?;
    get_preset_with_provider_by_name(pool, chat_id, &name).await
}
