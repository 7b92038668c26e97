//! Relational configuration store for chats, providers, presets, admin
//! hints, and the audit log.
//!
//! Two engines are supported behind the same schema semantics: an embedded
//! single-file SQLite database (development, single-node) and Postgres
//! (clustered). Both are reached through SQLx's `Any` driver; queries use
//! `$n` placeholders and `ON CONFLICT` upserts, which are valid on both.
//!
//! Multi-step workflows (e.g. preset creation that conditionally sets the
//! chat default) are not transactional across statements; second steps are
//! best-effort and idempotent.

pub mod admin;
pub mod audit;
pub mod chat;
pub mod error;
pub mod models;
pub mod preset;
pub mod provider;

pub use error::{Result, StorageError};
pub use models::{AuditEntry, Chat, Preset, PresetWithProvider, ProviderInstance};

use std::time::Duration;

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

const MAX_CONNECTIONS: u32 = 20;
const MAX_IDLE: u32 = 5;
const MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Which engine a DSN points at. Decides the bootstrap schema dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Sqlite,
    Postgres,
}

impl Driver {
    fn from_dsn(dsn: &str) -> Result<Self> {
        let scheme = dsn.split(':').next().unwrap_or("").to_ascii_lowercase();
        match scheme.as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(StorageError::UnsupportedDriver(other.to_string())),
        }
    }
}

/// Connection pool wrapper.
#[derive(Clone)]
pub struct Store {
    pool: AnyPool,
    driver: Driver,
}

impl Store {
    /// Connect with production pool limits.
    pub async fn connect(dsn: &str) -> Result<Self> {
        Self::connect_with(dsn, MAX_CONNECTIONS).await
    }

    /// Connect with an explicit connection cap. In-memory SQLite needs a
    /// single connection, since every new connection opens a fresh database.
    pub async fn connect_with(dsn: &str, max_connections: u32) -> Result<Self> {
        let driver = Driver::from_dsn(dsn)?;
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(MAX_IDLE.min(max_connections))
            .max_lifetime(MAX_LIFETIME)
            .connect(dsn)
            .await?;

        tracing::info!(driver = ?driver, "connected to configuration store");
        Ok(Self { pool, driver })
    }

    /// Create the schema if it does not exist yet.
    pub async fn init_schema(&self) -> Result<()> {
        let schema = match self.driver {
            Driver::Sqlite => SQLITE_SCHEMA,
            Driver::Postgres => POSTGRES_SCHEMA,
        };
        for statement in schema.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS chats (
    id INTEGER PRIMARY KEY,
    type TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    default_preset_name TEXT,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS chat_admin_cache (
    chat_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    is_admin INTEGER NOT NULL,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (chat_id, user_id)
);
CREATE TABLE IF NOT EXISTS provider_instances (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    base_url TEXT NOT NULL,
    enc_api_key TEXT,
    enc_headers_json TEXT,
    config_json TEXT NOT NULL DEFAULT '{}',
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(chat_id, name)
);
CREATE TABLE IF NOT EXISTS presets (
    chat_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    provider_instance_id INTEGER NOT NULL,
    model TEXT NOT NULL,
    system_prompt TEXT NOT NULL DEFAULT '',
    params_json TEXT NOT NULL DEFAULT '{}',
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (chat_id, name)
);
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    action TEXT NOT NULL,
    meta_json TEXT NOT NULL DEFAULT '{}',
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_provider_instances_chat_id ON provider_instances(chat_id);
CREATE INDEX IF NOT EXISTS idx_presets_chat_id ON presets(chat_id);
CREATE INDEX IF NOT EXISTS idx_audit_log_chat_id_created_at ON audit_log(chat_id, created_at DESC)
"#;

const POSTGRES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS chats (
    id BIGINT PRIMARY KEY,
    type TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    default_preset_name TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS chat_admin_cache (
    chat_id BIGINT NOT NULL,
    user_id BIGINT NOT NULL,
    is_admin INTEGER NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (chat_id, user_id)
);
CREATE TABLE IF NOT EXISTS provider_instances (
    id BIGSERIAL PRIMARY KEY,
    chat_id BIGINT NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    base_url TEXT NOT NULL,
    enc_api_key TEXT,
    enc_headers_json TEXT,
    config_json TEXT NOT NULL DEFAULT '{}',
    created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(chat_id, name)
);
CREATE TABLE IF NOT EXISTS presets (
    chat_id BIGINT NOT NULL,
    name TEXT NOT NULL,
    provider_instance_id BIGINT NOT NULL,
    model TEXT NOT NULL,
    system_prompt TEXT NOT NULL DEFAULT '',
    params_json TEXT NOT NULL DEFAULT '{}',
    created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (chat_id, name)
);
CREATE TABLE IF NOT EXISTS audit_log (
    id BIGSERIAL PRIMARY KEY,
    chat_id BIGINT NOT NULL,
    user_id BIGINT NOT NULL,
    action TEXT NOT NULL,
    meta_json TEXT NOT NULL DEFAULT '{}',
    created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_provider_instances_chat_id ON provider_instances(chat_id);
CREATE INDEX IF NOT EXISTS idx_presets_chat_id ON presets(chat_id);
CREATE INDEX IF NOT EXISTS idx_audit_log_chat_id_created_at ON audit_log(chat_id, created_at DESC)
"#;

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> Store {
        let store = Store::connect_with("sqlite::memory:", 1).await.unwrap();
        store.init_schema().await.unwrap();
        store
    }

    fn sample_provider(chat_id: i64, name: &str) -> ProviderInstance {
        ProviderInstance {
            id: 0,
            chat_id,
            name: name.to_string(),
            kind: "openai_compat".to_string(),
            base_url: "https://api.example/v1".to_string(),
            enc_api_key: Some(r#"{"key_id":"k1","nonce":"bm8=","ciphertext":"Y3Q="}"#.to_string()),
            enc_headers_json: None,
            config_json: r#"{"endpoint":"chat_completions"}"#.to_string(),
        }
    }

    #[tokio::test]
    async fn ensure_chat_upserts_and_refreshes() {
        let store = test_store().await;
        chat::ensure_chat(store.pool(), 111, "group", "First").await.unwrap();
        chat::ensure_chat(store.pool(), 111, "supergroup", "Renamed").await.unwrap();

        let chat = chat::get_chat(store.pool(), 111).await.unwrap();
        assert_eq!(chat.kind, "supergroup");
        assert_eq!(chat.title, "Renamed");
        assert_eq!(chat.default_preset_name, None);
    }

    #[tokio::test]
    async fn ensure_chat_defaults_unknown_type() {
        let store = test_store().await;
        chat::ensure_chat(store.pool(), 5, "", "").await.unwrap();
        let chat = chat::get_chat(store.pool(), 5).await.unwrap();
        assert_eq!(chat.kind, "unknown");
    }

    #[tokio::test]
    async fn provider_roundtrip_and_delete() {
        let store = test_store().await;
        chat::ensure_chat(store.pool(), 111, "group", "g").await.unwrap();

        let input = sample_provider(111, "grok");
        let id = provider::upsert_provider_instance(store.pool(), &input).await.unwrap();
        assert!(id > 0);

        let fetched = provider::get_provider_by_name(store.pool(), 111, "grok").await.unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(
            ProviderInstance { id: 0, ..fetched.clone() },
            input,
        );

        // Upsert with the same name keeps the surrogate id.
        let mut updated = input.clone();
        updated.base_url = "https://api.example/v2".to_string();
        let id2 = provider::upsert_provider_instance(store.pool(), &updated).await.unwrap();
        assert_eq!(id2, id);

        provider::delete_provider_by_name(store.pool(), 111, "grok").await.unwrap();
        let missing = provider::delete_provider_by_name(store.pool(), 111, "grok").await;
        assert!(matches!(missing, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn preset_join_and_default_pointer() {
        let store = test_store().await;
        chat::ensure_chat(store.pool(), 111, "group", "g").await.unwrap();
        let provider_id =
            provider::upsert_provider_instance(store.pool(), &sample_provider(111, "grok"))
                .await
                .unwrap();

        let p = Preset {
            chat_id: 111,
            name: "grok_default".to_string(),
            provider_instance_id: provider_id,
            model: "grok-beta".to_string(),
            system_prompt: "You are concise".to_string(),
            params_json: r#"{"max_tokens":1024,"temperature":0.7,"allow_tools":false}"#.to_string(),
        };
        preset::upsert_preset(store.pool(), &p).await.unwrap();

        // No default yet.
        assert!(chat::get_default_preset_name(store.pool(), 111)
            .await
            .unwrap_err()
            .is_not_found());

        chat::set_default_preset(store.pool(), 111, "grok_default").await.unwrap();
        assert_eq!(
            chat::get_default_preset_name(store.pool(), 111).await.unwrap(),
            "grok_default"
        );

        let joined = preset::get_default_preset_with_provider(store.pool(), 111).await.unwrap();
        assert_eq!(joined.preset, p);
        assert_eq!(joined.provider.name, "grok");

        let by_name = preset::get_preset_with_provider_by_name(store.pool(), 111, "grok_default")
            .await
            .unwrap();
        assert_eq!(by_name.preset.model, "grok-beta");

        chat::clear_default_preset(store.pool(), 111).await.unwrap();
        assert!(preset::get_default_preset_with_provider(store.pool(), 111)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn delete_preset_reports_missing() {
        let store = test_store().await;
        chat::ensure_chat(store.pool(), 1, "group", "g").await.unwrap();
        let err = preset::delete_preset(store.pool(), 1, "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn set_default_requires_existing_chat() {
        let store = test_store().await;
        let err = chat::set_default_preset(store.pool(), 999, "x").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn admin_cache_hint() {
        let store = test_store().await;
        assert_eq!(admin::get_admin_cache(store.pool(), 1, 2).await.unwrap(), None);

        admin::set_admin_cache(store.pool(), 1, 2, true).await.unwrap();
        assert_eq!(admin::get_admin_cache(store.pool(), 1, 2).await.unwrap(), Some(true));

        admin::set_admin_cache(store.pool(), 1, 2, false).await.unwrap();
        assert_eq!(admin::get_admin_cache(store.pool(), 1, 2).await.unwrap(), Some(false));
    }

    #[tokio::test]
    async fn audit_meta_is_sanitized() {
        let store = test_store().await;
        audit::log_action(
            store.pool(),
            &AuditEntry {
                chat_id: 1,
                user_id: 2,
                action: "provider_add".to_string(),
                meta_json: "not json".to_string(),
            },
        )
        .await
        .unwrap();

        let entries = audit::list_actions(store.pool(), 1, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].meta_json, "{}");
        assert_eq!(entries[0].action, "provider_add");
    }

    #[tokio::test]
    async fn list_orders_by_creation() {
        let store = test_store().await;
        chat::ensure_chat(store.pool(), 7, "group", "g").await.unwrap();
        let pid = provider::upsert_provider_instance(store.pool(), &sample_provider(7, "p"))
            .await
            .unwrap();
        for name in ["a", "b", "c"] {
            preset::upsert_preset(
                store.pool(),
                &Preset {
                    chat_id: 7,
                    name: name.to_string(),
                    provider_instance_id: pid,
                    model: "m".to_string(),
                    system_prompt: String::new(),
                    params_json: "{}".to_string(),
                },
            )
            .await
            .unwrap();
        }
        let names: Vec<String> = preset::list_presets(store.pool(), 7)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
