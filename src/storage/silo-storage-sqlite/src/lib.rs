//! # Silo Storage - SQLite Backend
//!
//! SQLite implementation of [`AuthConfigStore`]. Each silo keeps its auth
//! configuration in its own database file.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use silo_auth::{ApiKey, AuthIdentity, AuthProvider, AuthProviderFlags};
use silo_storage::{AuthConfigStore, StorageError};

type ProviderRow = (i64, i64, String, bool, bool, String);
type ApiKeyRow = (i64, i64, String, String, String, String, bool);

/// SQLite auth configuration store.
///
/// The database lives at `{base_path}/{silo}.db`.
#[derive(Clone)]
pub struct SqliteAuthConfigStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteAuthConfigStore {
    /// Opens or creates the database of a silo.
    ///
    /// # Arguments
    ///
    /// * `base_path` - Directory where silo databases are stored
    /// * `silo` - Silo name (must match `[a-z0-9_-]+`)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Silo name is invalid
    /// - Directory cannot be created
    /// - Database connection fails
    pub async fn open(base_path: impl AsRef<Path>, silo: &str) -> Result<Self, StorageError> {
        Self::validate_silo(silo)?;

        let base = base_path.as_ref();
        std::fs::create_dir_all(base).map_err(|e| {
            StorageError::ConnectionFailed(format!("failed to create directory: {e}"))
        })?;

        let db_path = base.join(format!("{silo}.db"));
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        debug!(silo = %silo, path = %db_path.display(), "Opening SQLite database");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        let store = Self { pool, db_path };
        store.migrate().await?;

        info!(silo = %silo, "SQLite auth config store ready");

        Ok(store)
    }

    /// Path of the database file.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Only allows: lowercase letters, digits, underscore, hyphen.
    fn validate_silo(silo: &str) -> Result<(), StorageError> {
        if silo.is_empty() {
            return Err(StorageError::InvalidInput("silo cannot be empty".into()));
        }

        if silo.len() > 64 {
            return Err(StorageError::InvalidInput("silo name too long".into()));
        }

        let valid = silo
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');

        if !valid {
            return Err(StorageError::InvalidInput("silo must match [a-z0-9_-]+".into()));
        }

        Ok(())
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        debug!("Running database migrations");

        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS auth_providers (
                id              INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL UNIQUE,
                provider        TEXT NOT NULL,
                allow_unlinked  INTEGER NOT NULL DEFAULT 0,
                scim_enabled    INTEGER NOT NULL DEFAULT 0,
                config          TEXT NOT NULL DEFAULT '{}'
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS auth_identities (
                id          INTEGER PRIMARY KEY,
                user_id     INTEGER NOT NULL,
                provider_id INTEGER NOT NULL,
                ident       TEXT NOT NULL,
                UNIQUE (provider_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS api_keys (
                id              INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                label           TEXT NOT NULL DEFAULT '',
                key             TEXT NOT NULL UNIQUE,
                scopes          TEXT NOT NULL DEFAULT '[]',
                allowed_origins TEXT NOT NULL DEFAULT '',
                is_active       INTEGER NOT NULL DEFAULT 1
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_api_keys_org ON api_keys (organization_id)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::ConnectionFailed(format!("migration failed: {e}")))?;
        }

        debug!("Migrations complete");

        Ok(())
    }

    /// Inserts or replaces the provider of an organization.
    pub async fn put_auth_provider(&self, provider: &AuthProvider) -> Result<(), StorageError> {
        let config = serde_json::to_string(&provider.config)?;

        sqlx::query(
            r#"
            INSERT INTO auth_providers
                (id, organization_id, provider, allow_unlinked, scim_enabled, config)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(organization_id) DO UPDATE SET
                id = excluded.id,
                provider = excluded.provider,
                allow_unlinked = excluded.allow_unlinked,
                scim_enabled = excluded.scim_enabled,
                config = excluded.config
            "#,
        )
        .bind(provider.id)
        .bind(provider.organization_id)
        .bind(&provider.provider)
        .bind(provider.flags.allow_unlinked)
        .bind(provider.flags.scim_enabled)
        .bind(config)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    /// Inserts or replaces an identity link.
    pub async fn put_auth_identity(&self, identity: &AuthIdentity) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO auth_identities (id, user_id, provider_id, ident)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(provider_id, user_id) DO UPDATE SET
                id = excluded.id,
                ident = excluded.ident
            "#,
        )
        .bind(identity.id)
        .bind(identity.user_id)
        .bind(identity.provider_id)
        .bind(&identity.ident)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    /// Inserts or replaces an API key.
    pub async fn put_api_key(&self, api_key: &ApiKey) -> Result<(), StorageError> {
        let id = to_i64(api_key.id)?;
        let organization_id = to_i64(api_key.organization_id)?;
        let scopes = serde_json::to_string(&api_key.scopes)?;
        let allowed_origins = api_key.allowed_origins.join("\n");

        sqlx::query(
            r#"
            INSERT INTO api_keys
                (id, organization_id, label, key, scopes, allowed_origins, is_active)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                id = excluded.id,
                organization_id = excluded.organization_id,
                label = excluded.label,
                scopes = excluded.scopes,
                allowed_origins = excluded.allowed_origins,
                is_active = excluded.is_active
            "#,
        )
        .bind(id)
        .bind(organization_id)
        .bind(&api_key.label)
        .bind(&api_key.key)
        .bind(scopes)
        .bind(allowed_origins)
        .bind(api_key.is_active)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl AuthConfigStore for SqliteAuthConfigStore {
    async fn get_auth_provider(
        &self,
        organization_id: i64,
    ) -> Result<Option<AuthProvider>, StorageError> {
        let row: Option<ProviderRow> = sqlx::query_as(
            r#"
            SELECT id, organization_id, provider, allow_unlinked, scim_enabled, config
            FROM auth_providers WHERE organization_id = ?
            "#,
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        let Some((id, organization_id, provider, allow_unlinked, scim_enabled, config)) = row else {
            return Ok(None);
        };

        let config: Map<String, Value> = serde_json::from_str(&config)?;
        Ok(Some(AuthProvider {
            id,
            organization_id,
            provider,
            flags: AuthProviderFlags {
                allow_unlinked,
                scim_enabled,
            },
            config,
        }))
    }

    async fn get_auth_identity(
        &self,
        provider_id: i64,
        user_id: i64,
    ) -> Result<Option<AuthIdentity>, StorageError> {
        let row: Option<(i64, String)> = sqlx::query_as(
            "SELECT id, ident FROM auth_identities WHERE provider_id = ? AND user_id = ?",
        )
        .bind(provider_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(row.map(|(id, ident)| AuthIdentity {
            id,
            user_id,
            provider_id,
            ident,
        }))
    }

    async fn has_api_key(&self, organization_id: i64) -> Result<bool, StorageError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM api_keys WHERE organization_id = ? AND is_active = 1",
        )
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(row.0 > 0)
    }

    async fn find_api_key(&self, key: &str) -> Result<Option<ApiKey>, StorageError> {
        let row: Option<ApiKeyRow> = sqlx::query_as(
            r#"
            SELECT id, organization_id, label, key, scopes, allowed_origins, is_active
            FROM api_keys WHERE key = ? AND is_active = 1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        let Some((id, organization_id, label, key, scopes, allowed_origins, is_active)) = row else {
            return Ok(None);
        };

        Ok(Some(ApiKey {
            id: from_i64(id)?,
            organization_id: from_i64(organization_id)?,
            label,
            key,
            scopes: serde_json::from_str(&scopes)?,
            allowed_origins: allowed_origins
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            is_active,
        }))
    }
}

fn to_i64(value: u64) -> Result<i64, StorageError> {
    i64::try_from(value).map_err(|_| StorageError::InvalidInput(format!("id {value} out of range")))
}

fn from_i64(value: i64) -> Result<u64, StorageError> {
    u64::try_from(value).map_err(|_| StorageError::Serialization(format!("negative id {value}")))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqliteAuthConfigStore) {
        let tmp = TempDir::new().unwrap();
        let store = SqliteAuthConfigStore::open(tmp.path(), "control").await.unwrap();
        (tmp, store)
    }

    fn saml_provider() -> AuthProvider {
        let mut config = Map::new();
        config.insert("idp".to_string(), Value::from("okta"));
        AuthProvider {
            id: 5,
            organization_id: 2,
            provider: "saml2".to_string(),
            flags: AuthProviderFlags {
                allow_unlinked: true,
                scim_enabled: false,
            },
            config,
        }
    }

    fn api_key(key: &str, is_active: bool) -> ApiKey {
        ApiKey {
            id: 3,
            organization_id: 2,
            label: "ci".to_string(),
            key: key.to_string(),
            scopes: vec!["project:read".to_string(), "project:write".to_string()],
            allowed_origins: vec!["https://a.example".to_string(), "*.b.example".to_string()],
            is_active,
        }
    }

    #[tokio::test]
    async fn test_open_creates_db() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteAuthConfigStore::open(tmp.path(), "control").await.unwrap();

        assert_eq!(store.db_path(), tmp.path().join("control.db"));
        assert!(store.db_path().exists(), "database file should be created");
    }

    #[tokio::test]
    async fn test_silo_validation() {
        let tmp = TempDir::new().unwrap();

        for name in ["", "Control", "../escape", "silo.db"] {
            let result = SqliteAuthConfigStore::open(tmp.path(), name).await;
            assert!(
                matches!(result, Err(StorageError::InvalidInput(_))),
                "should reject silo name: {name:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_provider_roundtrip() {
        let (_tmp, store) = setup().await;
        assert!(store.get_auth_provider(2).await.unwrap().is_none());

        store.put_auth_provider(&saml_provider()).await.unwrap();
        let provider = store.get_auth_provider(2).await.unwrap().unwrap();

        assert_eq!(provider, saml_provider());
        assert_eq!(provider.config, saml_provider().config);
        assert!(provider.flags.allow_unlinked);
    }

    #[tokio::test]
    async fn test_provider_replaced_per_org() {
        let (_tmp, store) = setup().await;
        store.put_auth_provider(&saml_provider()).await.unwrap();

        let google = AuthProvider {
            id: 6,
            provider: "google".to_string(),
            config: Map::new(),
            ..saml_provider()
        };
        store.put_auth_provider(&google).await.unwrap();

        let provider = store.get_auth_provider(2).await.unwrap().unwrap();
        assert_eq!(provider.provider, "google");
        assert_eq!(provider.id, 6);
    }

    #[tokio::test]
    async fn test_identity_lookup() {
        let (_tmp, store) = setup().await;
        store
            .put_auth_identity(&AuthIdentity {
                id: 9,
                user_id: 42,
                provider_id: 5,
                ident: "alice@okta".to_string(),
            })
            .await
            .unwrap();

        let identity = store.get_auth_identity(5, 42).await.unwrap().unwrap();
        assert_eq!(identity.id, 9);
        assert_eq!(identity.ident, "alice@okta");
        assert!(store.get_auth_identity(5, 7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_api_keys() {
        let (_tmp, store) = setup().await;
        assert!(!store.has_api_key(2).await.unwrap());

        store.put_api_key(&api_key("k-live", true)).await.unwrap();
        assert!(store.has_api_key(2).await.unwrap());

        let found = store.find_api_key("k-live").await.unwrap().unwrap();
        assert_eq!(found, api_key("k-live", true));
        assert!(store.find_api_key("k-other").await.unwrap().is_none());

        store.put_api_key(&api_key("k-live", false)).await.unwrap();
        assert!(store.find_api_key("k-live").await.unwrap().is_none());
        assert!(!store.has_api_key(2).await.unwrap());
    }

    #[tokio::test]
    async fn test_org_auth_config() {
        let (_tmp, store) = setup().await;
        store.put_auth_provider(&saml_provider()).await.unwrap();
        store.put_api_key(&api_key("k-live", true)).await.unwrap();

        let config = store.get_org_auth_config(2).await.unwrap();
        assert_eq!(config.organization_id, 2);
        assert_eq!(config.auth_provider.map(|p| p.provider), Some("saml2".to_string()));
        assert!(config.has_api_key);

        let empty = store.get_org_auth_config(3).await.unwrap();
        assert!(empty.auth_provider.is_none());
        assert!(!empty.has_api_key);
    }
}
