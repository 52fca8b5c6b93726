//! In-memory auth configuration store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use silo_auth::{ApiKey, AuthIdentity, AuthProvider};

use crate::{AuthConfigStore, StorageError};

#[derive(Debug, Default)]
struct Tables {
    providers: HashMap<i64, AuthProvider>,
    identities: HashMap<(i64, i64), AuthIdentity>,
    api_keys: HashMap<String, ApiKey>,
}

/// Store keeping everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryAuthConfigStore {
    tables: RwLock<Tables>,
}

impl MemoryAuthConfigStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the provider of its organization, replacing any previous one.
    pub fn put_auth_provider(&self, provider: AuthProvider) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.providers.insert(provider.organization_id, provider);
    }

    /// Links an identity.
    pub fn put_auth_identity(&self, identity: AuthIdentity) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables
            .identities
            .insert((identity.provider_id, identity.user_id), identity);
    }

    /// Stores an API key, replacing one with the same key material.
    pub fn put_api_key(&self, api_key: ApiKey) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.api_keys.insert(api_key.key.clone(), api_key);
    }
}

#[async_trait]
impl AuthConfigStore for MemoryAuthConfigStore {
    async fn get_auth_provider(
        &self,
        organization_id: i64,
    ) -> Result<Option<AuthProvider>, StorageError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.providers.get(&organization_id).cloned())
    }

    async fn get_auth_identity(
        &self,
        provider_id: i64,
        user_id: i64,
    ) -> Result<Option<AuthIdentity>, StorageError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.identities.get(&(provider_id, user_id)).cloned())
    }

    async fn has_api_key(&self, organization_id: i64) -> Result<bool, StorageError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .api_keys
            .values()
            .any(|k| k.is_active && i64::try_from(k.organization_id) == Ok(organization_id)))
    }

    async fn find_api_key(&self, key: &str) -> Result<Option<ApiKey>, StorageError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.api_keys.get(key).filter(|k| k.is_active).cloned())
    }
}
