//! Auth configuration store trait.

use async_trait::async_trait;
use silo_auth::{ApiKey, AuthIdentity, AuthProvider, OrganizationAuthConfig};

use crate::error::StorageError;

/// Read access to organization auth configuration.
#[async_trait]
pub trait AuthConfigStore: Send + Sync {
    /// SSO provider configured for an organization.
    async fn get_auth_provider(
        &self,
        organization_id: i64,
    ) -> Result<Option<AuthProvider>, StorageError>;

    /// Identity of `user_id` at provider `provider_id`.
    async fn get_auth_identity(
        &self,
        provider_id: i64,
        user_id: i64,
    ) -> Result<Option<AuthIdentity>, StorageError>;

    /// Whether the organization owns at least one active API key.
    async fn has_api_key(&self, organization_id: i64) -> Result<bool, StorageError>;

    /// Active API key with the given key material.
    async fn find_api_key(&self, key: &str) -> Result<Option<ApiKey>, StorageError>;

    /// Full auth configuration of an organization.
    ///
    /// Organizations without any configuration get an empty one.
    async fn get_org_auth_config(
        &self,
        organization_id: i64,
    ) -> Result<OrganizationAuthConfig, StorageError> {
        Ok(OrganizationAuthConfig {
            organization_id,
            auth_provider: self.get_auth_provider(organization_id).await?,
            has_api_key: self.has_api_key(organization_id).await?,
        })
    }
}
