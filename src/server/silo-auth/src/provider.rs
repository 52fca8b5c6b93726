//! Identity provider bindings of organizations.
//!
//! Read-mostly reference data owned by the credential store. The core only
//! reads it to instantiate provider logic and to build audit log entries.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::AuthError;

/// Behaviour switches of an auth provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthProviderFlags {
    /// Members without a linked identity may still sign in.
    pub allow_unlinked: bool,
    /// SCIM provisioning is enabled.
    pub scim_enabled: bool,
}

/// SSO provider configured for an organization.
///
/// Equality and hashing only consider `(id, organization_id, provider)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthProvider {
    /// Provider id, `-1` when unset.
    #[serde(default = "unset_id")]
    pub id: i64,
    /// Owning organization, `-1` when unset.
    #[serde(default = "unset_id")]
    pub organization_id: i64,
    /// Provider name, e.g. `saml2` or `google`.
    #[serde(default)]
    pub provider: String,
    /// Behaviour switches.
    #[serde(default)]
    pub flags: AuthProviderFlags,
    /// Provider specific configuration.
    pub config: Map<String, Value>,
}

impl AuthProvider {
    /// Audit log payload: `{provider, config}`.
    pub fn audit_log_data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("provider".to_string(), Value::from(self.provider.clone()));
        data.insert("config".to_string(), Value::Object(self.config.clone()));
        data
    }

    /// Instantiates the provider implementation through `manager`.
    ///
    /// # Errors
    ///
    /// Whatever the manager reports, typically an unknown provider name.
    pub fn get_provider<M: ProviderManager + ?Sized>(
        &self,
        manager: &M,
    ) -> Result<M::Provider, AuthError> {
        manager.get(&self.provider, &self.config)
    }

    fn key(&self) -> (i64, i64, &str) {
        (self.id, self.organization_id, &self.provider)
    }
}

impl PartialEq for AuthProvider {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for AuthProvider {}

impl Hash for AuthProvider {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Factory of provider implementations, keyed by provider name.
pub trait ProviderManager {
    /// Provider implementation type.
    type Provider;

    /// Builds the provider named `provider` from its configuration.
    fn get(&self, provider: &str, config: &Map<String, Value>) -> Result<Self::Provider, AuthError>;
}

/// Link between a user and an identity at a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthIdentity {
    /// Identity id.
    pub id: i64,
    /// Linked user.
    pub user_id: i64,
    /// Provider the identity belongs to.
    pub provider_id: i64,
    /// Identifier at the provider.
    pub ident: String,
}

impl Default for AuthIdentity {
    fn default() -> Self {
        Self {
            id: -1,
            user_id: -1,
            provider_id: -1,
            ident: String::new(),
        }
    }
}

/// Authentication settings of an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizationAuthConfig {
    /// Organization id.
    pub organization_id: i64,
    /// Configured SSO provider, if any.
    pub auth_provider: Option<AuthProvider>,
    /// Whether the organization has at least one API key.
    pub has_api_key: bool,
}

impl Default for OrganizationAuthConfig {
    fn default() -> Self {
        Self {
            organization_id: -1,
            auth_provider: None,
            has_api_key: false,
        }
    }
}

/// SSO status of a member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberSsoState {
    /// The organization requires SSO.
    pub is_required: bool,
    /// The member holds a valid SSO session.
    pub is_valid: bool,
}

/// Authorization state of a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    /// SSO status.
    pub sso_state: MemberSsoState,
    /// Granted permissions.
    pub permissions: Vec<String>,
}

fn unset_id() -> i64 {
    -1
}
