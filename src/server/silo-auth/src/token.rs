//! Unified token representation.
//!
//! Credential records of different families (API keys, API tokens, org auth
//! tokens) are converted into one [`AuthenticatedToken`] tagged with the kind
//! they were registered under. Kinds are registered once at startup through a
//! [`TokenKindsBuilder`]; sealing it yields an immutable [`TokenKinds`] that is
//! shared read-only while requests are served.

use std::any::{type_name, TypeId};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::AuthError;

/// Kind of tokens minted internally; authorizes every scope.
pub const SYSTEM_KIND: &str = "system";

/// Kind tag of legacy API keys.
pub const API_KEY_KIND: &str = "api_key";

/// Kind tag of user/application API tokens.
pub const API_TOKEN_KIND: &str = "api_token";

/// Kind tag of organization auth tokens.
pub const ORG_AUTH_TOKEN_KIND: &str = "org_auth_token";

/// Accessors a credential record must provide to be unified.
///
/// The optional id reads default to `None` for record families that do not
/// carry the field.
pub trait CredentialRecord {
    /// Origins the credential may be used from.
    fn allowed_origins(&self) -> Vec<String>;

    /// Scopes granted to the credential.
    fn scopes(&self) -> Vec<String>;

    /// Data recorded in audit log entries about this credential.
    fn audit_log_data(&self) -> Map<String, Value>;

    /// Record id.
    fn entity_id(&self) -> Option<u64> {
        None
    }

    /// Owning user.
    fn user_id(&self) -> Option<u64> {
        None
    }

    /// Owning organization.
    fn organization_id(&self) -> Option<u64> {
        None
    }

    /// Owning application.
    fn application_id(&self) -> Option<u64> {
        None
    }

    /// Returns `Some` if the record is already unified.
    fn as_authenticated_token(&self) -> Option<&AuthenticatedToken> {
        None
    }
}

/// Credential of any registered kind, in a transport-friendly shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticatedToken {
    /// Origins the credential may be used from.
    pub allowed_origins: Vec<String>,
    /// Audit log payload of the underlying record.
    pub audit_log_data: Map<String, Value>,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// Id of the underlying record.
    pub entity_id: Option<u64>,
    /// Registered kind tag.
    pub kind: String,
    /// Owning user (API tokens only).
    pub user_id: Option<u64>,
    /// Owning organization.
    pub organization_id: Option<u64>,
    /// Owning application (API tokens only).
    pub application_id: Option<u64>,
}

impl Default for AuthenticatedToken {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            audit_log_data: Map::new(),
            scopes: Vec::new(),
            entity_id: None,
            kind: SYSTEM_KIND.to_string(),
            user_id: None,
            organization_id: None,
            application_id: None,
        }
    }
}

impl AuthenticatedToken {
    /// Whether the token grants `scope`.
    ///
    /// System tokens grant every scope, whatever their scope list says.
    pub fn has_scope(&self, scope: &str) -> bool {
        if self.kind == SYSTEM_KIND {
            return true;
        }
        self.scopes.iter().any(|s| s == scope)
    }

    /// Whether the token came from a legacy API key.
    pub fn is_api_key_auth(&self) -> bool {
        self.kind == API_KEY_KIND
    }

    /// Whether the token came from an organization auth token.
    pub fn is_org_auth_token_auth(&self) -> bool {
        self.kind == ORG_AUTH_TOKEN_KIND
    }
}

impl CredentialRecord for AuthenticatedToken {
    fn allowed_origins(&self) -> Vec<String> {
        self.allowed_origins.clone()
    }

    fn scopes(&self) -> Vec<String> {
        self.scopes.clone()
    }

    fn audit_log_data(&self) -> Map<String, Value> {
        self.audit_log_data.clone()
    }

    fn entity_id(&self) -> Option<u64> {
        self.entity_id
    }

    fn user_id(&self) -> Option<u64> {
        self.user_id
    }

    fn organization_id(&self) -> Option<u64> {
        self.organization_id
    }

    fn application_id(&self) -> Option<u64> {
        self.application_id
    }

    fn as_authenticated_token(&self) -> Option<&AuthenticatedToken> {
        Some(self)
    }
}

#[derive(Debug, Clone)]
struct KindEntry {
    tag: String,
    type_id: TypeId,
}

/// Registration phase of the token kind registry.
///
/// Each credential-kind owner registers its record type once during startup
/// composition. Call [`TokenKindsBuilder::seal`] before serving requests.
#[derive(Debug, Default)]
pub struct TokenKindsBuilder {
    entries: Vec<KindEntry>,
}

impl TokenKindsBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers record type `T` under `tag`.
    ///
    /// # Errors
    ///
    /// `DuplicateKind` if `tag` is already registered or is the reserved
    /// `system` tag.
    pub fn register<T: CredentialRecord + 'static>(
        mut self,
        tag: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let tag = tag.into();
        if tag == SYSTEM_KIND || self.entries.iter().any(|e| e.tag == tag) {
            return Err(AuthError::DuplicateKind(tag));
        }

        tracing::debug!(kind = %tag, record = type_name::<T>(), "Registered token kind");
        self.entries.push(KindEntry {
            tag,
            type_id: TypeId::of::<T>(),
        });
        Ok(self)
    }

    /// Freezes the registry. No registration is possible afterwards.
    pub fn seal(self) -> TokenKinds {
        TokenKinds {
            entries: self.entries,
        }
    }
}

/// Sealed token kind registry.
#[derive(Debug, Clone)]
pub struct TokenKinds {
    entries: Vec<KindEntry>,
}

impl TokenKinds {
    /// Registered tags, in registration order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.tag.as_str())
    }

    /// Whether `tag` names a registered kind (or `system`).
    pub fn is_registered(&self, tag: &str) -> bool {
        tag == SYSTEM_KIND || self.entries.iter().any(|e| e.tag == tag)
    }

    /// Unifies a credential record.
    ///
    /// An absent record yields `Ok(None)`; an [`AuthenticatedToken`] is
    /// returned unchanged. Otherwise the first kind registered for `T`
    /// provides the tag.
    ///
    /// # Errors
    ///
    /// `UnregisteredCredentialType` if no kind was registered for `T`.
    pub fn from_credential<T: CredentialRecord + 'static>(
        &self,
        record: Option<&T>,
    ) -> Result<Option<AuthenticatedToken>, AuthError> {
        let Some(record) = record else {
            return Ok(None);
        };

        if let Some(token) = record.as_authenticated_token() {
            return Ok(Some(token.clone()));
        }

        let type_id = TypeId::of::<T>();
        let kind = self
            .entries
            .iter()
            .find(|e| e.type_id == type_id)
            .map(|e| e.tag.clone())
            .ok_or_else(|| AuthError::UnregisteredCredentialType(type_name::<T>().to_string()))?;

        Ok(Some(AuthenticatedToken {
            allowed_origins: record.allowed_origins(),
            audit_log_data: record.audit_log_data(),
            scopes: record.scopes(),
            entity_id: record.entity_id(),
            kind,
            user_id: record.user_id(),
            organization_id: record.organization_id(),
            application_id: record.application_id(),
        }))
    }
}
