//! Credential records of the built-in token kinds.
//!
//! These are the shapes the credential stores hand to resolvers. Each family
//! is registered under its kind tag by [`register_builtin_kinds`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::token::{API_KEY_KIND, API_TOKEN_KIND, ORG_AUTH_TOKEN_KIND};
use crate::{AuthError, CredentialRecord, TokenKindsBuilder};

/// Registers [`ApiKey`], [`ApiToken`] and [`OrgAuthToken`].
///
/// # Errors
///
/// `DuplicateKind` if one of the built-in tags is already taken.
pub fn register_builtin_kinds(builder: TokenKindsBuilder) -> Result<TokenKindsBuilder, AuthError> {
    builder
        .register::<ApiKey>(API_KEY_KIND)?
        .register::<ApiToken>(API_TOKEN_KIND)?
        .register::<OrgAuthToken>(ORG_AUTH_TOKEN_KIND)
}

/// Legacy organization-wide API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Record id.
    pub id: u64,
    /// Owning organization.
    pub organization_id: u64,
    /// Human readable label.
    #[serde(default)]
    pub label: String,
    /// Key material as presented by clients.
    pub key: String,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Allowed origins, one per entry.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Whether the key may be used.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl CredentialRecord for ApiKey {
    fn allowed_origins(&self) -> Vec<String> {
        self.allowed_origins.clone()
    }

    fn scopes(&self) -> Vec<String> {
        self.scopes.clone()
    }

    fn audit_log_data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("label".into(), Value::from(self.label.clone()));
        data.insert("key".into(), Value::from(self.key.clone()));
        data.insert("scopes".into(), Value::from(self.scopes.clone()));
        data.insert("status".into(), Value::from(u8::from(!self.is_active)));
        data
    }

    fn entity_id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn organization_id(&self) -> Option<u64> {
        Some(self.organization_id)
    }
}

/// Bearer token issued to a user, optionally on behalf of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiToken {
    /// Record id.
    pub id: u64,
    /// Owning user.
    pub user_id: u64,
    /// Application the token was issued to.
    #[serde(default)]
    pub application_id: Option<u64>,
    /// Organization the token is restricted to.
    #[serde(default)]
    pub organization_id: Option<u64>,
    /// Token value as presented by clients.
    pub token: String,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl CredentialRecord for ApiToken {
    fn allowed_origins(&self) -> Vec<String> {
        Vec::new()
    }

    fn scopes(&self) -> Vec<String> {
        self.scopes.clone()
    }

    fn audit_log_data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("scopes".into(), Value::from(self.scopes.clone()));
        data
    }

    fn entity_id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn user_id(&self) -> Option<u64> {
        Some(self.user_id)
    }

    fn organization_id(&self) -> Option<u64> {
        self.organization_id
    }

    fn application_id(&self) -> Option<u64> {
        self.application_id
    }
}

/// Organization auth token. Only the SHA-256 of the token is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgAuthToken {
    /// Record id.
    pub id: u64,
    /// Owning organization.
    pub organization_id: u64,
    /// Human readable name.
    #[serde(default)]
    pub name: String,
    /// Hex encoded SHA-256 of the token.
    pub token_hashed: String,
    /// Last characters of the token, for display.
    #[serde(default)]
    pub token_last_characters: Option<String>,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl CredentialRecord for OrgAuthToken {
    fn allowed_origins(&self) -> Vec<String> {
        Vec::new()
    }

    fn scopes(&self) -> Vec<String> {
        self.scopes.clone()
    }

    fn audit_log_data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("name".into(), Value::from(self.name.clone()));
        data.insert("scopes".into(), Value::from(self.scopes.clone()));
        data
    }

    fn entity_id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn organization_id(&self) -> Option<u64> {
        Some(self.organization_id)
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn builtin() -> crate::TokenKinds {
        register_builtin_kinds(TokenKindsBuilder::new()).unwrap().seal()
    }

    #[test]
    fn test_builtin_tags_in_order() {
        let kinds = builtin();
        assert_eq!(
            kinds.tags().collect::<Vec<_>>(),
            vec!["api_key", "api_token", "org_auth_token"]
        );
    }

    #[test]
    fn test_register_builtin_twice_fails() {
        let builder = register_builtin_kinds(TokenKindsBuilder::new()).unwrap();
        assert!(matches!(
            register_builtin_kinds(builder),
            Err(AuthError::DuplicateKind(tag)) if tag == "api_key"
        ));
    }

    #[test]
    fn test_api_key_unifies() {
        let key = ApiKey {
            id: 3,
            organization_id: 7,
            label: "ci".to_string(),
            key: "k-123".to_string(),
            scopes: vec!["project:read".to_string()],
            allowed_origins: vec!["*".to_string()],
            is_active: true,
        };
        let token = builtin().from_credential(Some(&key)).unwrap().unwrap();

        assert_eq!(token.kind, "api_key");
        assert_eq!(token.entity_id, Some(3));
        assert_eq!(token.organization_id, Some(7));
        assert_eq!(token.user_id, None);
        assert_eq!(token.allowed_origins, vec!["*"]);
        assert_eq!(token.audit_log_data["label"], Value::from("ci"));
        assert_eq!(token.audit_log_data["status"], Value::from(0));
        assert!(token.is_api_key_auth());
    }

    #[test]
    fn test_api_token_unifies_user_fields() {
        let record = ApiToken {
            id: 11,
            user_id: 42,
            application_id: Some(5),
            organization_id: None,
            token: "t-abc".to_string(),
            scopes: vec!["event:read".to_string()],
        };
        let token = builtin().from_credential(Some(&record)).unwrap().unwrap();

        assert_eq!(token.kind, "api_token");
        assert_eq!(token.user_id, Some(42));
        assert_eq!(token.application_id, Some(5));
        assert_eq!(token.organization_id, None);
        assert!(token.has_scope("event:read"));
    }

    #[test]
    fn test_org_auth_token_unifies() {
        let record = OrgAuthToken {
            id: 8,
            organization_id: 2,
            name: "release bot".to_string(),
            token_hashed: "00".repeat(32),
            token_last_characters: Some("abcd".to_string()),
            scopes: vec!["org:ci".to_string()],
        };
        let token = builtin().from_credential(Some(&record)).unwrap().unwrap();

        assert!(token.is_org_auth_token_auth());
        assert_eq!(token.organization_id, Some(2));
        assert_eq!(token.audit_log_data["name"], Value::from("release bot"));
    }
}
