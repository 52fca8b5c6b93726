//! Built-in authenticators.
//!
//! One resolver per [`AuthenticatorKind`]. API keys are read from the auth
//! config store; user tokens, org auth tokens and users come from the static
//! credentials configuration.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use silo_auth::{
    register_builtin_kinds, ApiToken, AuthError, AuthenticatedUser, AuthenticationContext,
    AuthenticationRequest, Authenticator, AuthenticatorRegistry, OrgAuthToken, TokenKinds,
    TokenKindsBuilder,
};
use silo_storage::AuthConfigStore;

use crate::config::StaticCredentialsConfig;

/// Prefix identifying organization auth tokens among bearer tokens.
pub const ORG_AUTH_TOKEN_PREFIX: &str = "orgtok_";

/// Token kinds of the built-in credential records, sealed.
///
/// # Errors
///
/// `DuplicateKind` if a tag is registered twice.
pub fn builtin_token_kinds() -> Result<TokenKinds, AuthError> {
    Ok(register_builtin_kinds(TokenKindsBuilder::new())?.seal())
}

/// Registry with the four built-in authenticators.
///
/// # Errors
///
/// Propagates registration errors of the registry builder.
pub fn builtin_registry(
    credentials: &StaticCredentialsConfig,
    store: Arc<dyn AuthConfigStore>,
) -> Result<AuthenticatorRegistry, AuthError> {
    let users = Arc::new(UserDirectory::new(&credentials.users));

    AuthenticatorRegistry::builder()
        .register(Arc::new(ApiKeyAuthentication { store }))?
        .register(Arc::new(TokenAuthentication::new(
            &credentials.api_tokens,
            users.clone(),
        )))?
        .register(Arc::new(SessionAuthentication { users }))?
        .register(Arc::new(OrgAuthTokenAuthentication::new(
            &credentials.org_auth_tokens,
        )))?
        .build()
}

/// Known users by id.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: HashMap<u64, AuthenticatedUser>,
}

impl UserDirectory {
    /// Indexes `users` by id.
    pub fn new(users: &[AuthenticatedUser]) -> Self {
        Self {
            users: users.iter().map(|u| (u.id, u.clone())).collect(),
        }
    }

    /// Active user with `id`.
    pub fn active(&self, id: u64) -> Option<&AuthenticatedUser> {
        self.users.get(&id).filter(|u| u.is_active)
    }
}

fn bearer(request: &AuthenticationRequest) -> Option<String> {
    let header = request.authorization()?;
    let (scheme, value) = header.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| value.trim().to_string())
}

/// Legacy API keys sent as `Basic base64(key:)`.
pub struct ApiKeyAuthentication {
    store: Arc<dyn AuthConfigStore>,
}

impl ApiKeyAuthentication {
    fn key_of(request: &AuthenticationRequest) -> Option<String> {
        let header = request.authorization()?;
        let (scheme, value) = header.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(value.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let key = decoded.split(':').next().unwrap_or_default();
        (!key.is_empty()).then(|| key.to_string())
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthentication {
    async fn authenticate(
        &self,
        request: &AuthenticationRequest,
        kinds: &TokenKinds,
    ) -> Result<Option<AuthenticationContext>, AuthError> {
        let Some(key) = Self::key_of(request) else {
            return Ok(None);
        };

        let api_key = self
            .store
            .find_api_key(&key)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let token = kinds.from_credential(Some(&api_key))?;
        Ok(token.map(AuthenticationContext::for_token))
    }

    fn name(&self) -> &'static str {
        "api-key"
    }
}

/// User API tokens sent as `Bearer <token>`.
pub struct TokenAuthentication {
    tokens: HashMap<String, ApiToken>,
    users: Arc<UserDirectory>,
}

impl TokenAuthentication {
    /// Indexes `tokens` by value.
    pub fn new(tokens: &[ApiToken], users: Arc<UserDirectory>) -> Self {
        Self {
            tokens: tokens.iter().map(|t| (t.token.clone(), t.clone())).collect(),
            users,
        }
    }
}

#[async_trait]
impl Authenticator for TokenAuthentication {
    async fn authenticate(
        &self,
        request: &AuthenticationRequest,
        kinds: &TokenKinds,
    ) -> Result<Option<AuthenticationContext>, AuthError> {
        let Some(value) = bearer(request) else {
            return Ok(None);
        };
        if value.starts_with(ORG_AUTH_TOKEN_PREFIX) {
            return Ok(None);
        }

        let record = self.tokens.get(&value).ok_or(AuthError::InvalidCredentials)?;
        let user = self
            .users
            .active(record.user_id)
            .ok_or(AuthError::InvalidCredentials)?;

        let token = kinds.from_credential(Some(record))?;
        Ok(Some(AuthenticationContext::for_user(user.clone(), token)))
    }

    fn name(&self) -> &'static str {
        "token"
    }
}

/// Organization auth tokens, compared by SHA-256.
pub struct OrgAuthTokenAuthentication {
    tokens: HashMap<String, OrgAuthToken>,
}

impl OrgAuthTokenAuthentication {
    /// Indexes `tokens` by hash.
    pub fn new(tokens: &[OrgAuthToken]) -> Self {
        Self {
            tokens: tokens
                .iter()
                .map(|t| (t.token_hashed.to_ascii_lowercase(), t.clone()))
                .collect(),
        }
    }
}

/// Hex encoded SHA-256, the stored form of org auth tokens.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[async_trait]
impl Authenticator for OrgAuthTokenAuthentication {
    async fn authenticate(
        &self,
        request: &AuthenticationRequest,
        kinds: &TokenKinds,
    ) -> Result<Option<AuthenticationContext>, AuthError> {
        let Some(value) = bearer(request) else {
            return Ok(None);
        };
        if !value.starts_with(ORG_AUTH_TOKEN_PREFIX) {
            return Ok(None);
        }

        let record = self
            .tokens
            .get(&hash_token(&value))
            .ok_or(AuthError::InvalidCredentials)?;

        let token = kinds.from_credential(Some(record))?;
        Ok(token.map(AuthenticationContext::for_token))
    }

    fn name(&self) -> &'static str {
        "org-auth-token"
    }
}

/// Browser sessions, identified by the session user id.
///
/// A session pointing at an unknown or inactive user is treated as logged
/// out rather than as an error.
pub struct SessionAuthentication {
    users: Arc<UserDirectory>,
}

#[async_trait]
impl Authenticator for SessionAuthentication {
    async fn authenticate(
        &self,
        request: &AuthenticationRequest,
        _kinds: &TokenKinds,
    ) -> Result<Option<AuthenticationContext>, AuthError> {
        let Some(user_id) = request.user_id.as_deref() else {
            return Ok(None);
        };
        let Ok(user_id) = user_id.parse::<u64>() else {
            tracing::debug!(user_id, "Ignoring malformed session user id");
            return Ok(None);
        };

        Ok(self
            .users
            .active(user_id)
            .map(|user| AuthenticationContext::for_user(user.clone(), None)))
    }

    fn name(&self) -> &'static str {
        "session"
    }
}
