//! Authenticator kinds and their resolvers.
//!
//! The set of schemes is closed. Each [`AuthenticatorKind`] maps to exactly
//! one resolver name in [`SCHEMES`]; adding a scheme means adding the enum
//! variant and its table row together.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{AuthError, AuthenticationContext, AuthenticationRequest, TokenKinds};

/// Authentication scheme kinds a request may be resolved with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AuthenticatorKind {
    /// Legacy organization API key.
    ApiKey = 0,
    /// User or application bearer token.
    Token = 1,
    /// Browser session.
    Session = 2,
    /// Organization auth token.
    OrgAuthToken = 3,
}

/// Kind to resolver name table. Row order follows the enum discriminants.
pub const SCHEMES: [(AuthenticatorKind, &str); 4] = [
    (AuthenticatorKind::ApiKey, "api-key"),
    (AuthenticatorKind::Token, "token"),
    (AuthenticatorKind::Session, "session"),
    (AuthenticatorKind::OrgAuthToken, "org-auth-token"),
];

impl AuthenticatorKind {
    /// Every kind, in discriminant order.
    pub const ALL: [AuthenticatorKind; 4] = [
        AuthenticatorKind::ApiKey,
        AuthenticatorKind::Token,
        AuthenticatorKind::Session,
        AuthenticatorKind::OrgAuthToken,
    ];

    /// Name of the resolver implementing this kind.
    pub fn scheme_name(self) -> &'static str {
        SCHEMES[self as usize].1
    }

    /// Reverse lookup from a resolver name. `None` means unrecognized.
    pub fn kind_of(name: &str) -> Option<Self> {
        SCHEMES
            .iter()
            .find(|(_, scheme)| *scheme == name)
            .map(|(kind, _)| *kind)
    }
}

impl fmt::Display for AuthenticatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme_name())
    }
}

/// Resolver for a single authentication scheme.
///
/// Implementations verify scheme-specific credentials (signatures, hashes,
/// expiry) and return the resolved context. `Ok(None)` means the request does
/// not carry credentials for this scheme.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Attempts to authenticate the request.
    ///
    /// Credential records found by the resolver are unified through `kinds`.
    async fn authenticate(
        &self,
        request: &AuthenticationRequest,
        kinds: &TokenKinds,
    ) -> Result<Option<AuthenticationContext>, AuthError>;

    /// Scheme name; must appear in [`SCHEMES`].
    fn name(&self) -> &'static str;
}

/// Total mapping from [`AuthenticatorKind`] to resolver instances.
pub struct AuthenticatorRegistry {
    resolvers: [Arc<dyn Authenticator>; 4],
}

impl AuthenticatorRegistry {
    /// Starts an empty registry.
    pub fn builder() -> AuthenticatorRegistryBuilder {
        AuthenticatorRegistryBuilder::default()
    }

    /// Resolver for `kind`.
    pub fn resolver_of(&self, kind: AuthenticatorKind) -> &Arc<dyn Authenticator> {
        &self.resolvers[kind as usize]
    }

    /// Kind implemented by `authenticator`, or `None` if it is not a known scheme.
    pub fn kind_of(&self, authenticator: &dyn Authenticator) -> Option<AuthenticatorKind> {
        AuthenticatorKind::kind_of(authenticator.name())
    }
}

impl fmt::Debug for AuthenticatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.resolvers.iter().map(|r| r.name()))
            .finish()
    }
}

/// Collects one resolver per kind before the registry is frozen.
#[derive(Default)]
pub struct AuthenticatorRegistryBuilder {
    slots: [Option<Arc<dyn Authenticator>>; 4],
}

impl AuthenticatorRegistryBuilder {
    /// Registers a resolver under the kind matching its name.
    ///
    /// # Errors
    ///
    /// * `UnrecognizedAuthenticator` - the name is not in [`SCHEMES`]
    /// * `DuplicateKind` - a resolver for that kind is already registered
    pub fn register(mut self, authenticator: Arc<dyn Authenticator>) -> Result<Self, AuthError> {
        let name = authenticator.name();
        let kind = AuthenticatorKind::kind_of(name)
            .ok_or_else(|| AuthError::UnrecognizedAuthenticator(name.to_string()))?;

        let slot = &mut self.slots[kind as usize];
        if slot.is_some() {
            return Err(AuthError::DuplicateKind(name.to_string()));
        }
        *slot = Some(authenticator);
        Ok(self)
    }

    /// Freezes the registry.
    ///
    /// # Errors
    ///
    /// `MissingAuthenticator` if any kind has no resolver.
    pub fn build(self) -> Result<AuthenticatorRegistry, AuthError> {
        let [api_key, token, session, org_auth_token] = self.slots;
        Ok(AuthenticatorRegistry {
            resolvers: [
                require(api_key, AuthenticatorKind::ApiKey)?,
                require(token, AuthenticatorKind::Token)?,
                require(session, AuthenticatorKind::Session)?,
                require(org_auth_token, AuthenticatorKind::OrgAuthToken)?,
            ],
        })
    }
}

fn require(
    slot: Option<Arc<dyn Authenticator>>,
    kind: AuthenticatorKind,
) -> Result<Arc<dyn Authenticator>, AuthError> {
    slot.ok_or_else(|| AuthError::MissingAuthenticator(kind.to_string()))
}
