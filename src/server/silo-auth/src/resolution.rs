//! Authentication resolution protocol.
//!
//! The silo owning the credentials runs a [`LocalAuthService`]; other silos
//! reach it through an [`AuthService`] client and wrap the answer with
//! [`RpcAuthentication`], which decides between an authenticated user, a
//! userless token, and no authentication at all.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::token::{API_KEY_KIND, ORG_AUTH_TOKEN_KIND};
use crate::{
    AuthError, AuthenticatedToken, AuthenticatedUser, AuthenticationContext,
    AuthenticationRequest, AuthenticatorKind, AuthenticatorRegistry, Principal, TokenKinds,
};

/// Realm advertised in `WWW-Authenticate` challenges.
pub const WWW_AUTHENTICATE_REALM: &str = "api";

/// Remote resolution call.
///
/// The implementation must try `kinds` in order and return the first match,
/// or the default (empty) context when nothing matches.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Resolves `request` against the candidate scheme kinds.
    async fn authenticate_with(
        &self,
        request: &AuthenticationRequest,
        kinds: &[AuthenticatorKind],
    ) -> Result<AuthenticationContext, AuthError>;
}

/// Resolution service backed by in-process authenticators.
#[derive(Debug, Clone)]
pub struct LocalAuthService {
    registry: Arc<AuthenticatorRegistry>,
    token_kinds: Arc<TokenKinds>,
}

impl LocalAuthService {
    /// Creates a service over a built registry and sealed token kinds.
    pub fn new(registry: Arc<AuthenticatorRegistry>, token_kinds: Arc<TokenKinds>) -> Self {
        Self {
            registry,
            token_kinds,
        }
    }

    /// The sealed token kinds handed to resolvers.
    pub fn token_kinds(&self) -> &TokenKinds {
        &self.token_kinds
    }
}

#[async_trait]
impl AuthService for LocalAuthService {
    async fn authenticate_with(
        &self,
        request: &AuthenticationRequest,
        kinds: &[AuthenticatorKind],
    ) -> Result<AuthenticationContext, AuthError> {
        for &kind in kinds {
            let resolver = self.registry.resolver_of(kind);
            match resolver.authenticate(request, &self.token_kinds).await? {
                Some(context) => {
                    if let Some(token) = &context.auth {
                        if !self.token_kinds.is_registered(&token.kind) {
                            tracing::warn!(
                                %kind,
                                token_kind = %token.kind,
                                "Resolver returned an unregistered token kind"
                            );
                            return Err(AuthError::UnregisteredCredentialType(token.kind.clone()));
                        }
                    }
                    tracing::debug!(
                        %kind,
                        user = ?context.user.as_ref().map(|u| u.id),
                        "Request resolved"
                    );
                    return Ok(context);
                },
                None => tracing::debug!(%kind, "No credentials for scheme"),
            }
        }
        Ok(AuthenticationContext::default())
    }
}

/// Outcome of [`RpcAuthentication::authenticate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A user was resolved, possibly together with the token used.
    Authenticated {
        /// The user.
        user: AuthenticatedUser,
        /// Token the user authenticated with, if any.
        token: Option<AuthenticatedToken>,
    },
    /// No user, but a token that is allowed to act on its own.
    Anonymous {
        /// The token.
        token: AuthenticatedToken,
    },
    /// Nothing usable. Callers treat this like absent credentials.
    Unauthenticated,
}

impl Resolution {
    /// Whether any identity or token was resolved.
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Resolution::Unauthenticated)
    }

    /// Identity to expose downstream.
    pub fn principal(&self) -> Principal {
        match self {
            Resolution::Authenticated { user, .. } => Principal::User(user.clone()),
            Resolution::Anonymous { .. } | Resolution::Unauthenticated => Principal::Anonymous,
        }
    }

    /// Resolved token, if any.
    pub fn token(&self) -> Option<&AuthenticatedToken> {
        match self {
            Resolution::Authenticated { token, .. } => token.as_ref(),
            Resolution::Anonymous { token } => Some(token),
            Resolution::Unauthenticated => None,
        }
    }

    /// Converts back into a context suitable for ambient installation.
    pub fn into_context(self) -> AuthenticationContext {
        match self {
            Resolution::Authenticated { user, token } => {
                AuthenticationContext::for_user(user, token)
            },
            Resolution::Anonymous { token } => AuthenticationContext::for_token(token),
            Resolution::Unauthenticated => AuthenticationContext::default(),
        }
    }
}

/// Deployment choices of the resolution wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionPolicy {
    /// Token kinds that authenticate without a user.
    pub userless_kinds: Vec<String>,
    /// Upper bound on the remote call.
    pub timeout: Option<Duration>,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self {
            userless_kinds: vec![API_KEY_KIND.to_string(), ORG_AUTH_TOKEN_KIND.to_string()],
            timeout: None,
        }
    }
}

impl ResolutionPolicy {
    /// Whether `token` may authenticate a request on its own.
    pub fn allows_userless(&self, token: &AuthenticatedToken) -> bool {
        self.userless_kinds.iter().any(|kind| *kind == token.kind)
    }
}

/// Request authentication through a remote resolution service.
#[derive(Clone)]
pub struct RpcAuthentication {
    service: Arc<dyn AuthService>,
    kinds: Vec<AuthenticatorKind>,
    policy: ResolutionPolicy,
}

impl RpcAuthentication {
    /// Creates a wrapper trying `kinds` in order with the default policy.
    pub fn new(service: Arc<dyn AuthService>, kinds: Vec<AuthenticatorKind>) -> Self {
        Self {
            service,
            kinds,
            policy: ResolutionPolicy::default(),
        }
    }

    /// Replaces the policy.
    pub fn with_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Candidate kinds, in the order they are tried.
    pub fn kinds(&self) -> &[AuthenticatorKind] {
        &self.kinds
    }

    /// Resolves `request`.
    ///
    /// Transport failures and timeouts yield [`Resolution::Unauthenticated`].
    ///
    /// # Errors
    ///
    /// Any other error reported by the service, e.g. an unregistered
    /// credential type on the remote side.
    pub async fn authenticate(
        &self,
        request: &AuthenticationRequest,
    ) -> Result<Resolution, AuthError> {
        let call = self.service.authenticate_with(request, &self.kinds);
        let outcome = match self.policy.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(AuthError::Timeout)),
            None => call.await,
        };

        match outcome {
            Ok(context) => Ok(self.resolve(context)),
            Err(e) if e.is_transport() => {
                tracing::warn!(
                    error = %e,
                    "Remote authentication unavailable, treating request as unauthenticated"
                );
                Ok(Resolution::Unauthenticated)
            },
            Err(e) => Err(e),
        }
    }

    /// Applies the three-way decision to a context returned by the service.
    pub fn resolve(&self, context: AuthenticationContext) -> Resolution {
        match context {
            AuthenticationContext {
                user: Some(user),
                auth,
            } => Resolution::Authenticated { user, token: auth },
            AuthenticationContext {
                user: None,
                auth: Some(token),
            } if self.policy.allows_userless(&token) => Resolution::Anonymous { token },
            _ => Resolution::Unauthenticated,
        }
    }

    /// `WWW-Authenticate` value sent with 401 responses.
    pub fn authenticate_header(&self) -> String {
        format!("xBasic realm=\"{WWW_AUTHENTICATE_REALM}\"")
    }
}

impl std::fmt::Debug for RpcAuthentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcAuthentication")
            .field("kinds", &self.kinds)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
