//! Authentication context types.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::AuthenticatedToken;

/// User resolved by the remote silo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticatedUser {
    /// User id.
    pub id: u64,
    /// Login name.
    pub username: String,
    /// Primary email, if any.
    pub email: Option<String>,
    /// Whether the account is active.
    pub is_active: bool,
    /// Whether the account has staff privileges.
    pub is_staff: bool,
}

impl AuthenticatedUser {
    /// Creates a user with only an id set.
    pub fn with_id(id: u64) -> Self {
        Self {
            id,
            is_active: true,
            ..Default::default()
        }
    }
}

/// Identity installed into ambient request state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Principal {
    /// A resolved user.
    User(AuthenticatedUser),
    /// No user; the request may still carry a token.
    Anonymous,
}

impl Principal {
    /// Whether this principal is a resolved user.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Principal::User(_))
    }

    /// User id, if any.
    pub fn user_id(&self) -> Option<u64> {
        match self {
            Principal::User(user) => Some(user.id),
            Principal::Anonymous => None,
        }
    }
}

/// Outcome of a resolution attempt.
///
/// The default value is a valid, unauthenticated context and behaves exactly
/// like a request that never attempted authentication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticationContext {
    /// Resolved token.
    pub auth: Option<AuthenticatedToken>,
    /// Resolved user.
    pub user: Option<AuthenticatedUser>,
}

impl AuthenticationContext {
    /// Context carrying a user and optionally a token.
    pub fn for_user(user: AuthenticatedUser, auth: Option<AuthenticatedToken>) -> Self {
        Self {
            auth,
            user: Some(user),
        }
    }

    /// Context carrying only a token.
    pub fn for_token(auth: AuthenticatedToken) -> Self {
        Self {
            auth: Some(auth),
            user: None,
        }
    }

    /// The user, or the anonymous placeholder.
    pub fn principal(&self) -> Principal {
        self.user
            .clone()
            .map_or(Principal::Anonymous, Principal::User)
    }

    /// Whether neither a user nor a token was resolved.
    pub fn is_empty(&self) -> bool {
        self.auth.is_none() && self.user.is_none()
    }
}

/// Result of resolving a browser session in the request middleware.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiddlewareAuthenticationResponse {
    /// Resolved user and token.
    #[serde(flatten)]
    pub context: AuthenticationContext,
    /// Whether the session had expired.
    pub expired: bool,
    /// Whether the user came from a signed URL rather than the session.
    pub user_from_signed_request: bool,
    /// Session keys read while resolving.
    pub accessed: BTreeSet<String>,
}
