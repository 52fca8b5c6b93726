//! Wire types of the API.

use serde::{Deserialize, Serialize};
use silo_auth::{AuthenticatedToken, AuthenticationRequest, AuthenticatorKind, Principal};

/// Body of `POST /v1/auth/authenticate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthenticateWithRequest {
    /// Descriptor of the request to authenticate.
    #[serde(default)]
    pub request: AuthenticationRequest,
    /// Candidate scheme kinds, in the order they must be tried.
    pub kinds: Vec<AuthenticatorKind>,
}

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human readable message.
    pub error: String,
    /// Stable machine readable code.
    pub code: String,
}

/// Body of `GET /v1/sys/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server answers.
    pub status: String,
    /// Server version.
    pub version: String,
}

/// Body of `GET /v1/auth/whoami`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhoAmIResponse {
    /// Identity seen by the handler.
    pub principal: Principal,
    /// Token the request authenticated with.
    pub auth: Option<AuthenticatedToken>,
}
