//! # Silo Auth
//!
//! Authentication resolution across silo boundaries.
//!
//! A request arriving at one silo may carry credentials that live in another
//! silo's storage. Instead of reading those stores directly, the request is
//! reduced to a transport-independent [`AuthenticationRequest`] and resolved
//! by a remote [`AuthService`] that owns the credentials.
//!
//! ## Building blocks
//!
//! - [`AuthenticationRequest`] - normalized credential descriptor
//! - [`AuthenticatorKind`] / [`AuthenticatorRegistry`] - closed set of schemes and their resolvers
//! - [`AuthenticatedToken`] / [`TokenKinds`] - unified token over heterogeneous credential records
//! - [`RpcAuthentication`] - resolution protocol wrapper (user, userless token, or nothing)
//! - [`AuthenticationContext::applied_to`] - scoped installation into ambient request state

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ambient;
pub mod authenticator;
pub mod context;
pub mod error;
pub mod provider;
pub mod records;
pub mod request;
pub mod resolution;
pub mod token;

pub use ambient::{
    current_principal, current_request, sync_with_current_request, with_current_request,
    AmbientAttr, AmbientTarget, AmbientValue, AppliedContext, RequestEnv, SharedRequest,
};
pub use authenticator::{
    Authenticator, AuthenticatorKind, AuthenticatorRegistry, AuthenticatorRegistryBuilder,
};
pub use context::{
    AuthenticatedUser, AuthenticationContext, MiddlewareAuthenticationResponse, Principal,
};
pub use error::AuthError;
pub use provider::{
    AuthIdentity, AuthProvider, AuthProviderFlags, AuthState, MemberSsoState,
    OrganizationAuthConfig, ProviderManager,
};
pub use records::{register_builtin_kinds, ApiKey, ApiToken, OrgAuthToken};
pub use request::{
    normalize_to_b64, AuthenticationRequest, MemorySession, Session, TransportRequest,
};
pub use resolution::{
    AuthService, LocalAuthService, Resolution, ResolutionPolicy, RpcAuthentication,
};
pub use token::{AuthenticatedToken, CredentialRecord, TokenKinds, TokenKindsBuilder};
