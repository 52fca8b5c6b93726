//! Authentication error types.

use thiserror::Error;

/// Errors that can occur while resolving authentication.
///
/// A request that simply fails to authenticate is not an error: it resolves
/// to [`crate::Resolution::Unauthenticated`]. The variants below cover
/// configuration mistakes, scheme failures and transport problems.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid credentials (bad token, wrong signature, etc.).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// A token kind tag was registered twice.
    #[error("duplicate kind: {0}")]
    DuplicateKind(String),

    /// A credential record has no registered token kind.
    #[error("unregistered credential type: {0}")]
    UnregisteredCredentialType(String),

    /// An authenticator implementation is outside the known scheme set.
    #[error("unrecognized authenticator: {0}")]
    UnrecognizedAuthenticator(String),

    /// No authenticator was registered for a scheme kind.
    #[error("no authenticator registered for {0}")]
    MissingAuthenticator(String),

    /// The remote resolution service could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote resolution call did not complete in time.
    #[error("remote authentication timed out")]
    Timeout,

    /// The remote resolution service reported a failure.
    #[error("remote error: {0}")]
    Remote(String),

    /// Identity provider could not be instantiated.
    #[error("provider error: {0}")]
    Provider(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// Returns true for failures of the call itself rather than of its outcome.
    ///
    /// The resolution wrapper downgrades these to an unauthenticated result.
    pub fn is_transport(&self) -> bool {
        matches!(self, AuthError::Transport(_) | AuthError::Timeout)
    }
}
