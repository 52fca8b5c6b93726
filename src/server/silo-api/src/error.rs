//! API error type.
//!
//! Errors are rendered as `{"error": ..., "code": ...}`. The client maps
//! the code back to an [`AuthError`] so failures reported by the remote silo
//! keep their meaning on the calling side.

use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use silo_auth::AuthError;
use silo_storage::StorageError;
use thiserror::Error;

use crate::types::ErrorBody;

/// Errors returned by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request did not authenticate.
    #[error("authentication required")]
    Unauthorized {
        /// `WWW-Authenticate` challenge.
        challenge: String,
    },

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Authentication failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type alias for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Stable code of an [`AuthError`].
pub fn auth_error_code(error: &AuthError) -> &'static str {
    match error {
        AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
        AuthError::DuplicateKind(_) => "DUPLICATE_KIND",
        AuthError::UnregisteredCredentialType(_) => "UNREGISTERED_CREDENTIAL_TYPE",
        AuthError::UnrecognizedAuthenticator(_) => "UNRECOGNIZED_AUTHENTICATOR",
        AuthError::MissingAuthenticator(_) => "MISSING_AUTHENTICATOR",
        AuthError::Transport(_) => "TRANSPORT_ERROR",
        AuthError::Timeout => "TIMEOUT",
        AuthError::Remote(_) => "REMOTE_ERROR",
        AuthError::Provider(_) => "PROVIDER_ERROR",
        AuthError::Configuration(_) => "CONFIG_ERROR",
        AuthError::Storage(_) => "STORAGE_ERROR",
    }
}

/// Rebuilds an [`AuthError`] from an error body returned by a remote silo.
///
/// Only failures that mean the same thing on both sides are mapped back;
/// everything else becomes [`AuthError::Remote`] so that it is never mistaken
/// for a local transport problem.
pub fn auth_error_from_body(body: ErrorBody) -> AuthError {
    match body.code.as_str() {
        "INVALID_CREDENTIALS" => AuthError::InvalidCredentials,
        "UNREGISTERED_CREDENTIAL_TYPE" => AuthError::UnregisteredCredentialType(body.error),
        _ => AuthError::Remote(format!("{}: {}", body.code, body.error)),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Unauthorized { .. } => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Auth(e) => {
                let status = match e {
                    AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                    AuthError::Transport(_) | AuthError::Remote(_) => StatusCode::BAD_GATEWAY,
                    AuthError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                    _ => {
                        tracing::error!(error = %e, "Authentication failed");
                        StatusCode::INTERNAL_SERVER_ERROR
                    },
                };
                (status, auth_error_code(e))
            },
            ApiError::Storage(e) => {
                tracing::error!(error = %e, "Storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
            },
        };

        let message = match &self {
            ApiError::Auth(AuthError::UnregisteredCredentialType(name)) => name.clone(),
            _ => self.to_string(),
        };
        let body = ErrorBody {
            error: message,
            code: code.to_string(),
        };
        let mut response = (status, Json(body)).into_response();

        if let ApiError::Unauthorized { challenge } = &self {
            if let Ok(value) = HeaderValue::from_str(challenge) {
                response.headers_mut().insert(WWW_AUTHENTICATE, value);
            }
        }

        response
    }
}
