//! Client side of the remote resolution call.

use std::time::Duration;

use async_trait::async_trait;
use silo_auth::{
    AuthError, AuthService, AuthenticationContext, AuthenticationRequest, AuthenticatorKind,
};

use crate::error::auth_error_from_body;
use crate::types::{AuthenticateWithRequest, ErrorBody};

/// Path of the resolution endpoint.
pub const AUTHENTICATE_PATH: &str = "/v1/auth/authenticate";

/// [`AuthService`] calling the silo that owns the credentials over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteAuthService {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteAuthService {
    /// Creates a client for the silo at `base_url`.
    ///
    /// # Errors
    ///
    /// `Configuration` if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Configuration(format!("http client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}{AUTHENTICATE_PATH}", base_url.trim_end_matches('/')),
        })
    }

    /// Full URL of the resolution endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn transport_error(e: reqwest::Error) -> AuthError {
    if e.is_timeout() {
        AuthError::Timeout
    } else {
        AuthError::Transport(e.to_string())
    }
}

#[async_trait]
impl AuthService for RemoteAuthService {
    async fn authenticate_with(
        &self,
        request: &AuthenticationRequest,
        kinds: &[AuthenticatorKind],
    ) -> Result<AuthenticationContext, AuthError> {
        let body = AuthenticateWithRequest {
            request: request.clone(),
            kinds: kinds.to_vec(),
        };

        tracing::debug!(endpoint = %self.endpoint, ?kinds, "Calling remote authentication");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<AuthenticationContext>()
                .await
                .map_err(|e| {
                    if e.is_decode() {
                        AuthError::Remote(format!("invalid response: {e}"))
                    } else {
                        transport_error(e)
                    }
                });
        }

        match response.json::<ErrorBody>().await {
            Ok(body) => Err(auth_error_from_body(body)),
            Err(_) => Err(AuthError::Remote(format!("unexpected status {status}"))),
        }
    }
}
