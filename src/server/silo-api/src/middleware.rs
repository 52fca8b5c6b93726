//! Request authentication middleware.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use silo_auth::{
    with_current_request, AuthError, AuthenticationRequest, MemorySession, RequestEnv,
};

use crate::error::{ApiError, ApiResult};
use crate::routes::ApiState;
use crate::transport::HttpRequest;

/// Resolves the caller through the configured [`silo_auth::RpcAuthentication`].
///
/// A session layer running before this middleware may put a
/// [`MemorySession`] into the request extensions; it is read for the session
/// scheme and put back with its accessed flag.
///
/// Unauthenticated requests and invalid credentials are rejected with 401 and
/// the resolver's challenge. Otherwise the [`silo_auth::Resolution`] is stored in the request
/// extensions and its context is installed on a fresh per-request
/// [`RequestEnv`] for as long as the inner service runs.
pub async fn require_authentication(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let (mut parts, body) = request.into_parts();
    let session = parts.extensions.remove::<MemorySession>();

    let mut http = HttpRequest::new(&parts);
    if let Some(session) = session {
        http = http.with_session(session);
    }
    let descriptor = AuthenticationRequest::from_transport(&mut http);
    if let Some(session) = http.into_session() {
        parts.extensions.insert(session);
    }

    let resolution = match state.rpc.authenticate(&descriptor).await {
        Ok(resolution) => resolution,
        Err(AuthError::InvalidCredentials) => {
            tracing::debug!(path = %descriptor.path, "Rejecting invalid credentials");
            return Err(ApiError::Unauthorized {
                challenge: state.rpc.authenticate_header(),
            });
        },
        Err(e) => return Err(e.into()),
    };
    if !resolution.is_authenticated() {
        tracing::debug!(path = %descriptor.path, "Rejecting unauthenticated request");
        return Err(ApiError::Unauthorized {
            challenge: state.rpc.authenticate_header(),
        });
    }

    let context = resolution.clone().into_context();
    parts.extensions.insert(resolution);
    let request = Request::from_parts(parts, body);

    let env = Arc::new(Mutex::new(RequestEnv::new()));
    let response = with_current_request(env, async move {
        let _applied = context.applied_to(None);
        next.run(request).await
    })
    .await;

    Ok(response)
}
