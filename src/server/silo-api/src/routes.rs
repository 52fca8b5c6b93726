//! Route definitions and handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use silo_auth::{
    current_principal, AuthService, AuthenticationContext, OrganizationAuthConfig, Principal,
    Resolution, RpcAuthentication,
};
use silo_storage::AuthConfigStore;
use tower_http::trace::TraceLayer;

use crate::error::ApiResult;
use crate::middleware::require_authentication;
use crate::types::{AuthenticateWithRequest, HealthResponse, WhoAmIResponse};

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    /// Resolution service answering `POST /v1/auth/authenticate`.
    pub service: Arc<dyn AuthService>,
    /// Organization auth configuration.
    pub store: Arc<dyn AuthConfigStore>,
    /// Resolution wrapper guarding authenticated routes.
    pub rpc: Arc<RpcAuthentication>,
}

/// Builds the API router.
pub fn build_router(state: ApiState) -> Router {
    let authenticated = Router::new()
        .route("/v1/auth/whoami", get(whoami))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_authentication,
        ));

    Router::new()
        .route("/v1/auth/authenticate", post(authenticate))
        .route("/v1/organizations/{id}/auth-config", get(org_auth_config))
        .route("/v1/sys/health", get(health))
        .merge(authenticated)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Remote resolution call.
///
/// POST /v1/auth/authenticate
pub async fn authenticate(
    State(state): State<ApiState>,
    Json(body): Json<AuthenticateWithRequest>,
) -> ApiResult<Json<AuthenticationContext>> {
    tracing::debug!(
        kinds = ?body.kinds,
        path = %body.request.path,
        "Authenticating on behalf of a remote silo"
    );
    let context = state.service.authenticate_with(&body.request, &body.kinds).await?;
    Ok(Json(context))
}

/// Organization auth configuration.
///
/// GET /v1/organizations/{id}/auth-config
pub async fn org_auth_config(
    State(state): State<ApiState>,
    Path(organization_id): Path<i64>,
) -> ApiResult<Json<OrganizationAuthConfig>> {
    Ok(Json(state.store.get_org_auth_config(organization_id).await?))
}

/// GET /v1/sys/health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Identity the request resolved to, as seen through ambient state.
///
/// GET /v1/auth/whoami
pub async fn whoami(Extension(resolution): Extension<Resolution>) -> Json<WhoAmIResponse> {
    let principal = current_principal().unwrap_or(Principal::Anonymous);
    Json(WhoAmIResponse {
        principal,
        auth: resolution.token().cloned(),
    })
}
