//! # Silo Server
//!
//! Composes the authentication resolution service: configuration, storage,
//! startup registration of token kinds and authenticators, and the HTTP API.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod schemes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use silo_api::{build_router, ApiState, RemoteAuthService};
use silo_auth::{AuthService, LocalAuthService, RpcAuthentication};
use silo_storage::{AuthConfigStore, MemoryAuthConfigStore};
use silo_storage_sqlite::SqliteAuthConfigStore;
use tokio::net::TcpListener;

pub use config::{ResolutionConfig, ServerConfig, StaticCredentialsConfig};

/// Builds the application router.
///
/// Token kinds and authenticators are registered here, once, and sealed
/// before the router is returned. Any registration error aborts startup.
pub async fn build_app(config: &ServerConfig) -> anyhow::Result<Router> {
    let store = open_store(config).await?;

    let token_kinds = Arc::new(schemes::builtin_token_kinds()?);
    let registry = Arc::new(schemes::builtin_registry(&config.credentials, store.clone())?);
    tracing::info!(
        token_kinds = ?token_kinds.tags().collect::<Vec<_>>(),
        authenticators = ?registry,
        "Authentication registries sealed"
    );

    let local: Arc<dyn AuthService> = Arc::new(LocalAuthService::new(registry, token_kinds));
    let resolver: Arc<dyn AuthService> = match &config.resolution.remote_url {
        Some(url) => {
            tracing::info!(remote = %url, "Resolving inbound requests through remote silo");
            Arc::new(RemoteAuthService::new(url, config.resolution.timeout())?)
        },
        None => local.clone(),
    };

    let rpc = RpcAuthentication::new(resolver, config.resolution.kinds.clone())
        .with_policy(config.resolution.policy());

    Ok(build_router(ApiState {
        service: local,
        store,
        rpc: Arc::new(rpc),
    }))
}

async fn open_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn AuthConfigStore>> {
    let api_keys = &config.credentials.api_keys;

    match &config.data_dir {
        Some(dir) => {
            let store = SqliteAuthConfigStore::open(dir, &config.silo).await?;
            for api_key in api_keys {
                store.put_api_key(api_key).await?;
            }
            Ok(Arc::new(store))
        },
        None => {
            tracing::info!("Using in-memory auth config store");
            let store = MemoryAuthConfigStore::new();
            for api_key in api_keys {
                store.put_api_key(api_key.clone());
            }
            Ok(Arc::new(store))
        },
    }
}

/// Serves `app` on `listener` until `shutdown` completes.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}
