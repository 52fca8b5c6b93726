//! Silo Server - Main entry point.

use std::path::PathBuf;

use clap::Parser;
use silo_auth::{ApiToken, AuthenticatedUser, OrgAuthToken};
use silo_server::schemes::hash_token;
use silo_server::{ServerConfig, StaticCredentialsConfig};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "silo-server")]
#[command(about = "Silo - cross-boundary authentication resolution service")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SILO_CONFIG")]
    config: Option<PathBuf>,

    /// Enable development mode (in-memory storage, demo credentials)
    #[arg(long, env = "SILO_DEV_MODE")]
    dev: bool,

    /// Server bind address
    #[arg(long, env = "SILO_BIND_ADDRESS")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = ServerConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }

    tracing::info!("Starting Silo server...");
    tracing::info!("Bind address: {}", config.bind_address);

    if cli.dev {
        tracing::warn!("Development mode enabled - DO NOT USE IN PRODUCTION");
        config.data_dir = None;
        if config.credentials.is_empty() {
            config.credentials = development_credentials();
            tracing::warn!(
                user_token = DEV_USER_TOKEN,
                org_token = DEV_ORG_TOKEN,
                "Loaded demo credentials"
            );
        }
    }

    let app = silo_server::build_app(&config).await?;
    let listener = TcpListener::bind(&config.bind_address).await?;

    tracing::info!(address = %listener.local_addr()?, "Silo server started successfully");

    silo_server::serve(listener, app, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutting down...");
    })
    .await
}

const DEV_USER_TOKEN: &str = "dev-user-token";
const DEV_ORG_TOKEN: &str = "orgtok_dev";

fn development_credentials() -> StaticCredentialsConfig {
    StaticCredentialsConfig {
        users: vec![AuthenticatedUser {
            username: "admin".to_string(),
            is_staff: true,
            ..AuthenticatedUser::with_id(1)
        }],
        api_keys: Vec::new(),
        api_tokens: vec![ApiToken {
            id: 1,
            user_id: 1,
            application_id: None,
            organization_id: None,
            token: DEV_USER_TOKEN.to_string(),
            scopes: vec!["org:admin".to_string()],
        }],
        org_auth_tokens: vec![OrgAuthToken {
            id: 1,
            organization_id: 1,
            name: "dev".to_string(),
            token_hashed: hash_token(DEV_ORG_TOKEN),
            token_last_characters: Some("_dev".to_string()),
            scopes: vec!["org:ci".to_string()],
        }],
    }
}
