//! Silo CLI - Command line interface.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand, ValueEnum};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "silo")]
#[command(about = "Silo CLI - Inspect cross-silo authentication")]
#[command(version)]
struct Cli {
    /// Silo server address
    #[arg(long, default_value = "http://localhost:8300", env = "SILO_ADDR")]
    addr: String,

    /// Bearer token (user API token or org auth token)
    #[arg(long, env = "SILO_TOKEN", conflicts_with = "api_key")]
    token: Option<String>,

    /// Legacy API key, sent as basic auth
    #[arg(long, env = "SILO_API_KEY")]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server status
    Status,
    /// Show the identity the server resolves for the given credentials
    Whoami,
    /// Call the remote resolution endpoint with a hand-built descriptor
    Authenticate {
        /// Scheme kinds to try, in order
        #[arg(long = "kind", value_enum, required = true)]
        kinds: Vec<Kind>,
        /// Session user id
        #[arg(long)]
        user_id: Option<String>,
        /// Request path recorded in the descriptor
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// Show the auth configuration of an organization
    OrgConfig {
        /// Organization id
        organization_id: i64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
enum Kind {
    ApiKey,
    Token,
    Session,
    OrgAuthToken,
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Default, Serialize)]
struct Descriptor {
    user_id: Option<String>,
    path: String,
    authorization_b64: Option<String>,
}

#[derive(Serialize)]
struct AuthenticateRequest {
    request: Descriptor,
    kinds: Vec<Kind>,
}

#[derive(Debug, Deserialize)]
struct WhoAmIResponse {
    principal: Value,
    auth: Option<Value>,
}

// ============================================================================
// HTTP Client
// ============================================================================

struct SiloClient {
    client: Client,
    base_url: String,
    authorization: Option<String>,
}

impl SiloClient {
    fn new(base_url: &str, authorization: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.authorization {
            Some(value) => req.header("Authorization", value),
            None => req,
        }
    }

    async fn parse<T: DeserializeOwned>(resp: Response, action: &str) -> Result<T> {
        if !resp.status().is_success() {
            let status = resp.status();
            let error: ErrorResponse = resp.json().await.unwrap_or(ErrorResponse {
                error: format!("HTTP {status}"),
                code: String::new(),
            });
            if error.code.is_empty() {
                bail!("{action} failed: {}", error.error);
            }
            bail!("{action} failed: {} ({})", error.error, error.code);
        }

        resp.json().await.context("Failed to parse response")
    }

    async fn get_health(&self) -> Result<HealthResponse> {
        let resp = self
            .client
            .get(self.url("/v1/sys/health"))
            .send()
            .await
            .context("Failed to connect to server")?;

        Self::parse(resp, "Health check").await
    }

    async fn whoami(&self) -> Result<WhoAmIResponse> {
        let resp = self
            .authorized(self.client.get(self.url("/v1/auth/whoami")))
            .send()
            .await
            .context("Failed to connect to server")?;

        Self::parse(resp, "Whoami").await
    }

    async fn authenticate(&self, req: &AuthenticateRequest) -> Result<Value> {
        let resp = self
            .client
            .post(self.url("/v1/auth/authenticate"))
            .json(req)
            .send()
            .await
            .context("Failed to connect to server")?;

        Self::parse(resp, "Authenticate").await
    }

    async fn org_config(&self, organization_id: i64) -> Result<Value> {
        let resp = self
            .client
            .get(self.url(&format!("/v1/organizations/{organization_id}/auth-config")))
            .send()
            .await
            .context("Failed to connect to server")?;

        Self::parse(resp, "Org config").await
    }
}

fn authorization_header(token: Option<String>, api_key: Option<String>) -> Option<String> {
    match (token, api_key) {
        (Some(token), _) => Some(format!("Bearer {token}")),
        (None, Some(key)) => Some(format!("Basic {}", STANDARD.encode(format!("{key}:")))),
        (None, None) => None,
    }
}

// ============================================================================
// Command Handlers
// ============================================================================

async fn cmd_status(client: &SiloClient) -> Result<()> {
    let health = client.get_health().await?;

    println!("Silo server status:");
    println!("  Status:  {}", health.status);
    println!("  Version: {}", health.version);

    Ok(())
}

async fn cmd_whoami(client: &SiloClient) -> Result<()> {
    if client.authorization.is_none() {
        bail!("Credentials required. Set SILO_TOKEN or SILO_API_KEY, or use --token / --api-key");
    }

    let result = client.whoami().await?;

    println!("Principal: {}", serde_json::to_string_pretty(&result.principal)?);
    match result.auth {
        Some(token) => println!("Token:     {}", serde_json::to_string_pretty(&token)?),
        None => println!("Token:     none"),
    }

    Ok(())
}

async fn cmd_authenticate(
    client: &SiloClient,
    kinds: Vec<Kind>,
    user_id: Option<String>,
    path: String,
) -> Result<()> {
    let req = AuthenticateRequest {
        request: Descriptor {
            user_id,
            path,
            authorization_b64: client
                .authorization
                .as_ref()
                .map(|value| STANDARD.encode(value)),
        },
        kinds,
    };

    let context = client.authenticate(&req).await?;
    println!("{}", serde_json::to_string_pretty(&context)?);

    Ok(())
}

async fn cmd_org_config(client: &SiloClient, organization_id: i64) -> Result<()> {
    let config = client.org_config(organization_id).await?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let authorization = authorization_header(cli.token, cli.api_key);
    let client = SiloClient::new(&cli.addr, authorization)?;

    match cli.command {
        Commands::Status => cmd_status(&client).await,
        Commands::Whoami => cmd_whoami(&client).await,
        Commands::Authenticate {
            kinds,
            user_id,
            path,
        } => cmd_authenticate(&client, kinds, user_id, path).await,
        Commands::OrgConfig { organization_id } => cmd_org_config(&client, organization_id).await,
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_header() {
        assert_eq!(
            authorization_header(Some("t-abc".into()), None).as_deref(),
            Some("Bearer t-abc")
        );
        assert_eq!(
            authorization_header(None, Some("k-123".into())).as_deref(),
            Some("Basic ay0xMjM6")
        );
        assert_eq!(authorization_header(None, None), None);
    }

    #[test]
    fn test_kinds_serialize_like_server() {
        let json = serde_json::to_value(vec![Kind::ApiKey, Kind::OrgAuthToken]).unwrap();
        assert_eq!(json, serde_json::json!(["api_key", "org_auth_token"]));
    }

    #[test]
    fn test_cli_parses_authenticate() {
        let cli = Cli::try_parse_from([
            "silo",
            "--token",
            "t-abc",
            "authenticate",
            "--kind",
            "session",
            "--kind",
            "api-key",
            "--user-id",
            "42",
        ])
        .unwrap();

        match cli.command {
            Commands::Authenticate { kinds, user_id, .. } => {
                assert_eq!(kinds.len(), 2);
                assert_eq!(user_id.as_deref(), Some("42"));
            },
            _ => panic!("expected authenticate"),
        }
    }
}
