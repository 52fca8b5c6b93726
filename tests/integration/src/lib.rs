//! Integration tests for Silo server.
//!
//! These tests run complete servers in-process and exercise resolution over
//! real HTTP, including a silo resolving through a remote control silo.

// Allow unwrap() in tests - panics are acceptable for test assertions
#![allow(clippy::disallowed_methods)]

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use silo_server::{build_app, serve, ServerConfig};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Default, Serialize)]
pub struct Descriptor {
    pub user_id: Option<String>,
    pub path: String,
    pub authorization_b64: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthenticateRequest {
    pub request: Descriptor,
    pub kinds: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct WhoAmIResponse {
    pub principal: Value,
    pub auth: Option<Value>,
}

// ============================================================================
// Test Server
// ============================================================================

/// A server running on an ephemeral port inside the test runtime.
pub struct TestServer {
    pub base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<()>>,
}

impl TestServer {
    /// Start a server with `config`; its bind address is ignored.
    pub async fn start(config: ServerConfig) -> Result<Self> {
        let app = build_app(&config).await.context("Failed to build app")?;
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind test listener")?;
        let base_url = format!("http://{}", listener.local_addr()?);

        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(serve(listener, app, async move {
            let _ = rx.await;
        }));

        let server = Self {
            base_url,
            shutdown: Some(tx),
            handle,
        };
        server.wait_for_ready().await?;
        Ok(server)
    }

    async fn wait_for_ready(&self) -> Result<()> {
        let client = Client::new();
        let url = format!("{}/v1/sys/health", self.base_url);

        for _ in 0..50 {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                _ => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }

        bail!("Server failed to start within 5 seconds")
    }

    /// Get a configured HTTP client for this server.
    pub fn client(&self) -> SiloClient {
        SiloClient::new(&self.base_url)
    }

    /// Stop the server and wait for it to drain.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        (&mut self.handle).await?
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

// ============================================================================
// Test Client
// ============================================================================

/// HTTP client for testing the Silo API.
pub struct SiloClient {
    client: Client,
    base_url: String,
    authorization: Option<String>,
}

impl SiloClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.to_string(),
            authorization: None,
        }
    }

    pub fn with_authorization(mut self, value: &str) -> Self {
        self.authorization = Some(value.to_string());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let resp = self.client.get(self.url("/v1/sys/health")).send().await?;
        Ok(resp.json().await?)
    }

    /// Raw whoami response, so tests can inspect status and headers.
    pub async fn whoami_raw(&self) -> Result<reqwest::Response> {
        let mut req = self.client.get(self.url("/v1/auth/whoami"));
        if let Some(value) = &self.authorization {
            req = req.header("Authorization", value);
        }
        Ok(req.send().await?)
    }

    pub async fn whoami(&self) -> Result<WhoAmIResponse> {
        let resp = self.whoami_raw().await?;
        if !resp.status().is_success() {
            bail!("Whoami failed: {} {}", resp.status(), resp.text().await?);
        }
        Ok(resp.json().await?)
    }

    pub async fn authenticate(&self, req: &AuthenticateRequest) -> Result<(StatusCode, Value)> {
        let resp = self
            .client
            .post(self.url("/v1/auth/authenticate"))
            .json(req)
            .send()
            .await?;
        let status = resp.status();
        Ok((status, resp.json().await?))
    }

    pub async fn org_auth_config(&self, organization_id: i64) -> Result<Value> {
        let resp = self
            .client
            .get(self.url(&format!("/v1/organizations/{organization_id}/auth-config")))
            .send()
            .await?;
        if !resp.status().is_success() {
            bail!("Auth config failed: {}", resp.text().await?);
        }
        Ok(resp.json().await?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use reqwest::header::WWW_AUTHENTICATE;
    use silo_auth::{ApiKey, ApiToken, AuthenticatedUser, AuthenticatorKind, OrgAuthToken};
    use silo_server::schemes::hash_token;
    use silo_server::StaticCredentialsConfig;
    use tempfile::TempDir;

    use super::*;

    fn credentials() -> StaticCredentialsConfig {
        StaticCredentialsConfig {
            users: vec![AuthenticatedUser {
                username: "alice".to_string(),
                ..AuthenticatedUser::with_id(42)
            }],
            api_keys: vec![ApiKey {
                id: 3,
                organization_id: 9,
                label: "legacy".to_string(),
                key: "k-123".to_string(),
                scopes: vec!["project:write".to_string()],
                allowed_origins: Vec::new(),
                is_active: true,
            }],
            api_tokens: vec![ApiToken {
                id: 1,
                user_id: 42,
                application_id: None,
                organization_id: None,
                token: "t-abc".to_string(),
                scopes: vec!["project:read".to_string()],
            }],
            org_auth_tokens: vec![OrgAuthToken {
                id: 2,
                organization_id: 9,
                name: "ci".to_string(),
                token_hashed: hash_token("orgtok_secret"),
                token_last_characters: Some("cret".to_string()),
                scopes: vec!["org:ci".to_string()],
            }],
        }
    }

    fn control_config() -> ServerConfig {
        ServerConfig {
            credentials: credentials(),
            ..Default::default()
        }
    }

    fn edge_config(remote_url: &str) -> ServerConfig {
        let mut config = ServerConfig {
            silo: "edge".to_string(),
            ..Default::default()
        };
        config.resolution.remote_url = Some(remote_url.to_string());
        config.resolution.timeout_ms = 2_000;
        config
    }

    fn basic(key: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{key}:")))
    }

    fn descriptor(authorization: Option<&str>, user_id: Option<&str>) -> Descriptor {
        Descriptor {
            user_id: user_id.map(str::to_string),
            path: "/api/0/projects/".to_string(),
            authorization_b64: authorization.map(|value| STANDARD.encode(value)),
        }
    }

    #[tokio::test]
    async fn test_server_health() {
        let server = TestServer::start(control_config()).await.unwrap();

        let health = server.client().health().await.unwrap();

        assert_eq!(health.status, "ok");
        assert!(!health.version.is_empty());
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_authenticate_session_user() {
        let server = TestServer::start(control_config()).await.unwrap();

        let (status, context) = server
            .client()
            .authenticate(&AuthenticateRequest {
                request: descriptor(None, Some("42")),
                kinds: vec!["session".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(context["user"]["id"], 42);
        assert_eq!(context["user"]["username"], "alice");
        assert!(context["auth"].is_null());
    }

    #[tokio::test]
    async fn test_authenticate_api_key_is_userless() {
        let server = TestServer::start(control_config()).await.unwrap();

        let (status, context) = server
            .client()
            .authenticate(&AuthenticateRequest {
                request: descriptor(Some(&basic("k-123")), None),
                kinds: vec!["session".to_string(), "api_key".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert!(context["user"].is_null());
        assert_eq!(context["auth"]["kind"], "api_key");
        assert_eq!(context["auth"]["organization_id"], 9);
    }

    #[tokio::test]
    async fn test_authenticate_without_credentials_is_empty() {
        let server = TestServer::start(control_config()).await.unwrap();

        let (status, context) = server
            .client()
            .authenticate(&AuthenticateRequest {
                request: descriptor(None, None),
                kinds: vec!["session".to_string(), "token".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert!(context["user"].is_null());
        assert!(context["auth"].is_null());
    }

    #[tokio::test]
    async fn test_authenticate_invalid_token_is_rejected() {
        let server = TestServer::start(control_config()).await.unwrap();

        let (status, body) = server
            .client()
            .authenticate(&AuthenticateRequest {
                request: descriptor(Some("Bearer t-unknown"), None),
                kinds: vec!["token".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let error: ErrorResponse = serde_json::from_value(body).unwrap();
        assert_eq!(error.code, "INVALID_CREDENTIALS");
        assert!(!error.error.is_empty());
    }

    #[tokio::test]
    async fn test_whoami_requires_credentials() {
        let server = TestServer::start(control_config()).await.unwrap();

        let resp = server.client().whoami_raw().await.unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers().get(WWW_AUTHENTICATE).unwrap(),
            "xBasic realm=\"api\""
        );
    }

    #[tokio::test]
    async fn test_whoami_local_resolution() {
        let server = TestServer::start(control_config()).await.unwrap();

        let user = server
            .client()
            .with_authorization("Bearer t-abc")
            .whoami()
            .await
            .unwrap();
        assert_eq!(user.principal["type"], "user");
        assert_eq!(user.principal["id"], 42);
        assert_eq!(user.auth.unwrap()["kind"], "api_token");

        let org = server
            .client()
            .with_authorization("Bearer orgtok_secret")
            .whoami()
            .await
            .unwrap();
        assert_eq!(org.principal["type"], "anonymous");
        assert_eq!(org.auth.unwrap()["kind"], "org_auth_token");
    }

    #[tokio::test]
    async fn test_edge_resolves_through_control() {
        let control = TestServer::start(control_config()).await.unwrap();
        let edge = TestServer::start(edge_config(&control.base_url)).await.unwrap();

        let user = edge
            .client()
            .with_authorization("Bearer t-abc")
            .whoami()
            .await
            .unwrap();
        assert_eq!(user.principal["id"], 42);
        assert_eq!(user.principal["username"], "alice");

        let key = edge
            .client()
            .with_authorization(&basic("k-123"))
            .whoami()
            .await
            .unwrap();
        assert_eq!(key.principal["type"], "anonymous");
        assert_eq!(key.auth.unwrap()["kind"], "api_key");

        let denied = edge
            .client()
            .with_authorization("Bearer t-unknown")
            .whoami_raw()
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            denied.headers().get(WWW_AUTHENTICATE).unwrap(),
            "xBasic realm=\"api\""
        );
    }

    #[tokio::test]
    async fn test_userless_kinds_can_be_disabled() {
        let mut config = control_config();
        config.resolution.userless_kinds = Vec::new();
        let server = TestServer::start(config).await.unwrap();

        let resp = server
            .client()
            .with_authorization(&basic("k-123"))
            .whoami_raw()
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unreachable_control_is_unauthenticated() {
        let edge = TestServer::start(edge_config("http://127.0.0.1:1")).await.unwrap();

        let resp = edge
            .client()
            .with_authorization("Bearer t-abc")
            .whoami_raw()
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.headers().contains_key(WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn test_restricted_kinds_are_honored() {
        let mut config = control_config();
        config.resolution.kinds = vec![AuthenticatorKind::Session];
        let server = TestServer::start(config).await.unwrap();

        let resp = server
            .client()
            .with_authorization("Bearer t-abc")
            .whoami_raw()
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_sqlite_auth_config() {
        let data_dir = TempDir::new().unwrap();
        let config = ServerConfig {
            data_dir: Some(data_dir.path().to_path_buf()),
            ..control_config()
        };
        let server = TestServer::start(config).await.unwrap();
        let client = server.client();

        let org = client.org_auth_config(9).await.unwrap();
        assert_eq!(org["organization_id"], 9);
        assert_eq!(org["has_api_key"], true);
        assert!(org["auth_provider"].is_null());

        let other = client.org_auth_config(10).await.unwrap();
        assert_eq!(other["has_api_key"], false);

        server.stop().await.unwrap();
        assert!(data_dir.path().join("control.db").exists());
    }
}
