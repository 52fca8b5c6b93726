//! Server configuration.
//!
//! Loaded from an optional TOML/YAML/JSON file, then overridden by
//! environment variables prefixed with `SILO__` (`__` separates nested
//! keys, e.g. `SILO__RESOLUTION__TIMEOUT_MS=2000`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;
use silo_auth::{
    ApiKey, ApiToken, AuthenticatedUser, AuthenticatorKind, OrgAuthToken, ResolutionPolicy,
};

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind_address: String,
    /// Name of this silo; also names its database file.
    pub silo: String,
    /// Directory of the SQLite database. In-memory storage when unset.
    pub data_dir: Option<PathBuf>,
    /// Resolution settings.
    pub resolution: ResolutionConfig,
    /// Credentials served by the built-in authenticators.
    pub credentials: StaticCredentialsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8300".to_string(),
            silo: "control".to_string(),
            data_dir: None,
            resolution: ResolutionConfig::default(),
            credentials: StaticCredentialsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads the configuration.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (`SILO__*`)
    /// 2. `path`, when given (must exist)
    /// 3. Built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigLoader::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder
            .add_source(Environment::with_prefix("SILO").separator("__"))
            .build()?
            .try_deserialize()
    }
}

/// How requests are resolved.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Base URL of the silo owning credentials. Resolution is local when unset.
    pub remote_url: Option<String>,
    /// Upper bound on a remote resolution call, in milliseconds.
    pub timeout_ms: u64,
    /// Scheme kinds tried for inbound requests, in order.
    pub kinds: Vec<AuthenticatorKind>,
    /// Token kinds accepted without a user.
    pub userless_kinds: Vec<String>,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            timeout_ms: 5_000,
            kinds: AuthenticatorKind::ALL.to_vec(),
            userless_kinds: ResolutionPolicy::default().userless_kinds,
        }
    }
}

impl ResolutionConfig {
    /// Remote call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolution policy built from these settings.
    pub fn policy(&self) -> ResolutionPolicy {
        ResolutionPolicy {
            userless_kinds: self.userless_kinds.clone(),
            timeout: Some(self.timeout()),
        }
    }
}

/// Statically configured users and credentials.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StaticCredentialsConfig {
    /// Known users, for session and token resolution.
    pub users: Vec<AuthenticatedUser>,
    /// Legacy API keys, written to the store at startup.
    pub api_keys: Vec<ApiKey>,
    /// User API tokens.
    pub api_tokens: Vec<ApiToken>,
    /// Organization auth tokens.
    pub org_auth_tokens: Vec<OrgAuthToken>,
}

impl StaticCredentialsConfig {
    /// Whether nothing is configured.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
            && self.api_keys.is_empty()
            && self.api_tokens.is_empty()
            && self.org_auth_tokens.is_empty()
    }
}
