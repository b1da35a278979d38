//! Configuration types and loading
//!
//! Config precedence: CLI `--config` > `CONFIG_PATH` env var > default path.
//! Credentials are never stored in the TOML: they come from `SIGNSTATION_*`
//! env vars, or for the client secret optionally from `client_secret_file`.
//! All credentials are optional at load time; requests needing a missing one
//! are answered with 500 instead of calling upstream unauthenticated.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const ENV_CLIENT_ID: &str = "SIGNSTATION_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "SIGNSTATION_CLIENT_SECRET";
pub const ENV_DEPARTMENT_ID: &str = "SIGNSTATION_DEPARTMENT_ID";
pub const ENV_CERTIFICATE_ID: &str = "SIGNSTATION_CERTIFICATE_ID";

const DEFAULT_CONFIG_PATH: &str = "signstation-proxy.toml";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// HTTP listener and upstream settings
#[derive(Debug, Deserialize)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Origin allow-list for the signing endpoints
#[derive(Debug, Default, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Server-held SignStation credentials
#[derive(Debug, Default, Deserialize)]
pub struct CredentialsConfig {
    /// File holding the client secret (alternative to SIGNSTATION_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(skip)]
    pub client_id: Option<String>,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    #[serde(skip)]
    pub department_id: Option<String>,
    #[serde(skip)]
    pub certificate_id: Option<String>,
}

impl CredentialsConfig {
    /// Client id and secret are both present.
    pub fn has_client_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    /// Department and certificate ids are both present.
    pub fn has_signing_identity(&self) -> bool {
        self.department_id.is_some() && self.certificate_id.is_some()
    }
}

fn default_upstream_url() -> String {
    signstation::DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    256
}

/// Non-empty trimmed value of an env var.
fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// `https://host` or `https://*.domain`, with nothing after the authority.
fn validate_origin(origin: &str) -> common::Result<()> {
    let Some((scheme, host)) = origin.split_once("://") else {
        return Err(common::Error::Config(format!(
            "allowed origin must include a scheme, got: {origin}"
        )));
    };
    if scheme != "http" && scheme != "https" {
        return Err(common::Error::Config(format!(
            "allowed origin must use http or https, got: {origin}"
        )));
    }
    if host.is_empty() || host.contains('/') {
        return Err(common::Error::Config(format!(
            "allowed origin must be scheme://host without a path, got: {origin}"
        )));
    }
    let wildcard_ok = match host.strip_prefix("*.") {
        Some(rest) => !rest.is_empty() && !rest.contains('*'),
        None => !host.contains('*'),
    };
    if !wildcard_ok {
        return Err(common::Error::Config(format!(
            "wildcards are only allowed as a leading '*.' label, got: {origin}"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file, then overlay credentials from the
    /// environment.
    ///
    /// Client secret resolution order:
    /// 1. SIGNSTATION_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.proxy.upstream_url.starts_with("http://")
            && !config.proxy.upstream_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "upstream_url must start with http:// or https://, got: {}",
                config.proxy.upstream_url
            )));
        }

        if config.proxy.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.proxy.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        for origin in &config.cors.allowed_origins {
            validate_origin(origin)?;
        }

        let credentials = &mut config.credentials;
        credentials.client_id = env_value(ENV_CLIENT_ID);
        credentials.department_id = env_value(ENV_DEPARTMENT_ID);
        credentials.certificate_id = env_value(ENV_CERTIFICATE_ID);

        if let Some(secret) = env_value(ENV_CLIENT_SECRET) {
            credentials.client_secret = Some(secret.into());
        } else if let Some(ref secret_file) = credentials.client_secret_file {
            let contents: Secret<String> = std::fs::read_to_string(secret_file)
                .map_err(|e| common::Error::SecretFile {
                    path: secret_file.display().to_string(),
                    source: e,
                })?
                .into();
            let secret = Secret::from(contents.expose().trim().to_owned());
            if !secret.is_blank() {
                credentials.client_secret = Some(secret);
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }
}
