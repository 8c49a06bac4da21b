//! Configuration management
//!
//! Loads configuration from config.toml with support for:
//! - GitHub API access and the sync interval
//! - Web hook endpoint (public URL, listen address, path)
//! - Ledger account service parameters
//! - Database location and shutdown behaviour

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_name")]
    pub name: String,
    /// Debug level logging unless RUST_LOG says otherwise
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_name() -> String {
    "bounty-platform".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: String,
    pub token: String,
    pub sync_interval_secs: u64,
    pub webhook: WebhookConfig,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: crate::tracker::GITHUB_API_BASE.to_string(),
            token: String::new(),
            sync_interval_secs: 60,
            webhook: WebhookConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Public base URL, without the path
    pub url: String,
    pub listen_address: String,
    pub url_path: String,
    pub tls: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9090".to_string(),
            listen_address: "0.0.0.0:9090".to_string(),
            url_path: "/webhooks".to_string(),
            tls: false,
        }
    }
}

impl WebhookConfig {
    /// The URL installed into repository hooks.
    pub fn target_url(&self) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), self.route())
    }

    /// `url_path` with a leading slash.
    pub fn route(&self) -> String {
        if self.url_path.starts_with('/') {
            self.url_path.clone()
        } else {
            format!("/{}", self.url_path)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub account_service_url: String,
    pub security_level: u8,
    pub mwm: u8,
    pub depth: u8,
    /// Validity of freshly allocated deposit addresses
    pub deposit_window_secs: u64,
    pub tag: String,
    pub unit: String,
    pub explorer_url: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            account_service_url: "http://127.0.0.1:14700".to_string(),
            security_level: 2,
            mwm: 14,
            depth: 3,
            deposit_window_secs: 180,
            tag: "IOTABOUNTY".to_string(),
            unit: "iotas".to_string(),
            explorer_url: "https://thetangle.org".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "bounty.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// How long in-flight requests may run after a shutdown signal
    pub shutdown_grace_ms: u64,
    pub log_requests: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: 1500,
            log_requests: false,
        }
    }
}

impl Config {
    /// Load from config.toml or use defaults
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    /// Load from specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            // Use embedded default config
            toml::from_str(DEFAULT_CONFIG).context("Failed to parse default config")
        }
    }

    /// GitHub token (env var takes precedence, None if neither is set)
    pub fn github_token(&self) -> Option<String> {
        match std::env::var("GITHUB_TOKEN") {
            Ok(token) if !token.is_empty() => Some(token),
            _ => {
                if self.github.token.is_empty() {
                    None
                } else {
                    Some(self.github.token.clone())
                }
            }
        }
    }

    /// Database path (env var takes precedence)
    pub fn database_path(&self) -> String {
        match std::env::var("DATABASE_PATH") {
            Ok(path) if !path.is_empty() => path,
            _ => self.database.path.clone(),
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.github.sync_interval_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.server.shutdown_grace_ms)
    }

    pub fn deposit_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ledger.deposit_window_secs as i64)
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|_| Self {
            name: default_name(),
            verbose: false,
            github: GitHubConfig::default(),
            ledger: LedgerConfig::default(),
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
        })
    }
}
