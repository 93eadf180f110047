//! Postback configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::coordinator::CoordinatorConfig;
use crate::transport::{Target, TransportError};

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the media server lives and how to talk to it
    pub server: ServerConfig,

    /// Timeouts and contact-loss policy
    pub coordinator: CoordinatorConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .postback.yml
        let local_config = PathBuf::from(".postback.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!(path = %local_config.display(), error = %e, "Failed to load local config");
                }
            }
        }

        // Try user config: ~/.config/postback/postback.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("postback").join("postback.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!(path = %user_config.display(), error = %e, "Failed to load user config");
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!(path = %path.as_ref().display(), "Loaded config");
        Ok(config)
    }
}

/// Media server connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server URL, e.g. http://localhost:9000; may include a path prefix
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Referer header sent with every request
    pub referer: Option<String>,

    /// JSON-RPC endpoint, relative to the base URL
    #[serde(rename = "rpc-path")]
    pub rpc_path: String,

    /// Lightweight endpoint probed after a timeout
    #[serde(rename = "probe-path")]
    pub probe_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            referer: None,
            rpc_path: "/jsonrpc.js".to_string(),
            probe_path: "/status.txt".to_string(),
        }
    }
}

impl ServerConfig {
    /// GET target for `path` on this server
    pub fn target(&self, path: &str) -> Result<Target, TransportError> {
        Target::resolve(&self.base_url, path)
    }

    /// Target used to check whether the server is still answering
    pub fn probe_target(&self) -> Result<Target, TransportError> {
        self.target(&self.probe_path)
    }

    /// Absolute JSON-RPC endpoint URL
    pub fn rpc_url(&self) -> Result<String, TransportError> {
        Ok(self.target(&self.rpc_path)?.url().to_string())
    }
}
