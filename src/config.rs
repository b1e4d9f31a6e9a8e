use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_GATEWAY_URL: &str = "ws://127.0.0.1:3456";
const DEFAULT_RECONNECT_DELAY_MS: u64 = 2000;

const GATEWAY_URL_ENV: &str = "AGENTDESK_GATEWAY_URL";
const RECONNECT_DELAY_ENV: &str = "AGENTDESK_RECONNECT_DELAY_MS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Could not find config directory")]
    NoConfigDir,
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Where the gateway lives and how eagerly to reconnect to it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

fn get_config_path() -> Result<PathBuf, ConfigError> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::NoConfigDir)?
        .join("agentdesk")
        .join("config.json"))
}

impl GatewayConfig {
    /// Load the user config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&get_config_path()?)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: GatewayConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = std::env::var(GATEWAY_URL_ENV) {
            if !url.trim().is_empty() {
                self.gateway_url = url;
            }
        }

        if let Ok(raw) = std::env::var(RECONNECT_DELAY_ENV) {
            self.reconnect_delay_ms = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: RECONNECT_DELAY_ENV,
                value: raw.clone(),
            })?;
        }

        Ok(())
    }

    pub fn reconnect_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Endpoint for one session's browser-side stream.
    pub fn session_url(&self, session_id: &str) -> String {
        format!(
            "{}/ws/agent/browser/{}",
            self.gateway_url.trim_end_matches('/'),
            session_id
        )
    }
}
