//! Configuration loading and persistence.
//!
//! [`Config`] is the persisted, environment-overridable settings file used
//! by the binary. [`ConnectionConfig`] is the live input a
//! [`ConnectionManager`](crate::connection::ConnectionManager) reads fresh
//! on every connection attempt.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;
use std::{fs, path::PathBuf};

use crate::constants::{ANONYMOUS_USER, DEFAULT_PORT, DEFAULT_RECONNECT_BASE_DELAY_MS};
use crate::endpoint::Endpoint;

/// Live connection inputs supplied by the auth/session collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// User identifier sent as the `user_id` query parameter.
    pub user_id: String,
    /// Auth token sent as the `token` query parameter when present.
    pub token: Option<String>,
    /// Reconnect with backoff after abnormal closure.
    pub auto_reconnect: bool,
    /// Delay before the first reconnect attempt.
    pub reconnect_base_delay: Duration,
    /// Master switch; `false` keeps the manager disconnected.
    pub enabled: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            user_id: ANONYMOUS_USER.to_string(),
            token: None,
            auto_reconnect: true,
            reconnect_base_delay: Duration::from_millis(DEFAULT_RECONNECT_BASE_DELAY_MS),
            enabled: true,
        }
    }
}

impl ConnectionConfig {
    /// Whether `other` identifies a different user or carries a different token.
    #[must_use]
    pub fn identity_differs(&self, other: &Self) -> bool {
        self.user_id != other.user_id || self.token != other.token
    }
}

/// Configuration for the realtime client.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    /// Explicit WebSocket base; takes precedence over `api_url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    /// HTTP API base the WebSocket base is derived from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Port for the localhost fallback.
    pub port: u16,
    /// User id to connect as.
    pub user_id: String,
    /// Auth token - NOT serialized to disk.
    #[serde(skip)]
    pub token: Option<String>,
    /// Reconnect after abnormal closure.
    pub auto_reconnect: bool,
    /// Base reconnect delay in milliseconds.
    pub reconnect_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_url: None,
            api_url: None,
            port: DEFAULT_PORT,
            user_id: ANONYMOUS_USER.to_string(),
            token: None,
            auto_reconnect: true,
            reconnect_delay_ms: DEFAULT_RECONNECT_BASE_DELAY_MS,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `HIREQ_CONFIG_DIR` env var: explicit override
    /// 2. `HIREQ_ENV=test`: repo `tmp/hireq-test`
    /// 3. Default: platform config dir joined with `hireq`
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("HIREQ_CONFIG_DIR") {
            PathBuf::from(dir)
        } else if crate::env::is_test_mode() {
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/hireq-test")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("hireq")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create config dir {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file().unwrap_or_else(|e| {
            log::debug!("Using default config: {e:#}");
            Self::default()
        });
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read {}", config_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("invalid config in {}", config_path.display()))
        } else {
            anyhow::bail!("Config file not found")
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(ws_url) = std::env::var("HIREQ_WS_URL") {
            self.ws_url = Some(ws_url);
        }

        if let Ok(api_url) = std::env::var("HIREQ_API_URL") {
            self.api_url = Some(api_url);
        }

        if let Ok(port) = std::env::var("HIREQ_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.port = port;
            }
        }

        if let Ok(user_id) = std::env::var("HIREQ_USER_ID") {
            self.user_id = user_id;
        }

        // Token only ever comes from the environment or the command line
        if let Ok(token) = std::env::var("HIREQ_TOKEN") {
            self.token = Some(token);
        }

        if let Ok(auto_reconnect) = std::env::var("HIREQ_AUTO_RECONNECT") {
            if let Ok(value) = auto_reconnect.parse::<bool>() {
                self.auto_reconnect = value;
            }
        }

        if let Ok(delay) = std::env::var("HIREQ_RECONNECT_DELAY_MS") {
            if let Ok(ms) = delay.parse::<u64>() {
                self.reconnect_delay_ms = ms;
            }
        }
    }

    /// Persists the current configuration to disk.
    /// Note: Token is NOT saved.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;

        // Set restrictive permissions (owner read/write only)
        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Endpoint resolution inputs.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            ws_url: self.ws_url.clone(),
            api_url: self.api_url.clone(),
            port: self.port,
        }
    }

    /// Resolved WebSocket base for a client process.
    #[must_use]
    pub fn ws_base(&self) -> String {
        self.endpoint().ws_base(crate::env::Platform::Client)
    }

    /// Initial live connection config (enabled).
    #[must_use]
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            user_id: self.user_id.clone(),
            token: self.token.clone().filter(|t| !t.is_empty()),
            auto_reconnect: self.auto_reconnect,
            reconnect_base_delay: Duration::from_millis(self.reconnect_delay_ms),
            enabled: true,
        }
    }
}
