//! Server configuration.
//!
//! Loaded from a TOML file; every field has a default so a missing file
//! yields a working (if locked-down) server. The webhook secret has no
//! default — without one, signature verification rejects every delivery,
//! which is the safe failure mode.
//!
//! ```toml
//! listen_addr = "127.0.0.1:8080"
//! secret = "It's a Secret to Everybody"
//! rate_limit = 100
//! rate_window_secs = 60
//! plugin_paths = ["~/.config/gh-pr-review/plugins"]
//!
//! [plugins.pr-logger]
//! enabled = true
//!
//! [plugins.spam-filter]
//! enabled = false
//! options = { patterns = ["+1", "bump"] }
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Per-plugin configuration block.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfig {
    /// Whether the plugin starts enabled. Defaults to true.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Free-form options handed to the plugin through its context.
    #[serde(default)]
    pub options: toml::Table,
}

impl Default for PluginConfig {
    fn default() -> Self {
        PluginConfig {
            enabled: true,
            options: toml::Table::new(),
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,

    /// Shared secret for webhook signature verification.
    pub secret: Option<String>,

    /// Maximum admitted requests per identity within the window.
    pub rate_limit: usize,

    /// Sliding-window length in seconds.
    pub rate_window_secs: u64,

    /// Directories scanned for plugin manifests and sources.
    pub plugin_paths: Vec<PathBuf>,

    /// Per-plugin settings, keyed by plugin name.
    pub plugins: BTreeMap<String, PluginConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            secret: None,
            rate_limit: 100,
            rate_window_secs: 60,
            plugin_paths: Vec::new(),
            plugins: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// A missing file is not an error: defaults are returned and a warning
    /// is logged, since running without a secret rejects all deliveries.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Config::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if config.secret.is_none() {
            warn!("no webhook secret configured; all deliveries will be rejected");
        }

        Ok(config)
    }

    /// The secret as bytes. `None` when unconfigured; callers must treat
    /// that as "reject", never verify against an empty key.
    pub fn secret_bytes(&self) -> Option<&[u8]> {
        self.secret.as_deref().map(str::as_bytes)
    }

    /// The settings block for a plugin, if present.
    pub fn plugin(&self, name: &str) -> Option<&PluginConfig> {
        self.plugins.get(name)
    }

    /// Whether a plugin starts enabled. Plugins without a config block
    /// default to enabled.
    pub fn plugin_enabled(&self, name: &str) -> bool {
        self.plugins.get(name).map_or(true, |p| p.enabled)
    }
}

fn default_true() -> bool {
    true
}
