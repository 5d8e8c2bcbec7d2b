//! Shared runtime context handed to every plugin.
//!
//! The context is an immutable value built once at startup and shared by
//! `Arc` into each plugin's constructor. Plugins read configuration
//! through it; nothing in it can be mutated after construction.

use std::path::{Path, PathBuf};

use crate::config::Config;

/// Immutable configuration and collaborator handles for plugins.
#[derive(Debug, Clone)]
pub struct PluginContext {
    config: Config,
    data_dir: Option<PathBuf>,
}

impl PluginContext {
    pub fn new(config: Config) -> PluginContext {
        PluginContext {
            config,
            data_dir: None,
        }
    }

    /// Sets the directory plugins may use for scratch data.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// The options table from the plugin's config block, if any.
    pub fn plugin_options(&self, plugin: &str) -> Option<&toml::Table> {
        self.config.plugin(plugin).map(|p| &p.options)
    }

    /// A single option from the plugin's config block.
    pub fn plugin_option(&self, plugin: &str, key: &str) -> Option<&toml::Value> {
        self.plugin_options(plugin).and_then(|opts| opts.get(key))
    }
}
