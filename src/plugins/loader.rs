//! Plugin discovery and loading.
//!
//! Plugins are implemented in-process and registered as factories; the
//! filesystem tells us *which* plugins an installation wants. Discovery
//! scans each search root for:
//!
//! - a directory containing a `plugin.toml` or `plugin.json` manifest
//!   naming the plugin,
//! - a plugin directory without a manifest (directory name is the plugin
//!   name),
//! - a freestanding source file, given a derived name (`plugin-` prefix
//!   plus the sanitized file stem).
//!
//! Every factory registered in the [`PluginRegistry`] loads
//! unconditionally, attributed to its discovered source when one exists
//! and as a built-in otherwise; discovered candidates beyond the
//! registry must resolve to a registered factory. Per-plugin failures
//! (unreadable manifest, no factory, construction error, invalid
//! metadata) are recorded in an error table instead of raised — one
//! broken plugin never blocks the rest. Duplicate plugin identifiers are
//! the exception: they are structural and fail discovery outright.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::context::PluginContext;
use super::metadata::PluginMetadata;
use super::{Plugin, PluginError};

/// Prefix for names derived from freestanding plugin files.
pub const FILE_PLUGIN_PREFIX: &str = "plugin-";

/// Constructs a plugin instance from the shared context.
pub type PluginFactory =
    Arc<dyn Fn(Arc<PluginContext>) -> Result<Box<dyn Plugin>, PluginError> + Send + Sync>;

/// Structural discovery failures. Unlike per-plugin load errors, these
/// abort loading: an installation with ambiguous plugin identity cannot
/// be partially started.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("duplicate plugin identifier: {0}")]
    DuplicatePlugin(String),
}

/// Where a discovered plugin came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginSource {
    /// Registered in code, loaded unconditionally.
    Builtin,
    /// Directory with a `plugin.toml`/`plugin.json` manifest.
    Manifest(PathBuf),
    /// Plugin directory without a manifest.
    Directory(PathBuf),
    /// Freestanding source file.
    File(PathBuf),
}

/// A plugin candidate found during discovery.
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    pub name: String,
    pub source: PluginSource,
}

/// Maps plugin identifiers to factories, in registration order.
///
/// Registration order matters: it is the order built-ins load in, which
/// in turn fixes the comment-filter pipeline order.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    factories: Vec<(String, PluginFactory)>,
}

impl PluginRegistry {
    pub fn new() -> PluginRegistry {
        PluginRegistry::default()
    }

    /// A registry pre-populated with the built-in plugins.
    pub fn with_builtins() -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        super::builtin::register_builtins(&mut registry);
        registry
    }

    /// Registers a factory. Re-registering a name replaces the factory in
    /// place, keeping its original position.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(Arc<PluginContext>) -> Result<Box<dyn Plugin>, PluginError> + Send + Sync + 'static,
    {
        let name = name.into();
        let factory: PluginFactory = Arc::new(factory);
        if let Some(slot) = self.factories.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = factory;
        } else {
            self.factories.push((name, factory));
        }
    }

    pub fn resolve(&self, name: &str) -> Option<PluginFactory> {
        self.factories
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| Arc::clone(f))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// A constructed plugin plus its runtime flags.
///
/// `enabled` is toggled by the manager; `failed` is set when `initialize`
/// fails or a dependency is unsatisfied. Only plugins that are enabled
/// and not failed participate in dispatch.
pub struct LoadedPlugin {
    plugin: Arc<dyn Plugin>,
    source: PluginSource,
    enabled: AtomicBool,
    failed: AtomicBool,
}

impl LoadedPlugin {
    fn new(plugin: Arc<dyn Plugin>, source: PluginSource, enabled: bool) -> LoadedPlugin {
        LoadedPlugin {
            plugin,
            source,
            enabled: AtomicBool::new(enabled),
            failed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.plugin.metadata().name
    }

    pub fn metadata(&self) -> &PluginMetadata {
        self.plugin.metadata()
    }

    pub fn plugin(&self) -> &dyn Plugin {
        self.plugin.as_ref()
    }

    pub fn source(&self) -> &PluginSource {
        &self.source
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub(super) fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    /// Enabled and not failed: eligible for dispatch.
    pub fn is_active(&self) -> bool {
        self.is_enabled() && !self.has_failed()
    }
}

/// Output of a load pass: constructed plugins in load order, plus the
/// per-plugin error table.
pub struct LoadOutput {
    pub plugins: Vec<Arc<LoadedPlugin>>,
    pub errors: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct TomlManifest {
    plugin: TomlManifestPlugin,
}

#[derive(Debug, Deserialize)]
struct TomlManifestPlugin {
    name: String,
}

#[derive(Debug, Deserialize)]
struct JsonManifest {
    name: String,
}

/// Discovers plugin candidates and constructs them via the registry.
pub struct PluginLoader {
    registry: PluginRegistry,
    context: Arc<PluginContext>,
    search_paths: Vec<PathBuf>,
}

impl PluginLoader {
    pub fn new(
        registry: PluginRegistry,
        context: Arc<PluginContext>,
        search_paths: Vec<PathBuf>,
    ) -> PluginLoader {
        PluginLoader {
            registry,
            context,
            search_paths,
        }
    }

    /// Scans the search paths for plugin candidates.
    ///
    /// Unreadable manifests are reported in `errors` keyed by the path's
    /// best-known name. Two candidates claiming the same identifier is a
    /// structural error and fails the whole pass.
    pub fn discover(
        &self,
        errors: &mut BTreeMap<String, String>,
    ) -> Result<Vec<DiscoveredPlugin>, LoaderError> {
        let mut discovered: Vec<DiscoveredPlugin> = Vec::new();

        for root in &self.search_paths {
            if !root.is_dir() {
                debug!(path = %root.display(), "plugin search path does not exist, skipping");
                continue;
            }

            let mut entries: Vec<PathBuf> = match std::fs::read_dir(root) {
                Ok(read) => read.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
                Err(e) => {
                    warn!(path = %root.display(), error = %e, "cannot read plugin search path");
                    continue;
                }
            };
            // Deterministic discovery order regardless of filesystem order.
            entries.sort();

            for path in entries {
                match self.classify_candidate(&path, errors) {
                    Some(candidate) => {
                        if discovered.iter().any(|d| d.name == candidate.name) {
                            return Err(LoaderError::DuplicatePlugin(candidate.name));
                        }
                        debug!(
                            plugin = %candidate.name,
                            path = %path.display(),
                            "discovered plugin"
                        );
                        discovered.push(candidate);
                    }
                    None => continue,
                }
            }
        }

        Ok(discovered)
    }

    fn classify_candidate(
        &self,
        path: &Path,
        errors: &mut BTreeMap<String, String>,
    ) -> Option<DiscoveredPlugin> {
        if path.is_dir() {
            let toml_manifest = path.join("plugin.toml");
            if toml_manifest.is_file() {
                return match read_toml_manifest(&toml_manifest) {
                    Ok(name) => Some(DiscoveredPlugin {
                        name,
                        source: PluginSource::Manifest(path.to_path_buf()),
                    }),
                    Err(e) => {
                        record_manifest_error(errors, path, e);
                        None
                    }
                };
            }

            let json_manifest = path.join("plugin.json");
            if json_manifest.is_file() {
                return match read_json_manifest(&json_manifest) {
                    Ok(name) => Some(DiscoveredPlugin {
                        name,
                        source: PluginSource::Manifest(path.to_path_buf()),
                    }),
                    Err(e) => {
                        record_manifest_error(errors, path, e);
                        None
                    }
                };
            }

            // Manifest-less plugin directory: the directory name is the
            // plugin name.
            let name = path.file_name()?.to_str()?.to_string();
            return Some(DiscoveredPlugin {
                name,
                source: PluginSource::Directory(path.to_path_buf()),
            });
        }

        if path.is_file() {
            let stem = path.file_stem()?.to_str()?;
            // Underscore-prefixed files are private helpers, not plugins.
            if stem.starts_with('_') {
                return None;
            }
            return Some(DiscoveredPlugin {
                name: derive_file_plugin_name(stem),
                source: PluginSource::File(path.to_path_buf()),
            });
        }

        None
    }

    /// Loads built-ins and all discovered candidates.
    ///
    /// Registry factories load first, in registry order. A factory with a
    /// discovered on-disk counterpart is constructed with that discovered
    /// source rather than as a built-in; a discovered candidate without a
    /// factory lands in the error table.
    pub fn load_all(&self) -> Result<LoadOutput, LoaderError> {
        let mut errors = BTreeMap::new();
        let mut plugins: Vec<Arc<LoadedPlugin>> = Vec::new();

        let mut discovered = self.discover(&mut errors)?;

        for (name, factory) in &self.registry.factories {
            let source = match discovered.iter().position(|d| &d.name == name) {
                Some(i) => discovered.remove(i).source,
                None => PluginSource::Builtin,
            };
            self.construct(name, Arc::clone(factory), source, &mut plugins, &mut errors);
        }

        for candidate in discovered {
            match self.registry.resolve(&candidate.name) {
                Some(factory) => {
                    self.construct(
                        &candidate.name,
                        factory,
                        candidate.source,
                        &mut plugins,
                        &mut errors,
                    );
                }
                None => {
                    debug!(plugin = %candidate.name, "no factory for discovered plugin");
                    errors.insert(
                        candidate.name.clone(),
                        format!("no factory registered for plugin {:?}", candidate.name),
                    );
                }
            }
        }

        info!(
            loaded = plugins.len(),
            failed = errors.len(),
            "plugin load pass complete"
        );
        Ok(LoadOutput { plugins, errors })
    }

    fn construct(
        &self,
        name: &str,
        factory: PluginFactory,
        source: PluginSource,
        plugins: &mut Vec<Arc<LoadedPlugin>>,
        errors: &mut BTreeMap<String, String>,
    ) {
        let plugin = match factory(Arc::clone(&self.context)) {
            Ok(plugin) => plugin,
            Err(e) => {
                warn!(plugin = name, error = %e, "plugin construction failed");
                errors.insert(name.to_string(), e.to_string());
                return;
            }
        };

        if let Err(e) = plugin.metadata().validate() {
            warn!(plugin = name, error = %e, "invalid plugin metadata");
            errors.insert(name.to_string(), e.to_string());
            return;
        }

        if plugin.metadata().name != name {
            errors.insert(
                name.to_string(),
                format!(
                    "metadata name {:?} does not match registered name {:?}",
                    plugin.metadata().name,
                    name
                ),
            );
            return;
        }

        let enabled = self.context.config().plugin_enabled(name);
        plugins.push(Arc::new(LoadedPlugin::new(
            Arc::from(plugin),
            source,
            enabled,
        )));
    }
}

/// Derives a plugin name for a freestanding file: `plugin-` prefix plus
/// the sanitized file stem.
pub fn derive_file_plugin_name(stem: &str) -> String {
    let sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{FILE_PLUGIN_PREFIX}{sanitized}")
}

fn read_toml_manifest(path: &Path) -> Result<String, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let manifest: TomlManifest = toml::from_str(&raw).map_err(|e| e.to_string())?;
    Ok(manifest.plugin.name)
}

fn read_json_manifest(path: &Path) -> Result<String, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let manifest: JsonManifest = serde_json::from_str(&raw).map_err(|e| e.to_string())?;
    Ok(manifest.name)
}

fn record_manifest_error(errors: &mut BTreeMap<String, String>, dir: &Path, error: String) {
    let key = dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string();
    warn!(plugin_dir = %dir.display(), error = %error, "unreadable plugin manifest");
    errors.insert(key, format!("unreadable manifest: {error}"));
}
