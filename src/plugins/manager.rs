//! Plugin lifecycle and capability-based dispatch.
//!
//! The manager composes loader output with a capability registry. PR
//! events and notifications are broadcast: every enabled plugin with the
//! capability is invoked and failures are isolated per plugin. Comment
//! filtering is a pipeline: each filter consumes the previous filter's
//! output, so ordering follows plugin load order.
//!
//! No manager operation can be brought down by a single plugin. The only
//! fatal condition is structural (duplicate plugin identifiers), and it
//! surfaces at load time, never at dispatch time.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

use crate::events::WebhookEvent;

use super::context::PluginContext;
use super::loader::{LoadedPlugin, LoaderError, PluginLoader, PluginRegistry};
use super::metadata::Capability;
use super::{HealthReport, Notification, PluginError};

/// The outcome of one plugin invocation. Exactly one of `result` and
/// `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PluginOutcome {
    pub fn ok(result: serde_json::Value) -> PluginOutcome {
        PluginOutcome {
            result: Some(result),
            error: None,
        }
    }

    pub fn err(error: impl ToString) -> PluginOutcome {
        PluginOutcome {
            result: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Serializable plugin summary for info output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub capabilities: Vec<&'static str>,
    pub enabled: bool,
}

/// Central coordinator for plugin loading, lifecycle, and dispatch.
pub struct PluginManager {
    loader: PluginLoader,
    /// Loaded plugins in load order. Load order fixes pipeline order.
    plugins: RwLock<Vec<Arc<LoadedPlugin>>>,
    /// Capability → active plugins, rebuilt on membership or enabled-state
    /// changes. Preserves load order within each capability.
    capability_registry: RwLock<HashMap<Capability, Vec<Arc<LoadedPlugin>>>>,
    /// Per-plugin load and initialization errors.
    errors: RwLock<BTreeMap<String, String>>,
}

impl PluginManager {
    /// Creates a manager over the given factory registry and context.
    /// Search paths come from the context's configuration. No plugins are
    /// loaded until [`initialize`](Self::initialize).
    pub fn new(registry: PluginRegistry, context: Arc<PluginContext>) -> PluginManager {
        let search_paths = context.config().plugin_paths.clone();
        PluginManager {
            loader: PluginLoader::new(registry, context, search_paths),
            plugins: RwLock::new(Vec::new()),
            capability_registry: RwLock::new(HashMap::new()),
            errors: RwLock::new(BTreeMap::new()),
        }
    }

    /// Discovers, loads, and initializes all plugins.
    ///
    /// Returns a per-plugin success map. A plugin that fails to load,
    /// has an unsatisfied dependency, or whose `initialize` errors is
    /// marked failed and excluded from dispatch; the others proceed.
    pub async fn initialize(&self) -> Result<BTreeMap<String, bool>, LoaderError> {
        let output = self.loader.load_all()?;

        let mut results: BTreeMap<String, bool> = BTreeMap::new();
        for (name, error) in &output.errors {
            debug!(plugin = %name, error = %error, "plugin failed to load");
            results.insert(name.clone(), false);
        }

        let loaded_names: Vec<String> =
            output.plugins.iter().map(|p| p.name().to_string()).collect();

        for loaded in &output.plugins {
            let name = loaded.name().to_string();

            if let Some(missing) = loaded
                .metadata()
                .dependencies
                .iter()
                .find(|dep| !loaded_names.contains(dep))
            {
                let err = PluginError::MissingDependency(missing.clone());
                warn!(plugin = %name, error = %err, "plugin excluded");
                loaded.mark_failed();
                output_error(&mut results, &self.errors, &name, err);
                continue;
            }

            match loaded.plugin().initialize().await {
                Ok(()) => {
                    debug!(plugin = %name, "plugin initialized");
                    results.insert(name, true);
                }
                Err(e) => {
                    warn!(plugin = %name, error = %e, "plugin initialization failed");
                    loaded.mark_failed();
                    output_error(&mut results, &self.errors, &name, e);
                }
            }
        }

        {
            let mut errors = self.errors.write().expect("plugin lock poisoned");
            for (name, error) in output.errors {
                errors.insert(name, error);
            }
        }
        *self.plugins.write().expect("plugin lock poisoned") = output.plugins;
        self.rebuild_capability_registry();

        let active = results.values().filter(|ok| **ok).count();
        info!(
            initialized = active,
            failed = results.len() - active,
            "plugin manager initialized"
        );
        Ok(results)
    }

    fn rebuild_capability_registry(&self) {
        let plugins = self.plugins.read().expect("plugin lock poisoned");
        let mut registry: HashMap<Capability, Vec<Arc<LoadedPlugin>>> = HashMap::new();

        for plugin in plugins.iter() {
            if !plugin.is_active() {
                continue;
            }
            for capability in &plugin.metadata().capabilities {
                registry
                    .entry(*capability)
                    .or_default()
                    .push(Arc::clone(plugin));
            }
        }

        *self
            .capability_registry
            .write()
            .expect("plugin lock poisoned") = registry;
    }

    /// Active plugins for a capability, in load order.
    fn active_with(&self, capability: Capability) -> Vec<Arc<LoadedPlugin>> {
        self.capability_registry
            .read()
            .expect("plugin lock poisoned")
            .get(&capability)
            .cloned()
            .unwrap_or_default()
    }

    /// Broadcasts a PR event to every enabled PR-event plugin.
    ///
    /// Failures are isolated: each plugin contributes a result or an
    /// error, never aborting the rest.
    pub async fn dispatch_pr_event(&self, event: &WebhookEvent) -> BTreeMap<String, PluginOutcome> {
        let mut results = BTreeMap::new();

        for plugin in self.active_with(Capability::PrEvent) {
            let name = plugin.name().to_string();
            let outcome = match plugin.plugin().pr_event_handler() {
                Some(handler) => match handler.handle_pr_event(event).await {
                    Ok(result) => PluginOutcome::ok(result),
                    Err(e) => {
                        error!(plugin = %name, error = %e, "PR event plugin failed");
                        PluginOutcome::err(e)
                    }
                },
                None => PluginOutcome::err("declares pr_event but implements no handler"),
            };
            results.insert(name, outcome);
        }

        results
    }

    /// Broadcasts a classified webhook event to every enabled
    /// webhook-handler plugin.
    pub async fn dispatch_webhook_event(
        &self,
        event: &WebhookEvent,
    ) -> BTreeMap<String, PluginOutcome> {
        let mut results = BTreeMap::new();

        for plugin in self.active_with(Capability::WebhookHandler) {
            let name = plugin.name().to_string();
            let outcome = match plugin.plugin().webhook_handler() {
                Some(handler) => match handler.handle_webhook(event).await {
                    Ok(result) => PluginOutcome::ok(result),
                    Err(e) => {
                        error!(plugin = %name, error = %e, "webhook plugin failed");
                        PluginOutcome::err(e)
                    }
                },
                None => PluginOutcome::err("declares webhook_handler but implements no handler"),
            };
            results.insert(name, outcome);
        }

        results
    }

    /// Broadcasts a notification to every enabled notification plugin.
    pub async fn send_notification(
        &self,
        notification: &Notification,
    ) -> BTreeMap<String, PluginOutcome> {
        let mut results = BTreeMap::new();

        for plugin in self.active_with(Capability::Notification) {
            let name = plugin.name().to_string();
            let outcome = match plugin.plugin().notifier() {
                Some(notifier) => match notifier.notify(notification).await {
                    Ok(()) => PluginOutcome::ok(serde_json::Value::Bool(true)),
                    Err(e) => {
                        error!(plugin = %name, error = %e, "notification plugin failed");
                        PluginOutcome::err(e)
                    }
                },
                None => PluginOutcome::err("declares notification but implements no notifier"),
            };
            results.insert(name, outcome);
        }

        results
    }

    /// Runs comments through every enabled comment-filter plugin,
    /// sequentially: each filter consumes the previous filter's output.
    ///
    /// A failing filter is skipped — the pipeline continues with the list
    /// as it stood before that filter.
    pub async fn filter_comments(
        &self,
        comments: Vec<serde_json::Value>,
        criteria: &serde_json::Value,
    ) -> Vec<serde_json::Value> {
        let mut current = comments;

        for plugin in self.active_with(Capability::CommentFilter) {
            let Some(filter) = plugin.plugin().comment_filter() else {
                continue;
            };
            match filter.filter_comments(&current, criteria).await {
                Ok(next) => current = next,
                Err(e) => {
                    error!(plugin = %plugin.name(), error = %e, "comment filter failed, skipping");
                }
            }
        }

        current
    }

    /// Enables a plugin and rebuilds the capability registry.
    /// Returns false for unknown ids.
    pub fn enable_plugin(&self, name: &str) -> bool {
        self.set_plugin_enabled(name, true)
    }

    /// Disables a plugin and rebuilds the capability registry.
    /// Returns false for unknown ids.
    pub fn disable_plugin(&self, name: &str) -> bool {
        self.set_plugin_enabled(name, false)
    }

    fn set_plugin_enabled(&self, name: &str, enabled: bool) -> bool {
        let found = {
            let plugins = self.plugins.read().expect("plugin lock poisoned");
            match plugins.iter().find(|p| p.name() == name) {
                Some(plugin) => {
                    plugin.set_enabled(enabled);
                    true
                }
                None => false,
            }
        };
        if found {
            info!(plugin = %name, enabled, "plugin enabled state changed");
            self.rebuild_capability_registry();
        }
        found
    }

    /// Looks up a loaded plugin by name.
    pub fn get_plugin(&self, name: &str) -> Option<Arc<LoadedPlugin>> {
        self.plugins
            .read()
            .expect("plugin lock poisoned")
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    /// Health status of every loaded plugin.
    ///
    /// A plugin without a health check, or whose check errors, yields an
    /// unhealthy report with an error field; nothing propagates.
    pub async fn get_plugin_health(&self) -> BTreeMap<String, HealthReport> {
        let plugins: Vec<Arc<LoadedPlugin>> = self
            .plugins
            .read()
            .expect("plugin lock poisoned")
            .clone();

        let mut reports = BTreeMap::new();
        for plugin in plugins {
            let metadata = plugin.metadata();
            let (healthy, error) = if plugin.has_failed() {
                (false, Some("plugin failed to initialize".to_string()))
            } else {
                match plugin.plugin().health_check().await {
                    Ok(()) => (true, None),
                    Err(e) => (false, Some(e.to_string())),
                }
            };
            reports.insert(
                metadata.name.clone(),
                HealthReport {
                    name: metadata.name.clone(),
                    version: metadata.version.clone(),
                    enabled: plugin.is_enabled(),
                    healthy,
                    error,
                },
            );
        }
        reports
    }

    /// Serializable summaries of every loaded plugin, in load order.
    pub fn get_plugin_info(&self) -> Vec<PluginInfo> {
        self.plugins
            .read()
            .expect("plugin lock poisoned")
            .iter()
            .map(|plugin| {
                let metadata = plugin.metadata();
                PluginInfo {
                    name: metadata.name.clone(),
                    version: metadata.version.clone(),
                    description: metadata.description.clone(),
                    author: metadata.author.clone(),
                    capabilities: metadata.capabilities.iter().map(|c| c.as_str()).collect(),
                    enabled: plugin.is_enabled(),
                }
            })
            .collect()
    }

    /// The per-plugin load and initialization error table.
    pub fn plugin_errors(&self) -> BTreeMap<String, String> {
        self.errors.read().expect("plugin lock poisoned").clone()
    }

    /// The number of loaded plugins.
    pub fn plugin_count(&self) -> usize {
        self.plugins.read().expect("plugin lock poisoned").len()
    }

    /// Shuts down every plugin, best-effort. One plugin's shutdown
    /// failure does not prevent shutting down the rest.
    pub async fn shutdown(&self) {
        let plugins: Vec<Arc<LoadedPlugin>> = self
            .plugins
            .read()
            .expect("plugin lock poisoned")
            .clone();

        for plugin in plugins {
            if let Err(e) = plugin.plugin().shutdown().await {
                warn!(plugin = %plugin.name(), error = %e, "plugin shutdown failed");
            }
        }
        info!("plugin manager shut down");
    }
}

fn output_error(
    results: &mut BTreeMap<String, bool>,
    errors: &RwLock<BTreeMap<String, String>>,
    name: &str,
    error: PluginError,
) {
    results.insert(name.to_string(), false);
    errors
        .write()
        .expect("plugin lock poisoned")
        .insert(name.to_string(), error.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::plugins::metadata::PluginMetadata;
    use crate::plugins::{CommentFilter, Notifier, Plugin, PrEventHandler};
    use crate::types::DeliveryId;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ========================================================================
    // Test plugins
    // ========================================================================

    struct TestPlugin {
        metadata: PluginMetadata,
        init_fails: bool,
        handle_fails: bool,
        pr_calls: Arc<AtomicUsize>,
        shutdown_fails: bool,
        shutdown_calls: Arc<AtomicUsize>,
        healthy: Option<bool>,
    }

    impl TestPlugin {
        fn builder(name: &str) -> TestPluginBuilder {
            TestPluginBuilder {
                name: name.to_string(),
                capabilities: vec![Capability::PrEvent],
                dependencies: vec![],
                init_fails: false,
                handle_fails: false,
                shutdown_fails: false,
                healthy: None,
            }
        }
    }

    struct TestPluginBuilder {
        name: String,
        capabilities: Vec<Capability>,
        dependencies: Vec<String>,
        init_fails: bool,
        handle_fails: bool,
        shutdown_fails: bool,
        healthy: Option<bool>,
    }

    impl TestPluginBuilder {
        fn capabilities(mut self, caps: &[Capability]) -> Self {
            self.capabilities = caps.to_vec();
            self
        }

        fn depends_on(mut self, dep: &str) -> Self {
            self.dependencies.push(dep.to_string());
            self
        }

        fn init_fails(mut self) -> Self {
            self.init_fails = true;
            self
        }

        fn handle_fails(mut self) -> Self {
            self.handle_fails = true;
            self
        }

        fn shutdown_fails(mut self) -> Self {
            self.shutdown_fails = true;
            self
        }

        fn healthy(mut self, healthy: bool) -> Self {
            self.healthy = Some(healthy);
            self
        }

        fn build(self) -> (TestPlugin, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let mut metadata = PluginMetadata::new(&self.name, "1.0.0", "test plugin");
            for cap in self.capabilities {
                metadata = metadata.with_capability(cap);
            }
            for dep in self.dependencies {
                metadata = metadata.with_dependency(dep);
            }
            let pr_calls = Arc::new(AtomicUsize::new(0));
            let shutdown_calls = Arc::new(AtomicUsize::new(0));
            let plugin = TestPlugin {
                metadata,
                init_fails: self.init_fails,
                handle_fails: self.handle_fails,
                pr_calls: Arc::clone(&pr_calls),
                shutdown_fails: self.shutdown_fails,
                shutdown_calls: Arc::clone(&shutdown_calls),
                healthy: self.healthy,
            };
            (plugin, pr_calls, shutdown_calls)
        }
    }

    #[async_trait]
    impl Plugin for TestPlugin {
        fn metadata(&self) -> &PluginMetadata {
            &self.metadata
        }

        async fn initialize(&self) -> Result<(), PluginError> {
            if self.init_fails {
                Err(PluginError::Init("refused".to_string()))
            } else {
                Ok(())
            }
        }

        async fn shutdown(&self) -> Result<(), PluginError> {
            self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
            if self.shutdown_fails {
                Err(PluginError::Failed("shutdown broke".to_string()))
            } else {
                Ok(())
            }
        }

        async fn health_check(&self) -> Result<(), PluginError> {
            match self.healthy {
                Some(true) => Ok(()),
                Some(false) => Err(PluginError::Failed("degraded".to_string())),
                None => Err(PluginError::HealthCheckUnsupported),
            }
        }

        fn pr_event_handler(&self) -> Option<&dyn PrEventHandler> {
            Some(self)
        }

        fn notifier(&self) -> Option<&dyn Notifier> {
            Some(self)
        }
    }

    #[async_trait]
    impl PrEventHandler for TestPlugin {
        async fn handle_pr_event(
            &self,
            event: &WebhookEvent,
        ) -> Result<serde_json::Value, PluginError> {
            self.pr_calls.fetch_add(1, Ordering::SeqCst);
            if self.handle_fails {
                Err(PluginError::Failed("handler broke".to_string()))
            } else {
                Ok(json!({"plugin": self.metadata.name, "action": event.action()}))
            }
        }
    }

    #[async_trait]
    impl Notifier for TestPlugin {
        async fn notify(&self, _notification: &Notification) -> Result<(), PluginError> {
            if self.handle_fails {
                Err(PluginError::Failed("notify broke".to_string()))
            } else {
                Ok(())
            }
        }
    }

    /// A comment filter keeping only comments whose body contains a
    /// substring, or whose id is below a threshold.
    struct KeepFilter {
        metadata: PluginMetadata,
        contains: Option<String>,
        id_below: Option<u64>,
    }

    impl KeepFilter {
        fn contains(name: &str, needle: &str) -> KeepFilter {
            KeepFilter {
                metadata: PluginMetadata::new(name, "1.0.0", "keep filter")
                    .with_capability(Capability::CommentFilter),
                contains: Some(needle.to_string()),
                id_below: None,
            }
        }

        fn id_below(name: &str, threshold: u64) -> KeepFilter {
            KeepFilter {
                metadata: PluginMetadata::new(name, "1.0.0", "keep filter")
                    .with_capability(Capability::CommentFilter),
                contains: None,
                id_below: Some(threshold),
            }
        }
    }

    #[async_trait]
    impl Plugin for KeepFilter {
        fn metadata(&self) -> &PluginMetadata {
            &self.metadata
        }

        async fn initialize(&self) -> Result<(), PluginError> {
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), PluginError> {
            Ok(())
        }

        fn comment_filter(&self) -> Option<&dyn CommentFilter> {
            Some(self)
        }
    }

    #[async_trait]
    impl CommentFilter for KeepFilter {
        async fn filter_comments(
            &self,
            comments: &[serde_json::Value],
            _criteria: &serde_json::Value,
        ) -> Result<Vec<serde_json::Value>, PluginError> {
            Ok(comments
                .iter()
                .filter(|c| {
                    if let Some(needle) = &self.contains {
                        return c
                            .get("body")
                            .and_then(|b| b.as_str())
                            .is_some_and(|b| b.contains(needle.as_str()));
                    }
                    if let Some(threshold) = self.id_below {
                        return c.get("id").and_then(|i| i.as_u64()).is_some_and(|i| i < threshold);
                    }
                    true
                })
                .cloned()
                .collect())
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn manager_with(registry: PluginRegistry) -> PluginManager {
        PluginManager::new(registry, Arc::new(PluginContext::new(Config::default())))
    }

    fn pr_event() -> WebhookEvent {
        WebhookEvent::new(
            "pull_request",
            DeliveryId::new("d-1"),
            json!({"action": "opened", "pull_request": {"number": 7}}),
        )
    }

    // ========================================================================
    // Tests
    // ========================================================================

    #[tokio::test]
    async fn initialize_reports_per_plugin_success() {
        let mut registry = PluginRegistry::new();
        registry.register("a", |_| {
            Ok(Box::new(TestPlugin::builder("a").init_fails().build().0))
        });
        registry.register("b", |_| Ok(Box::new(TestPlugin::builder("b").build().0)));

        let manager = manager_with(registry);
        let results = manager.initialize().await.unwrap();

        assert_eq!(results.get("a"), Some(&false));
        assert_eq!(results.get("b"), Some(&true));
        assert!(manager.plugin_errors()["a"].contains("refused"));
    }

    #[tokio::test]
    async fn failed_plugin_never_dispatched_healthy_one_invoked_once() {
        let a_calls = Arc::new(AtomicUsize::new(0));
        let b_calls = Arc::new(AtomicUsize::new(0));

        let mut registry = PluginRegistry::new();
        let a_calls2 = Arc::clone(&a_calls);
        registry.register("a", move |_| {
            let (mut plugin, _, _) = TestPlugin::builder("a").init_fails().build();
            plugin.pr_calls = Arc::clone(&a_calls2);
            Ok(Box::new(plugin))
        });
        let b_calls2 = Arc::clone(&b_calls);
        registry.register("b", move |_| {
            let (mut plugin, _, _) = TestPlugin::builder("b").build();
            plugin.pr_calls = Arc::clone(&b_calls2);
            Ok(Box::new(plugin))
        });

        let manager = manager_with(registry);
        let results = manager.initialize().await.unwrap();
        assert_eq!(results.get("a"), Some(&false));
        assert_eq!(results.get("b"), Some(&true));

        let outcomes = manager.dispatch_pr_event(&pr_event()).await;
        assert!(!outcomes.contains_key("a"));
        assert!(!outcomes["b"].is_error());
        assert_eq!(a_calls.load(Ordering::SeqCst), 0);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pr_dispatch_isolates_failures() {
        let mut registry = PluginRegistry::new();
        registry.register("broken", |_| {
            Ok(Box::new(TestPlugin::builder("broken").handle_fails().build().0))
        });
        registry.register("fine", |_| Ok(Box::new(TestPlugin::builder("fine").build().0)));

        let manager = manager_with(registry);
        manager.initialize().await.unwrap();

        let outcomes = manager.dispatch_pr_event(&pr_event()).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes["broken"].is_error());
        assert_eq!(
            outcomes["fine"].result,
            Some(json!({"plugin": "fine", "action": "opened"}))
        );
    }

    #[tokio::test]
    async fn unsatisfied_dependency_excludes_plugin() {
        let mut registry = PluginRegistry::new();
        registry.register("needy", |_| {
            Ok(Box::new(
                TestPlugin::builder("needy").depends_on("absent").build().0,
            ))
        });

        let manager = manager_with(registry);
        let results = manager.initialize().await.unwrap();

        assert_eq!(results.get("needy"), Some(&false));
        assert!(manager.plugin_errors()["needy"].contains("absent"));
        assert!(manager.dispatch_pr_event(&pr_event()).await.is_empty());
    }

    #[tokio::test]
    async fn satisfied_dependency_initializes() {
        let mut registry = PluginRegistry::new();
        registry.register("base", |_| Ok(Box::new(TestPlugin::builder("base").build().0)));
        registry.register("needy", |_| {
            Ok(Box::new(
                TestPlugin::builder("needy").depends_on("base").build().0,
            ))
        });

        let manager = manager_with(registry);
        let results = manager.initialize().await.unwrap();
        assert_eq!(results.get("needy"), Some(&true));
    }

    #[tokio::test]
    async fn filter_pipeline_composes_sequentially() {
        let mut registry = PluginRegistry::new();
        registry.register("keep-important", |_| {
            Ok(Box::new(KeepFilter::contains("keep-important", "important")))
        });
        registry.register("keep-low-ids", |_| {
            Ok(Box::new(KeepFilter::id_below("keep-low-ids", 3)))
        });

        let manager = manager_with(registry);
        manager.initialize().await.unwrap();

        let comments = vec![
            json!({"id": 1, "body": "important"}),
            json!({"id": 2, "body": "x"}),
            json!({"id": 5, "body": "important"}),
        ];
        let filtered = manager.filter_comments(comments, &json!({})).await;

        assert_eq!(filtered, vec![json!({"id": 1, "body": "important"})]);
    }

    #[tokio::test]
    async fn failing_filter_is_skipped_not_fatal() {
        struct BrokenFilter {
            metadata: PluginMetadata,
        }

        #[async_trait]
        impl Plugin for BrokenFilter {
            fn metadata(&self) -> &PluginMetadata {
                &self.metadata
            }
            async fn initialize(&self) -> Result<(), PluginError> {
                Ok(())
            }
            async fn shutdown(&self) -> Result<(), PluginError> {
                Ok(())
            }
            fn comment_filter(&self) -> Option<&dyn CommentFilter> {
                Some(self)
            }
        }

        #[async_trait]
        impl CommentFilter for BrokenFilter {
            async fn filter_comments(
                &self,
                _comments: &[serde_json::Value],
                _criteria: &serde_json::Value,
            ) -> Result<Vec<serde_json::Value>, PluginError> {
                Err(PluginError::Failed("filter broke".to_string()))
            }
        }

        let mut registry = PluginRegistry::new();
        registry.register("broken", |_| {
            Ok(Box::new(BrokenFilter {
                metadata: PluginMetadata::new("broken", "1.0.0", "broken filter")
                    .with_capability(Capability::CommentFilter),
            }))
        });
        registry.register("keep-low-ids", |_| {
            Ok(Box::new(KeepFilter::id_below("keep-low-ids", 3)))
        });

        let manager = manager_with(registry);
        manager.initialize().await.unwrap();

        let comments = vec![json!({"id": 1}), json!({"id": 9})];
        let filtered = manager.filter_comments(comments, &json!({})).await;
        assert_eq!(filtered, vec![json!({"id": 1})]);
    }

    #[tokio::test]
    async fn notifications_broadcast_and_isolate() {
        let mut registry = PluginRegistry::new();
        registry.register("n1", |_| {
            Ok(Box::new(
                TestPlugin::builder("n1")
                    .capabilities(&[Capability::Notification])
                    .build()
                    .0,
            ))
        });
        registry.register("n2", |_| {
            Ok(Box::new(
                TestPlugin::builder("n2")
                    .capabilities(&[Capability::Notification])
                    .handle_fails()
                    .build()
                    .0,
            ))
        });

        let manager = manager_with(registry);
        manager.initialize().await.unwrap();

        let note = Notification::new("Title", "Body").with_pr_number(7);
        let results = manager.send_notification(&note).await;

        assert_eq!(results["n1"], PluginOutcome::ok(json!(true)));
        assert!(results["n2"].is_error());
    }

    #[tokio::test]
    async fn disable_and_enable_rebuild_registry() {
        let mut registry = PluginRegistry::new();
        registry.register("p", |_| Ok(Box::new(TestPlugin::builder("p").build().0)));

        let manager = manager_with(registry);
        manager.initialize().await.unwrap();

        assert!(manager.disable_plugin("p"));
        assert!(manager.dispatch_pr_event(&pr_event()).await.is_empty());

        assert!(manager.enable_plugin("p"));
        assert_eq!(manager.dispatch_pr_event(&pr_event()).await.len(), 1);

        assert!(!manager.enable_plugin("unknown"));
        assert!(!manager.disable_plugin("unknown"));
    }

    #[tokio::test]
    async fn health_reports_cover_all_cases() {
        let mut registry = PluginRegistry::new();
        registry.register("healthy", |_| {
            Ok(Box::new(TestPlugin::builder("healthy").healthy(true).build().0))
        });
        registry.register("degraded", |_| {
            Ok(Box::new(TestPlugin::builder("degraded").healthy(false).build().0))
        });
        registry.register("no-check", |_| {
            Ok(Box::new(TestPlugin::builder("no-check").build().0))
        });
        registry.register("failed-init", |_| {
            Ok(Box::new(TestPlugin::builder("failed-init").init_fails().build().0))
        });

        let manager = manager_with(registry);
        manager.initialize().await.unwrap();

        let health = manager.get_plugin_health().await;

        assert!(health["healthy"].healthy);
        assert!(health["healthy"].error.is_none());

        assert!(!health["degraded"].healthy);
        assert_eq!(health["degraded"].error.as_deref(), Some("degraded"));

        assert!(!health["no-check"].healthy);
        assert!(health["no-check"].error.as_deref().unwrap().contains("not supported"));

        assert!(!health["failed-init"].healthy);
    }

    #[tokio::test]
    async fn plugin_info_is_serializable_summary() {
        let mut registry = PluginRegistry::new();
        registry.register("p", |_| {
            Ok(Box::new(
                TestPlugin::builder("p")
                    .capabilities(&[Capability::PrEvent, Capability::Notification])
                    .build()
                    .0,
            ))
        });

        let manager = manager_with(registry);
        manager.initialize().await.unwrap();

        let info = manager.get_plugin_info();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].name, "p");
        assert_eq!(info[0].capabilities, vec!["pr_event", "notification"]);
        assert!(info[0].enabled);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json[0]["capabilities"][0], "pr_event");
    }

    #[tokio::test]
    async fn shutdown_is_best_effort() {
        let shutdown_counts: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
        let mut registry = PluginRegistry::new();
        let counts = Arc::clone(&shutdown_counts);
        registry.register("broken", move |_| {
            let (mut plugin, _, _) = TestPlugin::builder("broken").shutdown_fails().build();
            plugin.shutdown_calls = Arc::clone(&counts);
            Ok(Box::new(plugin))
        });
        let counts = Arc::clone(&shutdown_counts);
        registry.register("fine", move |_| {
            let (mut plugin, _, _) = TestPlugin::builder("fine").build();
            plugin.shutdown_calls = Arc::clone(&counts);
            Ok(Box::new(plugin))
        });

        let manager = manager_with(registry);
        manager.initialize().await.unwrap();
        manager.shutdown().await;

        // Both shutdowns ran despite the first failing.
        assert_eq!(shutdown_counts.load(Ordering::SeqCst), 2);
    }
}
