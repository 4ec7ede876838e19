//! Addon lifecycle: state machine and installer.
//!
//! ```text
//! available -> installing -> installed -> enabled <-> disabled
//!                  |             |           |           |
//!                  v             +-----> uninstalling <--+
//!                failed <----------------/     |
//!                                             v
//!                                         available
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use deckhand_core::metrics::MetricsSink;
use deckhand_core::retry::{RetryConfig, RetryExecutor};
use deckhand_core::{HookContext, HookResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::loader::{Addon, AddonCatalog};
use crate::error::{SdkError, SdkResult};
use crate::hooks::{bash_path, run_script, script_env, HookExecutor};

// ─────────────────────────────────────────────────────────────────────────────
// State Machine
// ─────────────────────────────────────────────────────────────────────────────

/// Addon lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddonState {
    /// Known but not installed
    #[default]
    Available,
    Installing,
    Installed,
    Enabled,
    Disabled,
    Uninstalling,
    /// Last install or uninstall failed
    Failed,
}

impl AddonState {
    /// Whether moving from `self` to `to` is allowed
    pub fn can_transition_to(self, to: AddonState) -> bool {
        use AddonState::*;
        matches!(
            (self, to),
            (Available, Installing)
                | (Installing, Installed)
                | (Installing, Failed)
                | (Installed, Enabled)
                | (Installed, Disabled)
                | (Installed, Uninstalling)
                | (Enabled, Disabled)
                | (Disabled, Enabled)
                | (Enabled, Uninstalling)
                | (Disabled, Uninstalling)
                | (Uninstalling, Available)
                | (Uninstalling, Failed)
                | (Failed, Installing)
                | (Failed, Uninstalling)
        )
    }

    /// Installed, whether enabled or not
    pub fn is_installed(self) -> bool {
        matches!(
            self,
            AddonState::Installed | AddonState::Enabled | AddonState::Disabled
        )
    }
}

impl fmt::Display for AddonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AddonState::Available => "available",
            AddonState::Installing => "installing",
            AddonState::Installed => "installed",
            AddonState::Enabled => "enabled",
            AddonState::Disabled => "disabled",
            AddonState::Uninstalling => "uninstalling",
            AddonState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("addon '{addon}' cannot move from {from} to {to}")]
    InvalidTransition {
        addon: String,
        from: AddonState,
        to: AddonState,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Operations
// ─────────────────────────────────────────────────────────────────────────────

/// The actual install and uninstall work for an addon.
#[async_trait]
pub trait AddonOperations: Send + Sync {
    async fn install(&self, addon: &Addon) -> anyhow::Result<()>;
    async fn uninstall(&self, addon: &Addon) -> anyhow::Result<()>;
}

/// Runs the manifest's `install` / `uninstall` scripts with bash.
///
/// An addon without a script for the operation succeeds immediately.
pub struct ScriptOperations {
    interpreter: PathBuf,
}

impl Default for ScriptOperations {
    fn default() -> Self {
        Self {
            interpreter: bash_path(),
        }
    }
}

impl ScriptOperations {
    pub fn new() -> Self {
        Self::default()
    }

    async fn run(&self, addon: &Addon, event: &str, script: Option<&PathBuf>) -> anyhow::Result<()> {
        let Some(script) = script else {
            return Ok(());
        };
        let context = HookContext::new(event);
        run_script(
            &self.interpreter,
            &addon.script_path(script),
            script_env(&context, addon.name()),
            Vec::new(),
            Some(addon.dir.as_path()),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AddonOperations for ScriptOperations {
    async fn install(&self, addon: &Addon) -> anyhow::Result<()> {
        self.run(addon, "install", addon.manifest.install.as_ref()).await
    }

    async fn uninstall(&self, addon: &Addon) -> anyhow::Result<()> {
        self.run(addon, "uninstall", addon.manifest.uninstall.as_ref()).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Installer
// ─────────────────────────────────────────────────────────────────────────────

/// Installs and uninstalls addons in dependency order, firing the
/// `pre_*`/`post_*` lifecycle hooks around each operation.
pub struct AddonInstaller {
    catalog: Arc<AddonCatalog>,
    executor: Arc<HookExecutor>,
    operations: Arc<dyn AddonOperations>,
    retry: Arc<RetryExecutor>,
    retry_config: RetryConfig,
    states: RwLock<HashMap<String, AddonState>>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl AddonInstaller {
    pub fn new(
        catalog: Arc<AddonCatalog>,
        executor: Arc<HookExecutor>,
        operations: Arc<dyn AddonOperations>,
    ) -> Self {
        Self {
            catalog,
            executor,
            operations,
            retry: Arc::new(RetryExecutor::new()),
            retry_config: RetryConfig::default(),
            states: RwLock::new(HashMap::new()),
            metrics: None,
        }
    }

    /// Run operations through `retry` with `config`
    pub fn with_retry(mut self, retry: Arc<RetryExecutor>, config: RetryConfig) -> Self {
        self.retry = retry;
        self.retry_config = config;
        self
    }

    /// Persist operation attempt history to `sink`
    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    pub fn catalog(&self) -> &AddonCatalog {
        &self.catalog
    }

    /// Current state of an addon (`Available` when never touched)
    pub async fn state(&self, name: &str) -> AddonState {
        self.states.read().await.get(name).copied().unwrap_or_default()
    }

    /// Snapshot of every tracked state, sorted by name
    pub async fn states(&self) -> Vec<(String, AddonState)> {
        let mut states: Vec<(String, AddonState)> = self
            .states
            .read()
            .await
            .iter()
            .map(|(name, state)| (name.clone(), *state))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Record an addon as installed without running its operation.
    pub async fn mark_installed(&self, name: &str) -> SdkResult<()> {
        if self.catalog.get(name).is_none() {
            return Err(SdkError::not_found("addon", name));
        }
        self.states
            .write()
            .await
            .insert(name.to_string(), AddonState::Installed);
        Ok(())
    }

    async fn transition(&self, name: &str, to: AddonState) -> Result<(), LifecycleError> {
        let mut states = self.states.write().await;
        let from = states.get(name).copied().unwrap_or_default();
        if !from.can_transition_to(to) {
            return Err(LifecycleError::InvalidTransition {
                addon: name.to_string(),
                from,
                to,
            });
        }
        states.insert(name.to_string(), to);
        info!(addon = %name, from = %from, to = %to, "Addon state changed");
        Ok(())
    }

    fn addon(&self, name: &str) -> SdkResult<&Addon> {
        self.catalog
            .get(name)
            .ok_or_else(|| SdkError::not_found("addon", name))
    }

    async fn trigger(&self, event: &str, addon: &Addon, fail_fast: bool) -> SdkResult<Vec<HookResult>> {
        let context = HookContext::new(event)
            .with_metadata("addon", json!(addon.name()))
            .with_metadata("version", json!(addon.manifest.version));
        Ok(self.executor.trigger(event, context, fail_fast).await?)
    }

    async fn persist(&self, operation: &str) {
        if let Some(ref sink) = self.metrics {
            self.retry.persist_history(operation, sink.as_ref()).await;
        }
    }

    /// Install `name` and every missing dependency, dependencies first.
    ///
    /// Returns the addons actually installed by this call. A graph defect
    /// fails before anything runs.
    pub async fn install(&self, name: &str) -> SdkResult<Vec<String>> {
        let order = self.catalog.install_order(name)?;
        let mut installed = Vec::new();

        for addon_name in &order {
            if self.state(addon_name).await.is_installed() {
                continue;
            }
            self.install_one(self.addon(addon_name)?).await?;
            installed.push(addon_name.clone());
        }

        info!(addon = %name, installed = installed.len(), "Install complete");
        Ok(installed)
    }

    async fn install_one(&self, addon: &Addon) -> SdkResult<()> {
        let name = addon.name();
        self.transition(name, AddonState::Installing).await?;

        if let Err(e) = self.trigger("pre_install", addon, true).await {
            self.transition(name, AddonState::Failed).await?;
            return Err(e);
        }

        let operation = format!("install:{name}");
        let ops = self.operations.clone();
        let outcome = self
            .retry
            .run_with_healing(&operation, &self.retry_config, || {
                let ops = ops.clone();
                async move { ops.install(addon).await }
            })
            .await;
        self.persist(&operation).await;

        if !outcome.success {
            self.transition(name, AddonState::Failed).await?;
            return Err(SdkError::operation_failed(
                "install",
                name,
                outcome.last_error.unwrap_or_default(),
            ));
        }

        self.transition(name, AddonState::Installed).await?;
        if let Err(e) = self.trigger("post_install", addon, false).await {
            warn!(addon = %name, error = %e, "post_install hooks failed");
        }
        Ok(())
    }

    /// Uninstall `name`.
    ///
    /// Refused while any installed addon still depends on it.
    pub async fn uninstall(&self, name: &str) -> SdkResult<()> {
        let addon = self.addon(name)?;

        let mut dependents = Vec::new();
        for dependent in self.catalog.resolver().dependents_of(name) {
            if self.state(&dependent).await.is_installed() {
                dependents.push(dependent);
            }
        }
        if !dependents.is_empty() {
            return Err(SdkError::HasDependents {
                addon: name.to_string(),
                dependents,
            });
        }

        self.transition(name, AddonState::Uninstalling).await?;
        if let Err(e) = self.trigger("pre_uninstall", addon, true).await {
            self.transition(name, AddonState::Failed).await?;
            return Err(e);
        }

        let operation = format!("uninstall:{name}");
        let ops = self.operations.clone();
        let outcome = self
            .retry
            .retry_with_backoff(&operation, &self.retry_config, || {
                let ops = ops.clone();
                async move { ops.uninstall(addon).await }
            })
            .await;
        self.persist(&operation).await;

        if !outcome.success {
            self.transition(name, AddonState::Failed).await?;
            return Err(SdkError::operation_failed(
                "uninstall",
                name,
                outcome.last_error.unwrap_or_default(),
            ));
        }

        self.transition(name, AddonState::Available).await?;
        if let Err(e) = self.trigger("post_uninstall", addon, false).await {
            warn!(addon = %name, error = %e, "post_uninstall hooks failed");
        }
        Ok(())
    }

    pub async fn enable(&self, name: &str) -> SdkResult<()> {
        self.addon(name)?;
        Ok(self.transition(name, AddonState::Enabled).await?)
    }

    pub async fn disable(&self, name: &str) -> SdkResult<()> {
        self.addon(name)?;
        Ok(self.transition(name, AddonState::Disabled).await?)
    }

    /// Installed addons in dependents-first order
    pub async fn uninstall_order(&self) -> SdkResult<Vec<String>> {
        let mut order = Vec::new();
        for name in self.catalog.uninstall_order()? {
            if self.state(&name).await.is_installed() {
                order.push(name);
            }
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addons::AddonManifest;
    use crate::hooks::{FnHandler, HookOptions, HookRegistry};
    use deckhand_core::metrics::InMemoryMetrics;
    use deckhand_core::retry::BackoffStrategy;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    fn addon(name: &str, deps: &[&str]) -> Addon {
        Addon {
            manifest: AddonManifest {
                name: name.into(),
                version: "1.0.0".into(),
                description: String::new(),
                dependencies: deps.iter().map(|d| d.to_string()).collect(),
                install: None,
                uninstall: None,
                hooks: vec![],
            },
            dir: PathBuf::from("/nonexistent"),
        }
    }

    #[derive(Default)]
    struct RecordingOps {
        calls: Mutex<Vec<String>>,
        /// Remaining install failures per addon
        failures: Mutex<HashMap<String, u32>>,
    }

    impl RecordingOps {
        fn failing(name: &str, times: u32) -> Self {
            let ops = Self::default();
            ops.failures.lock().unwrap().insert(name.into(), times);
            ops
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AddonOperations for RecordingOps {
        async fn install(&self, addon: &Addon) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("install:{}", addon.name()));
            let mut failures = self.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(addon.name()) {
                if *left > 0 {
                    *left -= 1;
                    anyhow::bail!("permission denied writing {}", addon.name());
                }
            }
            Ok(())
        }

        async fn uninstall(&self, addon: &Addon) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("uninstall:{}", addon.name()));
            Ok(())
        }
    }

    fn catalog() -> Arc<AddonCatalog> {
        Arc::new(AddonCatalog::new([
            addon("postgres", &[]),
            addon("redis", &[]),
            addon("api", &["postgres", "redis"]),
            addon("dashboard", &["api"]),
        ]))
    }

    fn installer(registry: HookRegistry, ops: Arc<RecordingOps>) -> AddonInstaller {
        AddonInstaller::new(catalog(), Arc::new(HookExecutor::new(Arc::new(registry))), ops)
            .with_retry(
                Arc::new(RetryExecutor::new()),
                RetryConfig::new(2, BackoffStrategy::Immediate),
            )
    }

    #[test]
    fn test_transitions() {
        use AddonState::*;
        assert!(Available.can_transition_to(Installing));
        assert!(Enabled.can_transition_to(Disabled));
        assert!(Disabled.can_transition_to(Enabled));
        assert!(Failed.can_transition_to(Installing));
        assert!(Uninstalling.can_transition_to(Available));
        assert!(!Available.can_transition_to(Installed));
        assert!(!Installed.can_transition_to(Installing));
        assert!(!Enabled.can_transition_to(Available));
    }

    #[tokio::test]
    async fn test_install_follows_dependency_order() {
        let ops = Arc::new(RecordingOps::default());
        let installer = installer(HookRegistry::new(), ops.clone());

        let installed = assert_ok!(installer.install("dashboard").await);
        assert_eq!(installed, vec!["postgres", "redis", "api", "dashboard"]);
        assert_eq!(installer.state("api").await, AddonState::Installed);

        // Already installed dependencies are skipped
        let again = installer.install("dashboard").await.unwrap();
        assert!(again.is_empty());
        assert_eq!(ops.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_install_retries_then_fails() {
        let ops = Arc::new(RecordingOps::failing("redis", 5));
        let installer = installer(HookRegistry::new(), ops.clone());

        let err = assert_err!(installer.install("api").await);
        assert!(matches!(err, SdkError::OperationFailed { ref addon, .. } if addon == "redis"));
        assert_eq!(installer.state("postgres").await, AddonState::Installed);
        assert_eq!(installer.state("redis").await, AddonState::Failed);
        assert_eq!(installer.state("api").await, AddonState::Available);

        // Permission errors have no automatic recovery: exactly max_attempts calls
        let redis_calls = ops.calls().iter().filter(|c| *c == "install:redis").count();
        assert_eq!(redis_calls, 2);
    }

    #[tokio::test]
    async fn test_failed_addon_can_be_retried() {
        let ops = Arc::new(RecordingOps::failing("postgres", 2));
        let installer = installer(HookRegistry::new(), ops);

        assert!(installer.install("postgres").await.is_err());
        assert_eq!(installer.state("postgres").await, AddonState::Failed);
        assert_eq!(installer.install("postgres").await.unwrap(), vec!["postgres"]);
    }

    #[tokio::test]
    async fn test_required_pre_install_hook_blocks_install() {
        let mut registry = HookRegistry::new();
        registry.register_hook(
            "pre_install",
            Arc::new(FnHandler::new("license-check", |ctx| {
                if ctx.metadata.get("addon") == Some(&json!("redis")) {
                    anyhow::bail!("license not accepted");
                }
                Ok(())
            })),
            "compliance",
            HookOptions::default().required(),
        );
        let ops = Arc::new(RecordingOps::default());
        let installer = installer(registry, ops.clone());

        let err = installer.install("api").await.unwrap_err();
        assert!(matches!(err, SdkError::HookExecution(_)));
        assert_eq!(installer.state("redis").await, AddonState::Failed);
        assert_eq!(ops.calls(), vec!["install:postgres"]);
    }

    #[tokio::test]
    async fn test_install_resolution_error() {
        let catalog = Arc::new(AddonCatalog::new([addon("web", &["cache"])]));
        let installer = AddonInstaller::new(
            catalog,
            Arc::new(HookExecutor::new(Arc::new(HookRegistry::new()))),
            Arc::new(RecordingOps::default()),
        );
        let err = installer.install("web").await.unwrap_err();
        assert!(err.is_resolution());
        assert_eq!(installer.state("web").await, AddonState::Available);
    }

    #[tokio::test]
    async fn test_uninstall_refuses_with_installed_dependents() {
        let ops = Arc::new(RecordingOps::default());
        let installer = installer(HookRegistry::new(), ops.clone());
        installer.install("api").await.unwrap();

        let err = installer.uninstall("postgres").await.unwrap_err();
        assert_eq!(err.to_string(), "addon 'postgres' is required by: api");

        assert_eq!(installer.uninstall_order().await.unwrap()[0], "api");
        installer.uninstall("api").await.unwrap();
        installer.uninstall("postgres").await.unwrap();
        assert_eq!(installer.state("postgres").await, AddonState::Available);
        assert!(ops.calls().contains(&"uninstall:api".to_string()));
    }

    #[tokio::test]
    async fn test_enable_disable() {
        let installer = installer(HookRegistry::new(), Arc::new(RecordingOps::default()));
        let err = installer.enable("redis").await.unwrap_err();
        assert!(matches!(err, SdkError::Lifecycle(LifecycleError::InvalidTransition { .. })));

        installer.mark_installed("redis").await.unwrap();
        installer.enable("redis").await.unwrap();
        installer.disable("redis").await.unwrap();
        assert_eq!(installer.state("redis").await, AddonState::Disabled);
        assert!(installer.enable("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_install_history_persisted() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let ops = Arc::new(RecordingOps::failing("redis", 1));
        let installer = installer(HookRegistry::new(), ops).with_metrics(metrics.clone());

        installer.install("redis").await.unwrap();
        let recorded = metrics.addon_metrics("install:redis").await.unwrap();
        assert_eq!(recorded.retry_attempts, 2);
        assert!(recorded.last_error.unwrap().contains("permission denied"));
    }

    #[tokio::test]
    async fn test_repeated_installs_count_each_attempt_once() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let ops = Arc::new(RecordingOps::failing("postgres", 2));
        let installer = installer(HookRegistry::new(), ops).with_metrics(metrics.clone());

        assert_err!(installer.install("postgres").await);
        assert_eq!(installer.install("postgres").await.unwrap(), vec!["postgres"]);

        let recorded = metrics.addon_metrics("install:postgres").await.unwrap();
        assert_eq!(recorded.retry_attempts, 3);
    }
}
