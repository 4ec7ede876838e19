//! Main SDK Entry Point
//!
//! Wires configuration, metrics, addon discovery, hook execution and the
//! installer together.

use std::sync::Arc;

use deckhand_core::metrics::{MetricsSink, SqliteMetrics};
use deckhand_core::retry::{RetryConfig, RetryExecutor, WorkspaceRecovery};
use deckhand_core::{Config, HookContext, HookResult};
use tracing::info;

use crate::addons::{
    discover_hooks, AddonCatalog, AddonInstaller, AddonLoader, BuiltinHandlers, ScriptOperations,
};
use crate::hooks::{HookExecutor, HookRegistry};
use crate::SdkResult;

#[cfg(feature = "logs")]
use crate::logs::{LogPublisher, LogTailManager, PipelineConfig};

/// Deckhand - Main entry point
///
/// # Example
///
/// ```rust,no_run
/// use deckhand_sdk::{Deckhand, deckhand_core::Config};
/// use deckhand_sdk::addons::BuiltinHandlers;
///
/// async fn example() -> anyhow::Result<()> {
///     let deckhand = Deckhand::open(Config::load()?, BuiltinHandlers::new()).await?;
///
///     let order = deckhand.catalog().install_order("api")?;
///     println!("{order:?}");
///
///     deckhand.installer().install("api").await?;
///     Ok(())
/// }
/// ```
pub struct Deckhand {
    config: Config,
    metrics: Arc<SqliteMetrics>,
    catalog: Arc<AddonCatalog>,
    executor: Arc<HookExecutor>,
    retry: Arc<RetryExecutor>,
    installer: AddonInstaller,
}

impl Deckhand {
    /// Open the metrics store, scan the addons directory and register
    /// every declared hook.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The metrics database cannot be opened
    /// - A declared hook handler cannot be resolved
    pub async fn open(config: Config, builtins: BuiltinHandlers) -> SdkResult<Self> {
        config.validate().map_err(deckhand_core::Error::from)?;

        let metrics = Arc::new(SqliteMetrics::open(&config.paths.database_path)?);
        let catalog = Arc::new(
            AddonLoader::new(vec![config.paths.addons_dir.clone()])
                .load_catalog()
                .await,
        );

        let mut registry = HookRegistry::new();
        discover_hooks(&catalog, &mut registry, &builtins, &config.hooks)?;

        let sink: Arc<dyn MetricsSink> = metrics.clone();
        let executor = Arc::new(HookExecutor::new(Arc::new(registry)).with_metrics(sink.clone()));
        let retry = Arc::new(RetryExecutor::with_recovery(Arc::new(
            WorkspaceRecovery::for_workspace(&config.paths.workspace_dir),
        )));
        let installer = AddonInstaller::new(
            catalog.clone(),
            executor.clone(),
            Arc::new(ScriptOperations::new()),
        )
        .with_retry(retry.clone(), RetryConfig::from(&config.retry))
        .with_metrics(sink);

        info!(
            addons = catalog.len(),
            hooks = executor.registry().len(),
            database = %config.paths.database_path.display(),
            "Deckhand ready"
        );

        Ok(Self {
            config,
            metrics,
            catalog,
            executor,
            retry,
            installer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &SqliteMetrics {
        &self.metrics
    }

    pub fn catalog(&self) -> &AddonCatalog {
        &self.catalog
    }

    pub fn executor(&self) -> &HookExecutor {
        &self.executor
    }

    pub fn retry(&self) -> &RetryExecutor {
        &self.retry
    }

    pub fn installer(&self) -> &AddonInstaller {
        &self.installer
    }

    /// Trigger the hooks registered for `event`
    pub async fn trigger(
        &self,
        event: &str,
        context: HookContext,
        fail_fast: bool,
    ) -> SdkResult<Vec<HookResult>> {
        Ok(self.executor.trigger(event, context, fail_fast).await?)
    }

    /// Log pipeline manager publishing to `publisher`
    #[cfg(feature = "logs")]
    pub fn log_manager(&self, publisher: Arc<dyn LogPublisher>) -> LogTailManager {
        LogTailManager::new(PipelineConfig::from(&self.config), publisher)
    }
}
