//! Command implementations for the deckhand CLI.
//!
//! Each submodule implements the logic for a command group.

pub mod addons;
pub mod config;
pub mod diagnose;
pub mod hooks;
pub mod logs;
pub mod metrics;

use std::sync::Arc;

use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};
use deckhand_core::Config;
use deckhand_sdk::addons::BuiltinHandlers;
use deckhand_sdk::hooks::AsyncFnHandler;
use deckhand_sdk::Deckhand;

/// Handlers manifests can reference as `{"type": "builtin", "name": ...}`.
pub fn builtin_handlers() -> BuiltinHandlers {
    let mut builtins = BuiltinHandlers::new();
    builtins.register(
        "log-context",
        Arc::new(AsyncFnHandler::new("log-context", |ctx| async move {
            tracing::info!(
                event = %ctx.event,
                run_id = %ctx.run_id,
                deployment = ?ctx.deployment_id,
                environment = ?ctx.environment,
                "Hook context"
            );
            Ok(())
        })),
    );
    builtins
}

/// Open the runtime for the addons directory in `config`.
pub async fn open(config: Config) -> Result<Deckhand> {
    let addons_dir = config.paths.addons_dir.clone();
    Deckhand::open(config, builtin_handlers())
        .await
        .with_context(|| format!("Failed to load addons from {}", addons_dir.display()))
}

/// Green check / red cross for a result line.
pub fn status_icon(success: bool) -> ColoredString {
    if success { "✓".green() } else { "✗".red() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckhand_core::HookContext;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_empty_addons_dir() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.addons_dir = tmp.path().join("addons");
        config.paths.database_path = tmp.path().join("metrics.db");
        config.paths.workspace_dir = tmp.path().join("workspace");

        let deckhand = tokio_test::assert_ok!(open(config).await);
        assert!(deckhand.catalog().is_empty());

        let results = deckhand
            .trigger("pre_deployment", HookContext::new("pre_deployment"), true)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_builtin_handlers_registered() {
        assert_eq!(builtin_handlers().names(), vec!["log-context"]);
    }
}
