//! Addon Lifecycle Hooks
//!
//! Addons subscribe to lifecycle events (`pre_deployment`, `post_install`,
//! custom names, ...) by registering a [`HookHandler`] in a [`HookRegistry`].
//! The [`HookExecutor`] runs an event's hooks in priority order, each attempt
//! in its own task with a hard timeout, retrying with backoff and applying
//! the hook's enforcement policy.
//!
//! # Handler Kinds
//!
//! - [`FnHandler`]: blocking in-process closure
//! - [`AsyncFnHandler`]: async in-process closure
//! - [`ScriptHandler`]: addon bash script with an isolated environment
//! - `WebhookHandler`: HTTP POST of the context (feature `webhook`)
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use deckhand_core::HookContext;
//! use deckhand_sdk::hooks::{FnHandler, HookExecutor, HookOptions, HookRegistry};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let mut registry = HookRegistry::new();
//!     registry.register_hook(
//!         "pre_deployment",
//!         Arc::new(FnHandler::new("scan", |_ctx| Ok(()))),
//!         "security",
//!         HookOptions::default().priority(10).required(),
//!     );
//!
//!     let executor = HookExecutor::new(Arc::new(registry));
//!     let ctx = HookContext::new("pre_deployment").with_environment("production");
//!     let results = executor.trigger("pre_deployment", ctx, true).await?;
//!     assert!(results.iter().all(|r| r.success));
//!     Ok(())
//! }
//! ```

mod executor;
mod handlers;
mod registry;

pub use executor::{retry_delay, HookExecutionError, HookExecutor};
pub use handlers::{
    bash_path, run_script, script_env, AsyncFnHandler, FnHandler, HookError, HookHandler,
    ScriptHandler,
};
#[cfg(feature = "webhook")]
pub use handlers::WebhookHandler;
pub use registry::{HookOptions, HookRegistration, HookRegistry};
