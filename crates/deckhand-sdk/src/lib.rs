//! Deckhand SDK - Addon hook orchestration runtime
//!
//! This crate builds the runtime on top of `deckhand-core`:
//!
//! # Core Modules (from deckhand-core)
//!
//! - **resolver** - Dependency graph resolution (install order, cycles)
//! - **retry** - Retry with backoff and automatic recovery
//! - **metrics** - Hook run metrics and retry history
//! - **config** - Layered configuration
//!
//! # SDK Modules
//!
//! - **hooks** - Hook registry, handlers and the executor
//! - **addons** - Addon manifests, discovery and lifecycle
//! - **logs** - Log tailing with backpressure, chunking and rate limiting
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use deckhand_sdk::hooks::{FnHandler, HookExecutor, HookOptions, HookRegistry};
//! use deckhand_sdk::deckhand_core::HookContext;
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
//!     let results = executor
//!         .trigger("pre_deployment", HookContext::new("pre_deployment"), true)
//!         .await?;
//!     assert!(results.iter().all(|r| r.success));
//!     Ok(())
//! }
//! ```

// ─────────────────────────────────────────────────────────────────────────────
// Re-export core modules from deckhand-core
// ─────────────────────────────────────────────────────────────────────────────

pub use deckhand_core;

/// Dependency graph resolution
pub use deckhand_core::resolver;

/// Retry and automatic recovery
pub use deckhand_core::retry;

/// Hook metrics
pub use deckhand_core::metrics;

/// Configuration
pub use deckhand_core::config;

/// Hook context and result types
pub use deckhand_core::types;

// ─────────────────────────────────────────────────────────────────────────────
// SDK-specific modules
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "hooks")]
pub mod hooks;

#[cfg(feature = "addons")]
pub mod addons;

#[cfg(feature = "logs")]
pub mod logs;

pub mod utils;

mod error;
#[cfg(feature = "addons")]
mod sdk;

pub use error::{SdkError, SdkResult};
#[cfg(feature = "addons")]
pub use sdk::Deckhand;

#[cfg(feature = "hooks")]
pub use hooks::{HookExecutionError, HookExecutor, HookHandler, HookOptions, HookRegistry};

#[cfg(feature = "addons")]
pub use addons::{AddonCatalog, AddonInstaller, AddonLoader, AddonManifest, AddonState};

#[cfg(feature = "logs")]
pub use logs::{BroadcastPublisher, LogTailManager, RateLimiter};
