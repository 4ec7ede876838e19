//! deckhand-core - Core library for Deckhand
//!
//! This crate provides the side-effect-light building blocks shared by the
//! Deckhand SDK and CLI:
//!
//! - **types**: Hook context, hook results and enforcement policy
//! - **resolver**: Addon dependency graph resolution (install order, cycles, trees)
//! - **retry**: Retry with backoff strategies and automatic error recovery
//! - **metrics**: Addon hook metrics and retry history persistence
//! - **config**: Layered configuration (env > file > defaults)

pub mod config;
pub mod error;
pub mod metrics;
pub mod resolver;
pub mod retry;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use resolver::{DependencyGraph, DependencyResolver, ResolutionError};
pub use retry::{BackoffStrategy, RetryConfig, RetryExecutor, RetryOutcome};
pub use types::{Enforcement, HookContext, HookResult};
