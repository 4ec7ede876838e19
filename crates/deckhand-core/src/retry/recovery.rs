//! Error classification and recovery actions.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Category of a recognised failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    DiskSpace,
    Permission,
    Corruption,
    Build,
}

/// Concrete recovery step for a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryKind {
    /// Wait for the network to settle, then retry
    RetryAfterDelay,
    /// Free disk space (manual)
    FreeDiskSpace,
    /// Fix file permissions (manual)
    FixPermissions,
    /// Clear package caches, then retry
    ClearCacheAndRetry,
    /// Remove build artifacts and rebuild
    CleanRebuild,
}

impl fmt::Display for RecoveryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecoveryKind::RetryAfterDelay => "retry_after_delay",
            RecoveryKind::FreeDiskSpace => "free_disk_space",
            RecoveryKind::FixPermissions => "fix_permissions",
            RecoveryKind::ClearCacheAndRetry => "clear_cache_and_retry",
            RecoveryKind::CleanRebuild => "clean_rebuild",
        };
        f.write_str(s)
    }
}

/// A suggested recovery for an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub category: ErrorCategory,
    pub kind: RecoveryKind,
    /// Human readable suggestion
    pub description: String,
    /// Whether the action may run without an operator
    pub auto_execute: bool,
}

impl RecoveryAction {
    fn new(category: ErrorCategory, kind: RecoveryKind, description: &str, auto: bool) -> Self {
        Self {
            category,
            kind,
            description: description.to_string(),
            auto_execute: auto,
        }
    }
}

const NETWORK_PATTERNS: &[&str] = &[
    "network",
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "could not resolve host",
    "temporary failure in name resolution",
];
const DISK_PATTERNS: &[&str] = &["no space left", "disk full", "disk space", "quota exceeded"];
const PERMISSION_PATTERNS: &[&str] = &["permission denied", "access denied", "eacces", "eperm"];
const CORRUPTION_PATTERNS: &[&str] = &["checksum", "hash mismatch", "corrupt", "integrity"];
const BUILD_PATTERNS: &[&str] = &["build failed", "compilation failed", "compile error", "linker"];

/// Classify error text into recovery actions.
///
/// Matching is case-insensitive substring search. An error may match several
/// categories; actions come back in a fixed category order.
pub fn detect_recoverable_errors(error: &str) -> Vec<RecoveryAction> {
    let text = error.to_lowercase();
    let matches = |patterns: &[&str]| patterns.iter().any(|p| text.contains(p));

    let mut actions = Vec::new();
    if matches(NETWORK_PATTERNS) {
        actions.push(RecoveryAction::new(
            ErrorCategory::Network,
            RecoveryKind::RetryAfterDelay,
            "Network issue detected, retrying after a short delay",
            true,
        ));
    }
    if matches(DISK_PATTERNS) {
        actions.push(RecoveryAction::new(
            ErrorCategory::DiskSpace,
            RecoveryKind::FreeDiskSpace,
            "Free disk space (remove old images, caches or logs) and retry",
            false,
        ));
    }
    if matches(PERMISSION_PATTERNS) {
        actions.push(RecoveryAction::new(
            ErrorCategory::Permission,
            RecoveryKind::FixPermissions,
            "Check file ownership and permissions of the workspace",
            false,
        ));
    }
    if matches(CORRUPTION_PATTERNS) {
        actions.push(RecoveryAction::new(
            ErrorCategory::Corruption,
            RecoveryKind::ClearCacheAndRetry,
            "Corrupted download detected, clearing caches and retrying",
            true,
        ));
    }
    if matches(BUILD_PATTERNS) {
        actions.push(RecoveryAction::new(
            ErrorCategory::Build,
            RecoveryKind::CleanRebuild,
            "Build failure detected, removing build artifacts and rebuilding",
            true,
        ));
    }
    actions
}

// ─────────────────────────────────────────────────────────────────────────────
// Recovery Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Executes recovery actions on behalf of the retry executor.
#[async_trait]
pub trait RecoveryHandler: Send + Sync {
    /// Run `action` for `operation`; returns whether it succeeded.
    async fn execute(&self, action: &RecoveryAction, operation: &str) -> bool;
}

/// Handler that never recovers anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecovery;

#[async_trait]
impl RecoveryHandler for NoopRecovery {
    async fn execute(&self, _action: &RecoveryAction, _operation: &str) -> bool {
        false
    }
}

/// Recovery handler operating on a workspace directory.
#[derive(Debug, Clone)]
pub struct WorkspaceRecovery {
    /// Cache directories removed by `ClearCacheAndRetry`
    pub cache_dirs: Vec<PathBuf>,
    /// Build output directories removed by `CleanRebuild`
    pub build_dirs: Vec<PathBuf>,
    /// Pause used by `RetryAfterDelay`
    pub network_pause: Duration,
}

impl WorkspaceRecovery {
    /// Recovery for a workspace with the usual cache and build directories.
    pub fn for_workspace(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            cache_dirs: vec![root.join(".cache"), root.join("node_modules/.cache")],
            build_dirs: vec![root.join("build"), root.join("dist"), root.join("target")],
            network_pause: Duration::from_secs(5),
        }
    }

    /// Set network pause
    pub fn with_network_pause(mut self, pause: Duration) -> Self {
        self.network_pause = pause;
        self
    }

    async fn remove_dirs(dirs: &[PathBuf]) -> bool {
        let mut ok = true;
        for dir in dirs {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => debug!(path = %dir.display(), "Removed directory"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Failed to remove directory");
                    ok = false;
                }
            }
        }
        ok
    }
}

#[async_trait]
impl RecoveryHandler for WorkspaceRecovery {
    async fn execute(&self, action: &RecoveryAction, operation: &str) -> bool {
        debug!(operation = %operation, action = %action.kind, "Executing recovery");
        match action.kind {
            RecoveryKind::RetryAfterDelay => {
                tokio::time::sleep(self.network_pause).await;
                true
            }
            RecoveryKind::ClearCacheAndRetry => Self::remove_dirs(&self.cache_dirs).await,
            RecoveryKind::CleanRebuild => Self::remove_dirs(&self.build_dirs).await,
            RecoveryKind::FreeDiskSpace | RecoveryKind::FixPermissions => false,
        }
    }
}
