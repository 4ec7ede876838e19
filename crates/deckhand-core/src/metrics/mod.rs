//! Addon metrics.
//!
//! The hook executor reports every completed hook to a [`MetricsSink`], and
//! the retry executor forwards attempt histories to it. Recording is
//! best-effort: callers log sink failures and carry on.
//!
//! Two sinks are provided:
//! - [`InMemoryMetrics`] for tests and one-shot CLI runs
//! - `SqliteMetrics` (feature `db`) for persistent aggregates

#[cfg(feature = "db")]
mod sqlite;

#[cfg(feature = "db")]
pub use sqlite::SqliteMetrics;

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::retry::AttemptRecord;
use crate::types::HookResult;

/// One completed hook invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookRun {
    pub addon_name: String,
    pub hook_name: String,
    pub event: String,
    pub success: bool,
    pub duration_ms: u64,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HookRun {
    /// Build a run record from a hook result.
    pub fn from_result(event: &str, result: &HookResult) -> Self {
        Self {
            addon_name: result.addon_name.clone(),
            hook_name: result.hook_name.clone(),
            event: event.to_string(),
            success: result.success,
            duration_ms: result.duration_ms,
            attempts: result.attempts,
            error: result.error.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Aggregated metrics for one addon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddonMetrics {
    pub addon_name: String,
    pub total_runs: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_duration_ms: u64,
    /// Attempts recorded through retry histories
    pub retry_attempts: u64,
    pub last_error: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    /// When `last_error` was recorded
    pub last_error_at: Option<DateTime<Utc>>,
}

impl AddonMetrics {
    fn empty(addon_name: &str) -> Self {
        Self {
            addon_name: addon_name.to_string(),
            ..Default::default()
        }
    }

    /// Fraction of successful runs (0.0 when nothing ran)
    pub fn success_rate(&self) -> f64 {
        if self.total_runs == 0 {
            0.0
        } else {
            self.successes as f64 / self.total_runs as f64
        }
    }

    /// Mean run duration in milliseconds
    pub fn avg_duration_ms(&self) -> f64 {
        if self.total_runs == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.total_runs as f64
        }
    }
}

/// Destination for hook runs and retry histories.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Record one completed hook invocation.
    async fn record_hook_run(&self, run: &HookRun) -> Result<()>;

    /// Record the attempt history of an operation.
    ///
    /// The operation name is treated as the addon name.
    async fn record_attempt_history(&self, operation: &str, records: &[AttemptRecord])
        -> Result<()>;

    /// Aggregates for an addon (zeroed when nothing was recorded).
    async fn addon_metrics(&self, addon_name: &str) -> Result<AddonMetrics>;
}

/// Runs kept by `InMemoryMetrics` before the oldest are dropped.
pub const DEFAULT_RUN_LIMIT: usize = 1000;

/// Process-local metrics sink.
///
/// Aggregates cover every run; only the newest `run_limit` runs are kept.
#[derive(Debug)]
pub struct InMemoryMetrics {
    addons: RwLock<HashMap<String, AddonMetrics>>,
    runs: RwLock<VecDeque<HookRun>>,
    run_limit: usize,
}

impl Default for InMemoryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::with_run_limit(DEFAULT_RUN_LIMIT)
    }

    /// Keep at most `limit` runs (at least one)
    pub fn with_run_limit(limit: usize) -> Self {
        Self {
            addons: RwLock::new(HashMap::new()),
            runs: RwLock::new(VecDeque::new()),
            run_limit: limit.max(1),
        }
    }

    /// Retained runs, oldest first
    pub async fn runs(&self) -> Vec<HookRun> {
        self.runs.read().await.iter().cloned().collect()
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetrics {
    async fn record_hook_run(&self, run: &HookRun) -> Result<()> {
        {
            let mut addons = self.addons.write().await;
            let entry = addons
                .entry(run.addon_name.clone())
                .or_insert_with(|| AddonMetrics::empty(&run.addon_name));
            entry.total_runs += 1;
            if run.success {
                entry.successes += 1;
                entry.last_success_at = Some(run.timestamp);
            } else {
                entry.failures += 1;
                entry.last_error = run.error.clone();
                entry.last_error_at = Some(run.timestamp);
            }
            entry.total_duration_ms += run.duration_ms;
            entry.last_run_at = Some(run.timestamp);
        }

        let mut runs = self.runs.write().await;
        runs.push_back(run.clone());
        while runs.len() > self.run_limit {
            runs.pop_front();
        }
        Ok(())
    }

    async fn record_attempt_history(
        &self,
        operation: &str,
        records: &[AttemptRecord],
    ) -> Result<()> {
        let mut addons = self.addons.write().await;
        let entry = addons
            .entry(operation.to_string())
            .or_insert_with(|| AddonMetrics::empty(operation));
        entry.retry_attempts += records.len() as u64;
        if let Some(failed) = records.iter().rev().find(|r| r.error.is_some()) {
            entry.last_error = failed.error.clone();
            entry.last_error_at = Some(failed.timestamp);
        }
        if let Some(succeeded) = records.iter().rev().find(|r| r.success) {
            entry.last_success_at = Some(succeeded.timestamp);
        }
        Ok(())
    }

    async fn addon_metrics(&self, addon_name: &str) -> Result<AddonMetrics> {
        let addons = self.addons.read().await;
        Ok(addons
            .get(addon_name)
            .cloned()
            .unwrap_or_else(|| AddonMetrics::empty(addon_name)))
    }
}
