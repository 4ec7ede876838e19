//! SQLite-backed metrics store.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{AddonMetrics, HookRun, MetricsSink};
use crate::error::{Error, Result};
use crate::retry::AttemptRecord;

/// Persistent metrics store.
///
/// Aggregates are updated with single-statement upserts, so concurrent
/// writers never lose increments.
pub struct SqliteMetrics {
    conn: Mutex<Connection>,
}

impl SqliteMetrics {
    /// Open (or create) the metrics database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::from_connection(conn)
    }

    /// In-memory store
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(include_str!("migrations/001_metrics_tables.sql"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Most recent runs of an addon, newest first
    pub fn recent_runs(&self, addon_name: &str, limit: usize) -> Result<Vec<HookRun>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT addon_name, hook_name, event, success, duration_ms, attempts, error, created_at
             FROM hook_run
             WHERE addon_name = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;
        let runs = stmt
            .query_map(params![addon_name, limit as i64], Self::map_run)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn map_run(row: &rusqlite::Row) -> rusqlite::Result<HookRun> {
        Ok(HookRun {
            addon_name: row.get(0)?,
            hook_name: row.get(1)?,
            event: row.get(2)?,
            success: row.get(3)?,
            duration_ms: row.get::<_, i64>(4)? as u64,
            attempts: row.get(5)?,
            error: row.get(6)?,
            timestamp: from_millis(row.get(7)?).unwrap_or_default(),
        })
    }
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

#[async_trait]
impl MetricsSink for SqliteMetrics {
    async fn record_hook_run(&self, run: &HookRun) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let at = run.timestamp.timestamp_millis();

        conn.execute(
            "INSERT INTO hook_run
                (addon_name, hook_name, event, success, duration_ms, attempts, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run.addon_name,
                run.hook_name,
                run.event,
                run.success,
                run.duration_ms as i64,
                run.attempts,
                run.error,
                at,
            ],
        )?;

        conn.execute(
            "INSERT INTO addon_metrics
                (addon_name, total_runs, successes, failures, total_duration_ms,
                 last_error, last_error_at, last_run_at, last_success_at)
             VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(addon_name) DO UPDATE SET
                total_runs = total_runs + 1,
                successes = successes + excluded.successes,
                failures = failures + excluded.failures,
                total_duration_ms = total_duration_ms + excluded.total_duration_ms,
                last_error = COALESCE(excluded.last_error, last_error),
                last_error_at = COALESCE(excluded.last_error_at, last_error_at),
                last_run_at = excluded.last_run_at,
                last_success_at = COALESCE(excluded.last_success_at, last_success_at)",
            params![
                run.addon_name,
                run.success as i64,
                (!run.success) as i64,
                run.duration_ms as i64,
                if run.success { None } else { run.error.as_deref() },
                (!run.success).then_some(at),
                at,
                run.success.then_some(at),
            ],
        )?;
        Ok(())
    }

    async fn record_attempt_history(
        &self,
        operation: &str,
        records: &[AttemptRecord],
    ) -> Result<()> {
        let failed = records.iter().rev().find(|r| r.error.is_some());
        let last_error = failed.and_then(|r| r.error.as_deref());
        let last_error_at = failed.map(|r| r.timestamp.timestamp_millis());
        let last_success_at = records
            .iter()
            .rev()
            .find(|r| r.success)
            .map(|r| r.timestamp.timestamp_millis());

        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute(
            "INSERT INTO addon_metrics
                (addon_name, retry_attempts, last_error, last_error_at, last_success_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(addon_name) DO UPDATE SET
                retry_attempts = retry_attempts + excluded.retry_attempts,
                last_error = COALESCE(excluded.last_error, last_error),
                last_error_at = COALESCE(excluded.last_error_at, last_error_at),
                last_success_at = COALESCE(excluded.last_success_at, last_success_at)",
            params![operation, records.len() as i64, last_error, last_error_at, last_success_at],
        )?;
        Ok(())
    }

    async fn addon_metrics(&self, addon_name: &str) -> Result<AddonMetrics> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let metrics = conn
            .query_row(
                "SELECT total_runs, successes, failures, total_duration_ms, retry_attempts,
                        last_error, last_run_at, last_success_at, last_error_at
                 FROM addon_metrics WHERE addon_name = ?1",
                params![addon_name],
                |row| {
                    Ok(AddonMetrics {
                        addon_name: addon_name.to_string(),
                        total_runs: row.get::<_, i64>(0)? as u64,
                        successes: row.get::<_, i64>(1)? as u64,
                        failures: row.get::<_, i64>(2)? as u64,
                        total_duration_ms: row.get::<_, i64>(3)? as u64,
                        retry_attempts: row.get::<_, i64>(4)? as u64,
                        last_error: row.get(5)?,
                        last_run_at: row.get::<_, Option<i64>>(6)?.and_then(from_millis),
                        last_success_at: row.get::<_, Option<i64>>(7)?.and_then(from_millis),
                        last_error_at: row.get::<_, Option<i64>>(8)?.and_then(from_millis),
                    })
                },
            )
            .optional()?;

        Ok(metrics.unwrap_or_else(|| AddonMetrics::empty(addon_name)))
    }
}
