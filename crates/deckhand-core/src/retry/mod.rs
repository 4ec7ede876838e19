//! Retry and Auto-Heal
//!
//! Two tiers of failure handling for deployment and install operations:
//!
//! - **Mechanical retry**: [`RetryExecutor::retry_with_backoff`] re-runs an
//!   operation with an immediate, linear, exponential or fibonacci backoff,
//!   recording every attempt in a per-operation history.
//! - **Semantic recovery**: [`detect_recoverable_errors`] classifies the error
//!   text into recovery actions and [`RetryExecutor::auto_recover`] runs the
//!   auto-executable ones before trying the operation again.
//!
//! # Example
//!
//! ```rust,no_run
//! use deckhand_core::retry::{BackoffStrategy, RetryConfig, RetryExecutor};
//! use std::time::Duration;
//!
//! async fn example() {
//!     let executor = RetryExecutor::new();
//!     let config = RetryConfig::new(3, BackoffStrategy::Exponential)
//!         .with_base_delay(Duration::from_millis(200));
//!
//!     let outcome = executor
//!         .retry_with_backoff("git_clone", &config, || async {
//!             Ok::<_, std::io::Error>("cloned")
//!         })
//!         .await;
//!     assert!(outcome.success);
//! }
//! ```

mod recovery;

pub use recovery::{
    detect_recoverable_errors, ErrorCategory, NoopRecovery, RecoveryAction, RecoveryHandler,
    RecoveryKind, WorkspaceRecovery,
};

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::metrics::MetricsSink;

/// Maximum attempt records kept per operation name.
const DEFAULT_HISTORY_LIMIT: usize = 500;

// ─────────────────────────────────────────────────────────────────────────────
// Backoff Strategy
// ─────────────────────────────────────────────────────────────────────────────

/// Function from attempt number to wait time before the next attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// No wait between attempts.
    Immediate,
    /// `base * attempt`
    Linear,
    /// `base * 2^(attempt - 1)`
    #[default]
    Exponential,
    /// `base * fib(attempt)`, yielding 1, 1, 2, 3, 5, ... multiples of base
    Fibonacci,
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffStrategy::Immediate => write!(f, "immediate"),
            BackoffStrategy::Linear => write!(f, "linear"),
            BackoffStrategy::Exponential => write!(f, "exponential"),
            BackoffStrategy::Fibonacci => write!(f, "fibonacci"),
        }
    }
}

impl FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "immediate" => Ok(BackoffStrategy::Immediate),
            "linear" => Ok(BackoffStrategy::Linear),
            "exponential" => Ok(BackoffStrategy::Exponential),
            "fibonacci" => Ok(BackoffStrategy::Fibonacci),
            other => Err(format!("unknown backoff strategy: {other}")),
        }
    }
}

/// Fibonacci multiplier for an attempt number: 1, 1, 2, 3, 5, ...
fn fibonacci(attempt: u32) -> u64 {
    let (mut prev, mut curr) = (1u64, 1u64);
    for _ in 2..attempt {
        let next = prev.saturating_add(curr);
        prev = curr;
        curr = next;
    }
    curr
}

/// Exponential multiplier for an attempt number: 1, 2, 4, 8, ...
pub fn exponential_multiplier(attempt: u32) -> u32 {
    1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX)
}

// ─────────────────────────────────────────────────────────────────────────────
// Retry Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Callback invoked after a failed attempt that will be retried.
pub type OnRetry = Arc<dyn Fn(u32, &str) + Send + Sync>;

/// Retry policy for one call site.
#[derive(Clone)]
pub struct RetryConfig {
    /// Total attempts, at least 1
    pub max_attempts: u32,
    /// Backoff strategy
    pub strategy: BackoffStrategy,
    /// Base delay fed into the strategy
    pub base_delay: Duration,
    /// Cap applied to every computed delay
    pub max_delay: Duration,
    /// Called with (attempt, error) after each failure that will be retried
    pub on_retry: Option<OnRetry>,
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("strategy", &self.strategy)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: BackoffStrategy::Exponential,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            on_retry: None,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given attempts and strategy
    pub fn new(max_attempts: u32, strategy: BackoffStrategy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            strategy,
            ..Default::default()
        }
    }

    /// Set base delay
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set max delay
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the on-retry callback
    pub fn on_retry(mut self, callback: impl Fn(u32, &str) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    /// Delay to wait after a failed `attempt` (1-based), capped at `max_delay`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.strategy {
            BackoffStrategy::Immediate => Duration::ZERO,
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                self.base_delay.saturating_mul(exponential_multiplier(attempt))
            }
            BackoffStrategy::Fibonacci => {
                let factor = u32::try_from(fibonacci(attempt)).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
        };
        delay.min(self.max_delay)
    }
}

impl From<&crate::config::RetrySettings> for RetryConfig {
    fn from(settings: &crate::config::RetrySettings) -> Self {
        Self::new(settings.max_attempts, settings.strategy)
            .with_base_delay(Duration::from_millis(settings.base_delay_ms))
            .with_max_delay(Duration::from_millis(settings.max_delay_ms))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Attempt History
// ─────────────────────────────────────────────────────────────────────────────

/// One recorded attempt of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub attempt: u32,
    /// Whether the attempt succeeded
    pub success: bool,
    /// Error text for failed attempts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the attempt finished
    pub timestamp: DateTime<Utc>,
}

/// Aggregate statistics over an operation's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryStats {
    pub operation: String,
    pub total_attempts: usize,
    pub successes: usize,
    pub failures: usize,
    /// Fraction of successful attempts (0.0 when no attempts)
    pub success_rate: f64,
    pub last_error: Option<String>,
}

/// Outcome of a retried operation.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Whether any attempt succeeded
    pub success: bool,
    /// Value of the successful attempt
    pub result: Option<T>,
    /// Error of the last failed attempt
    pub last_error: Option<String>,
    /// Attempts made
    pub attempts: u32,
}

impl<T> RetryOutcome<T> {
    /// Convert into a `Result`, keeping the last error text.
    pub fn into_result(self) -> Result<T, String> {
        match self.result {
            Some(value) if self.success => Ok(value),
            _ => Err(self
                .last_error
                .unwrap_or_else(|| "operation failed".to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Retry Executor
// ─────────────────────────────────────────────────────────────────────────────

/// Executes operations with backoff and optional automatic recovery.
pub struct RetryExecutor {
    history: Mutex<HashMap<String, OperationHistory>>,
    history_limit: usize,
    recovery: Arc<dyn RecoveryHandler>,
}

/// Attempts of one operation plus how many of the newest were never persisted.
#[derive(Debug, Default)]
struct OperationHistory {
    records: Vec<AttemptRecord>,
    unpersisted: usize,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryExecutor {
    /// Create an executor without recovery actions
    pub fn new() -> Self {
        Self::with_recovery(Arc::new(NoopRecovery))
    }

    /// Create an executor that runs recovery actions through `handler`
    pub fn with_recovery(handler: Arc<dyn RecoveryHandler>) -> Self {
        Self {
            history: Mutex::new(HashMap::new()),
            history_limit: DEFAULT_HISTORY_LIMIT,
            recovery: handler,
        }
    }

    /// Run `operation` up to `config.max_attempts` times.
    ///
    /// Never sleeps after the final attempt.
    pub async fn retry_with_backoff<F, Fut, T, E>(
        &self,
        name: &str,
        config: &RetryConfig,
        mut operation: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = config.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match operation().await {
                Ok(value) => {
                    self.record(name, attempt, None).await;
                    if attempt > 1 {
                        info!(operation = %name, attempt, "Operation succeeded after retry");
                    }
                    return RetryOutcome {
                        success: true,
                        result: Some(value),
                        last_error: None,
                        attempts: attempt,
                    };
                }
                Err(err) => {
                    let message = err.to_string();
                    self.record(name, attempt, Some(message.clone())).await;

                    if attempt < max_attempts {
                        if let Some(ref on_retry) = config.on_retry {
                            on_retry(attempt, &message);
                        }
                        let delay = config.calculate_delay(attempt);
                        debug!(
                            operation = %name,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %message,
                            "Attempt failed, backing off"
                        );
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    } else {
                        warn!(
                            operation = %name,
                            attempts = max_attempts,
                            error = %message,
                            "Operation failed after all attempts"
                        );
                    }
                    last_error = Some(message);
                }
            }
        }

        RetryOutcome {
            success: false,
            result: None,
            last_error,
            attempts: max_attempts,
        }
    }

    /// Run the auto-executable recovery actions for `error`, then invoke
    /// `operation` once after the first action that succeeds.
    ///
    /// Does not move on to further actions if the re-invoked operation fails.
    pub async fn auto_recover<F, Fut, T, E>(
        &self,
        name: &str,
        error: &str,
        operation: F,
    ) -> RetryOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let actions: Vec<RecoveryAction> = detect_recoverable_errors(error)
            .into_iter()
            .filter(|a| a.auto_execute)
            .collect();

        if actions.is_empty() {
            debug!(operation = %name, "No automatic recovery available");
            return RetryOutcome {
                success: false,
                result: None,
                last_error: Some(error.to_string()),
                attempts: 0,
            };
        }

        for action in &actions {
            info!(
                operation = %name,
                action = %action.kind,
                "Running recovery action"
            );
            if !self.recovery.execute(action, name).await {
                warn!(operation = %name, action = %action.kind, "Recovery action failed");
                continue;
            }

            let attempt = self.next_attempt_number(name).await;
            return match operation().await {
                Ok(value) => {
                    self.record(name, attempt, None).await;
                    info!(operation = %name, action = %action.kind, "Recovered");
                    RetryOutcome {
                        success: true,
                        result: Some(value),
                        last_error: None,
                        attempts: 1,
                    }
                }
                Err(err) => {
                    let message = err.to_string();
                    self.record(name, attempt, Some(message.clone())).await;
                    warn!(
                        operation = %name,
                        action = %action.kind,
                        error = %message,
                        "Operation still failing after recovery"
                    );
                    RetryOutcome {
                        success: false,
                        result: None,
                        last_error: Some(message),
                        attempts: 1,
                    }
                }
            };
        }

        RetryOutcome {
            success: false,
            result: None,
            last_error: Some(error.to_string()),
            attempts: 0,
        }
    }

    /// Retry with backoff, falling back to one round of automatic recovery.
    pub async fn run_with_healing<F, Fut, T, E>(
        &self,
        name: &str,
        config: &RetryConfig,
        mut operation: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let outcome = self.retry_with_backoff(name, config, &mut operation).await;
        if outcome.success {
            return outcome;
        }

        let Some(error) = outcome.last_error.clone() else {
            return outcome;
        };
        let mut healed = self.auto_recover(name, &error, operation).await;
        healed.attempts += outcome.attempts;
        healed
    }

    /// Attempt history for an operation
    pub async fn history(&self, name: &str) -> Vec<AttemptRecord> {
        let history = self.history.lock().await;
        history
            .get(name)
            .map(|h| h.records.clone())
            .unwrap_or_default()
    }

    /// Drop the history of an operation
    pub async fn clear_history(&self, name: &str) {
        let mut history = self.history.lock().await;
        history.remove(name);
    }

    /// Aggregate statistics for an operation
    pub async fn stats(&self, name: &str) -> RetryStats {
        let history = self.history.lock().await;
        let records = history.get(name).map(|h| h.records.as_slice()).unwrap_or(&[]);

        let successes = records.iter().filter(|r| r.success).count();
        let failures = records.len() - successes;
        let success_rate = if records.is_empty() {
            0.0
        } else {
            successes as f64 / records.len() as f64
        };

        RetryStats {
            operation: name.to_string(),
            total_attempts: records.len(),
            successes,
            failures,
            success_rate,
            last_error: records.iter().rev().find_map(|r| r.error.clone()),
        }
    }

    /// Forward the attempts recorded since the last persist to the metrics
    /// collaborator.
    ///
    /// Failures are logged and reported as `false`, never propagated; the
    /// same attempts are offered again on the next call.
    pub async fn persist_history(&self, name: &str, sink: &dyn MetricsSink) -> bool {
        let pending = {
            let history = self.history.lock().await;
            match history.get(name) {
                Some(h) => h.records[h.records.len() - h.unpersisted..].to_vec(),
                None => Vec::new(),
            }
        };
        if pending.is_empty() {
            return true;
        }

        match sink.record_attempt_history(name, &pending).await {
            Ok(()) => {
                let mut history = self.history.lock().await;
                if let Some(h) = history.get_mut(name) {
                    h.unpersisted = h.unpersisted.saturating_sub(pending.len());
                }
                true
            }
            Err(e) => {
                warn!(operation = %name, error = %e, "Failed to persist retry history");
                false
            }
        }
    }

    // Private helpers

    async fn record(&self, name: &str, attempt: u32, error: Option<String>) {
        let mut history = self.history.lock().await;
        let entry = history.entry(name.to_string()).or_default();
        entry.records.push(AttemptRecord {
            attempt,
            success: error.is_none(),
            error,
            timestamp: Utc::now(),
        });
        entry.unpersisted += 1;
        if entry.records.len() > self.history_limit {
            let excess = entry.records.len() - self.history_limit;
            entry.records.drain(..excess);
            entry.unpersisted = entry.unpersisted.min(entry.records.len());
        }
    }

    async fn next_attempt_number(&self, name: &str) -> u32 {
        let history = self.history.lock().await;
        history
            .get(name)
            .and_then(|h| h.records.last())
            .map(|r| r.attempt + 1)
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::assert_err;

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|v| Duration::from_secs(*v)).collect()
    }

    fn delays(strategy: BackoffStrategy) -> Vec<Duration> {
        let config = RetryConfig::new(5, strategy)
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(1000));
        (1..=4).map(|a| config.calculate_delay(a)).collect()
    }

    #[test]
    fn test_backoff_formulas() {
        assert_eq!(delays(BackoffStrategy::Exponential), secs(&[1, 2, 4, 8]));
        assert_eq!(delays(BackoffStrategy::Fibonacci), secs(&[1, 1, 2, 3]));
        assert_eq!(delays(BackoffStrategy::Linear), secs(&[1, 2, 3, 4]));
        assert_eq!(delays(BackoffStrategy::Immediate), secs(&[0, 0, 0, 0]));
    }

    #[test]
    fn test_backoff_capped_at_max_delay() {
        let config = RetryConfig::new(10, BackoffStrategy::Exponential)
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5));
        assert_eq!(config.calculate_delay(3), Duration::from_secs(4));
        assert_eq!(config.calculate_delay(4), Duration::from_secs(5));
        assert_eq!(config.calculate_delay(40), Duration::from_secs(5));
    }

    #[test]
    fn test_fibonacci_sequence() {
        let seq: Vec<u64> = (1..=8).map(fibonacci).collect();
        assert_eq!(seq, vec![1, 1, 2, 3, 5, 8, 13, 21]);
        assert_eq!(fibonacci(0), 1);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("fibonacci".parse(), Ok(BackoffStrategy::Fibonacci));
        assert!("random".parse::<BackoffStrategy>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_third_attempt() {
        let executor = RetryExecutor::new();
        let calls = AtomicU32::new(0);
        let retried = Arc::new(AtomicU32::new(0));
        let retried_cb = retried.clone();

        let config = RetryConfig::new(5, BackoffStrategy::Linear)
            .with_base_delay(Duration::from_millis(100))
            .on_retry(move |_, _| {
                retried_cb.fetch_add(1, Ordering::SeqCst);
            });

        let outcome = executor
            .retry_with_backoff("clone", &config, || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(format!("connection reset (call {n})"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.result, Some(3));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(retried.load(Ordering::SeqCst), 2);

        let stats = executor.stats("clone").await;
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.last_error.as_deref(), Some("connection reset (call 2)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_without_trailing_sleep() {
        let executor = RetryExecutor::new();
        let config = RetryConfig::new(3, BackoffStrategy::Exponential)
            .with_base_delay(Duration::from_secs(1));

        let started = tokio::time::Instant::now();
        let outcome = executor
            .retry_with_backoff("build", &config, || async {
                Err::<(), _>("compile error")
            })
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.last_error.as_deref(), Some("compile error"));
        // 1s + 2s between attempts, none after the last one
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_err!(outcome.into_result());
    }

    #[tokio::test]
    async fn test_auto_recover_without_actions_fails() {
        let executor = RetryExecutor::new();
        let outcome = executor
            .auto_recover("deploy", "unexpected token", || async { Ok::<_, String>(1) })
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 0);
    }

    #[tokio::test]
    async fn test_auto_recover_noop_handler_never_reinvokes() {
        let executor = RetryExecutor::new();
        let invoked = AtomicU32::new(0);
        let outcome = executor
            .auto_recover("deploy", "checksum mismatch", || async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await;
        assert!(!outcome.success);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    struct AlwaysRecovers;

    #[async_trait::async_trait]
    impl RecoveryHandler for AlwaysRecovers {
        async fn execute(&self, _action: &RecoveryAction, _operation: &str) -> bool {
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_healing_recovers_once() {
        let executor = RetryExecutor::with_recovery(Arc::new(AlwaysRecovers));
        let calls = AtomicU32::new(0);
        let config = RetryConfig::new(2, BackoffStrategy::Immediate);

        let outcome = executor
            .run_with_healing("pip_install", &config, || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n <= 2 {
                        Err("hash mismatch for wheel".to_string())
                    } else {
                        Ok("installed")
                    }
                }
            })
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(executor.history("pip_install").await.len(), 3);
    }

    #[tokio::test]
    async fn test_recovered_operation_failing_does_not_cascade() {
        let executor = RetryExecutor::with_recovery(Arc::new(AlwaysRecovers));
        let outcome = executor
            .auto_recover(
                "npm_build",
                "connection timed out; build failed",
                || async { Err::<(), _>("still broken") },
            )
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.last_error.as_deref(), Some("still broken"));
    }

    #[tokio::test]
    async fn test_clear_history() {
        let executor = RetryExecutor::new();
        let config = RetryConfig::new(1, BackoffStrategy::Immediate);
        executor
            .retry_with_backoff("op", &config, || async { Ok::<_, String>(()) })
            .await;
        assert_eq!(executor.history("op").await.len(), 1);
        executor.clear_history("op").await;
        assert!(executor.history("op").await.is_empty());
        assert_eq!(executor.stats("op").await.success_rate, 0.0);
    }

    #[tokio::test]
    async fn test_persist_history_forwards_new_attempts_only() {
        use crate::metrics::InMemoryMetrics;

        let executor = RetryExecutor::new();
        let sink = InMemoryMetrics::new();
        let config = RetryConfig::new(2, BackoffStrategy::Immediate);

        executor
            .retry_with_backoff("install:db", &config, || async { Err::<(), _>("disk full") })
            .await;
        assert!(executor.persist_history("install:db", &sink).await);
        assert!(executor.persist_history("install:db", &sink).await);
        assert_eq!(sink.addon_metrics("install:db").await.unwrap().retry_attempts, 2);

        executor
            .retry_with_backoff("install:db", &config, || async { Ok::<_, String>(()) })
            .await;
        assert!(executor.persist_history("install:db", &sink).await);
        assert_eq!(sink.addon_metrics("install:db").await.unwrap().retry_attempts, 3);
        assert_eq!(executor.history("install:db").await.len(), 3);
    }
}
