//! Hook execution with timeouts, retries and enforcement.

use std::sync::Arc;
use std::time::Duration;

use deckhand_core::metrics::{HookRun, MetricsSink};
use deckhand_core::retry::exponential_multiplier;
use deckhand_core::{Enforcement, HookContext, HookResult};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::handlers::{join_error, HookError};
use super::registry::{HookOptions, HookRegistration, HookRegistry};

/// Abort raised by `trigger` under `fail_fast`.
#[derive(Debug, Error)]
pub enum HookExecutionError {
    /// A required hook exhausted its attempts.
    ///
    /// `results` holds every result recorded so far, the failing one last.
    #[error("Required hook '{hook_name}' of addon '{addon_name}' failed: {error}")]
    EnforcementFailed {
        addon_name: String,
        hook_name: String,
        error: String,
        results: Vec<HookResult>,
    },
}

impl HookExecutionError {
    /// Results recorded before the abort
    pub fn results(&self) -> &[HookResult] {
        match self {
            Self::EnforcementFailed { results, .. } => results,
        }
    }
}

/// Delay before retrying after a failed `attempt` (1-based).
pub fn retry_delay(options: &HookOptions, attempt: u32) -> Duration {
    let initial = Duration::from_millis(options.retry_initial_delay_ms);
    if options.retry_backoff {
        initial.saturating_mul(exponential_multiplier(attempt))
    } else {
        initial
    }
}

/// Runs the hooks registered for an event.
pub struct HookExecutor {
    registry: Arc<HookRegistry>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl HookExecutor {
    /// Create an executor over a populated registry
    pub fn new(registry: Arc<HookRegistry>) -> Self {
        Self {
            registry,
            metrics: None,
        }
    }

    /// Report every completed hook to `sink`
    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// The registry this executor reads from
    pub fn registry(&self) -> &HookRegistry {
        &self.registry
    }

    /// Run every hook registered for `event`.
    ///
    /// Hooks run one after another in ascending priority, ties in
    /// registration order. With `fail_fast`, a failed required hook stops the
    /// run and no later hook is invoked.
    pub async fn trigger(
        &self,
        event: &str,
        mut context: HookContext,
        fail_fast: bool,
    ) -> Result<Vec<HookResult>, HookExecutionError> {
        context.event = event.to_string();
        let context = Arc::new(context);

        let mut hooks = self.registry.get_hooks(event);
        hooks.sort_by_key(|h| h.options.priority);

        info!(
            event = %event,
            run_id = %context.run_id,
            hooks = hooks.len(),
            fail_fast,
            "Triggering hooks"
        );

        let mut results = Vec::with_capacity(hooks.len());
        for hook in &hooks {
            if !context.matches_conditions(&hook.options.conditions) {
                debug!(
                    event = %event,
                    addon = %hook.addon_name,
                    hook = %hook.hook_name(),
                    "Conditions not met, skipping hook"
                );
                results.push(HookResult::skipped(&hook.addon_name, hook.hook_name()));
                continue;
            }

            let result = self.run_hook(hook, &context).await;
            self.record_metrics(event, &result).await;

            let abort = fail_fast
                && hook.options.enforcement == Enforcement::Required
                && result.is_failure();
            if abort {
                let error = result.error.clone().unwrap_or_default();
                error!(
                    event = %event,
                    addon = %hook.addon_name,
                    hook = %hook.hook_name(),
                    error = %error,
                    "Required hook failed, aborting"
                );
                results.push(result);
                return Err(HookExecutionError::EnforcementFailed {
                    addon_name: hook.addon_name.clone(),
                    hook_name: hook.hook_name().to_string(),
                    error,
                    results,
                });
            }
            results.push(result);
        }

        Ok(results)
    }

    /// Run one hook through all of its attempts.
    async fn run_hook(&self, hook: &HookRegistration, context: &Arc<HookContext>) -> HookResult {
        let started = Instant::now();
        let max_attempts = hook.options.retries.saturating_add(1);
        let mut attempts = 0;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            attempts = attempt;
            match run_attempt(hook, context.clone()).await {
                Ok(()) => {
                    debug!(addon = %hook.addon_name, hook = %hook.hook_name(), attempt, "Hook succeeded");
                    last_error = None;
                    break;
                }
                Err(err) => {
                    warn!(
                        addon = %hook.addon_name,
                        hook = %hook.hook_name(),
                        attempt,
                        max_attempts,
                        error = %err,
                        "Hook attempt failed"
                    );
                    last_error = Some(err.to_string());
                    if attempt < max_attempts {
                        tokio::time::sleep(retry_delay(&hook.options, attempt)).await;
                    }
                }
            }
        }

        HookResult {
            addon_name: hook.addon_name.clone(),
            hook_name: hook.hook_name().to_string(),
            success: last_error.is_none(),
            error: last_error,
            duration_ms: started.elapsed().as_millis() as u64,
            attempts,
            skipped: false,
        }
    }

    async fn record_metrics(&self, event: &str, result: &HookResult) {
        let Some(ref sink) = self.metrics else {
            return;
        };
        if let Err(e) = sink.record_hook_run(&HookRun::from_result(event, result)).await {
            warn!(addon = %result.addon_name, error = %e, "Failed to record hook metrics");
        }
    }
}

/// Run one attempt in its own task, bounded by the hook's timeout.
///
/// A timed-out task is aborted; it owns its result slot, so nothing it does
/// afterwards reaches the executor.
async fn run_attempt(hook: &HookRegistration, context: Arc<HookContext>) -> Result<(), HookError> {
    let handler = hook.handler.clone();
    let mut task = tokio::spawn(async move { handler.invoke(context).await });

    let joined = match hook.options.timeout_ms {
        Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                task.abort();
                return Err(HookError::Timeout(ms));
            }
        },
        None => task.await,
    };

    joined.unwrap_or_else(|e| Err(join_error(e)))
}
