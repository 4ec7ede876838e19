//! Hook registrations keyed by lifecycle event.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use deckhand_core::config::HookDefaults;
use deckhand_core::types::Conditions;
use deckhand_core::Enforcement;
use serde_json::Value;

use super::handlers::HookHandler;

/// Per-registration execution policy.
#[derive(Debug, Clone, PartialEq)]
pub struct HookOptions {
    /// Lower runs first (default 100).
    pub priority: i32,
    /// Per-attempt timeout; `None` runs unbounded.
    pub timeout_ms: Option<u64>,
    /// Retry attempts after the first failure.
    pub retries: u32,
    pub retry_initial_delay_ms: u64,
    /// Exponential (true) or constant (false) delay between attempts.
    pub retry_backoff: bool,
    pub enforcement: Enforcement,
    /// Every entry must match the context for the hook to run.
    pub conditions: Conditions,
}

impl Default for HookOptions {
    fn default() -> Self {
        Self::from(&HookDefaults::default())
    }
}

impl From<&HookDefaults> for HookOptions {
    fn from(defaults: &HookDefaults) -> Self {
        Self {
            priority: defaults.priority,
            timeout_ms: (defaults.timeout_ms > 0).then_some(defaults.timeout_ms),
            retries: defaults.retries,
            retry_initial_delay_ms: defaults.retry_initial_delay_ms,
            retry_backoff: defaults.retry_backoff,
            enforcement: Enforcement::Optional,
            conditions: Conditions::new(),
        }
    }
}

impl HookOptions {
    /// Set priority
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set timeout (`None` disables it)
    pub fn timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set retry count
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set delay before the first retry and whether it doubles
    pub fn retry_delay(mut self, initial_delay_ms: u64, backoff: bool) -> Self {
        self.retry_initial_delay_ms = initial_delay_ms;
        self.retry_backoff = backoff;
        self
    }

    /// Mark the hook as required
    pub fn required(mut self) -> Self {
        self.enforcement = Enforcement::Required;
        self
    }

    /// Set enforcement
    pub fn enforcement(mut self, enforcement: Enforcement) -> Self {
        self.enforcement = enforcement;
        self
    }

    /// Add a condition
    pub fn condition(mut self, key: impl Into<String>, value: Value) -> Self {
        self.conditions.insert(key.into(), value);
        self
    }
}

/// One addon's subscription to one lifecycle event.
#[derive(Clone)]
pub struct HookRegistration {
    pub event: String,
    pub addon_name: String,
    pub handler: Arc<dyn HookHandler>,
    pub options: HookOptions,
}

impl HookRegistration {
    /// Name of the registered handler
    pub fn hook_name(&self) -> &str {
        self.handler.name()
    }
}

impl fmt::Debug for HookRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistration")
            .field("event", &self.event)
            .field("addon_name", &self.addon_name)
            .field("hook_name", &self.hook_name())
            .field("options", &self.options)
            .finish()
    }
}

/// Registry of hooks, populated during addon discovery.
///
/// Built mutably at startup and then shared as `Arc<HookRegistry>`; shared
/// readers never observe mutation.
#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<String, Vec<HookRegistration>>,
}

impl HookRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook for `event`.
    ///
    /// Unknown events are created on demand. The same addon may register
    /// several hooks for one event; nothing is deduplicated.
    pub fn register_hook(
        &mut self,
        event: impl Into<String>,
        handler: Arc<dyn HookHandler>,
        addon_name: impl Into<String>,
        options: HookOptions,
    ) {
        let event = event.into();
        let registration = HookRegistration {
            event: event.clone(),
            addon_name: addon_name.into(),
            handler,
            options,
        };
        tracing::debug!(
            event = %registration.event,
            addon = %registration.addon_name,
            hook = %registration.hook_name(),
            priority = registration.options.priority,
            "Registered hook"
        );
        self.hooks.entry(event).or_default().push(registration);
    }

    /// Snapshot of the registrations for `event`, in registration order.
    pub fn get_hooks(&self, event: &str) -> Vec<HookRegistration> {
        self.hooks.get(event).cloned().unwrap_or_default()
    }

    /// Events with at least one registration, sorted.
    pub fn events(&self) -> Vec<&str> {
        let mut events: Vec<&str> = self.hooks.keys().map(String::as_str).collect();
        events.sort_unstable();
        events
    }

    /// Registrations belonging to one addon, across all events.
    pub fn hooks_for_addon(&self, addon_name: &str) -> Vec<HookRegistration> {
        let mut hooks: Vec<HookRegistration> = self
            .hooks
            .values()
            .flatten()
            .filter(|r| r.addon_name == addon_name)
            .cloned()
            .collect();
        hooks.sort_by(|a, b| a.event.cmp(&b.event));
        hooks
    }

    /// Total number of registrations.
    pub fn len(&self) -> usize {
        self.hooks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::handlers::FnHandler;
    use serde_json::json;

    fn noop(name: &str) -> Arc<dyn HookHandler> {
        Arc::new(FnHandler::new(name, |_| Ok(())))
    }

    #[test]
    fn test_options_defaults() {
        let options = HookOptions::default();
        assert_eq!(options.priority, 100);
        assert_eq!(options.timeout_ms, Some(5000));
        assert_eq!(options.retries, 0);
        assert_eq!(options.retry_initial_delay_ms, 250);
        assert!(options.retry_backoff);
        assert_eq!(options.enforcement, Enforcement::Optional);
        assert!(options.conditions.is_empty());

        let unbounded = HookOptions::from(&HookDefaults {
            timeout_ms: 0,
            ..HookDefaults::default()
        });
        assert_eq!(unbounded.timeout_ms, None);
    }

    #[test]
    fn test_register_keeps_order_and_duplicates() {
        let mut registry = HookRegistry::new();
        registry.register_hook("pre_deployment", noop("first"), "audit", HookOptions::default());
        registry.register_hook(
            "pre_deployment",
            noop("second"),
            "audit",
            HookOptions::default().priority(10),
        );
        registry.register_hook("db_migrated", noop("custom"), "postgres", HookOptions::default());

        let hooks = registry.get_hooks("pre_deployment");
        let names: Vec<&str> = hooks.iter().map(|h| h.hook_name()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.events(), vec!["db_migrated", "pre_deployment"]);
        assert!(registry.get_hooks("health_check").is_empty());
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut registry = HookRegistry::new();
        registry.register_hook("post_deployment", noop("a"), "x", HookOptions::default());
        let snapshot = registry.get_hooks("post_deployment");
        registry.register_hook("post_deployment", noop("b"), "x", HookOptions::default());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.get_hooks("post_deployment").len(), 2);
    }

    #[test]
    fn test_hooks_for_addon() {
        let mut registry = HookRegistry::new();
        let options = HookOptions::default()
            .required()
            .condition("env", json!("production"));
        registry.register_hook("pre_deployment", noop("scan"), "security", options.clone());
        registry.register_hook("post_deployment", noop("report"), "security", options);
        registry.register_hook("post_deployment", noop("ping"), "slack", HookOptions::default());

        let hooks = registry.hooks_for_addon("security");
        assert_eq!(hooks.len(), 2);
        assert_eq!(hooks[0].event, "post_deployment");
        assert_eq!(hooks[1].options.enforcement, Enforcement::Required);
    }
}
