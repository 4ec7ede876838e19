//! Hook types shared between the executor, handlers and the metrics store.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle Events
// ─────────────────────────────────────────────────────────────────────────────

/// Well-known lifecycle events.
///
/// The event vocabulary is open: any string may be used as an event name,
/// `Custom` carries names that are not listed here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HookEvent {
    /// Before deployment steps run.
    PreDeployment,
    /// After deployment steps completed.
    PostDeployment,
    /// A deployment failed.
    DeploymentFailed,
    /// Periodic or on-demand health check.
    HealthCheck,
    /// Before an addon install operation.
    PreInstall,
    /// After an addon install operation.
    PostInstall,
    /// Before an addon uninstall operation.
    PreUninstall,
    /// After an addon uninstall operation.
    PostUninstall,
    /// Any other event name.
    Custom(String),
}

impl HookEvent {
    /// Canonical string name of the event.
    pub fn as_str(&self) -> &str {
        match self {
            HookEvent::PreDeployment => "pre_deployment",
            HookEvent::PostDeployment => "post_deployment",
            HookEvent::DeploymentFailed => "deployment_failed",
            HookEvent::HealthCheck => "health_check",
            HookEvent::PreInstall => "pre_install",
            HookEvent::PostInstall => "post_install",
            HookEvent::PreUninstall => "pre_uninstall",
            HookEvent::PostUninstall => "post_uninstall",
            HookEvent::Custom(name) => name,
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for HookEvent {
    fn from(name: &str) -> Self {
        match name {
            "pre_deployment" => HookEvent::PreDeployment,
            "post_deployment" => HookEvent::PostDeployment,
            "deployment_failed" => HookEvent::DeploymentFailed,
            "health_check" => HookEvent::HealthCheck,
            "pre_install" => HookEvent::PreInstall,
            "post_install" => HookEvent::PostInstall,
            "pre_uninstall" => HookEvent::PreUninstall,
            "post_uninstall" => HookEvent::PostUninstall,
            other => HookEvent::Custom(other.to_string()),
        }
    }
}

impl From<String> for HookEvent {
    fn from(name: String) -> Self {
        HookEvent::from(name.as_str())
    }
}

impl From<HookEvent> for String {
    fn from(event: HookEvent) -> Self {
        event.as_str().to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Enforcement
// ─────────────────────────────────────────────────────────────────────────────

/// Whether a hook failure may block the triggering workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Enforcement {
    /// Failure is recorded, the workflow proceeds.
    #[default]
    Optional,
    /// Failure aborts the workflow when triggered with `fail_fast`.
    Required,
}

impl fmt::Display for Enforcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Enforcement::Optional => write!(f, "optional"),
            Enforcement::Required => write!(f, "required"),
        }
    }
}

impl FromStr for Enforcement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "optional" => Ok(Enforcement::Optional),
            "required" => Ok(Enforcement::Required),
            other => Err(format!("unknown enforcement level: {other}")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hook Context
// ─────────────────────────────────────────────────────────────────────────────

/// Condition map: field name -> expected value.
pub type Conditions = HashMap<String, Value>;

/// Context passed to every hook invoked for one `trigger()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookContext {
    /// Identifier of this trigger run (for log correlation).
    pub run_id: Uuid,
    /// Event being triggered.
    pub event: String,
    /// Deployment the event belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    /// Project the deployment belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Target environment (production, staging, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Arbitrary metadata supplied by the caller.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl HookContext {
    /// Create a new context for an event.
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            event: event.into(),
            deployment_id: None,
            project_id: None,
            environment: None,
            metadata: HashMap::new(),
        }
    }

    /// Set deployment ID.
    pub fn with_deployment(mut self, deployment_id: impl Into<String>) -> Self {
        self.deployment_id = Some(deployment_id.into());
        self
    }

    /// Set project ID.
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Set environment.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Look up a top-level attribute by name.
    ///
    /// `env` is accepted as an alias for `environment`.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        let value = match name {
            "event" => Some(&self.event),
            "deployment_id" => self.deployment_id.as_ref(),
            "project_id" => self.project_id.as_ref(),
            "environment" | "env" => self.environment.as_ref(),
            _ => None,
        };
        value.map(|v| Value::String(v.clone()))
    }

    /// Check that every condition equals either a top-level attribute or a
    /// metadata entry of the same name.
    pub fn matches_conditions(&self, conditions: &Conditions) -> bool {
        conditions.iter().all(|(key, expected)| {
            self.attribute(key).as_ref() == Some(expected)
                || self.metadata.get(key) == Some(expected)
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hook Result
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of one hook invocation (all of its attempts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookResult {
    /// Addon that registered the hook.
    pub addon_name: String,
    /// Name of the hook handler.
    pub hook_name: String,
    /// Whether the hook succeeded (skipped hooks count as success).
    pub success: bool,
    /// Last error, cleared on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration of the whole attempt sequence.
    pub duration_ms: u64,
    /// Number of attempts made.
    pub attempts: u32,
    /// True when the hook's conditions did not match the context.
    pub skipped: bool,
}

impl HookResult {
    /// Result for a hook whose conditions did not match.
    pub fn skipped(addon_name: impl Into<String>, hook_name: impl Into<String>) -> Self {
        Self {
            addon_name: addon_name.into(),
            hook_name: hook_name.into(),
            success: true,
            error: None,
            duration_ms: 0,
            attempts: 0,
            skipped: true,
        }
    }

    /// Whether the hook ran and failed.
    pub fn is_failure(&self) -> bool {
        !self.success && !self.skipped
    }
}
