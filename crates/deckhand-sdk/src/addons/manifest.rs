//! Addon manifest (`addon.json`).

use std::path::PathBuf;

use deckhand_core::config::HookDefaults;
use deckhand_core::types::Conditions;
use deckhand_core::Enforcement;
use serde::{Deserialize, Serialize};

use crate::hooks::HookOptions;
use crate::utils::{validate_addon_name, validate_event_name, validate_version, ValidationError};

/// File name of the manifest inside an addon directory.
pub const MANIFEST_FILE: &str = "addon.json";

/// Declarative description of an addon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Names of addons that must be installed first
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Install script, relative to the addon directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<PathBuf>,
    /// Uninstall script, relative to the addon directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uninstall: Option<PathBuf>,
    #[serde(default)]
    pub hooks: Vec<HookSpec>,
}

/// How a hook's handler is provided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandlerSpec {
    /// Bash script, relative to the addon directory
    Script { path: PathBuf },
    /// URL receiving the context as a JSON POST
    Webhook { url: String },
    /// Handler supplied by the host under this name
    Builtin { name: String },
}

/// One hook declared by an addon.
///
/// Unset policy fields fall back to the configured hook defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookSpec {
    pub event: String,
    pub handler: HandlerSpec,
    /// Hook name, defaults to `<addon>:<event>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// `0` disables the timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_initial_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff: Option<bool>,
    #[serde(default)]
    pub enforcement: Enforcement,
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
}

impl HookSpec {
    /// Hook name, derived from addon and event when not set
    pub fn hook_name(&self, addon_name: &str) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{addon_name}:{}", self.event))
    }

    /// Registration options, with `defaults` filling unset fields
    pub fn options(&self, defaults: &HookDefaults) -> HookOptions {
        let mut options = HookOptions::from(defaults)
            .enforcement(self.enforcement)
            .retry_delay(
                self.retry_initial_delay_ms
                    .unwrap_or(defaults.retry_initial_delay_ms),
                self.retry_backoff.unwrap_or(defaults.retry_backoff),
            );
        if let Some(priority) = self.priority {
            options = options.priority(priority);
        }
        if let Some(timeout) = self.timeout_ms {
            options = options.timeout_ms((timeout > 0).then_some(timeout));
        }
        if let Some(retries) = self.retries {
            options = options.retries(retries);
        }
        options.conditions = self.conditions.clone();
        options
    }
}

impl AddonManifest {
    /// Validate names, version and hook events
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_addon_name(&self.name)?;
        validate_version(&self.version)?;
        for dependency in &self.dependencies {
            validate_addon_name(dependency)?;
        }
        for hook in &self.hooks {
            validate_event_name(&hook.event)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MANIFEST: &str = r#"{
        "name": "slack-notify",
        "version": "1.2.0",
        "description": "Posts deployment results to Slack",
        "dependencies": ["http-client"],
        "install": "scripts/install.sh",
        "hooks": [
            {
                "event": "post_deployment",
                "handler": {"type": "webhook", "url": "https://hooks.example.com/T000"},
                "priority": 50,
                "retries": 2,
                "conditions": {"env": "production"}
            },
            {
                "event": "deployment_failed",
                "handler": {"type": "builtin", "name": "page-oncall"},
                "enforcement": "required",
                "timeout_ms": 0
            }
        ]
    }"#;

    #[test]
    fn test_parse_manifest() {
        let manifest: AddonManifest = serde_json::from_str(MANIFEST).unwrap();
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.dependencies, vec!["http-client"]);
        assert_eq!(manifest.install, Some(PathBuf::from("scripts/install.sh")));
        assert_eq!(manifest.uninstall, None);
        assert_eq!(
            manifest.hooks[1].handler,
            HandlerSpec::Builtin {
                name: "page-oncall".into()
            }
        );
    }

    #[test]
    fn test_hook_options_merge_defaults() {
        let manifest: AddonManifest = serde_json::from_str(MANIFEST).unwrap();
        let defaults = HookDefaults::default();

        let notify = manifest.hooks[0].options(&defaults);
        assert_eq!(notify.priority, 50);
        assert_eq!(notify.retries, 2);
        assert_eq!(notify.timeout_ms, Some(5000));
        assert_eq!(notify.enforcement, Enforcement::Optional);
        assert_eq!(notify.conditions.get("env"), Some(&json!("production")));

        let page = manifest.hooks[1].options(&defaults);
        assert_eq!(page.priority, 100);
        assert_eq!(page.timeout_ms, None);
        assert_eq!(page.enforcement, Enforcement::Required);

        assert_eq!(manifest.hooks[0].hook_name("slack-notify"), "slack-notify:post_deployment");
    }

    #[test]
    fn test_invalid_manifest() {
        let mut manifest: AddonManifest = serde_json::from_str(MANIFEST).unwrap();
        manifest.version = "latest".into();
        assert!(manifest.validate().is_err());

        let mut manifest: AddonManifest = serde_json::from_str(MANIFEST).unwrap();
        manifest.hooks[0].event = "Post Deploy".into();
        assert!(manifest.validate().is_err());
    }
}
