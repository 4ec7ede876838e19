//! Addon Loader
//!
//! Loads addon manifests from the filesystem and turns their hook
//! declarations into registered handlers.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use deckhand_core::config::HookDefaults;
use deckhand_core::resolver::{DependencyGraph, DependencyResolver, DependencyTree};
use deckhand_core::ResolutionError;
use tokio::fs;
use tracing::{debug, info, warn};

use super::manifest::{AddonManifest, HandlerSpec, MANIFEST_FILE};
use crate::error::{SdkError, SdkResult};
use crate::hooks::{HookHandler, HookRegistry, ScriptHandler};

/// A discovered addon.
#[derive(Debug, Clone, PartialEq)]
pub struct Addon {
    pub manifest: AddonManifest,
    /// Directory holding `addon.json`
    pub dir: PathBuf,
}

impl Addon {
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Absolute path of a script declared relative to the addon directory
    pub fn script_path(&self, relative: &Path) -> PathBuf {
        self.dir.join(relative)
    }
}

/// Addon loader
pub struct AddonLoader {
    directories: Vec<PathBuf>,
}

impl AddonLoader {
    /// Create a loader scanning `directories`
    pub fn new(directories: Vec<PathBuf>) -> Self {
        Self { directories }
    }

    /// Load an addon from its directory
    pub async fn load_from_dir(&self, path: &Path) -> SdkResult<Addon> {
        let manifest_path = path.join(MANIFEST_FILE);
        let display = manifest_path.display().to_string();

        let content = fs::read_to_string(&manifest_path)
            .await
            .map_err(|e| SdkError::manifest(&display, format!("failed to read: {e}")))?;
        let manifest: AddonManifest = serde_json::from_str(&content)
            .map_err(|e| SdkError::manifest(&display, format!("invalid JSON: {e}")))?;
        manifest
            .validate()
            .map_err(|e| SdkError::manifest(&display, e.to_string()))?;

        for script in manifest.install.iter().chain(manifest.uninstall.iter()) {
            if !path.join(script).is_file() {
                return Err(SdkError::manifest(
                    &display,
                    format!("script not found: {}", script.display()),
                ));
            }
        }

        debug!(addon = %manifest.name, version = %manifest.version, "Loaded addon manifest");
        Ok(Addon {
            manifest,
            dir: path.to_path_buf(),
        })
    }

    /// Scan directories for addons.
    ///
    /// Each subdirectory holding an `addon.json` yields one result, so a
    /// broken manifest does not hide the others.
    pub async fn scan(&self) -> Vec<SdkResult<Addon>> {
        let mut results = Vec::new();

        for dir in &self.directories {
            let Ok(mut entries) = fs::read_dir(dir).await else {
                debug!(dir = %dir.display(), "Addon directory not readable, skipping");
                continue;
            };

            let mut paths = Vec::new();
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.is_dir() && path.join(MANIFEST_FILE).exists() {
                    paths.push(path);
                }
            }
            paths.sort();

            for path in paths {
                results.push(self.load_from_dir(&path).await);
            }
        }

        results
    }

    /// Scan and build a catalog, logging and skipping broken addons.
    pub async fn load_catalog(&self) -> AddonCatalog {
        let mut addons = Vec::new();
        for result in self.scan().await {
            match result {
                Ok(addon) => addons.push(addon),
                Err(e) => warn!(error = %e, "Skipping addon"),
            }
        }
        AddonCatalog::new(addons)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

/// The set of known addons, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct AddonCatalog {
    addons: BTreeMap<String, Addon>,
    graph: DependencyGraph,
}

impl AddonCatalog {
    /// Build a catalog; a later addon with the same name replaces an earlier one.
    pub fn new(addons: impl IntoIterator<Item = Addon>) -> Self {
        let mut map = BTreeMap::new();
        for addon in addons {
            if let Some(previous) = map.insert(addon.name().to_string(), addon) {
                warn!(addon = %previous.name(), dir = %previous.dir.display(), "Duplicate addon replaced");
            }
        }
        let graph = map
            .iter()
            .map(|(name, addon)| (name.clone(), addon.manifest.dependencies.clone()))
            .collect();
        Self { addons: map, graph }
    }

    pub fn get(&self, name: &str) -> Option<&Addon> {
        self.addons.get(name)
    }

    /// Addons sorted by name
    pub fn addons(&self) -> impl Iterator<Item = &Addon> {
        self.addons.values()
    }

    pub fn len(&self) -> usize {
        self.addons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addons.is_empty()
    }

    /// Addon name -> dependency names
    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Resolver over this catalog's graph
    pub fn resolver(&self) -> DependencyResolver<'_> {
        DependencyResolver::new(&self.graph)
    }

    /// Dependencies-first install order for `name`
    pub fn install_order(&self, name: &str) -> Result<Vec<String>, ResolutionError> {
        self.resolver().resolve_install_order(name)
    }

    /// Dependents-first order for the whole catalog
    pub fn uninstall_order(&self) -> Result<Vec<String>, ResolutionError> {
        self.resolver().uninstall_order()
    }

    pub fn dependency_tree(&self, name: &str) -> DependencyTree {
        self.resolver().get_dependency_tree(name)
    }

    /// Human-readable graph problems (cycles, missing dependencies)
    pub fn validate(&self) -> Vec<String> {
        self.resolver().validate_graph()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hook Discovery
// ─────────────────────────────────────────────────────────────────────────────

/// Handlers supplied by the host application, referenced by name from
/// manifests (`{"type": "builtin", "name": ...}`).
#[derive(Default, Clone)]
pub struct BuiltinHandlers {
    handlers: HashMap<String, Arc<dyn HookHandler>>,
}

impl BuiltinHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `name`
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn HookHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn HookHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Resolve a manifest handler declaration into an invocable handler.
fn resolve_handler(
    addon: &Addon,
    hook_name: String,
    spec: &HandlerSpec,
    builtins: &BuiltinHandlers,
) -> SdkResult<Arc<dyn HookHandler>> {
    match spec {
        HandlerSpec::Script { path } => {
            let script = addon.script_path(path);
            if !script.is_file() {
                return Err(SdkError::handler(format!(
                    "addon '{}': script {} does not exist",
                    addon.name(),
                    script.display()
                )));
            }
            Ok(Arc::new(
                ScriptHandler::new(hook_name, addon.name(), script).with_working_dir(&addon.dir),
            ))
        }
        #[cfg(feature = "webhook")]
        HandlerSpec::Webhook { url } => Ok(Arc::new(crate::hooks::WebhookHandler::new(hook_name, url))),
        #[cfg(not(feature = "webhook"))]
        HandlerSpec::Webhook { url } => Err(SdkError::handler(format!(
            "addon '{}': webhook {url} requires the `webhook` feature",
            addon.name()
        ))),
        HandlerSpec::Builtin { name } => builtins
            .get(name)
            .ok_or_else(|| SdkError::not_found("builtin handler", name)),
    }
}

/// Register every hook declared by the catalog's addons.
///
/// Handlers are resolved up front; the first unresolvable handler aborts
/// discovery with the registry left untouched.
pub fn discover_hooks(
    catalog: &AddonCatalog,
    registry: &mut HookRegistry,
    builtins: &BuiltinHandlers,
    defaults: &HookDefaults,
) -> SdkResult<usize> {
    let mut resolved = Vec::new();
    for addon in catalog.addons() {
        for spec in &addon.manifest.hooks {
            let handler = resolve_handler(addon, spec.hook_name(addon.name()), &spec.handler, builtins)?;
            resolved.push((spec.event.clone(), handler, addon.name().to_string(), spec.options(defaults)));
        }
    }

    let count = resolved.len();
    for (event, handler, addon_name, options) in resolved {
        registry.register_hook(event, handler, addon_name, options);
    }
    info!(hooks = count, addons = catalog.len(), "Discovered addon hooks");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::FnHandler;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_addon(root: &Path, name: &str, manifest: serde_json::Value) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(dir.join("scripts")).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), manifest.to_string()).unwrap();
        dir
    }

    fn basic(name: &str, deps: &[&str]) -> serde_json::Value {
        json!({"name": name, "version": "1.0.0", "dependencies": deps})
    }

    #[tokio::test]
    async fn test_scan_reports_each_addon() {
        let tmp = TempDir::new().unwrap();
        write_addon(tmp.path(), "postgres", basic("postgres", &[]));
        write_addon(tmp.path(), "api", basic("api", &["postgres"]));
        write_addon(tmp.path(), "broken", json!({"name": "Broken!", "version": "1"}));
        std::fs::create_dir_all(tmp.path().join("not-an-addon")).unwrap();

        let loader = AddonLoader::new(vec![tmp.path().to_path_buf(), tmp.path().join("missing")]);
        let results = loader.scan().await;
        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);

        let catalog = loader.load_catalog().await;
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.install_order("api").unwrap(), vec!["postgres", "api"]);
        assert!(catalog.validate().is_empty());
    }

    #[tokio::test]
    async fn test_missing_install_script_rejected() {
        let tmp = TempDir::new().unwrap();
        let dir = write_addon(
            tmp.path(),
            "redis",
            json!({"name": "redis", "version": "7.2", "install": "scripts/install.sh"}),
        );
        let loader = AddonLoader::new(vec![]);
        let err = loader.load_from_dir(&dir).await.unwrap_err();
        assert!(err.to_string().contains("script not found"));

        std::fs::write(dir.join("scripts/install.sh"), "exit 0\n").unwrap();
        assert!(loader.load_from_dir(&dir).await.is_ok());
    }

    #[tokio::test]
    async fn test_catalog_reports_missing_dependency() {
        let tmp = TempDir::new().unwrap();
        write_addon(tmp.path(), "web", basic("web", &["cache"]));
        let catalog = AddonLoader::new(vec![tmp.path().to_path_buf()]).load_catalog().await;

        assert!(matches!(
            catalog.install_order("web"),
            Err(ResolutionError::DependencyNotFound { .. })
        ));
        assert_eq!(catalog.validate().len(), 1);
    }

    #[tokio::test]
    async fn test_discover_hooks_registers_handlers() {
        let tmp = TempDir::new().unwrap();
        let dir = write_addon(
            tmp.path(),
            "security",
            json!({
                "name": "security",
                "version": "2.0.0",
                "hooks": [
                    {"event": "pre_deployment", "handler": {"type": "script", "path": "scripts/scan.sh"},
                     "priority": 10, "enforcement": "required"},
                    {"event": "post_deployment", "handler": {"type": "builtin", "name": "audit-log"}}
                ]
            }),
        );
        std::fs::write(dir.join("scripts/scan.sh"), "exit 0\n").unwrap();

        let catalog = AddonLoader::new(vec![tmp.path().to_path_buf()]).load_catalog().await;
        let mut builtins = BuiltinHandlers::new();
        builtins.register("audit-log", Arc::new(FnHandler::new("audit-log", |_| Ok(()))));

        let mut registry = HookRegistry::new();
        let count = discover_hooks(&catalog, &mut registry, &builtins, &HookDefaults::default()).unwrap();
        assert_eq!(count, 2);

        let pre = registry.get_hooks("pre_deployment");
        assert_eq!(pre[0].hook_name(), "security:pre_deployment");
        assert_eq!(pre[0].options.priority, 10);
        assert_eq!(registry.get_hooks("post_deployment")[0].hook_name(), "audit-log");
    }

    #[tokio::test]
    async fn test_unknown_builtin_leaves_registry_empty() {
        let tmp = TempDir::new().unwrap();
        write_addon(
            tmp.path(),
            "notify",
            json!({
                "name": "notify",
                "version": "1.0",
                "hooks": [{"event": "post_deployment", "handler": {"type": "builtin", "name": "nope"}}]
            }),
        );
        let catalog = AddonLoader::new(vec![tmp.path().to_path_buf()]).load_catalog().await;
        let mut registry = HookRegistry::new();
        let err = discover_hooks(&catalog, &mut registry, &BuiltinHandlers::new(), &HookDefaults::default())
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(registry.is_empty());
    }
}
