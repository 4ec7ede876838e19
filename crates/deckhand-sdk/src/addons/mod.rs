//! Addons
//!
//! An addon is a directory holding an `addon.json` manifest, optional
//! install/uninstall scripts and the hooks it contributes.
//!
//! # Example
//!
//! ```rust,ignore
//! use deckhand_sdk::addons::{discover_hooks, AddonLoader, BuiltinHandlers};
//! use deckhand_sdk::hooks::HookRegistry;
//!
//! let catalog = AddonLoader::new(vec![config.paths.addons_dir.clone()])
//!     .load_catalog()
//!     .await;
//!
//! let mut registry = HookRegistry::new();
//! discover_hooks(&catalog, &mut registry, &BuiltinHandlers::new(), &config.hooks)?;
//!
//! println!("install order: {:?}", catalog.install_order("api")?);
//! ```

mod lifecycle;
mod loader;
mod manifest;

pub use lifecycle::{
    AddonInstaller, AddonOperations, AddonState, LifecycleError, ScriptOperations,
};
pub use loader::{discover_hooks, Addon, AddonCatalog, AddonLoader, BuiltinHandlers};
pub use manifest::{AddonManifest, HandlerSpec, HookSpec, MANIFEST_FILE};
