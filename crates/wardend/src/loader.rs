//! Backend module loading keyed by domain configuration.
//!
//! Each target kind names its module through a configuration option
//! (`provider`, `auth-module`, ...). The loader resolves the name, pulls the
//! factory from the static module catalog, and instantiates each distinct
//! module name at most once per process; further target kinds naming the
//! same module reuse the live instance. Instances are never discarded during
//! the process lifetime.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, info};

use warden_config::ConfigStore;
use warden_providers::{
    BackendModule, ModuleCatalog, ModuleInitContext, ProviderError, TargetKind, TargetOps,
};

/// Tracing target for module loading.
const LOADER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::loader");

/// Legacy provider alias rewritten before any module load.
pub const LEGACY_FILES_PROVIDER: &str = "files";
/// Canonical provider the legacy alias maps to.
pub const PROXY_PROVIDER: &str = "proxy";
/// Option carrying the proxied library name after the rewrite.
pub const LIB_NAME_OPTION: &str = "lib-name";

/// Rewrites the legacy `provider = files` alias into its canonical form.
///
/// After the rewrite the effective provider is `proxy` with `lib-name =
/// files`. Applying the rewrite to an already-rewritten configuration is a
/// no-op, so running it twice yields the same end state as once.
pub fn rewrite_legacy_provider(store: &mut ConfigStore, conf_path: &str) {
    if store.get_string(conf_path, TargetKind::Identity.config_option())
        == Some(LEGACY_FILES_PROVIDER)
    {
        info!(
            target: LOADER_TARGET,
            conf_path,
            "rewriting legacy 'files' provider to proxy"
        );
        store.set(
            conf_path,
            TargetKind::Identity.config_option(),
            PROXY_PROVIDER,
        );
        store.set(conf_path, LIB_NAME_OPTION, LEGACY_FILES_PROVIDER);
    }
}

/// Loads backend modules from the catalog, deduplicating by module name.
pub struct ModuleLoader {
    catalog: ModuleCatalog,
    loaded: HashMap<String, Rc<RefCell<dyn BackendModule>>>,
}

impl ModuleLoader {
    /// Creates a loader over the given catalog.
    #[must_use]
    pub fn new(catalog: ModuleCatalog) -> Self {
        Self {
            catalog,
            loaded: HashMap::new(),
        }
    }

    /// Resolves and initializes the target of one kind.
    ///
    /// An optional target with no configured module name yields
    /// [`ProviderError::NotConfigured`]; callers decide whether that is
    /// fatal for the kind at hand.
    pub fn load_target(
        &mut self,
        kind: TargetKind,
        context: &ModuleInitContext<'_>,
    ) -> Result<Rc<RefCell<dyn TargetOps>>, ProviderError> {
        let name = context
            .store
            .get_string(context.conf_path, kind.config_option())
            .ok_or(ProviderError::NotConfigured { kind })?
            .to_owned();

        let module = self.module_instance(&name)?;
        debug!(target: LOADER_TARGET, module = %name, %kind, "initializing target");
        // Bind the borrow so it ends before `module` is dropped.
        let mut instance = module.borrow_mut();
        instance.init_target(kind, context)
    }

    /// Returns the live instance for a module name, if one was loaded.
    #[must_use]
    pub fn loaded_module(&self, name: &str) -> Option<Rc<RefCell<dyn BackendModule>>> {
        self.loaded.get(name).map(Rc::clone)
    }

    fn module_instance(
        &mut self,
        name: &str,
    ) -> Result<Rc<RefCell<dyn BackendModule>>, ProviderError> {
        if let Some(module) = self.loaded.get(name) {
            return Ok(Rc::clone(module));
        }
        let module = self
            .catalog
            .instantiate(name)
            .ok_or_else(|| ProviderError::module_not_found(name))?;
        info!(target: LOADER_TARGET, module = %name, "loaded backend module");
        self.loaded.insert(name.to_owned(), Rc::clone(&module));
        Ok(module)
    }
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ModuleLoader")
            .field("catalog", &self.catalog)
            .field("loaded", &self.loaded.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{recording_catalog, RecordingState};

    const CONF_PATH: &str = "config/domains/example.com";

    fn store_with_provider(provider: &str) -> ConfigStore {
        let mut store = ConfigStore::new();
        store.set(CONF_PATH, "provider", provider);
        store
    }

    fn init_context<'a>(store: &'a ConfigStore) -> ModuleInitContext<'a> {
        ModuleInitContext {
            domain: "example.com",
            conf_path: CONF_PATH,
            store,
        }
    }

    #[test]
    fn files_alias_rewrites_to_proxy_idempotently() {
        let mut store = store_with_provider("files");

        rewrite_legacy_provider(&mut store, CONF_PATH);
        assert_eq!(store.get_string(CONF_PATH, "provider"), Some("proxy"));
        assert_eq!(store.get_string(CONF_PATH, "lib-name"), Some("files"));

        rewrite_legacy_provider(&mut store, CONF_PATH);
        assert_eq!(store.get_string(CONF_PATH, "provider"), Some("proxy"));
        assert_eq!(store.get_string(CONF_PATH, "lib-name"), Some("files"));
    }

    #[test]
    fn other_providers_are_left_untouched() {
        let mut store = store_with_provider("ldap");
        rewrite_legacy_provider(&mut store, CONF_PATH);
        assert_eq!(store.get_string(CONF_PATH, "provider"), Some("ldap"));
        assert_eq!(store.get_string(CONF_PATH, "lib-name"), None);
    }

    #[test]
    fn unconfigured_target_is_distinguished_from_load_failure() {
        let state = RecordingState::default();
        let mut loader = ModuleLoader::new(recording_catalog(&state));
        let store = store_with_provider("recording");

        let result = loader.load_target(TargetKind::Auth, &init_context(&store));
        assert!(matches!(
            result,
            Err(ProviderError::NotConfigured {
                kind: TargetKind::Auth
            })
        ));
    }

    #[test]
    fn unknown_module_name_is_a_load_failure() {
        let state = RecordingState::default();
        let mut loader = ModuleLoader::new(recording_catalog(&state));
        let store = store_with_provider("ldap");

        let result = loader.load_target(TargetKind::Identity, &init_context(&store));
        assert!(matches!(result, Err(ProviderError::ModuleNotFound { .. })));
    }

    #[test]
    fn one_module_name_is_instantiated_once_across_targets() {
        let state = RecordingState::default();
        let mut loader = ModuleLoader::new(recording_catalog(&state));
        let mut store = store_with_provider("recording");
        store.set(CONF_PATH, "auth-module", "recording");

        loader
            .load_target(TargetKind::Identity, &init_context(&store))
            .expect("identity target");
        loader
            .load_target(TargetKind::Auth, &init_context(&store))
            .expect("auth target");

        assert_eq!(state.instantiations(), 1);
        assert!(loader.loaded_module("recording").is_some());
    }
}
