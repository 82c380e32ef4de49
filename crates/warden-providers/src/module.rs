//! Backend modules and the static catalog they are published in.
//!
//! Modules are compiled into the binary and looked up by name in a
//! [`ModuleCatalog`]; there is no runtime code loading. A module is a factory
//! of targets: the loader asks one module instance for each target kind the
//! domain configuration assigns to it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use warden_config::ConfigStore;

use crate::error::ProviderError;
use crate::target::{TargetKind, TargetOps};

/// Configuration context handed to a module during target initialization.
#[derive(Debug, Clone, Copy)]
pub struct ModuleInitContext<'a> {
    /// Domain the backend serves.
    pub domain: &'a str,
    /// Configuration path of the domain section.
    pub conf_path: &'a str,
    /// Configuration store the module reads its options from.
    pub store: &'a ConfigStore,
}

/// A named backend module able to initialize targets.
///
/// One module instance is shared by every target kind the configuration
/// assigns to the same module name, so a module can pool state (connections,
/// caches) across its targets.
pub trait BackendModule {
    /// The catalog name of the module.
    fn name(&self) -> &'static str;

    /// Initializes the operations for one target kind.
    ///
    /// Returns [`ProviderError::UnsupportedTarget`] when the module does not
    /// implement the kind at all.
    fn init_target(
        &mut self,
        kind: TargetKind,
        context: &ModuleInitContext<'_>,
    ) -> Result<Rc<RefCell<dyn TargetOps>>, ProviderError>;
}

/// Factory producing a fresh module instance.
pub type ModuleFactory = fn() -> Rc<RefCell<dyn BackendModule>>;

/// Compile-time registry of available backend modules.
#[derive(Default)]
pub struct ModuleCatalog {
    factories: HashMap<&'static str, ModuleFactory>,
}

impl ModuleCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module factory under its catalog name.
    #[must_use]
    pub fn with_module(mut self, name: &'static str, factory: ModuleFactory) -> Self {
        self.factories.insert(name, factory);
        self
    }

    /// Returns `true` when a module of that name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiates a fresh module instance by name.
    ///
    /// Callers wanting one shared instance per name must memoize the result;
    /// the catalog itself hands out a new instance on every call.
    #[must_use]
    pub fn instantiate(&self, name: &str) -> Option<Rc<RefCell<dyn BackendModule>>> {
        self.factories.get(name).map(|factory| factory())
    }
}

impl std::fmt::Debug for ModuleCatalog {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ModuleCatalog")
            .field("modules", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullModule;

    impl BackendModule for NullModule {
        fn name(&self) -> &'static str {
            "null"
        }

        fn init_target(
            &mut self,
            kind: TargetKind,
            _context: &ModuleInitContext<'_>,
        ) -> Result<Rc<RefCell<dyn TargetOps>>, ProviderError> {
            Err(ProviderError::unsupported_target("null", kind))
        }
    }

    fn null_factory() -> Rc<RefCell<dyn BackendModule>> {
        Rc::new(RefCell::new(NullModule))
    }

    #[test]
    fn instantiates_registered_modules_by_name() {
        let catalog = ModuleCatalog::new().with_module("null", null_factory);
        assert!(catalog.contains("null"));
        let module = catalog.instantiate("null").expect("registered module");
        assert_eq!(module.borrow().name(), "null");
    }

    #[test]
    fn unknown_names_yield_nothing() {
        let catalog = ModuleCatalog::new();
        assert!(!catalog.contains("ldap"));
        assert!(catalog.instantiate("ldap").is_none());
    }

    #[test]
    fn each_instantiation_is_a_fresh_instance() {
        let catalog = ModuleCatalog::new().with_module("null", null_factory);
        let first = catalog.instantiate("null").expect("registered module");
        let second = catalog.instantiate("null").expect("registered module");
        assert!(!Rc::ptr_eq(&first, &second));
    }
}
