//! Target registry: one operation table per target kind.
//!
//! Built once at startup from the domain configuration. Identity is
//! mandatory; auth and chpass degrade to absent when unconfigured or
//! failing to load, and access degrades to the built-in always-permit
//! table.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use strum::IntoEnumIterator;
use tracing::{debug, warn};

use warden_providers::{ModuleInitContext, PermitAccess, ProviderError, TargetKind, TargetOps};

use crate::loader::ModuleLoader;

/// Tracing target for registry construction.
const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Map of target kind to its live operation table.
#[derive(Default)]
pub struct TargetRegistry {
    entries: HashMap<TargetKind, Rc<RefCell<dyn TargetOps>>>,
}

impl TargetRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the operation table for one kind, replacing any previous
    /// entry.
    pub fn register(&mut self, kind: TargetKind, ops: Rc<RefCell<dyn TargetOps>>) {
        self.entries.insert(kind, ops);
    }

    /// Looks up the operation table for one kind.
    #[must_use]
    pub fn lookup(&self, kind: TargetKind) -> Option<Rc<RefCell<dyn TargetOps>>> {
        self.entries.get(&kind).map(Rc::clone)
    }

    /// Kinds with a registered operation table.
    #[must_use]
    pub fn registered_kinds(&self) -> Vec<TargetKind> {
        TargetKind::iter()
            .filter(|kind| self.entries.contains_key(kind))
            .collect()
    }
}

impl std::fmt::Debug for TargetRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TargetRegistry")
            .field("registered", &self.registered_kinds())
            .finish()
    }
}

/// Builds the registry for one domain from its configuration.
///
/// A load failure is fatal for the identity target only. Access failures
/// fall back to [`PermitAccess`]; auth and chpass failures leave the kind
/// absent, which the dispatcher later surfaces as a generic system error.
pub fn initialize_targets(
    loader: &mut ModuleLoader,
    context: &ModuleInitContext<'_>,
) -> Result<TargetRegistry, ProviderError> {
    let mut registry = TargetRegistry::new();
    for kind in TargetKind::iter() {
        match loader.load_target(kind, context) {
            Ok(ops) => {
                debug!(target: REGISTRY_TARGET, %kind, "target registered");
                registry.register(kind, ops);
            }
            Err(error) if kind.is_mandatory() => return Err(error),
            Err(ProviderError::NotConfigured { .. }) if kind == TargetKind::Access => {
                debug!(
                    target: REGISTRY_TARGET,
                    "no access module configured, permitting all access"
                );
                registry.register(kind, Rc::new(RefCell::new(PermitAccess)));
            }
            Err(error) if kind == TargetKind::Access => {
                warn!(
                    target: REGISTRY_TARGET,
                    %error,
                    "access module unavailable, permitting all access"
                );
                registry.register(kind, Rc::new(RefCell::new(PermitAccess)));
            }
            Err(ProviderError::NotConfigured { .. }) => {
                debug!(target: REGISTRY_TARGET, %kind, "optional target not configured");
            }
            Err(error) => {
                warn!(target: REGISTRY_TARGET, %kind, %error, "optional target unavailable");
            }
        }
    }
    Ok(registry)
}
