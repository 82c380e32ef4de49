//! Per-domain backend context.
//!
//! One context exists per backend process, owned by the event loop and
//! passed explicitly into every handler; no handler reaches global state.

use warden_config::ConfigStore;
use warden_providers::{ModuleCatalog, ModuleInitContext, ProviderError};

use crate::cache::{IdentityCache, MemoryCache};
use crate::deferred::{Scheduler, DEFAULT_QUEUE_CAPACITY};
use crate::loader::{rewrite_legacy_provider, ModuleLoader};
use crate::offline::OfflineStatus;
use crate::registry::{initialize_targets, TargetRegistry};

/// Configuration path of one domain's section.
#[must_use]
pub fn domain_conf_path(domain: &str) -> String {
    format!("config/domains/{domain}")
}

/// State owned by one backend process for one domain.
pub struct BackendContext {
    domain: String,
    conf_path: String,
    store: ConfigStore,
    cache: Box<dyn IdentityCache>,
    offline: OfflineStatus,
    registry: TargetRegistry,
    scheduler: Scheduler<BackendContext>,
    // Loaded module instances live as long as the process.
    loader: ModuleLoader,
}

impl BackendContext {
    /// Builds the context for `domain`: rewrites the legacy provider alias,
    /// loads and registers the configured targets, and opens the domain's
    /// identity cache.
    pub fn initialize(
        domain: &str,
        catalog: ModuleCatalog,
        mut store: ConfigStore,
    ) -> Result<Self, ProviderError> {
        let conf_path = domain_conf_path(domain);
        rewrite_legacy_provider(&mut store, &conf_path);

        let mut loader = ModuleLoader::new(catalog);
        let registry = {
            let context = ModuleInitContext {
                domain,
                conf_path: &conf_path,
                store: &store,
            };
            initialize_targets(&mut loader, &context)?
        };

        Ok(Self {
            domain: domain.to_owned(),
            conf_path,
            store,
            cache: Box::new(MemoryCache::open(domain)),
            offline: OfflineStatus::new(),
            registry,
            scheduler: Scheduler::new(DEFAULT_QUEUE_CAPACITY),
            loader,
        })
    }

    /// Assembles a context from prebuilt parts.
    ///
    /// Composition seam used by tests that need a hand-built registry or a
    /// differently bounded scheduler.
    #[must_use]
    pub fn from_parts(
        domain: impl Into<String>,
        store: ConfigStore,
        registry: TargetRegistry,
        scheduler: Scheduler<BackendContext>,
    ) -> Self {
        let domain = domain.into();
        let conf_path = domain_conf_path(&domain);
        let cache = Box::new(MemoryCache::open(&domain));
        Self {
            domain,
            conf_path,
            store,
            cache,
            offline: OfflineStatus::new(),
            registry,
            scheduler,
            loader: ModuleLoader::new(ModuleCatalog::new()),
        }
    }

    /// Domain this backend serves.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Configuration path of the domain section.
    #[must_use]
    pub fn conf_path(&self) -> &str {
        &self.conf_path
    }

    /// Bus name the backend announces itself under.
    #[must_use]
    pub fn identity_string(&self) -> String {
        format!("%BE_{}", self.domain)
    }

    /// Configuration store.
    #[must_use]
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Identity cache of the domain.
    #[must_use]
    pub fn cache(&self) -> &dyn IdentityCache {
        self.cache.as_ref()
    }

    /// Mutable identity cache access.
    pub fn cache_mut(&mut self) -> &mut dyn IdentityCache {
        self.cache.as_mut()
    }

    /// Reachability state, mutable because reads self-clear stale state.
    pub fn offline_mut(&mut self) -> &mut OfflineStatus {
        &mut self.offline
    }

    /// Registered targets.
    #[must_use]
    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    /// Loaded backend modules.
    #[must_use]
    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    /// Handle on the deferred scheduler.
    #[must_use]
    pub fn scheduler(&self) -> Scheduler<BackendContext> {
        self.scheduler.clone()
    }

    /// Runs every queued deferred callback, including ones queued while
    /// draining.
    pub fn drain_deferred(&mut self) {
        let scheduler = self.scheduler.clone();
        while let Some(callback) = scheduler.take_next() {
            callback(self);
        }
    }
}

impl std::fmt::Debug for BackendContext {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BackendContext")
            .field("domain", &self.domain)
            .field("registry", &self.registry)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
