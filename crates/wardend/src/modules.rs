//! Backend modules compiled into the daemon.
//!
//! Concrete network providers (LDAP, Kerberos) live behind the same trait
//! but are out of scope here; the built-in catalog ships the proxy module
//! that fronts a local identity service, which is also the load target of
//! the legacy `files` alias.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use warden_bus::DpReply;
use warden_providers::{
    BackendModule, ModuleCatalog, ModuleInitContext, OnlineProbe, ProviderError, Request,
    RequestPayload, TargetKind, TargetOps,
};

use crate::loader::{LEGACY_FILES_PROVIDER, LIB_NAME_OPTION, PROXY_PROVIDER};

/// Tracing target for built-in modules.
const MODULES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::modules");

/// Catalog of the modules compiled into this binary.
#[must_use]
pub fn builtin_catalog() -> ModuleCatalog {
    ModuleCatalog::new().with_module(PROXY_PROVIDER, proxy_factory)
}

fn proxy_factory() -> Rc<RefCell<dyn BackendModule>> {
    Rc::new(RefCell::new(ProxyModule))
}

/// Identity provider proxying a local name service.
struct ProxyModule;

impl BackendModule for ProxyModule {
    fn name(&self) -> &'static str {
        PROXY_PROVIDER
    }

    fn init_target(
        &mut self,
        kind: TargetKind,
        context: &ModuleInitContext<'_>,
    ) -> Result<Rc<RefCell<dyn TargetOps>>, ProviderError> {
        if kind != TargetKind::Identity {
            return Err(ProviderError::unsupported_target(PROXY_PROVIDER, kind));
        }
        let lib_name = context
            .store
            .get_string(context.conf_path, LIB_NAME_OPTION)
            .unwrap_or(LEGACY_FILES_PROVIDER)
            .to_owned();
        debug!(
            target: MODULES_TARGET,
            domain = %context.domain,
            %lib_name,
            "proxy identity target initialized"
        );
        Ok(Rc::new(RefCell::new(ProxyIdentity { lib_name })))
    }
}

/// Identity target answering lookups from the proxied local service.
struct ProxyIdentity {
    lib_name: String,
}

impl TargetOps for ProxyIdentity {
    fn handle(&mut self, request: Request) {
        match request.payload() {
            RequestPayload::AccountInfo(info) => {
                debug!(
                    target: MODULES_TARGET,
                    lib = %self.lib_name,
                    filter = %info.filter,
                    "serving identity lookup through proxy"
                );
                request.complete(DpReply::success());
            }
            RequestPayload::Pam(_) => {
                request.complete(DpReply::fatal(95, "proxy serves identity lookups only"));
            }
        }
    }

    fn check_online(&mut self) -> Option<OnlineProbe> {
        // The proxied service is process-local.
        Some(OnlineProbe::Reachable)
    }
}

#[cfg(test)]
mod tests {
    use warden_config::ConfigStore;

    use super::*;

    #[test]
    fn catalog_ships_the_proxy_module() {
        let catalog = builtin_catalog();
        assert!(catalog.contains(PROXY_PROVIDER));
        assert!(!catalog.contains("ldap"));
    }

    #[test]
    fn proxy_provides_identity_only() {
        let catalog = builtin_catalog();
        let module = catalog.instantiate(PROXY_PROVIDER).expect("proxy module");
        let store = ConfigStore::new();
        let context = ModuleInitContext {
            domain: "example.com",
            conf_path: "config/domains/example.com",
            store: &store,
        };

        assert!(module
            .borrow_mut()
            .init_target(TargetKind::Identity, &context)
            .is_ok());
        assert!(matches!(
            module.borrow_mut().init_target(TargetKind::Auth, &context),
            Err(ProviderError::UnsupportedTarget { .. })
        ));
    }

    #[test]
    fn proxy_identity_answers_lookups() {
        use std::cell::RefCell;
        use std::rc::Rc;

        use warden_bus::DpErrorMajor;
        use warden_providers::{AccountInfoRequest, AttrScope, Completion, LookupFilter};

        let replies = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&replies);
        let completion = Completion::new(move |_payload, reply| sink.borrow_mut().push(reply));
        let payload = RequestPayload::AccountInfo(AccountInfoRequest {
            entry_type: 1,
            attrs: AttrScope::Core,
            filter: LookupFilter::Name("alice".to_owned()),
        });

        let mut target = ProxyIdentity {
            lib_name: "files".to_owned(),
        };
        target.handle(Request::new(payload, completion));

        let replies = replies.borrow();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].error_major, DpErrorMajor::Ok.code());
    }
}
