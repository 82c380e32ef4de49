//! Backend provider model: modules, targets, and in-flight requests.
//!
//! A domain backend serves four request categories, its targets. Each target
//! is initialized from a named backend module registered in a compile-time
//! catalog; the identity target is mandatory, the rest are optional with
//! built-in fallbacks. Requests own a one-shot completion that answers the
//! caller exactly once, including when a target drops the request.

mod error;
mod module;
mod permit;
mod request;
mod target;

pub use error::ProviderError;
pub use module::{BackendModule, ModuleCatalog, ModuleFactory, ModuleInitContext};
pub use permit::PermitAccess;
pub use request::{AccountInfoRequest, AttrScope, Completion, LookupFilter, Request, RequestPayload};
pub use target::{OnlineProbe, TargetKind, TargetOps};
