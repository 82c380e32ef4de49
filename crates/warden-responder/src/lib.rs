//! Warden front-end responder.
//!
//! A responder fronts one local service (PAM, NSS) and forwards its
//! requests over the message bus to the domain's backend broker. The
//! broker connection is established lazily and recovered within a bounded
//! retry budget; requests sent before the link exists fail fast rather
//! than queueing.

pub mod bootstrap;
pub mod link;
pub mod proxy;

pub use bootstrap::{run, Cli, ResponderError, EXIT_OK, EXIT_STARTUP, EXIT_USAGE};
pub use link::BrokerLink;
pub use proxy::{BrokerProxy, DEFAULT_PAM_TIMEOUT};
