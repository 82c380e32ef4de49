//! Warden backend broker daemon.
//!
//! One `wardend` process serves one identity domain: it loads the configured
//! backend modules, registers their targets, and brokers account-info and
//! PAM requests from front-end responders onto those targets through a
//! deferred, single-threaded dispatch loop. The process stays attached to
//! its supervising monitor and shuts down in an ordered sequence when that
//! link is lost beyond the retry bound.

pub mod bootstrap;
pub mod cache;
pub mod context;
pub mod deferred;
pub mod dispatch;
pub mod loader;
pub mod modules;
pub mod offline;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use bootstrap::{
    run, Cli, DaemonError, EXIT_OK, EXIT_PROVIDER_INIT, EXIT_STARTUP, EXIT_USAGE,
};
pub use context::BackendContext;
