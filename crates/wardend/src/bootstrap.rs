//! Daemon bootstrap and event loop.
//!
//! Startup order: telemetry, domain configuration, backend context (module
//! loading), broker listener, monitor link, signal handlers, then the
//! single-threaded event loop. The loop accepts responder connections,
//! serves the broker and monitor method tables, drains the deferred queue,
//! and drives reconnection and shutdown.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use thiserror::Error;
use tracing::{info, warn};

use warden_bus::{
    BusConnection, BusError, BusMessage, EndpointConnector, EndpointLink, MethodTable,
    PendingReply, ReconnectManager, ReconnectOutcome, ServiceIdentity, DEFAULT_MAX_RETRIES,
    MONITOR_INTERFACE, MONITOR_PATH,
};
use warden_config::{Config, ConfigError, ConfigStore};
use warden_providers::ProviderError;

use crate::context::{domain_conf_path, BackendContext};
use crate::dispatch;
use crate::modules;
use crate::server::BusListener;
use crate::shutdown::ShutdownSequencer;
use crate::telemetry::{self, TelemetryError};

/// Tracing target for lifecycle events.
const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Normal shutdown.
pub const EXIT_OK: u8 = 0;
/// Bad command-line usage.
pub const EXIT_USAGE: u8 = 1;
/// Startup or main-loop setup failure.
pub const EXIT_STARTUP: u8 = 2;
/// Provider initialization failure.
pub const EXIT_PROVIDER_INIT: u8 = 3;

/// How long each connection read waits per loop turn.
const READ_SLICE: Duration = Duration::from_millis(5);
/// Idle sleep when no connection is live.
const IDLE_SLEEP: Duration = Duration::from_millis(20);

/// Command-line interface of the backend daemon.
#[derive(Debug, Parser)]
#[command(name = "wardend", about = "Warden domain backend broker", version)]
pub struct Cli {
    /// Domain this backend instance serves.
    #[arg(long)]
    pub domain: String,
}

/// Errors that stop the daemon before or during the main loop.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The environment configuration is malformed.
    #[error("invalid configuration: {source}")]
    Config {
        /// Underlying configuration error.
        #[source]
        source: ConfigError,
    },
    /// Telemetry could not be initialised.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Provider initialization failed.
    #[error("provider initialisation failed: {source}")]
    Provider {
        /// Underlying provider error.
        #[source]
        source: ProviderError,
    },
    /// The broker endpoint could not be bound.
    #[error("failed to bind broker endpoint: {source}")]
    Bind {
        /// Underlying bus error.
        #[source]
        source: BusError,
    },
    /// The monitor link could not be established at startup.
    #[error("monitor link could not be established: {source}")]
    Monitor {
        /// Underlying bus error.
        #[source]
        source: BusError,
    },
    /// Signal handlers could not be installed.
    #[error("failed to install signal handlers: {source}")]
    Signals {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl DaemonError {
    /// Process exit code for this failure class.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Provider { .. } => EXIT_PROVIDER_INIT,
            _ => EXIT_STARTUP,
        }
    }
}

/// Runs the daemon to completion, returning its exit code.
pub fn run(cli: &Cli) -> Result<u8, DaemonError> {
    let config = Config::from_env().map_err(|source| DaemonError::Config { source })?;
    telemetry::initialise(&config).map_err(|source| DaemonError::Telemetry { source })?;
    info!(target: BOOTSTRAP_TARGET, domain = %cli.domain, "starting backend broker");

    let store = domain_store_from_env(&domain_conf_path(&cli.domain));
    let mut context = BackendContext::initialize(&cli.domain, modules::builtin_catalog(), store)
        .map_err(|source| DaemonError::Provider { source })?;

    let listener = BusListener::bind(config.broker_endpoint())
        .map_err(|source| DaemonError::Bind { source })?;

    let mut identity = ServiceIdentity::backend(cli.domain.as_str());
    identity.service = context.identity_string();
    let connector = EndpointConnector::new(
        config.monitor_endpoint().clone(),
        MONITOR_INTERFACE,
        MONITOR_PATH,
    );
    let max_retries = reconnection_retries(&context);
    let mut monitor = ReconnectManager::new(connector, identity, max_retries);
    let monitor_link = monitor
        .establish()
        .map_err(|source| DaemonError::Monitor { source })?;
    info!(target: BOOTSTRAP_TARGET, "monitor link established");

    let shutdown_requested = Arc::new(AtomicBool::new(false));
    for signal in [SIGTERM, SIGINT] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown_requested))
            .map_err(|source| DaemonError::Signals { source })?;
    }

    Ok(event_loop(
        &mut context,
        &listener,
        monitor,
        monitor_link,
        &shutdown_requested,
    ))
}

/// Reads the per-domain module configuration from the environment.
///
/// The full configuration-file parser is an external collaborator; the
/// daemon consumes resolved options. `WARDEN_PROVIDER` defaults to the
/// built-in proxy module when unset.
fn domain_store_from_env(conf_path: &str) -> ConfigStore {
    let mut store = ConfigStore::new();
    let options = [
        ("WARDEN_PROVIDER", "provider"),
        ("WARDEN_AUTH_MODULE", "auth-module"),
        ("WARDEN_ACCESS_MODULE", "access-module"),
        ("WARDEN_CHPASS_MODULE", "chpass-module"),
    ];
    for (variable, option) in options {
        if let Ok(value) = std::env::var(variable) {
            store.set(conf_path, option, value);
        }
    }
    if store.get_string(conf_path, "provider").is_none() {
        store.set(conf_path, "provider", crate::loader::PROXY_PROVIDER);
    }
    store
}

fn reconnection_retries(context: &BackendContext) -> u32 {
    let configured = context
        .store()
        .get_int(
            context.conf_path(),
            "reconnection_retries",
            i64::from(DEFAULT_MAX_RETRIES),
        )
        .unwrap_or_else(|config_error| {
            warn!(target: BOOTSTRAP_TARGET, %config_error, "using default retry bound");
            i64::from(DEFAULT_MAX_RETRIES)
        });
    u32::try_from(configured).unwrap_or(DEFAULT_MAX_RETRIES)
}

fn event_loop(
    context: &mut BackendContext,
    listener: &BusListener,
    mut monitor: ReconnectManager<EndpointConnector>,
    mut monitor_link: EndpointLink,
    shutdown_requested: &Arc<AtomicBool>,
) -> u8 {
    let monitor_methods = dispatch::monitor_table();
    let broker_methods = dispatch::broker_table();
    let sequencer = Rc::new(RefCell::new(ShutdownSequencer::new()));
    let mut peers: Vec<Rc<BusConnection>> = Vec::new();

    loop {
        if shutdown_requested.swap(false, Ordering::SeqCst) {
            info!(target: BOOTSTRAP_TARGET, "shutdown requested by signal");
            ShutdownSequencer::begin(&sequencer, &context.scheduler());
        }

        match listener.try_accept() {
            Ok(Some(stream)) => peers.push(BusConnection::from_stream(stream)),
            Ok(None) => {}
            Err(accept_error) => {
                warn!(target: BOOTSTRAP_TARGET, %accept_error, "accept failed");
            }
        }

        peers.retain(|peer| serve_connection(context, peer, &[&broker_methods]));

        let monitor_alive =
            serve_connection(context, &monitor_link.connection(), &[&monitor_methods]);
        if !monitor_alive && !sequencer.borrow().is_exiting() {
            match monitor.on_disconnect() {
                ReconnectOutcome::Reconnected(link) => monitor_link = link,
                ReconnectOutcome::Exhausted => {
                    warn!(
                        target: BOOTSTRAP_TARGET,
                        "monitor link lost beyond the retry bound, shutting down"
                    );
                    ShutdownSequencer::begin(&sequencer, &context.scheduler());
                }
            }
        }

        context.drain_deferred();

        if sequencer.borrow().is_exiting() {
            let exit_code = sequencer.borrow().exit_code();
            info!(target: BOOTSTRAP_TARGET, exit_code, "exiting");
            return exit_code;
        }

        if peers.is_empty() {
            std::thread::sleep(IDLE_SLEEP);
        }
    }
}

/// Serves one read slice of a connection; `false` means the peer is gone.
fn serve_connection(
    context: &mut BackendContext,
    connection: &Rc<BusConnection>,
    tables: &[&MethodTable<BackendContext>],
) -> bool {
    match connection.recv_timeout(READ_SLICE) {
        Ok(Some(BusMessage::MethodCall(call))) => {
            let reply = PendingReply::new(call.serial, Rc::clone(connection) as _);
            match tables.iter().find(|table| table.matches(&call)) {
                Some(table) => {
                    if let Err(dispatch_error) = table.dispatch(context, &call, reply) {
                        warn!(target: BOOTSTRAP_TARGET, %dispatch_error, "dispatch failed");
                    }
                }
                None => {
                    let interface = call.interface.clone();
                    if let Err(send_error) =
                        reply.send_error(format!("no such interface '{interface}'"))
                    {
                        warn!(target: BOOTSTRAP_TARGET, %send_error, "failed to send reply");
                    }
                }
            }
            true
        }
        Ok(Some(other)) => {
            warn!(target: BOOTSTRAP_TARGET, message = ?other, "dropping unexpected message");
            true
        }
        Ok(None) => true,
        Err(BusError::Disconnected) => {
            info!(target: BOOTSTRAP_TARGET, "peer disconnected");
            false
        }
        Err(receive_error) => {
            warn!(target: BOOTSTRAP_TARGET, %receive_error, "connection failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;

    use super::*;

    #[test]
    fn domain_argument_is_mandatory() {
        let result = Cli::try_parse_from(["wardend"]);
        let parse_error = result.expect_err("missing --domain must fail");
        assert_eq!(
            parse_error.kind(),
            ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn domain_argument_is_parsed() {
        let cli = Cli::try_parse_from(["wardend", "--domain", "example.com"]).expect("parse");
        assert_eq!(cli.domain, "example.com");
    }

    #[test]
    fn provider_failures_map_to_their_own_exit_code() {
        let provider = DaemonError::Provider {
            source: ProviderError::module_not_found("ldap"),
        };
        assert_eq!(provider.exit_code(), EXIT_PROVIDER_INIT);

        let bind = DaemonError::Bind {
            source: BusError::NotConnected,
        };
        assert_eq!(bind.exit_code(), EXIT_STARTUP);
    }
}
