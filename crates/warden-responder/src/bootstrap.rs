//! Responder process bootstrap and supervision loop.
//!
//! A responder needs no mandatory arguments: it reads its endpoints from the
//! environment, connects to the backend broker with its frontend identity,
//! and then supervises the link with periodic health checks until a signal
//! asks it to stop. Losing the link beyond the retry bound ends the process
//! with a startup-class failure so the service manager restarts it.

use std::io::{self, IsTerminal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use once_cell::sync::OnceCell;
use signal_hook::consts::{SIGINT, SIGTERM};
use thiserror::Error;
use tracing::{info, warn, Subscriber};
use tracing_subscriber::{fmt, EnvFilter};

use warden_bus::{BusError, DEFAULT_MAX_RETRIES};
use warden_config::{Config, ConfigError, LogFormat};

use crate::link::BrokerLink;

/// Tracing target for lifecycle events.
const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Normal shutdown.
pub const EXIT_OK: u8 = 0;
/// Bad command-line usage.
pub const EXIT_USAGE: u8 = 1;
/// Startup failure or broker link lost beyond the retry bound.
pub const EXIT_STARTUP: u8 = 2;

/// Interval between broker health checks.
const HEALTH_INTERVAL: Duration = Duration::from_secs(1);
/// Timeout for a single health-check round trip.
const PING_TIMEOUT: Duration = Duration::from_secs(5);

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Command-line interface of a responder process.
#[derive(Debug, Parser)]
#[command(name = "warden-responder", about = "Warden front-end responder", version)]
pub struct Cli {
    /// Service this responder fronts.
    #[arg(long, default_value = "pam")]
    pub service: String,
}

/// Errors that stop a responder before its supervision loop.
#[derive(Debug, Error)]
pub enum ResponderError {
    /// The environment configuration is malformed.
    #[error("invalid configuration: {source}")]
    Config {
        /// Underlying configuration error.
        #[source]
        source: ConfigError,
    },
    /// Telemetry could not be initialised.
    #[error("invalid log filter: {0}")]
    Telemetry(String),
    /// The broker link could not be established at startup.
    #[error("broker link could not be established: {source}")]
    Connect {
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

impl ResponderError {
    /// Process exit code for this failure class.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        EXIT_STARTUP
    }
}

/// Runs the responder to completion, returning its exit code.
pub fn run(cli: &Cli) -> Result<u8, ResponderError> {
    let config = Config::from_env().map_err(|source| ResponderError::Config { source })?;
    initialise_telemetry(&config)?;
    info!(target: BOOTSTRAP_TARGET, service = %cli.service, "starting responder");

    let mut link = BrokerLink::new(
        config.broker_endpoint().clone(),
        &cli.service,
        DEFAULT_MAX_RETRIES,
    );
    link.establish()
        .map_err(|source| ResponderError::Connect { source })?;

    let shutdown_requested = Arc::new(AtomicBool::new(false));
    for signal in [SIGTERM, SIGINT] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown_requested))
            .map_err(|source| ResponderError::Signals { source })?;
    }

    Ok(supervise(&mut link, &shutdown_requested))
}

/// Supervises the broker link until a signal or exhausted recovery.
fn supervise(link: &mut BrokerLink, shutdown_requested: &Arc<AtomicBool>) -> u8 {
    loop {
        if shutdown_requested.load(Ordering::SeqCst) {
            info!(target: BOOTSTRAP_TARGET, "shutdown requested by signal");
            return EXIT_OK;
        }

        match link.ping(PING_TIMEOUT) {
            Ok(()) => {}
            Err(BusError::NotConnected | BusError::Disconnected) => {
                if !link.recover() {
                    return EXIT_STARTUP;
                }
            }
            Err(ping_error) => {
                warn!(target: BOOTSTRAP_TARGET, %ping_error, "broker health check failed");
            }
        }

        std::thread::sleep(HEALTH_INTERVAL);
    }
}

/// Installs the global tracing subscriber once; later calls are no-ops.
fn initialise_telemetry(config: &Config) -> Result<(), ResponderError> {
    TELEMETRY_GUARD.get_or_try_init(|| {
        let filter = EnvFilter::try_new(config.log_filter())
            .map_err(|error| ResponderError::Telemetry(error.to_string()))?;
        let builder = fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339());
        let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
            LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
            LogFormat::Compact => Box::new(builder.compact().finish()),
        };
        // A subscriber installed elsewhere in the process wins silently.
        let _ = tracing::subscriber::set_global_default(subscriber);
        Ok(())
    })?;
    Ok(())
}
