//! Shared configuration for the Warden daemons.
//!
//! The crate exposes the configuration store consumed by the backend broker
//! and the responder processes: typed getters keyed by configuration path and
//! option name, socket endpoint descriptions for the bus connections, and the
//! logging knobs shared by every binary. Configuration-file parsing lives
//! outside this crate; embedders populate a [`ConfigStore`] programmatically
//! or rely on the defaults.

mod defaults;
mod logging;
mod socket;
mod store;

pub use defaults::{
    DEFAULT_LOG_FILTER, default_broker_endpoint, default_log_filter, default_monitor_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::SocketEndpoint;
pub use store::{ConfigError, ConfigStore};

/// Resolved configuration shared by the Warden binaries.
#[derive(Debug, Clone)]
pub struct Config {
    monitor_endpoint: SocketEndpoint,
    broker_endpoint: SocketEndpoint,
    log_filter: String,
    log_format: LogFormat,
    store: ConfigStore,
}

impl Config {
    /// Returns the endpoint of the supervising monitor process.
    #[must_use]
    pub fn monitor_endpoint(&self) -> &SocketEndpoint {
        &self.monitor_endpoint
    }

    /// Returns the endpoint of the backend broker bus.
    #[must_use]
    pub fn broker_endpoint(&self) -> &SocketEndpoint {
        &self.broker_endpoint
    }

    /// Returns the log filter expression for the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Returns the configured logging output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the underlying option store.
    #[must_use]
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Returns a mutable reference to the underlying option store.
    pub fn store_mut(&mut self) -> &mut ConfigStore {
        &mut self.store
    }

    /// Replaces the broker endpoint, used by tests and embedders.
    #[must_use]
    pub fn with_broker_endpoint(mut self, endpoint: SocketEndpoint) -> Self {
        self.broker_endpoint = endpoint;
        self
    }

    /// Replaces the monitor endpoint, used by tests and embedders.
    #[must_use]
    pub fn with_monitor_endpoint(mut self, endpoint: SocketEndpoint) -> Self {
        self.monitor_endpoint = endpoint;
        self
    }

    /// Builds a configuration from process environment overrides.
    ///
    /// Recognised variables: `WARDEN_LOG_FILTER`, `WARDEN_LOG_FORMAT`,
    /// `WARDEN_MONITOR_SOCKET`, and `WARDEN_BROKER_SOCKET`. Unset variables
    /// fall back to the built-in defaults; an unparsable log format is a
    /// configuration error rather than a silent fallback.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(filter) = std::env::var("WARDEN_LOG_FILTER") {
            config.log_filter = filter;
        }
        if let Ok(format) = std::env::var("WARDEN_LOG_FORMAT") {
            config.log_format = format
                .parse()
                .map_err(|_| ConfigError::invalid_value("env", "WARDEN_LOG_FORMAT", &format))?;
        }
        if let Ok(path) = std::env::var("WARDEN_MONITOR_SOCKET") {
            config.monitor_endpoint = SocketEndpoint::unix(path);
        }
        if let Ok(path) = std::env::var("WARDEN_BROKER_SOCKET") {
            config.broker_endpoint = SocketEndpoint::unix(path);
        }
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitor_endpoint: default_monitor_endpoint(),
            broker_endpoint: default_broker_endpoint(),
            log_filter: default_log_filter().to_owned(),
            log_format: LogFormat::default(),
            store: ConfigStore::new(),
        }
    }
}
