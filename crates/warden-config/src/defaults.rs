use std::env;

use camino::Utf8PathBuf;

use crate::socket::SocketEndpoint;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binaries.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Computes the default endpoint of the monitor bus.
#[must_use]
pub fn default_monitor_endpoint() -> SocketEndpoint {
    SocketEndpoint::unix(runtime_base().join("monitor.sock"))
}

/// Computes the default endpoint of the backend broker bus.
#[must_use]
pub fn default_broker_endpoint() -> SocketEndpoint {
    SocketEndpoint::unix(runtime_base().join("broker.sock"))
}

fn runtime_base() -> Utf8PathBuf {
    let base = env::var("XDG_RUNTIME_DIR")
        .ok()
        .map(Utf8PathBuf::from)
        .unwrap_or_else(|| {
            Utf8PathBuf::from_path_buf(env::temp_dir())
                .unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
        });
    base.join("warden")
}
