//! Listening side of the broker endpoint.
//!
//! The daemon accepts responder connections without blocking the event
//! loop: the listener is non-blocking, accepted streams are switched back
//! to blocking mode so per-connection reads can use short timeouts.

use std::io;
use std::net::TcpListener;
#[cfg(unix)]
use std::os::unix::net::UnixListener;

use tracing::{debug, info};

use warden_bus::{BusError, ConnectionStream};
use warden_config::SocketEndpoint;

/// Tracing target for listener events.
const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// Non-blocking listener on either supported transport.
#[derive(Debug)]
pub enum BusListener {
    /// TCP listener.
    Tcp(TcpListener),
    /// Unix domain socket listener.
    #[cfg(unix)]
    Unix(UnixListener),
}

impl BusListener {
    /// Binds the configured endpoint.
    ///
    /// A stale Unix socket file left by a previous process is removed
    /// before binding.
    pub fn bind(endpoint: &SocketEndpoint) -> Result<Self, BusError> {
        let listener = match endpoint {
            SocketEndpoint::Tcp { host, port } => {
                let listener = TcpListener::bind((host.as_str(), *port))?;
                listener.set_nonblocking(true)?;
                Self::Tcp(listener)
            }
            SocketEndpoint::Unix { path } => {
                #[cfg(unix)]
                {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    match std::fs::remove_file(path.as_std_path()) {
                        Ok(()) => debug!(target: SERVER_TARGET, %path, "removed stale socket"),
                        Err(remove_error) if remove_error.kind() == io::ErrorKind::NotFound => {}
                        Err(remove_error) => return Err(BusError::io(remove_error)),
                    }
                    let listener = UnixListener::bind(path.as_std_path())?;
                    listener.set_nonblocking(true)?;
                    Self::Unix(listener)
                }
                #[cfg(not(unix))]
                {
                    return Err(BusError::io(io::Error::new(
                        io::ErrorKind::Unsupported,
                        format!("unix endpoint '{path}' unsupported on this platform"),
                    )));
                }
            }
        };
        info!(target: SERVER_TARGET, %endpoint, "listening");
        Ok(listener)
    }

    /// Accepts one pending connection, if any.
    pub fn try_accept(&self) -> Result<Option<ConnectionStream>, BusError> {
        let accepted = match self {
            Self::Tcp(listener) => match listener.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false)?;
                    Some(ConnectionStream::Tcp(stream))
                }
                Err(accept_error) if accept_error.kind() == io::ErrorKind::WouldBlock => None,
                Err(accept_error) => return Err(BusError::io(accept_error)),
            },
            #[cfg(unix)]
            Self::Unix(listener) => match listener.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false)?;
                    Some(ConnectionStream::Unix(stream))
                }
                Err(accept_error) if accept_error.kind() == io::ErrorKind::WouldBlock => None,
                Err(accept_error) => return Err(BusError::io(accept_error)),
            },
        };
        if accepted.is_some() {
            debug!(target: SERVER_TARGET, "accepted responder connection");
        }
        Ok(accepted)
    }
}
