//! Client connection with JSONL framing and one-shot reply contexts.
//!
//! A [`BusConnection`] wraps a Unix or TCP stream and speaks the single-line
//! JSON envelope from [`crate::proto`]. Connections are shared within one
//! single-threaded daemon process via `Rc`; interior mutability covers the
//! stream and the read buffer. [`PendingReply`] is the opaque reply context
//! handed to asynchronous completions: it is consumed by sending, so exactly
//! one reply can ever leave for a given inbound call.

use std::cell::{Cell, RefCell};
use std::io::{self, Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use warden_config::SocketEndpoint;

use crate::error::BusError;
use crate::proto::{
    BusMessage, ErrorReply, MethodCall, MethodReturn, METHOD_IDENTIFY, ServiceIdentity,
};

/// Tracing target for connection-level events.
const BUS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::connection");

/// Maximum size of a single wire line in bytes.
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Timeout applied to identity announcements.
const ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected stream of either supported transport.
#[derive(Debug)]
pub enum ConnectionStream {
    /// TCP transport.
    Tcp(TcpStream),
    /// Unix domain socket transport.
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ConnectionStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.set_read_timeout(timeout),
            #[cfg(unix)]
            Self::Unix(stream) => stream.set_read_timeout(timeout),
        }
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// Outcome of a blocking call that received a correlated reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallReply {
    /// The peer answered with a method return.
    Return(serde_json::Value),
    /// The peer answered with a bus-level error.
    Error(String),
}

/// Sink through which replies leave the process.
pub trait ReplySink {
    /// Sends one message to the peer.
    fn send_message(&self, message: &BusMessage) -> Result<(), BusError>;
}

/// One-shot reply context for an inbound method call.
///
/// Consuming `self` on send enforces the one-reply-per-request invariant
/// through move semantics.
pub struct PendingReply {
    serial: u64,
    sink: Rc<dyn ReplySink>,
}

impl PendingReply {
    /// Creates a reply context for the given call serial and outbound sink.
    #[must_use]
    pub fn new(serial: u64, sink: Rc<dyn ReplySink>) -> Self {
        Self { serial, sink }
    }

    /// Serial of the call this reply answers.
    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Sends a method return carrying `body`.
    pub fn send_return(self, body: serde_json::Value) -> Result<(), BusError> {
        self.sink.send_message(&BusMessage::MethodReturn(MethodReturn {
            serial: self.serial,
            body,
        }))
    }

    /// Sends a bus-level error reply.
    pub fn send_error(self, message: impl Into<String>) -> Result<(), BusError> {
        self.sink.send_message(&BusMessage::Error(ErrorReply {
            serial: self.serial,
            message: message.into(),
        }))
    }
}

impl std::fmt::Debug for PendingReply {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PendingReply")
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

/// A client connection to a bus peer.
#[derive(Debug)]
pub struct BusConnection {
    stream: RefCell<ConnectionStream>,
    read_buf: RefCell<Vec<u8>>,
    next_serial: Cell<u64>,
}

impl BusConnection {
    /// Connects to the given endpoint.
    pub fn connect(endpoint: &SocketEndpoint) -> Result<Rc<Self>, BusError> {
        let stream = match endpoint {
            SocketEndpoint::Tcp { host, port } => {
                ConnectionStream::Tcp(TcpStream::connect((host.as_str(), *port))?)
            }
            SocketEndpoint::Unix { path } => {
                #[cfg(unix)]
                {
                    ConnectionStream::Unix(UnixStream::connect(path.as_std_path())?)
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
        Ok(Self::from_stream(stream))
    }

    /// Wraps an already-connected stream.
    #[must_use]
    pub fn from_stream(stream: ConnectionStream) -> Rc<Self> {
        Rc::new(Self {
            stream: RefCell::new(stream),
            read_buf: RefCell::new(Vec::new()),
            next_serial: Cell::new(1),
        })
    }

    /// Allocates the next call serial on this connection.
    pub fn next_serial(&self) -> u64 {
        let serial = self.next_serial.get();
        self.next_serial.set(serial.wrapping_add(1));
        serial
    }

    /// Builds a method call addressed at the given interface and path.
    pub fn method_call(
        &self,
        interface: &str,
        path: &str,
        method: &str,
        body: serde_json::Value,
    ) -> MethodCall {
        MethodCall {
            serial: self.next_serial(),
            interface: interface.to_owned(),
            path: path.to_owned(),
            method: method.to_owned(),
            body,
        }
    }

    /// Sends one message.
    pub fn send(&self, message: &BusMessage) -> Result<(), BusError> {
        let line = message.to_line()?;
        let mut stream = self.stream.borrow_mut();
        stream.write_all(&line)?;
        stream.flush()?;
        Ok(())
    }

    /// Receives the next message, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when the timeout elapses without a complete line.
    /// A peer that closes the stream yields [`BusError::Disconnected`].
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<BusMessage>, BusError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = self.take_buffered_line()? {
                return BusMessage::from_line(&line).map(Some);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            let mut chunk = [0_u8; 1024];
            let result = {
                let mut stream = self.stream.borrow_mut();
                // A zero read timeout means "block forever"; clamp upward.
                stream.set_read_timeout(Some(remaining.max(Duration::from_millis(1))))?;
                stream.read(&mut chunk)
            };
            match result {
                Ok(0) => return Err(BusError::Disconnected),
                Ok(read) => {
                    let mut buf = self.read_buf.borrow_mut();
                    buf.extend_from_slice(&chunk[..read]);
                    if buf.len() > MAX_LINE_BYTES {
                        return Err(BusError::malformed("wire line exceeds size limit"));
                    }
                }
                Err(error)
                    if error.kind() == io::ErrorKind::WouldBlock
                        || error.kind() == io::ErrorKind::TimedOut =>
                {
                    return Ok(None);
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(BusError::io(error)),
            }
        }
    }

    /// Sends a call and blocks until its correlated reply or the timeout.
    ///
    /// Uncorrelated traffic received while waiting is logged and dropped;
    /// callers issue one outstanding blocking call at a time.
    pub fn call_with_timeout(
        &self,
        call: MethodCall,
        timeout: Duration,
    ) -> Result<CallReply, BusError> {
        let serial = call.serial;
        self.send(&BusMessage::MethodCall(call))?;

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BusError::Timeout {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            match self.recv_timeout(remaining)? {
                Some(BusMessage::MethodReturn(reply)) if reply.serial == serial => {
                    return Ok(CallReply::Return(reply.body));
                }
                Some(BusMessage::Error(reply)) if reply.serial == serial => {
                    return Ok(CallReply::Error(reply.message));
                }
                Some(other) => {
                    warn!(target: BUS_TARGET, message = ?other, "dropping uncorrelated message");
                }
                None => {}
            }
        }
    }

    /// Announces this process's identity to the peer's control interface.
    pub fn announce(
        &self,
        interface: &str,
        path: &str,
        identity: &ServiceIdentity,
    ) -> Result<(), BusError> {
        let body = serde_json::to_value(identity)?;
        let call = self.method_call(interface, path, METHOD_IDENTIFY, body);
        debug!(target: BUS_TARGET, role = ?identity.role, service = %identity.service,
               domain = %identity.domain, "announcing identity");
        match self.call_with_timeout(call, ANNOUNCE_TIMEOUT)? {
            CallReply::Return(_) => Ok(()),
            CallReply::Error(message) => Err(BusError::AnnounceRejected { message }),
        }
    }

    fn take_buffered_line(&self) -> Result<Option<Vec<u8>>, BusError> {
        let mut buf = self.read_buf.borrow_mut();
        let Some(newline) = buf.iter().position(|byte| *byte == b'\n') else {
            return Ok(None);
        };
        let rest = buf.split_off(newline + 1);
        let mut line = std::mem::replace(&mut *buf, rest);
        line.pop();
        Ok(Some(line))
    }
}

impl ReplySink for BusConnection {
    fn send_message(&self, message: &BusMessage) -> Result<(), BusError> {
        self.send(message)
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod testing {
    //! In-memory bus doubles for unit and integration tests.

    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::error::BusError;
    use crate::proto::BusMessage;

    use super::ReplySink;

    /// Reply sink that records every message it is asked to send.
    #[derive(Debug, Default)]
    pub struct MemorySink {
        sent: RefCell<Vec<BusMessage>>,
    }

    impl MemorySink {
        /// Creates an empty recording sink.
        #[must_use]
        pub fn new() -> Rc<Self> {
            Rc::new(Self::default())
        }

        /// Returns a copy of everything sent so far.
        #[must_use]
        pub fn sent(&self) -> Vec<BusMessage> {
            self.sent.borrow().clone()
        }
    }

    impl ReplySink for MemorySink {
        fn send_message(&self, message: &BusMessage) -> Result<(), BusError> {
            self.sent.borrow_mut().push(message.clone());
            Ok(())
        }
    }
}
