//! Bus protocol and client plumbing shared by the Warden processes.
//!
//! The bus carries typed identity/authentication requests between front-end
//! responders, the backend broker, and the supervising monitor. This crate
//! provides the wire envelope and its typed payloads, the client connection
//! with JSONL framing, one-shot reply contexts, server-side method tables,
//! and the bounded reconnect manager used symmetrically by every process.
//!
//! The low-level transport is deliberately narrow: connect, send,
//! send-with-reply-and-timeout, and method-table registration. Everything
//! else (routing, retry policy, shutdown escalation) belongs to the callers.

mod connection;
mod error;
pub mod pam;
mod proto;
mod reconnect;
mod table;

pub use connection::{BusConnection, CallReply, ConnectionStream, PendingReply, ReplySink};
#[cfg(any(test, feature = "test-support"))]
pub use connection::testing;
pub use error::BusError;
pub use proto::{
    AccountInfoParams, BusMessage, DpErrorMajor, DpReply, ErrorReply, MethodCall, MethodReturn,
    OnlineReply, OnlineState, PeerRole, ServiceIdentity, BROKER_INTERFACE, BROKER_PATH,
    METHOD_GET_ACCOUNT_INFO, METHOD_GET_ONLINE, METHOD_IDENTIFY, METHOD_PAM_HANDLER, METHOD_PING,
    METHOD_RELOAD, METHOD_RES_INIT, MONITOR_INTERFACE, MONITOR_PATH, PROTOCOL_VERSION,
};
pub use reconnect::{
    ClientLink, Connector, EndpointConnector, EndpointLink, LinkState, ReconnectManager,
    ReconnectOutcome, DEFAULT_MAX_RETRIES,
};
pub use table::{MethodHandler, MethodTable};
