//! Wire message envelope and typed payloads.
//!
//! Every message is one JSON object on a single line, newline terminated.
//! Method calls carry a per-connection serial; the matching reply (a method
//! return or a bus error) echoes the serial so callers can correlate
//! asynchronous completions.

use serde::{Deserialize, Serialize};

use crate::error::BusError;

/// Protocol version announced by every process on connect.
pub const PROTOCOL_VERSION: u16 = 1;

/// Interface name of the monitor-facing method table.
pub const MONITOR_INTERFACE: &str = "org.warden.Monitor";
/// Object path of the monitor-facing method table.
pub const MONITOR_PATH: &str = "/org/warden/monitor";
/// Interface name of the backend broker method table.
pub const BROKER_INTERFACE: &str = "org.warden.Broker";
/// Object path of the backend broker method table.
pub const BROKER_PATH: &str = "/org/warden/broker";

/// Health-check method; replies with an empty acknowledgement.
pub const METHOD_PING: &str = "ping";
/// Configuration-reload request; replies with an empty acknowledgement.
pub const METHOD_RELOAD: &str = "reload";
/// Resolver re-initialisation request; replies with an empty acknowledgement.
pub const METHOD_RES_INIT: &str = "resInit";
/// Online-status query.
pub const METHOD_GET_ONLINE: &str = "getOnline";
/// Account-information query.
pub const METHOD_GET_ACCOUNT_INFO: &str = "getAccountInfo";
/// PAM operation request.
pub const METHOD_PAM_HANDLER: &str = "pamHandler";
/// Identity announcement sent by a process after (re)connecting.
pub const METHOD_IDENTIFY: &str = "identify";

/// A method invocation addressed at an interface and object path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MethodCall {
    /// Per-connection serial used to correlate the reply.
    pub serial: u64,
    /// Target interface name.
    pub interface: String,
    /// Target object path.
    pub path: String,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub body: serde_json::Value,
}

/// Successful reply to a method call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MethodReturn {
    /// Serial of the call being answered.
    pub serial: u64,
    /// Reply payload.
    #[serde(default)]
    pub body: serde_json::Value,
}

/// Bus-level error reply to a method call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorReply {
    /// Serial of the call being answered.
    pub serial: u64,
    /// Error description.
    pub message: String,
}

/// One wire message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusMessage {
    /// A method invocation.
    MethodCall(MethodCall),
    /// A successful method reply.
    MethodReturn(MethodReturn),
    /// A bus-level error reply.
    Error(ErrorReply),
}

impl BusMessage {
    /// Serializes the message as a single JSONL line including the newline.
    pub fn to_line(&self) -> Result<Vec<u8>, BusError> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    /// Parses one JSONL line into a message.
    pub fn from_line(line: &[u8]) -> Result<Self, BusError> {
        serde_json::from_slice(line).map_err(|error| BusError::malformed(error.to_string()))
    }
}

/// Error classes carried in data-provider replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpErrorMajor {
    /// The operation succeeded.
    Ok,
    /// The backend is offline; cached data should be used.
    Offline,
    /// The backend did not answer in time.
    Timeout,
    /// The operation failed terminally.
    Fatal,
}

impl DpErrorMajor {
    /// Returns the wire code of the error class.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Ok => 0,
            Self::Offline => 1,
            Self::Timeout => 2,
            Self::Fatal => 3,
        }
    }

    /// Parses a wire code into an error class.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::Offline),
            2 => Some(Self::Timeout),
            3 => Some(Self::Fatal),
            _ => None,
        }
    }
}

/// Reply payload shared by account-info completions and validation errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DpReply {
    /// Error class code, see [`DpErrorMajor`].
    pub error_major: u16,
    /// Errno-equivalent minor code supplied by the failing layer.
    pub error_minor: u32,
    /// Human-readable description.
    pub error_message: String,
}

impl DpReply {
    /// Builds the canonical success reply.
    #[must_use]
    pub fn success() -> Self {
        Self {
            error_major: DpErrorMajor::Ok.code(),
            error_minor: 0,
            error_message: "Success".to_owned(),
        }
    }

    /// Builds a fatal-class reply with the supplied minor code and message.
    #[must_use]
    pub fn fatal(error_minor: u32, error_message: impl Into<String>) -> Self {
        Self {
            error_major: DpErrorMajor::Fatal.code(),
            error_minor,
            error_message: error_message.into(),
        }
    }
}

/// Backend reachability states reported by the online-status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnlineState {
    /// The upstream identity source is reachable.
    Online,
    /// The upstream identity source is in its offline blackout window.
    Offline,
}

impl OnlineState {
    /// Returns the wire code of the state.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Online => 1,
            Self::Offline => 2,
        }
    }
}

/// Reply payload of the online-status query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OnlineReply {
    /// Reachability state code, see [`OnlineState`].
    pub status: u16,
    /// Error class code.
    pub error_major: u16,
    /// Errno-equivalent minor code.
    pub error_minor: u32,
    /// Human-readable description.
    pub error_message: String,
}

impl OnlineReply {
    /// Builds the reply for the given state with a success error triple.
    #[must_use]
    pub fn new(state: OnlineState) -> Self {
        Self {
            status: state.code(),
            error_major: DpErrorMajor::Ok.code(),
            error_minor: 0,
            error_message: "Success".to_owned(),
        }
    }
}

/// Parameters of the account-information query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountInfoParams {
    /// Entry type selector (user, group, ...), passed through to the backend.
    pub entry_type: u32,
    /// Attribute selector: `core`, `membership`, or `all`.
    pub attrs: String,
    /// Filter expression: `name=<value>` or `idnumber=<value>`.
    pub filter: String,
}

/// Roles a process announces when connecting to a bus peer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PeerRole {
    /// A front-end responder process.
    Frontend,
    /// A backend broker process.
    Backend,
}

/// Identity announcement sent on connect and after every reconnect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceIdentity {
    /// Role of the announcing process.
    pub role: PeerRole,
    /// Protocol version spoken by the announcing process.
    pub version: u16,
    /// Service name, for example `nss` or `pam`; empty for backends.
    pub service: String,
    /// Target domain name; empty for responders.
    pub domain: String,
}

impl ServiceIdentity {
    /// Builds a backend identity for the given domain.
    #[must_use]
    pub fn backend(domain: impl Into<String>) -> Self {
        Self {
            role: PeerRole::Backend,
            version: PROTOCOL_VERSION,
            service: String::new(),
            domain: domain.into(),
        }
    }

    /// Builds a frontend identity for the given service name.
    #[must_use]
    pub fn frontend(service: impl Into<String>) -> Self {
        Self {
            role: PeerRole::Frontend,
            version: PROTOCOL_VERSION,
            service: service.into(),
            domain: String::new(),
        }
    }
}
