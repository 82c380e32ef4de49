//! PAM operation pack/unpack contract.
//!
//! The PAM request travels between responders and the backend broker as a
//! structured JSON body inside the bus envelope. Authentication tokens are
//! part of the payload but are redacted from all diagnostic output; the
//! custom `Debug` implementation logs token presence only.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BusError;

/// PAM success status.
pub const PAM_SUCCESS: u32 = 0;
/// Generic PAM system-error status; the pre-set sentinel for broker replies.
pub const PAM_SYSTEM_ERR: u32 = 4;

/// PAM operations the broker understands.
///
/// The wire carries raw command codes so that unknown operations pass
/// through unpacking; the broker deliberately accepts them as no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PamCommand {
    /// Verify the caller's credentials.
    Authenticate,
    /// Establish credentials for the session.
    SetCredentials,
    /// Account management (access-control) checks.
    AccountManagement,
    /// Open a login session.
    OpenSession,
    /// Close a login session.
    CloseSession,
    /// Change the authentication token.
    ChangeAuthToken,
}

impl PamCommand {
    /// Returns the wire code of the command.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Authenticate => 1,
            Self::SetCredentials => 2,
            Self::AccountManagement => 3,
            Self::OpenSession => 4,
            Self::CloseSession => 5,
            Self::ChangeAuthToken => 6,
        }
    }

    /// Parses a wire code; unknown codes yield `None`.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Authenticate),
            2 => Some(Self::SetCredentials),
            3 => Some(Self::AccountManagement),
            4 => Some(Self::OpenSession),
            5 => Some(Self::CloseSession),
            6 => Some(Self::ChangeAuthToken),
            _ => None,
        }
    }
}

/// A PAM operation as carried over the bus.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PamRequest {
    /// Raw PAM command code; see [`PamCommand::from_code`].
    pub cmd: u32,
    /// Domain the operation targets.
    pub domain: String,
    /// Account name the operation concerns.
    pub user: String,
    /// Requesting PAM service name.
    pub service: String,
    /// Controlling terminal, when known.
    #[serde(default)]
    pub tty: String,
    /// Requesting user, when known.
    #[serde(default)]
    pub ruser: String,
    /// Requesting host, when known.
    #[serde(default)]
    pub rhost: String,
    /// Current authentication token.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Replacement authentication token for change-password operations.
    #[serde(default)]
    pub new_auth_token: Option<String>,
    /// Resulting PAM status; set by the backend before the reply is packed.
    #[serde(default)]
    pub pam_status: u32,
}

impl PamRequest {
    /// Builds a request for the given command, user, and service.
    #[must_use]
    pub fn new(cmd: PamCommand, user: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            cmd: cmd.code(),
            domain: String::new(),
            user: user.into(),
            service: service.into(),
            tty: String::new(),
            ruser: String::new(),
            rhost: String::new(),
            auth_token: None,
            new_auth_token: None,
            pam_status: PAM_SYSTEM_ERR,
        }
    }

    /// Returns the decoded command, or `None` for unknown codes.
    #[must_use]
    pub const fn command(&self) -> Option<PamCommand> {
        PamCommand::from_code(self.cmd)
    }
}

impl fmt::Debug for PamRequest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PamRequest")
            .field("cmd", &self.cmd)
            .field("domain", &self.domain)
            .field("user", &self.user)
            .field("service", &self.service)
            .field("tty", &self.tty)
            .field("ruser", &self.ruser)
            .field("rhost", &self.rhost)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field(
                "new_auth_token",
                &self.new_auth_token.as_ref().map(|_| "<redacted>"),
            )
            .field("pam_status", &self.pam_status)
            .finish()
    }
}

/// Reply payload of a PAM operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PamResponse {
    /// Final PAM status code.
    pub pam_status: u32,
    /// Domain that handled the operation.
    pub domain: String,
}

/// Packs a PAM request into a bus message body.
pub fn pack_pam_request(request: &PamRequest) -> Result<serde_json::Value, BusError> {
    serde_json::to_value(request).map_err(BusError::from)
}

/// Unpacks a PAM request from a bus message body.
///
/// A body that does not match the request schema is a transport-level
/// failure, not a PAM-level one.
pub fn unpack_pam_request(body: &serde_json::Value) -> Result<PamRequest, BusError> {
    serde_json::from_value(body.clone()).map_err(|error| BusError::malformed(error.to_string()))
}

/// Packs a PAM response into a bus message body.
pub fn pack_pam_response(response: &PamResponse) -> Result<serde_json::Value, BusError> {
    serde_json::to_value(response).map_err(BusError::from)
}

/// Unpacks a PAM response from a bus message body.
pub fn unpack_pam_response(body: &serde_json::Value) -> Result<PamResponse, BusError> {
    serde_json::from_value(body.clone()).map_err(|error| BusError::malformed(error.to_string()))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(PamCommand::Authenticate, 1)]
    #[case(PamCommand::SetCredentials, 2)]
    #[case(PamCommand::AccountManagement, 3)]
    #[case(PamCommand::OpenSession, 4)]
    #[case(PamCommand::CloseSession, 5)]
    #[case(PamCommand::ChangeAuthToken, 6)]
    fn command_codes_round_trip(#[case] command: PamCommand, #[case] code: u32) {
        assert_eq!(command.code(), code);
        assert_eq!(PamCommand::from_code(code), Some(command));
    }

    #[test]
    fn request_round_trips_through_pack_unpack() {
        let mut request = PamRequest::new(PamCommand::Authenticate, "alice", "login");
        request.domain = "example.com".to_owned();
        request.auth_token = Some("hunter2".to_owned());

        let body = pack_pam_request(&request).expect("pack");
        let back = unpack_pam_request(&body).expect("unpack");
        assert_eq!(request, back);
    }

    #[test]
    fn unpack_rejects_wrong_shape() {
        let body = serde_json::json!({"not": "a pam request"});
        assert!(unpack_pam_request(&body).is_err());
    }

    #[test]
    fn new_request_presets_system_error_sentinel() {
        let request = PamRequest::new(PamCommand::AccountManagement, "bob", "sshd");
        assert_eq!(request.pam_status, PAM_SYSTEM_ERR);
    }

    #[test]
    fn debug_redacts_tokens() {
        let mut request = PamRequest::new(PamCommand::ChangeAuthToken, "carol", "passwd");
        request.auth_token = Some("old secret".to_owned());
        request.new_auth_token = Some("new secret".to_owned());
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("old secret"));
        assert!(!rendered.contains("new secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn unknown_command_codes_survive_unpacking() {
        let mut request = PamRequest::new(PamCommand::Authenticate, "dave", "su");
        request.cmd = 250;
        let body = pack_pam_request(&request).expect("pack");
        let back = unpack_pam_request(&body).expect("unpack");
        assert_eq!(back.command(), None);
        assert_eq!(back.cmd, 250);
    }
}
