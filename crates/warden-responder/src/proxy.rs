//! PAM request proxy toward the backend broker.
//!
//! A responder accepts local client requests before its broker link is
//! necessarily up, so every send first guards against the uninitialized
//! connection and fails fast with an I/O-class error instead of blocking.
//! Once a call is on the wire the caller's callback fires exactly once,
//! whatever comes back: a decoded reply, a bus-level error, a timeout, or
//! an undecodable body all resolve the callback, the last three with the
//! generic system-error status.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, warn};

use warden_bus::pam::{
    pack_pam_request, unpack_pam_response, PamRequest, PamResponse, PAM_SYSTEM_ERR,
};
use warden_bus::{
    BusConnection, BusError, CallReply, BROKER_INTERFACE, BROKER_PATH, METHOD_PAM_HANDLER,
};

/// Tracing target for proxy traffic.
const PROXY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::proxy");

/// Default timeout for PAM calls toward the broker.
pub const DEFAULT_PAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Client-side proxy over the (possibly not yet established) broker link.
#[derive(Default)]
pub struct BrokerProxy {
    connection: RefCell<Option<Rc<BusConnection>>>,
}

impl BrokerProxy {
    /// Creates a proxy with no connection attached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a live broker connection.
    pub fn attach(&self, connection: Rc<BusConnection>) {
        *self.connection.borrow_mut() = Some(connection);
    }

    /// Drops the attached connection; subsequent sends fail fast.
    pub fn detach(&self) {
        *self.connection.borrow_mut() = None;
    }

    /// Whether a broker connection is currently attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.borrow().is_some()
    }

    /// The attached broker connection, if any.
    #[must_use]
    pub fn connection(&self) -> Option<Rc<BusConnection>> {
        self.connection.borrow().clone()
    }

    /// Sends a PAM operation and resolves `on_reply` with the outcome.
    ///
    /// Returns [`BusError::NotConnected`] without invoking the callback when
    /// no connection is attached. After the call is issued the callback
    /// fires exactly once; transport failures and undecodable replies
    /// resolve it with the generic system-error status. A disconnect also
    /// detaches the connection so later sends fail fast until the link is
    /// re-established.
    pub fn send_pam_request(
        &self,
        request: &PamRequest,
        timeout: Duration,
        on_reply: impl FnOnce(PamResponse),
    ) -> Result<(), BusError> {
        let Some(connection) = self.connection() else {
            return Err(BusError::NotConnected);
        };
        let body = pack_pam_request(request)?;
        let call = connection.method_call(BROKER_INTERFACE, BROKER_PATH, METHOD_PAM_HANDLER, body);
        debug!(
            target: PROXY_TARGET,
            user = %request.user,
            cmd = request.cmd,
            "sending PAM request to broker"
        );

        let response = match connection.call_with_timeout(call, timeout) {
            Ok(CallReply::Return(reply_body)) => match unpack_pam_response(&reply_body) {
                Ok(response) => response,
                Err(decode_error) => {
                    warn!(target: PROXY_TARGET, %decode_error, "undecodable PAM reply");
                    self.system_error_response(request)
                }
            },
            Ok(CallReply::Error(message)) => {
                warn!(target: PROXY_TARGET, %message, "broker answered with a bus error");
                self.system_error_response(request)
            }
            Err(call_error) => {
                warn!(target: PROXY_TARGET, %call_error, "PAM call failed");
                if matches!(call_error, BusError::Disconnected) {
                    self.detach();
                }
                self.system_error_response(request)
            }
        };
        on_reply(response);
        Ok(())
    }

    fn system_error_response(&self, request: &PamRequest) -> PamResponse {
        PamResponse {
            pam_status: PAM_SYSTEM_ERR,
            domain: request.domain.clone(),
        }
    }
}

impl std::fmt::Debug for BrokerProxy {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BrokerProxy")
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io::{BufRead, BufReader, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    use warden_bus::pam::{pack_pam_response, PamCommand, PAM_SUCCESS};
    use warden_bus::{BusMessage, ConnectionStream, MethodReturn};

    use super::*;

    fn attached_proxy() -> (BrokerProxy, TcpStream) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let addr = listener.local_addr().expect("addr");
        let client = thread::spawn(move || TcpStream::connect(addr).expect("connect"));
        let (broker_side, _) = listener.accept().expect("accept");
        let client_side = client.join().expect("join");

        let proxy = BrokerProxy::new();
        proxy.attach(BusConnection::from_stream(ConnectionStream::Tcp(client_side)));
        (proxy, broker_side)
    }

    fn pam_request() -> PamRequest {
        let mut request = PamRequest::new(PamCommand::Authenticate, "alice", "sshd");
        request.domain = "example.com".to_owned();
        request
    }

    /// Reads one call off the broker side and answers it with `reply_body`.
    fn answer_next_call(broker_side: TcpStream, reply_body: serde_json::Value) {
        let mut reader = BufReader::new(broker_side.try_clone().expect("clone"));
        let mut line = String::new();
        reader.read_line(&mut line).expect("read");
        let serial = match BusMessage::from_line(line.as_bytes()).expect("parse") {
            BusMessage::MethodCall(call) => call.serial,
            other => panic!("expected a method call, got {other:?}"),
        };
        let reply = BusMessage::MethodReturn(MethodReturn {
            serial,
            body: reply_body,
        });
        let mut writer = broker_side;
        writer
            .write_all(&reply.to_line().expect("serialize"))
            .expect("write");
    }

    #[test]
    fn attach_and_detach_govern_the_exposed_connection() {
        let (proxy, _broker_side) = attached_proxy();
        assert!(proxy.connection().is_some());
        proxy.detach();
        assert!(proxy.connection().is_none());
        assert!(!proxy.is_connected());
    }

    #[test]
    fn uninitialized_connection_fails_fast_without_callback() {
        let proxy = BrokerProxy::new();
        let fired = RefCell::new(0_u32);
        let result = proxy.send_pam_request(&pam_request(), Duration::from_secs(1), |_| {
            *fired.borrow_mut() += 1;
        });
        assert!(matches!(result, Err(BusError::NotConnected)));
        assert_eq!(*fired.borrow(), 0);
    }

    #[test]
    fn method_return_decodes_into_the_callback() {
        let (proxy, broker_side) = attached_proxy();
        let reply_body = pack_pam_response(&PamResponse {
            pam_status: PAM_SUCCESS,
            domain: "example.com".to_owned(),
        })
        .expect("pack");
        let broker = thread::spawn(move || answer_next_call(broker_side, reply_body));

        let observed = RefCell::new(Vec::new());
        proxy
            .send_pam_request(&pam_request(), Duration::from_secs(2), |response| {
                observed.borrow_mut().push(response);
            })
            .expect("send");
        broker.join().expect("broker join");

        let observed = observed.borrow();
        assert_eq!(observed.len(), 1);
        assert_eq!(observed[0].pam_status, PAM_SUCCESS);
        assert_eq!(observed[0].domain, "example.com");
    }

    #[test]
    fn undecodable_reply_maps_to_system_error() {
        let (proxy, broker_side) = attached_proxy();
        let broker = thread::spawn(move || {
            answer_next_call(broker_side, serde_json::json!({"not": "a pam response"}));
        });

        let observed = RefCell::new(Vec::new());
        proxy
            .send_pam_request(&pam_request(), Duration::from_secs(2), |response| {
                observed.borrow_mut().push(response);
            })
            .expect("send");
        broker.join().expect("broker join");

        let observed = observed.borrow();
        assert_eq!(observed.len(), 1);
        assert_eq!(observed[0].pam_status, PAM_SYSTEM_ERR);
        assert_eq!(observed[0].domain, "example.com");
    }

    #[test]
    fn bus_error_reply_maps_to_system_error() {
        let (proxy, broker_side) = attached_proxy();
        let broker = thread::spawn(move || {
            let mut reader = BufReader::new(broker_side.try_clone().expect("clone"));
            let mut line = String::new();
            reader.read_line(&mut line).expect("read");
            let serial = match BusMessage::from_line(line.as_bytes()).expect("parse") {
                BusMessage::MethodCall(call) => call.serial,
                other => panic!("expected a method call, got {other:?}"),
            };
            let reply = BusMessage::Error(warden_bus::ErrorReply {
                serial,
                message: "dispatch failed".to_owned(),
            });
            let mut writer = broker_side;
            writer
                .write_all(&reply.to_line().expect("serialize"))
                .expect("write");
        });

        let observed = RefCell::new(Vec::new());
        proxy
            .send_pam_request(&pam_request(), Duration::from_secs(2), |response| {
                observed.borrow_mut().push(response);
            })
            .expect("send");
        broker.join().expect("broker join");

        assert_eq!(observed.borrow().len(), 1);
        assert_eq!(observed.borrow()[0].pam_status, PAM_SYSTEM_ERR);
    }

    #[test]
    fn timeout_resolves_the_callback_with_system_error() {
        let (proxy, _broker_side) = attached_proxy();

        let observed = RefCell::new(Vec::new());
        proxy
            .send_pam_request(&pam_request(), Duration::from_millis(50), |response| {
                observed.borrow_mut().push(response);
            })
            .expect("send");

        assert_eq!(observed.borrow().len(), 1);
        assert_eq!(observed.borrow()[0].pam_status, PAM_SYSTEM_ERR);
        // The connection is still attached; a timeout is not a disconnect.
        assert!(proxy.is_connected());
    }

    #[test]
    fn disconnect_detaches_so_later_sends_fail_fast() {
        let (proxy, broker_side) = attached_proxy();
        drop(broker_side);

        let observed = RefCell::new(Vec::new());
        proxy
            .send_pam_request(&pam_request(), Duration::from_secs(1), |response| {
                observed.borrow_mut().push(response);
            })
            .expect("send");

        assert_eq!(observed.borrow().len(), 1);
        assert_eq!(observed.borrow()[0].pam_status, PAM_SYSTEM_ERR);
        assert!(!proxy.is_connected());

        let result = proxy.send_pam_request(&pam_request(), Duration::from_secs(1), |_| {
            panic!("callback must not fire before a connection exists");
        });
        assert!(matches!(result, Err(BusError::NotConnected)));
    }
}
