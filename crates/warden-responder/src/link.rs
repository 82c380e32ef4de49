//! Responder-side broker link with bounded recovery.
//!
//! Wraps the shared reconnect manager with the responder's frontend
//! identity and keeps the [`BrokerProxy`] attached to whatever connection
//! is currently live. Exhausted recovery detaches the proxy so pending
//! local work fails fast while the process shuts down.

use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, warn};

use warden_bus::{
    BusError, CallReply, EndpointConnector, LinkState, ReconnectManager, ReconnectOutcome,
    ServiceIdentity, BROKER_INTERFACE, BROKER_PATH, METHOD_PING,
};
use warden_config::SocketEndpoint;

use crate::proxy::BrokerProxy;

/// Tracing target for link lifecycle events.
const LINK_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::link");

/// A responder's managed connection to the backend broker.
pub struct BrokerLink {
    manager: ReconnectManager<EndpointConnector>,
    proxy: Rc<BrokerProxy>,
}

impl BrokerLink {
    /// Creates an unconnected link for the given service identity.
    #[must_use]
    pub fn new(endpoint: SocketEndpoint, service: &str, max_retries: u32) -> Self {
        let connector = EndpointConnector::new(endpoint, BROKER_INTERFACE, BROKER_PATH);
        let identity = ServiceIdentity::frontend(service);
        Self {
            manager: ReconnectManager::new(connector, identity, max_retries),
            proxy: Rc::new(BrokerProxy::new()),
        }
    }

    /// The proxy local request handlers send through.
    #[must_use]
    pub fn proxy(&self) -> Rc<BrokerProxy> {
        Rc::clone(&self.proxy)
    }

    /// Current link state.
    #[must_use]
    pub fn state(&self) -> LinkState {
        self.manager.state()
    }

    /// Establishes the initial connection and attaches the proxy.
    pub fn establish(&mut self) -> Result<(), BusError> {
        let link = self.manager.establish()?;
        self.proxy.attach(link.connection());
        debug!(target: LINK_TARGET, "broker link established");
        Ok(())
    }

    /// Attempts bounded recovery after a disconnect.
    ///
    /// Returns `false` when the retry bound is exhausted; the proxy is
    /// detached and the process is expected to shut down.
    pub fn recover(&mut self) -> bool {
        match self.manager.on_disconnect() {
            ReconnectOutcome::Reconnected(link) => {
                self.proxy.attach(link.connection());
                true
            }
            ReconnectOutcome::Exhausted => {
                warn!(target: LINK_TARGET, "broker link lost beyond the retry bound");
                self.proxy.detach();
                false
            }
        }
    }

    /// Confirms broker liveness with a health-check round trip.
    pub fn ping(&self, timeout: Duration) -> Result<(), BusError> {
        let Some(connection) = self.proxy.connection() else {
            return Err(BusError::NotConnected);
        };
        let call = connection.method_call(
            BROKER_INTERFACE,
            BROKER_PATH,
            METHOD_PING,
            serde_json::Value::Null,
        );
        match connection.call_with_timeout(call, timeout)? {
            CallReply::Return(_) => Ok(()),
            // An error reply still proves the broker is alive.
            CallReply::Error(message) => {
                debug!(target: LINK_TARGET, %message, "ping answered with an error");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for BrokerLink {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BrokerLink")
            .field("state", &self.manager.state())
            .field("proxy", &self.proxy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    use warden_bus::{BusMessage, MethodReturn};

    use super::*;

    /// Accepts one connection and acknowledges its identity announcement.
    fn broker_accepting_identity(listener: TcpListener) -> thread::JoinHandle<Vec<BusMessage>> {
        thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut line = String::new();
            reader.read_line(&mut line).expect("read");
            let message = BusMessage::from_line(line.as_bytes()).expect("parse");
            let serial = match &message {
                BusMessage::MethodCall(call) => call.serial,
                other => panic!("expected identity announcement, got {other:?}"),
            };
            let reply = BusMessage::MethodReturn(MethodReturn {
                serial,
                body: serde_json::Value::Null,
            });
            let mut writer = stream;
            writer
                .write_all(&reply.to_line().expect("serialize"))
                .expect("write");
            vec![message]
        })
    }

    #[test]
    fn establish_announces_and_attaches_the_proxy() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let addr = listener.local_addr().expect("addr");
        let broker = broker_accepting_identity(listener);

        let endpoint = SocketEndpoint::Tcp {
            host: addr.ip().to_string(),
            port: addr.port(),
        };
        let mut link = BrokerLink::new(endpoint, "pam", 3);
        assert!(!link.proxy().is_connected());

        link.establish().expect("establish");
        assert!(link.proxy().is_connected());
        assert_eq!(link.state(), LinkState::Connected);

        let messages = broker.join().expect("broker join");
        match &messages[0] {
            BusMessage::MethodCall(call) => {
                assert_eq!(call.method, "identify");
                let identity: ServiceIdentity =
                    serde_json::from_value(call.body.clone()).expect("decode identity");
                assert_eq!(identity.service, "pam");
            }
            other => panic!("expected identity announcement, got {other:?}"),
        }
    }

    #[test]
    fn exhausted_recovery_detaches_the_proxy() {
        // Nobody listens on this endpoint after we learn a free port.
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let endpoint = SocketEndpoint::Tcp {
            host: addr.ip().to_string(),
            port: addr.port(),
        };
        let mut link = BrokerLink::new(endpoint, "nss", 2);

        assert!(!link.recover());
        assert_eq!(link.state(), LinkState::Exhausted);
        assert!(!link.proxy().is_connected());
    }
}
