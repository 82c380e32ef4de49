//! Bounded reconnection with identity re-announcement.
//!
//! Both the backend's link to its supervising monitor and a responder's link
//! to the backend broker recover from disconnects the same way: retry the
//! connection up to a configured bound, re-announce the process identity on
//! success, and escalate to shutdown when the bound is exhausted or the
//! announcement is rejected. The manager is parameterized only by the
//! connector and the announcement payload.

use std::rc::Rc;

use tracing::{info, warn};

use crate::connection::BusConnection;
use crate::error::BusError;
use crate::proto::ServiceIdentity;

use warden_config::SocketEndpoint;

/// Tracing target for reconnection events.
const RECONNECT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::reconnect");

/// Default bound on reconnection attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A connected link that can carry an identity announcement.
pub trait ClientLink {
    /// Re-announces the owning process's identity to the peer.
    fn announce_identity(&self, identity: &ServiceIdentity) -> Result<(), BusError>;
}

/// Factory producing fresh links to one fixed peer.
pub trait Connector {
    /// Link type produced on success.
    type Link: ClientLink;

    /// Attempts one connection to the peer.
    fn connect(&mut self) -> Result<Self::Link, BusError>;
}

/// Connector dialling a configured socket endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConnector {
    endpoint: SocketEndpoint,
    interface: &'static str,
    path: &'static str,
}

impl EndpointConnector {
    /// Creates a connector for the peer listening at `endpoint`, announcing
    /// on the given control interface.
    #[must_use]
    pub fn new(endpoint: SocketEndpoint, interface: &'static str, path: &'static str) -> Self {
        Self {
            endpoint,
            interface,
            path,
        }
    }
}

/// A dialled endpoint link carrying the control interface coordinates.
#[derive(Debug)]
pub struct EndpointLink {
    connection: Rc<BusConnection>,
    interface: &'static str,
    path: &'static str,
}

impl EndpointLink {
    /// Returns the underlying connection.
    #[must_use]
    pub fn connection(&self) -> Rc<BusConnection> {
        Rc::clone(&self.connection)
    }
}

impl ClientLink for EndpointLink {
    fn announce_identity(&self, identity: &ServiceIdentity) -> Result<(), BusError> {
        self.connection.announce(self.interface, self.path, identity)
    }
}

impl Connector for EndpointConnector {
    type Link = EndpointLink;

    fn connect(&mut self) -> Result<Self::Link, BusError> {
        Ok(EndpointLink {
            connection: BusConnection::connect(&self.endpoint)?,
            interface: self.interface,
            path: self.path,
        })
    }
}

/// Connection states tracked by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// The link is up and announced.
    Connected,
    /// The link dropped; no recovery attempted yet.
    Disconnected,
    /// A recovery attempt is in progress.
    Reconnecting,
    /// The retry bound is spent; the process must shut down.
    Exhausted,
}

/// Outcome of a recovery attempt.
#[derive(Debug)]
pub enum ReconnectOutcome<L> {
    /// The link was re-established and the identity re-announced.
    Reconnected(L),
    /// Recovery failed; the caller must escalate to shutdown.
    Exhausted,
}

/// Drives bounded reconnection for one client link.
#[derive(Debug)]
pub struct ReconnectManager<C: Connector> {
    connector: C,
    identity: ServiceIdentity,
    max_retries: u32,
    state: LinkState,
}

impl<C: Connector> ReconnectManager<C> {
    /// Creates a manager with the given retry bound.
    #[must_use]
    pub fn new(connector: C, identity: ServiceIdentity, max_retries: u32) -> Self {
        Self {
            connector,
            identity,
            max_retries,
            state: LinkState::Disconnected,
        }
    }

    /// Current link state.
    #[must_use]
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Establishes the initial link: one connect attempt plus announcement.
    ///
    /// Startup failures are surfaced directly; the retry bound only governs
    /// recovery after an established link drops.
    pub fn establish(&mut self) -> Result<C::Link, BusError> {
        let link = self.connector.connect()?;
        link.announce_identity(&self.identity)?;
        self.state = LinkState::Connected;
        Ok(link)
    }

    /// Records a disconnect and attempts bounded recovery.
    ///
    /// Performs at most `max_retries` connect attempts. A successful connect
    /// is followed by the identity announcement; a rejected announcement is
    /// treated as recovery failure, not as a consumable retry.
    pub fn on_disconnect(&mut self) -> ReconnectOutcome<C::Link> {
        if self.state == LinkState::Exhausted {
            return ReconnectOutcome::Exhausted;
        }
        self.state = LinkState::Disconnected;

        for attempt in 1..=self.max_retries {
            self.state = LinkState::Reconnecting;
            match self.connector.connect() {
                Ok(link) => {
                    info!(
                        target: RECONNECT_TARGET,
                        attempt,
                        "reconnected, re-announcing identity"
                    );
                    match link.announce_identity(&self.identity) {
                        Ok(()) => {
                            self.state = LinkState::Connected;
                            return ReconnectOutcome::Reconnected(link);
                        }
                        Err(error) => {
                            warn!(
                                target: RECONNECT_TARGET,
                                %error,
                                "identity announcement failed after reconnect"
                            );
                            self.state = LinkState::Exhausted;
                            return ReconnectOutcome::Exhausted;
                        }
                    }
                }
                Err(error) => {
                    warn!(
                        target: RECONNECT_TARGET,
                        attempt,
                        max_retries = self.max_retries,
                        %error,
                        "reconnect attempt failed"
                    );
                }
            }
        }

        self.state = LinkState::Exhausted;
        ReconnectOutcome::Exhausted
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::proto::PeerRole;

    #[derive(Debug, Default)]
    struct FakePeer {
        connect_attempts: RefCell<u32>,
        refuse_first: u32,
        reachable: bool,
        announcements: RefCell<Vec<ServiceIdentity>>,
        reject_announce: bool,
    }

    struct FakeLink {
        peer: Rc<FakePeer>,
    }

    impl ClientLink for FakeLink {
        fn announce_identity(&self, identity: &ServiceIdentity) -> Result<(), BusError> {
            if self.peer.reject_announce {
                return Err(BusError::AnnounceRejected {
                    message: "version mismatch".to_owned(),
                });
            }
            self.peer.announcements.borrow_mut().push(identity.clone());
            Ok(())
        }
    }

    struct FakeConnector {
        peer: Rc<FakePeer>,
    }

    impl Connector for FakeConnector {
        type Link = FakeLink;

        fn connect(&mut self) -> Result<Self::Link, BusError> {
            let mut attempts = self.peer.connect_attempts.borrow_mut();
            *attempts += 1;
            if !self.peer.reachable || *attempts <= self.peer.refuse_first {
                return Err(BusError::io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "peer unreachable",
                )));
            }
            Ok(FakeLink {
                peer: Rc::clone(&self.peer),
            })
        }
    }

    fn manager_with(peer: &Rc<FakePeer>, max_retries: u32) -> ReconnectManager<FakeConnector> {
        ReconnectManager::new(
            FakeConnector {
                peer: Rc::clone(peer),
            },
            ServiceIdentity::backend("example.com"),
            max_retries,
        )
    }

    #[test]
    fn unreachable_peer_gets_exactly_max_retries_attempts() {
        let peer = Rc::new(FakePeer::default());
        let mut manager = manager_with(&peer, 3);

        let outcome = manager.on_disconnect();
        assert!(matches!(outcome, ReconnectOutcome::Exhausted));
        assert_eq!(*peer.connect_attempts.borrow(), 3);
        assert_eq!(manager.state(), LinkState::Exhausted);

        // Once exhausted there is never a further attempt.
        let outcome = manager.on_disconnect();
        assert!(matches!(outcome, ReconnectOutcome::Exhausted));
        assert_eq!(*peer.connect_attempts.borrow(), 3);
    }

    #[test]
    fn successful_reconnect_reannounces_identity() {
        let peer = Rc::new(FakePeer {
            reachable: true,
            ..FakePeer::default()
        });
        let mut manager = manager_with(&peer, 3);

        let outcome = manager.on_disconnect();
        assert!(matches!(outcome, ReconnectOutcome::Reconnected(_)));
        assert_eq!(manager.state(), LinkState::Connected);

        let announcements = peer.announcements.borrow();
        assert_eq!(announcements.len(), 1);
        assert_eq!(announcements[0].role, PeerRole::Backend);
        assert_eq!(announcements[0].domain, "example.com");
    }

    #[test]
    fn rejected_announcement_escalates_instead_of_retrying() {
        let peer = Rc::new(FakePeer {
            reachable: true,
            reject_announce: true,
            ..FakePeer::default()
        });
        let mut manager = manager_with(&peer, 3);

        let outcome = manager.on_disconnect();
        assert!(matches!(outcome, ReconnectOutcome::Exhausted));
        // One connect, then straight to exhausted; no further dials.
        assert_eq!(*peer.connect_attempts.borrow(), 1);
    }

    #[test]
    fn recovery_succeeds_midway_through_the_retry_budget() {
        let peer = Rc::new(FakePeer {
            reachable: true,
            refuse_first: 2,
            ..FakePeer::default()
        });
        let mut manager = manager_with(&peer, 3);

        let outcome = manager.on_disconnect();
        assert!(matches!(outcome, ReconnectOutcome::Reconnected(_)));
        assert_eq!(*peer.connect_attempts.borrow(), 3);
        assert_eq!(manager.state(), LinkState::Connected);
    }

    #[test]
    fn establish_surfaces_connect_failure_directly() {
        let peer = Rc::new(FakePeer::default());
        let mut manager = manager_with(&peer, 3);
        assert!(manager.establish().is_err());
        assert_eq!(*peer.connect_attempts.borrow(), 1);
    }
}
