//! Method-table registration for bus servers.
//!
//! A process exposes an interface by registering named method handlers in a
//! [`MethodTable`]. Handlers receive the owning context explicitly together
//! with the inbound call and its one-shot reply context; there is no global
//! state reachable from a handler.

use std::collections::HashMap;

use tracing::warn;

use crate::connection::PendingReply;
use crate::error::BusError;
use crate::proto::MethodCall;

/// Tracing target for method dispatch.
const TABLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::table");

/// Handler invoked for one bus method.
pub type MethodHandler<C> = fn(&mut C, &MethodCall, PendingReply) -> Result<(), BusError>;

/// A registered set of methods behind one interface and object path.
pub struct MethodTable<C> {
    interface: &'static str,
    path: &'static str,
    handlers: HashMap<&'static str, MethodHandler<C>>,
}

impl<C> MethodTable<C> {
    /// Creates an empty table for the given interface and path.
    #[must_use]
    pub fn new(interface: &'static str, path: &'static str) -> Self {
        Self {
            interface,
            path,
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler, replacing any previous handler of the same name.
    #[must_use]
    pub fn with_method(mut self, method: &'static str, handler: MethodHandler<C>) -> Self {
        self.handlers.insert(method, handler);
        self
    }

    /// Interface name this table serves.
    #[must_use]
    pub fn interface(&self) -> &'static str {
        self.interface
    }

    /// Object path this table serves.
    #[must_use]
    pub fn path(&self) -> &'static str {
        self.path
    }

    /// Returns `true` when the call addresses this table.
    #[must_use]
    pub fn matches(&self, call: &MethodCall) -> bool {
        call.interface == self.interface && call.path == self.path
    }

    /// Dispatches a call to its registered handler.
    ///
    /// Unknown methods answer the caller with a bus error and surface
    /// [`BusError::UnknownMethod`] to the dispatch loop.
    pub fn dispatch(
        &self,
        context: &mut C,
        call: &MethodCall,
        reply: PendingReply,
    ) -> Result<(), BusError> {
        match self.handlers.get(call.method.as_str()) {
            Some(handler) => handler(context, call, reply),
            None => {
                warn!(
                    target: TABLE_TARGET,
                    interface = %call.interface,
                    method = %call.method,
                    "call for unregistered method"
                );
                let method = call.method.clone();
                reply.send_error(format!("unknown method '{method}'"))?;
                Err(BusError::UnknownMethod { method })
            }
        }
    }
}

impl<C> std::fmt::Debug for MethodTable<C> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("MethodTable")
            .field("interface", &self.interface)
            .field("path", &self.path)
            .field("methods", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
