use crate::error::SessionError;
use crate::handle::ConnectionHandle;
use crate::metrics::{counters, gauges};
use crate::registry::Registry;
use crate::router::Router;
use pair_common::{Envelope, PeerId};
use std::sync::Arc;

/// Outcome of handling one inbound text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// This connection is now reachable under the given id.
    Registered(PeerId),
    /// The envelope was delivered to its recipient.
    Relayed,
}

/// Per-connection state machine, independent of the transport.
///
/// A session starts unregistered, may register under one or more ids, and
/// releases every id it holds when [`Session::close`] runs. Registering a
/// second id does not release the first: a connection holding several ids
/// is reachable under all of them until it closes.
#[derive(Debug)]
pub struct Session {
    handle: ConnectionHandle,
    router: Router,
    identities: Vec<PeerId>,
}

impl Session {
    /// Start a session for the connection behind `handle`.
    #[must_use]
    pub fn new(handle: ConnectionHandle, router: Router) -> Self {
        Self {
            handle,
            router,
            identities: Vec::new(),
        }
    }

    /// The connection this session supervises.
    #[must_use]
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Ids currently bound to this connection, in registration order.
    #[must_use]
    pub fn identities(&self) -> &[PeerId] {
        &self.identities
    }

    /// Returns `true` once at least one registration has succeeded.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        !self.identities.is_empty()
    }

    fn registry(&self) -> &Arc<Registry> {
        self.router.registry()
    }

    /// Decode and act on one inbound text message.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] describing why the message was dropped.
    /// The session stays usable after any error.
    pub async fn handle_text(&mut self, text: &str) -> Result<Dispatch, SessionError> {
        let envelope = match Envelope::decode_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                counters::messages_dropped_total("decode");
                return Err(e.into());
            }
        };
        self.handle_envelope(&envelope).await
    }

    /// Act on one decoded envelope.
    ///
    /// # Errors
    ///
    /// See [`Session::handle_text`].
    pub async fn handle_envelope(&mut self, envelope: &Envelope) -> Result<Dispatch, SessionError> {
        match envelope {
            Envelope::Register { peer_id } => self.register(peer_id.clone()),
            _ => {
                self.router.route(envelope).await?;
                Ok(Dispatch::Relayed)
            }
        }
    }

    fn register(&mut self, id: PeerId) -> Result<Dispatch, SessionError> {
        match self.registry().register(id.clone(), self.handle.clone()) {
            Ok(()) => {
                counters::registrations_total("registered");
                gauges::inc_peers_registered();
                tracing::info!(peer = %id, conn = %self.handle.id(), "registered new peer");
                self.identities.push(id.clone());
                Ok(Dispatch::Registered(id))
            }
            Err(e) => {
                counters::registrations_total("duplicate");
                Err(e.into())
            }
        }
    }

    /// Close the connection and release every id it holds.
    ///
    /// Each id is released exactly once, and only if it is still bound to
    /// this connection.
    pub async fn close(self) {
        let conn = self.handle.id();
        for id in &self.identities {
            if self.registry().unregister(id, conn) {
                gauges::dec_peers_registered();
                tracing::info!(peer = %id, %conn, "removed peer");
            }
        }
        self.handle.close().await;
    }
}
