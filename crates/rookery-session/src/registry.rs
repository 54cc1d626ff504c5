//! Live connections attached to one session.
//!
//! The registry belongs to the session actor and is never shared. Every
//! delivery is an independent, non-blocking channel send: a connection
//! whose handler has gone away is skipped without affecting the others.

use std::collections::HashMap;

use rookery_protocol::{ServerMessage, Side};
use rookery_transport::ConnectionId;
use tokio::sync::mpsc;

/// Channel the actor pushes messages into; the connection handler drains
/// it onto the socket.
pub type ConnectionSender = mpsc::UnboundedSender<ServerMessage>;

struct Attached {
    sender: ConnectionSender,
    side: Option<Side>,
}

/// Connections attached to a session, keyed by [`ConnectionId`].
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Attached>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and immediately sends it `snapshot`.
    ///
    /// Re-attaching an existing id replaces its sender and side.
    /// Returns whether the snapshot was delivered.
    pub fn attach(
        &mut self,
        conn: ConnectionId,
        sender: ConnectionSender,
        side: Option<Side>,
        snapshot: ServerMessage,
    ) -> bool {
        self.connections.insert(conn, Attached { sender, side });
        tracing::debug!(%conn, ?side, attached = self.connections.len(), "connection attached");
        self.send_to(conn, snapshot)
    }

    /// Removes a connection. Returns whether it was attached.
    pub fn detach(&mut self, conn: ConnectionId) -> bool {
        let removed = self.connections.remove(&conn).is_some();
        if removed {
            tracing::debug!(%conn, attached = self.connections.len(), "connection detached");
        }
        removed
    }

    /// Best-effort delivery to one connection.
    pub fn send_to(&self, conn: ConnectionId, msg: ServerMessage) -> bool {
        let Some(attached) = self.connections.get(&conn) else {
            return false;
        };
        match attached.sender.send(msg) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(%conn, "send to closed connection dropped");
                false
            }
        }
    }

    /// Sends `msg` to every attached connection. Returns the number of
    /// successful deliveries.
    pub fn broadcast_all(&self, msg: &ServerMessage) -> usize {
        self.broadcast_except(None, msg)
    }

    /// Sends `msg` to every attached connection except `excluded`.
    pub fn broadcast_except(&self, excluded: Option<ConnectionId>, msg: &ServerMessage) -> usize {
        self.connections
            .keys()
            .filter(|conn| Some(**conn) != excluded)
            .filter(|conn| self.send_to(**conn, msg.clone()))
            .count()
    }

    /// Tags a connection with the side it plays.
    pub fn set_side(&mut self, conn: ConnectionId, side: Side) {
        if let Some(attached) = self.connections.get_mut(&conn) {
            attached.side = Some(side);
        }
    }

    pub fn side_of(&self, conn: ConnectionId) -> Option<Side> {
        self.connections.get(&conn).and_then(|a| a.side)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
