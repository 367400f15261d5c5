//! Broadcast hub
//!
//! Registry of live dashboard connections. Each connection owns an unbounded
//! queue drained by its socket writer, so a send never blocks the broadcaster and
//! messages reach a given connection in the order they were broadcast.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::RwLock;

use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::broadcast::protocol::ServerMessage;

/// Identifier of a live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A registered connection
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<ServerMessage>,
    subscriptions: HashSet<String>,
}

impl Connection {
    /// Create a connection and the receiving end its socket writer drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connection = Self {
            id: ConnectionId::new(),
            sender,
            subscriptions: HashSet::new(),
        };
        (connection, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, message: ServerMessage) -> bool {
        match self.sender.send(message) {
            Ok(()) => true,
            Err(_) => {
                trace!(connection = %self.id, "Dropping message for closed connection");
                false
            }
        }
    }
}

/// Something to deliver through the hub
#[derive(Debug, Clone)]
pub enum Event {
    /// Every connection subscribed to `topic`
    Topic {
        topic: String,
        message: ServerMessage,
    },

    /// Exactly one connection
    Direct {
        connection: ConnectionId,
        message: ServerMessage,
    },
}

impl Event {
    pub fn topic(topic: impl Into<String>, message: ServerMessage) -> Self {
        Event::Topic {
            topic: topic.into(),
            message,
        }
    }

    pub fn direct(connection: ConnectionId, message: ServerMessage) -> Self {
        Event::Direct {
            connection,
            message,
        }
    }
}

/// Connection registry with per-connection topic subscriptions
#[derive(Debug, Default)]
pub struct Hub {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection; returns `false` and keeps the existing entry if the id is
    /// already registered
    pub fn register(&self, connection: Connection) -> bool {
        let mut connections = self.connections.write().unwrap_or_else(|e| e.into_inner());
        if connections.contains_key(&connection.id) {
            return false;
        }
        debug!(connection = %connection.id, "Connection registered");
        connections.insert(connection.id, connection);
        true
    }

    /// Remove a connection; unknown ids are ignored
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        let mut connections = self.connections.write().unwrap_or_else(|e| e.into_inner());
        let removed = connections.remove(id).is_some();
        if removed {
            debug!(connection = %id, "Connection unregistered");
        }
        removed
    }

    pub fn subscribe(&self, id: &ConnectionId, topic: &str) -> bool {
        let mut connections = self.connections.write().unwrap_or_else(|e| e.into_inner());
        match connections.get_mut(id) {
            Some(connection) => {
                connection.subscriptions.insert(topic.to_string());
                debug!(connection = %id, topic, "Subscribed");
                true
            }
            None => false,
        }
    }

    pub fn unsubscribe(&self, id: &ConnectionId, topic: &str) -> bool {
        let mut connections = self.connections.write().unwrap_or_else(|e| e.into_inner());
        match connections.get_mut(id) {
            Some(connection) => {
                connection.subscriptions.remove(topic);
                debug!(connection = %id, topic, "Unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Deliver an event, returning how many connections accepted it.
    ///
    /// A failed send is dropped; the connection stays registered until its own
    /// close unregisters it.
    pub fn broadcast(&self, event: Event) -> usize {
        let connections = self.connections.read().unwrap_or_else(|e| e.into_inner());
        match event {
            Event::Topic { topic, message } => connections
                .values()
                .filter(|c| c.subscriptions.contains(&topic))
                .filter(|c| c.send(message.clone()))
                .count(),
            Event::Direct {
                connection,
                message,
            } => connections
                .get(&connection)
                .map(|c| usize::from(c.send(message)))
                .unwrap_or(0),
        }
    }

    pub fn is_subscribed(&self, id: &ConnectionId, topic: &str) -> bool {
        let connections = self.connections.read().unwrap_or_else(|e| e.into_inner());
        connections
            .get(id)
            .is_some_and(|c| c.subscriptions.contains(topic))
    }

    pub fn len(&self) -> usize {
        let connections = self.connections.read().unwrap_or_else(|e| e.into_inner());
        connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
