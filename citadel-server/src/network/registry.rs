//! Connection Registry
//!
//! Maps each player identity to its live connection and remembers which
//! session the identity currently sits in.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::game::Username;

/// Opaque handle for one transport connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    /// Allocate a fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // first group is enough to tell connections apart in logs
        let id = self.0.simple().to_string();
        f.write_str(&id[..8])
    }
}

/// Presence of an identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Presence {
    /// Bound to a live connection.
    Connected,
    /// Connection lost while seated; the seat is held for a grace window.
    GracePeriod,
    /// Unknown to the registry.
    Removed,
}

#[derive(Debug, Clone)]
struct PlayerEntry {
    connection: Option<ConnectionId>,
    session: Option<String>,
}

/// What `disconnect` found for a closed connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnected {
    /// Identity that was bound to the connection.
    pub identity: Username,
    /// Session the identity sits in, if any.
    pub session: Option<String>,
}

/// Identity ↔ connection bindings.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    players: BTreeMap<Username, PlayerEntry>,
    connections: BTreeMap<ConnectionId, Username>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `identity` to `connection`. Idempotent.
    ///
    /// Returns the identity's previous live connection when a different one
    /// is replaced.
    pub fn register(&mut self, identity: &Username, connection: ConnectionId) -> Option<ConnectionId> {
        let entry = self
            .players
            .entry(identity.clone())
            .or_insert(PlayerEntry {
                connection: None,
                session: None,
            });

        let previous = entry.connection.replace(connection);
        if let Some(old) = previous.filter(|old| *old != connection) {
            self.connections.remove(&old);
        }
        self.connections.insert(connection, identity.clone());

        previous.filter(|old| *old != connection)
    }

    /// Identity bound to `connection`.
    pub fn resolve(&self, connection: ConnectionId) -> Option<&Username> {
        self.connections.get(&connection)
    }

    /// Live connection of `identity`.
    pub fn connection_of(&self, identity: &Username) -> Option<ConnectionId> {
        self.players.get(identity).and_then(|e| e.connection)
    }

    /// Session `identity` currently sits in.
    pub fn session_of(&self, identity: &Username) -> Option<&str> {
        self.players.get(identity).and_then(|e| e.session.as_deref())
    }

    /// Presence of `identity`.
    pub fn presence(&self, identity: &Username) -> Presence {
        match self.players.get(identity) {
            None => Presence::Removed,
            Some(entry) if entry.connection.is_some() => Presence::Connected,
            Some(_) => Presence::GracePeriod,
        }
    }

    /// Record the session `identity` sits in. Unknown identities are ignored.
    pub fn seat(&mut self, identity: &Username, session: Option<&str>) {
        if let Some(entry) = self.players.get_mut(identity) {
            entry.session = session.map(str::to_string);
        }
    }

    /// Clear `identity`'s seat if it points at `session`.
    pub fn unseat(&mut self, identity: &Username, session: &str) {
        if let Some(entry) = self.players.get_mut(identity) {
            if entry.session.as_deref() == Some(session) {
                entry.session = None;
            }
        }
        self.forget_if_idle(identity);
    }

    /// Unbind a closed connection.
    ///
    /// An identity with no seat is forgotten right away; a seated one keeps
    /// its entry for the grace window.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Option<Disconnected> {
        let identity = self.connections.remove(&connection)?;
        let entry = self.players.get_mut(&identity)?;
        if entry.connection == Some(connection) {
            entry.connection = None;
        }

        let session = entry.session.clone();
        self.forget_if_idle(&identity);
        Some(Disconnected { identity, session })
    }

    /// Drop an entry that has neither a live connection nor a seat.
    pub fn forget_if_idle(&mut self, identity: &Username) {
        let idle = self
            .players
            .get(identity)
            .is_some_and(|e| e.connection.is_none() && e.session.is_none());
        if idle {
            self.players.remove(identity);
        }
    }

    /// Live connections of the given identities, in the given order.
    pub fn live_connections<'a>(
        &self,
        identities: impl IntoIterator<Item = &'a Username>,
    ) -> Vec<ConnectionId> {
        identities
            .into_iter()
            .filter_map(|name| self.connection_of(name))
            .collect()
    }

    /// Number of identities bound to a live connection.
    pub fn connected_count(&self) -> usize {
        self.connections.len()
    }
}
