use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::Sender;

use tracing::debug;
use uuid::Uuid;

use crate::config::ProjectId;

use super::SyncEvent;

/// Identifies one open live-sync connection.
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
        write!(f, "{}", self.0)
    }
}

/// Sending half of a subscriber's event channel.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    sender: Sender<SyncEvent>,
}

impl Connection {
    pub fn new(id: ConnectionId, sender: Sender<SyncEvent>) -> Self {
        Self { id, sender }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns false once the receiving side is gone.
    pub fn send(&self, event: SyncEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// What [`SubscriberRegistry::remove_subscriber`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The connection was not (or no longer) subscribed.
    NotRegistered,
    /// Removed; this many subscribers remain.
    Remaining(usize),
    /// Removed the last subscriber; the project is now unsubscribed.
    Drained,
}

/* 📖 # Why does removal report a transition?

A connection can be removed twice: once when the stream is dropped normally
and once when a send to it fails. Only the removal that actually empties a
project's set may stop its watcher. `Removal::Drained` is returned exactly for
that call and never again for the same emptiness, so the caller can react to it
without tracking state of its own.
*/

/// Open connections per project, in registration order.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscribers: HashMap<ProjectId, Vec<Connection>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns true if it is the project's first subscriber.
    pub fn add_subscriber(&mut self, project: &ProjectId, connection: Connection) -> bool {
        let connections = self.subscribers.entry(project.clone()).or_default();
        connections.push(connection);
        debug!(%project, subscribers = connections.len(), "Subscriber added");
        connections.len() == 1
    }

    /// Remove a connection. Safe to call repeatedly for the same connection.
    pub fn remove_subscriber(&mut self, project: &ProjectId, id: ConnectionId) -> Removal {
        let Some(connections) = self.subscribers.get_mut(project) else {
            return Removal::NotRegistered;
        };
        let before = connections.len();
        connections.retain(|connection| connection.id != id);
        if connections.len() == before {
            return Removal::NotRegistered;
        }
        debug!(%project, connection = %id, subscribers = connections.len(), "Subscriber removed");
        if connections.is_empty() {
            self.subscribers.remove(project);
            Removal::Drained
        } else {
            Removal::Remaining(connections.len())
        }
    }

    /// Current subscribers of `project`, in registration order.
    pub fn subscribers_of(&self, project: &ProjectId) -> &[Connection] {
        self.subscribers
            .get(project)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, project: &ProjectId) -> bool {
        self.subscribers.contains_key(project)
    }

    /// Projects with at least one subscriber.
    pub fn projects(&self) -> Vec<ProjectId> {
        self.subscribers.keys().cloned().collect()
    }

    /// Send `event` to every subscriber of `project`; returns the connections that are gone.
    ///
    /// Dead connections are not removed here; pass them to `remove_subscriber`
    /// so that draining is handled in one place.
    pub fn send_to(&self, project: &ProjectId, event: &SyncEvent) -> Vec<ConnectionId> {
        self.subscribers_of(project)
            .iter()
            .filter(|connection| !connection.send(event.clone()))
            .map(Connection::id)
            .collect()
    }
}
