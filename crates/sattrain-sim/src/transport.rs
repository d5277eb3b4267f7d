//! Transport boundary.
//!
//! The core only needs room membership keyed by session id and a way to
//! push events into a room. Inbound commands arrive through
//! `SessionManager::route_command`; the streaming adapter (WebSocket in the
//! gateway) owns the connection and calls it.

use crate::core::SessionId;
use crate::events::SessionEvent;
use crate::metrics;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::trace;

pub trait Transport: Send + Sync {
    fn join(&self, session_id: &SessionId);

    fn leave(&self, session_id: &SessionId);

    /// Push an event to every endpoint in the session's room.
    fn emit(&self, session_id: &SessionId, event: SessionEvent);
}

/// In-process rooms backed by `tokio::sync::broadcast`.
///
/// Slow subscribers lag and skip events rather than blocking the session.
pub struct BroadcastRooms {
    capacity: usize,
    rooms: RwLock<HashMap<SessionId, broadcast::Sender<Arc<SessionEvent>>>>,
}

impl BroadcastRooms {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to a room. `None` when the session has no room.
    pub fn subscribe(&self, session_id: &SessionId) -> Option<broadcast::Receiver<Arc<SessionEvent>>> {
        let rooms = self.rooms.read().unwrap_or_else(|e| e.into_inner());
        rooms.get(session_id).map(|tx| tx.subscribe())
    }

    pub fn has_room(&self, session_id: &SessionId) -> bool {
        let rooms = self.rooms.read().unwrap_or_else(|e| e.into_inner());
        rooms.contains_key(session_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Transport for BroadcastRooms {
    fn join(&self, session_id: &SessionId) {
        let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        rooms
            .entry(session_id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
    }

    fn leave(&self, session_id: &SessionId) {
        // Dropping the sender closes every subscriber's stream.
        let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        rooms.remove(session_id);
    }

    fn emit(&self, session_id: &SessionId, event: SessionEvent) {
        let rooms = self.rooms.read().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = rooms.get(session_id) else {
            trace!(%session_id, event = event.name(), "no room for event");
            return;
        };
        metrics::EVENTS_EMITTED
            .with_label_values(&[event.name()])
            .inc();
        // No subscribers is not an error.
        let _ = tx.send(Arc::new(event));
    }
}
