//! Authoritative mapping from participant identifier to live channel handle.

use std::collections::HashMap;
use std::sync::Arc;

use sala_core::ids::ParticipantId;
use tokio::sync::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound capability for one participant: pre-serialized frames pushed
/// here are drained by that connection's write loop. The send fails exactly
/// when the write loop is gone, which is the delivery-failure signal the
/// broadcast engine heals on.
pub type FrameSender = mpsc::UnboundedSender<Arc<String>>;

/// Registry of currently-connected participants.
///
/// The only shared mutable state in the relay. Mutation happens solely
/// through the register/unregister operations; fan-out reads go through
/// [`snapshot`](Self::snapshot) so an in-progress broadcast never iterates
/// the live map.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ParticipantId, FrameSender>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace the entry for `id`.
    ///
    /// Overwrite is intentional (last-writer-wins): a reconnect under the
    /// same identifier steals the registry slot, and the previous channel
    /// becomes unreachable via broadcast even if not yet physically closed.
    pub async fn register(&self, id: ParticipantId, handle: FrameSender) {
        let mut conns = self.connections.write().await;
        if conns.insert(id.clone(), handle).is_some() {
            debug!(participant = %id, "registration replaced an existing channel");
        } else {
            debug!(participant = %id, "registered connection");
        }
    }

    /// Remove the entry for `id` if present.
    ///
    /// Removing an absent id is a no-op, so cleanup stays idempotent across
    /// the multiple failure paths that converge on it.
    pub async fn unregister(&self, id: &ParticipantId) {
        let mut conns = self.connections.write().await;
        if conns.remove(id).is_some() {
            debug!(participant = %id, "unregistered connection");
        }
    }

    /// Remove the entry for `id` only if its registered channel is `handle`.
    ///
    /// Both self-healing and session cleanup race reconnects under the
    /// last-writer-wins policy: by the time either path runs, the identifier
    /// may already belong to a newer channel, which must not be evicted.
    /// Returns whether the entry was removed.
    pub async fn unregister_if_current(&self, id: &ParticipantId, handle: &FrameSender) -> bool {
        let mut conns = self.connections.write().await;
        match conns.get(id) {
            Some(current) if current.same_channel(handle) => {
                let _ = conns.remove(id);
                debug!(participant = %id, "unregistered connection");
                true
            }
            _ => false,
        }
    }

    /// Defensive copy of all current `(id, handle)` pairs, atomic with
    /// respect to concurrent register/unregister.
    pub async fn snapshot(&self) -> Vec<(ParticipantId, FrameSender)> {
        let conns = self.connections.read().await;
        conns
            .iter()
            .map(|(id, tx)| (id.clone(), tx.clone()))
            .collect()
    }

    /// Current participant identifiers, sorted so roster replies are
    /// deterministic.
    pub async fn list_ids(&self) -> Vec<ParticipantId> {
        let conns = self.connections.read().await;
        let mut ids: Vec<ParticipantId> = conns.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered participants.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
