//! Message fan-out over a registry snapshot, with self-healing delivery.

use std::sync::Arc;

use metrics::counter;
use sala_core::ids::ParticipantId;
use sala_core::messages::ServerMessage;
use tracing::{debug, warn};

use crate::metrics::WS_BROADCAST_DROPS_TOTAL;
use crate::registry::ConnectionRegistry;

/// Delivers outbound messages to registered participants.
///
/// Every fan-out serializes the message once and iterates an owned snapshot,
/// never the live registry — a disconnect landing mid-broadcast can neither
/// crash the iteration nor skip the remaining recipients. A handle that
/// rejects a send is deregistered on the spot; no retry, and partial failure
/// is not reported to the caller.
pub struct BroadcastEngine {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastEngine {
    /// Create an engine over the given registry.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this engine heals.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Deliver `message` to every participant in the current snapshot.
    pub async fn broadcast(&self, message: &ServerMessage) {
        let Some(json) = serialize(message) else {
            return;
        };

        let snapshot = self.registry.snapshot().await;
        let mut to_remove = Vec::new();
        for (id, tx) in &snapshot {
            if tx.send(Arc::clone(&json)).is_err() {
                counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                warn!(
                    participant = %id,
                    message_type = message.message_type(),
                    "failed to deliver frame, deregistering recipient"
                );
                to_remove.push((id.clone(), tx.clone()));
            }
        }
        debug!(
            message_type = message.message_type(),
            recipients = snapshot.len() - to_remove.len(),
            "broadcast frame"
        );

        // Guarded removal: the id may have been re-registered (last-writer-
        // wins) since the snapshot was taken, and a newer channel must not
        // be evicted for its predecessor's failure.
        for (id, failed) in &to_remove {
            let _ = self.registry.unregister_if_current(id, failed).await;
        }
    }

    /// Deliver `message` to exactly one participant, if registered.
    ///
    /// An absent id is a silent no-op — the requester may already have
    /// disconnected. A failing handle is deregistered just like in
    /// [`broadcast`](Self::broadcast).
    pub async fn unicast(&self, id: &ParticipantId, message: &ServerMessage) {
        let Some(json) = serialize(message) else {
            return;
        };

        let snapshot = self.registry.snapshot().await;
        let Some((_, tx)) = snapshot.iter().find(|(entry_id, _)| entry_id == id) else {
            return;
        };
        if tx.send(json).is_err() {
            counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
            warn!(
                participant = %id,
                message_type = message.message_type(),
                "failed to deliver unicast frame, deregistering recipient"
            );
            let _ = self.registry.unregister_if_current(id, tx).await;
        }
    }
}

/// Serialize once per fan-out; a message that cannot serialize is dropped
/// with a warning rather than aborting the caller.
fn serialize(message: &ServerMessage) -> Option<Arc<String>> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Arc::new(json)),
        Err(error) => {
            warn!(
                message_type = message.message_type(),
                error = %error,
                "failed to serialize outbound message"
            );
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
