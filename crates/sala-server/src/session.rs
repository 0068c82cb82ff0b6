//! Per-connection control loop: accept, announce, route, clean up.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use sala_core::ids::ParticipantId;
use sala_core::messages::ServerMessage;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::broadcast::BroadcastEngine;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use crate::registry::{ConnectionRegistry, FrameSender};
use crate::router::MessageRouter;

/// Why a session left its open state.
///
/// Both variants converge on the same cleanup; the distinction exists only
/// for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CloseReason {
    /// The transport signaled an orderly close, or the stream ended.
    Graceful,
    /// A transport error while awaiting or processing a frame.
    Failed,
}

/// Drive one connection from registration to terminal cleanup.
///
/// State machine: Connecting → Open → Closed. Registration plus the join
/// announcement is the Connecting→Open edge; the read loop is Open; any
/// exit from the loop is the single Open→Closed edge.
pub async fn run(
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<BroadcastEngine>,
    router: Arc<MessageRouter>,
    socket: WebSocket,
    id: ParticipantId,
) {
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    registry.register(id.clone(), outbound_tx.clone()).await;
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!(participant = %id, "participant connected");

    // The participant is registered before the announcement goes out, so it
    // receives its own arrival notice.
    broadcaster
        .broadcast(&ServerMessage::system(format!("{id} entrou na sala.")))
        .await;

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Write loop: drains frames queued by fan-outs. Ends once every sender
    // clone is gone (cleanup drops the registry's copy) or the socket
    // rejects a send.
    let _write_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if ws_tx
                .send(Message::Text(frame.as_str().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // Read loop: the open state. Suspends on the next inbound frame and
    // remains open across any number of routed messages.
    let reason = loop {
        match ws_rx.next().await {
            Some(Ok(Message::Text(raw))) => router.route(&id, raw.as_str()).await,
            Some(Ok(Message::Close(_))) | None => break CloseReason::Graceful,
            Some(Ok(_)) => {} // ping/pong/binary — nothing to route
            Some(Err(error)) => {
                debug!(participant = %id, error = %error, "transport error while receiving");
                break CloseReason::Failed;
            }
        }
    };

    cleanup(&registry, &broadcaster, &id, &outbound_tx, reason).await;
}

/// The single cleanup path every exit converges on: deregister, announce the
/// departure, then broadcast `user-left-video` so peer-connection teardown
/// happens on every client whether or not the participant had joined the
/// video sub-room.
///
/// If a reconnect under the same identifier has already replaced this
/// session's registration (last-writer-wins), the participant is still
/// present through the newer channel: the stale session must neither evict
/// that entry nor announce a departure that did not happen.
async fn cleanup(
    registry: &ConnectionRegistry,
    broadcaster: &BroadcastEngine,
    id: &ParticipantId,
    our_handle: &FrameSender,
    reason: CloseReason,
) {
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);

    if !registry.unregister_if_current(id, our_handle).await {
        debug!(participant = %id, ?reason, "registration already replaced, skipping departure");
        return;
    }
    info!(participant = %id, ?reason, "participant disconnected");

    broadcaster
        .broadcast(&ServerMessage::system(format!("{id} saiu da sala.")))
        .await;
    broadcaster
        .broadcast(&ServerMessage::user_left_video(id))
        .await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        registry: Arc<ConnectionRegistry>,
        broadcaster: Arc<BroadcastEngine>,
    }

    fn harness() -> Harness {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(BroadcastEngine::new(Arc::clone(&registry)));
        Harness {
            registry,
            broadcaster,
        }
    }

    fn id(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    async fn register(h: &Harness, name: &str) -> (FrameSender, UnboundedReceiver<Arc<String>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        h.registry.register(id(name), tx.clone()).await;
        (tx, rx)
    }

    fn recv(rx: &mut UnboundedReceiver<Arc<String>>) -> serde_json::Value {
        serde_json::from_str(&rx.try_recv().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn cleanup_deregisters_then_announces_in_order() {
        let h = harness();
        let (_tx_a, mut rx_a) = register(&h, "Guest-a").await;
        let (tx_b, mut rx_b) = register(&h, "Guest-b").await;

        cleanup(
            &h.registry,
            &h.broadcaster,
            &id("Guest-b"),
            &tx_b,
            CloseReason::Graceful,
        )
        .await;

        assert_eq!(h.registry.list_ids().await, vec![id("Guest-a")]);

        // Remaining participants see the departure notice, then the
        // video-teardown event.
        let system = recv(&mut rx_a);
        assert_eq!(system["type"], "system");
        assert_eq!(system["content"], "Guest-b saiu da sala.");
        let left = recv(&mut rx_a);
        assert_eq!(left["type"], "user-left-video");
        assert_eq!(left["id"], "Guest-b");

        // The departing participant was deregistered before the
        // announcements, so it receives neither.
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn cleanup_on_failure_path_matches_graceful_path() {
        let h = harness();
        let (_tx_a, mut rx_a) = register(&h, "Guest-a").await;
        let (tx_b, _rx_b) = register(&h, "Guest-b").await;

        cleanup(
            &h.registry,
            &h.broadcaster,
            &id("Guest-b"),
            &tx_b,
            CloseReason::Failed,
        )
        .await;

        assert_eq!(recv(&mut rx_a)["type"], "system");
        assert_eq!(recv(&mut rx_a)["type"], "user-left-video");
        assert_eq!(h.registry.len().await, 1);
    }

    #[tokio::test]
    async fn cleanup_for_unknown_participant_leaves_others_untouched() {
        let h = harness();
        let (_tx_a, mut rx_a) = register(&h, "Guest-a").await;
        let (ghost_tx, _ghost_rx) = mpsc::unbounded_channel();

        cleanup(
            &h.registry,
            &h.broadcaster,
            &id("Guest-ghost"),
            &ghost_tx,
            CloseReason::Graceful,
        )
        .await;

        assert_eq!(h.registry.list_ids().await, vec![id("Guest-a")]);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn stale_cleanup_does_not_evict_a_reconnected_participant() {
        let h = harness();
        let (_tx_other, mut rx_other) = register(&h, "Guest-other").await;

        // First connection under Guest-1, then a reconnect overwrites it.
        let (old_tx, _old_rx) = register(&h, "Guest-1").await;
        let (_new_tx, mut new_rx) = register(&h, "Guest-1").await;

        cleanup(
            &h.registry,
            &h.broadcaster,
            &id("Guest-1"),
            &old_tx,
            CloseReason::Graceful,
        )
        .await;

        // The newer registration survives, and nobody heard a departure.
        assert!(h.registry.list_ids().await.contains(&id("Guest-1")));
        assert!(rx_other.try_recv().is_err());
        assert!(new_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn double_cleanup_is_idempotent() {
        let h = harness();
        let (_tx_a, mut rx_a) = register(&h, "Guest-a").await;
        let (tx_b, _rx_b) = register(&h, "Guest-b").await;

        cleanup(
            &h.registry,
            &h.broadcaster,
            &id("Guest-b"),
            &tx_b,
            CloseReason::Graceful,
        )
        .await;
        cleanup(
            &h.registry,
            &h.broadcaster,
            &id("Guest-b"),
            &tx_b,
            CloseReason::Graceful,
        )
        .await;

        // Exactly one departure pair.
        assert_eq!(recv(&mut rx_a)["type"], "system");
        assert_eq!(recv(&mut rx_a)["type"], "user-left-video");
        assert!(rx_a.try_recv().is_err());
    }
}
