//! Inbound frame decode, classification, enrichment, and delivery mode.

use std::sync::Arc;

use metrics::counter;
use sala_core::ids::ParticipantId;
use sala_core::messages::{ClientFrame, ServerMessage};
use tracing::debug;

use crate::broadcast::BroadcastEngine;
use crate::metrics::WS_MESSAGES_ROUTED_TOTAL;
use crate::registry::ConnectionRegistry;

/// Routes each inbound text frame from a participant.
///
/// Decodes the frame, classifies it by its declared `type`, enriches it with
/// server-known facts (sender identity, timestamp), and picks the delivery
/// mode: broadcast-to-all, unicast-to-sender, or both. Decode failures are
/// recovered locally (legacy plain-text chat), never surfaced to the sender.
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<BroadcastEngine>,
}

impl MessageRouter {
    /// Create a router over the given registry and broadcast engine.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, broadcaster: Arc<BroadcastEngine>) -> Self {
        Self {
            registry,
            broadcaster,
        }
    }

    /// Route one raw text frame received from `sender`.
    pub async fn route(&self, sender: &ParticipantId, raw: &str) {
        let Ok(frame) = serde_json::from_str::<ClientFrame>(raw) else {
            // Backward-compatible fallback: the whole frame is chat text.
            debug!(participant = %sender, "non-JSON frame, relaying as plain chat");
            self.count("plain-text");
            self.broadcaster
                .broadcast(&ServerMessage::chat(sender, raw))
                .await;
            return;
        };

        match frame {
            ClientFrame::Chat { content } => {
                self.count("message");
                self.broadcaster
                    .broadcast(&ServerMessage::chat(sender, content))
                    .await;
            }
            ClientFrame::Typing { is_typing } => {
                self.count("typing");
                self.broadcaster
                    .broadcast(&ServerMessage::typing(sender, is_typing))
                    .await;
            }
            ClientFrame::JoinRoom => {
                self.count("join-room");
                // Roster first: the requester must hold the current roster
                // before it starts seeing itself in user-joined events.
                let users = self.registry.list_ids().await;
                self.broadcaster
                    .unicast(sender, &ServerMessage::all_users(users))
                    .await;
                self.broadcaster
                    .broadcast(&ServerMessage::user_joined(sender))
                    .await;
            }
            ClientFrame::Signal { target, signal } => {
                self.count("signal");
                // Fan-out-and-filter: every participant receives every
                // signal and self-filters on `target`.
                self.broadcaster
                    .broadcast(&ServerMessage::signal(sender, target, signal))
                    .await;
            }
            ClientFrame::LeaveRoom => {
                self.count("leave-room");
                self.broadcaster
                    .broadcast(&ServerMessage::user_left_video(sender))
                    .await;
            }
            ClientFrame::Other(fields) => {
                self.count("passthrough");
                debug!(participant = %sender, "relaying unrecognized frame type");
                self.broadcaster
                    .broadcast(&ServerMessage::passthrough(sender, fields))
                    .await;
            }
        }
    }

    fn count(&self, message_type: &'static str) {
        counter!(WS_MESSAGES_ROUTED_TOTAL, "message_type" => message_type).increment(1);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
