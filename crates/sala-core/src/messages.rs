//! Wire message model for the relay.
//!
//! Two message families:
//!
//! - **[`ClientFrame`]**: Inbound frames decoded from a participant's text
//!   frame (chat text, typing indicator, video-room requests, signaling).
//! - **[`ServerMessage`]**: Outbound frames the server fans out (enriched
//!   chat/typing, system notices, rosters, presence events, signaling).
//!
//! Both are closed tagged-variant enums discriminated on the `type` field,
//! with an explicit untagged passthrough case so unrecognized payloads are a
//! deliberate branch rather than a decode failure. Messages are transient:
//! constructed, serialized, delivered, then discarded.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::SYSTEM_USER;
use crate::ids::ParticipantId;

/// Current UTC time as an RFC 3339 string, the timestamp format every
/// outbound message carries.
#[must_use]
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ─────────────────────────────────────────────────────────────────────────────
// ClientFrame — inbound frames
// ─────────────────────────────────────────────────────────────────────────────

/// A decoded inbound frame.
///
/// Non-JSON (or non-object) frames never reach this type — the router treats
/// them as legacy plain-text chat. JSON objects with an unrecognized `type`
/// (or none at all) land in [`ClientFrame::Other`] and are relayed through
/// the passthrough path.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Chat text.
    #[serde(rename = "message")]
    Chat {
        /// Message body.
        content: String,
    },

    /// Typing-presence signal.
    #[serde(rename = "typing")]
    Typing {
        /// Whether the sender is currently typing.
        is_typing: bool,
    },

    /// Request to join the video sub-room.
    #[serde(rename = "join-room")]
    JoinRoom,

    /// Opaque peer-negotiation payload.
    #[serde(rename = "signal")]
    Signal {
        /// Intended recipient; relayed verbatim, never used for routing.
        target: String,
        /// Opaque negotiation data; relayed verbatim.
        signal: Value,
    },

    /// Request to leave the video sub-room.
    #[serde(rename = "leave-room")]
    LeaveRoom,

    /// Any other JSON object — forward-compatible passthrough.
    #[serde(untagged)]
    Other(serde_json::Map<String, Value>),
}

// ─────────────────────────────────────────────────────────────────────────────
// ServerMessage — outbound frames
// ─────────────────────────────────────────────────────────────────────────────

/// An outbound frame, serialized once per fan-out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Chat text, enriched with sender and server timestamp.
    #[serde(rename = "message")]
    Chat {
        /// Sender identifier.
        user: String,
        /// Message body.
        content: String,
        /// RFC 3339 server timestamp.
        timestamp: String,
    },

    /// Typing-presence signal, enriched with sender and server timestamp.
    #[serde(rename = "typing")]
    Typing {
        /// Sender identifier.
        user: String,
        /// Whether the sender is currently typing.
        is_typing: bool,
        /// RFC 3339 server timestamp.
        timestamp: String,
    },

    /// Server-authored notice (join/leave announcements).
    #[serde(rename = "system")]
    System {
        /// Always [`SYSTEM_USER`].
        user: String,
        /// Notice body.
        content: String,
        /// RFC 3339 server timestamp.
        timestamp: String,
    },

    /// Roster reply to a `join-room` request.
    #[serde(rename = "all-users")]
    AllUsers {
        /// Currently-registered identifiers, sorted.
        users: Vec<ParticipantId>,
    },

    /// A participant joined the video sub-room.
    #[serde(rename = "user-joined")]
    UserJoined {
        /// The joining participant.
        id: ParticipantId,
    },

    /// Relayed peer-negotiation payload.
    #[serde(rename = "signal")]
    Signal {
        /// Sending participant (attached by the server).
        from: ParticipantId,
        /// Intended recipient; recipients self-filter on this.
        target: String,
        /// Opaque negotiation data, unchanged from the inbound frame.
        signal: Value,
    },

    /// A participant left the video sub-room (or disconnected).
    #[serde(rename = "user-left-video")]
    UserLeftVideo {
        /// The departing participant.
        id: ParticipantId,
    },

    /// Forward-compatible passthrough: the original payload fields merged
    /// onto a sender/timestamp envelope, carried as-is (including whatever
    /// `type` the original declared).
    #[serde(untagged)]
    Passthrough(serde_json::Map<String, Value>),
}

impl ServerMessage {
    /// Chat text from `user`, stamped now.
    #[must_use]
    pub fn chat(user: &ParticipantId, content: impl Into<String>) -> Self {
        Self::Chat {
            user: user.to_string(),
            content: content.into(),
            timestamp: now_timestamp(),
        }
    }

    /// Typing indicator from `user`, stamped now.
    #[must_use]
    pub fn typing(user: &ParticipantId, is_typing: bool) -> Self {
        Self::Typing {
            user: user.to_string(),
            is_typing,
            timestamp: now_timestamp(),
        }
    }

    /// Server-authored notice, stamped now.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            user: SYSTEM_USER.to_owned(),
            content: content.into(),
            timestamp: now_timestamp(),
        }
    }

    /// Roster reply.
    #[must_use]
    pub fn all_users(users: Vec<ParticipantId>) -> Self {
        Self::AllUsers { users }
    }

    /// Video-room join event.
    #[must_use]
    pub fn user_joined(id: &ParticipantId) -> Self {
        Self::UserJoined { id: id.clone() }
    }

    /// Relayed signal with `from` attached.
    #[must_use]
    pub fn signal(from: &ParticipantId, target: impl Into<String>, signal: Value) -> Self {
        Self::Signal {
            from: from.clone(),
            target: target.into(),
            signal,
        }
    }

    /// Video-room leave event.
    #[must_use]
    pub fn user_left_video(id: &ParticipantId) -> Self {
        Self::UserLeftVideo { id: id.clone() }
    }

    /// Merge an unrecognized payload onto a `{user, timestamp}` envelope.
    ///
    /// Original fields win on conflict, so a payload that already carries
    /// `user` or `timestamp` passes through unchanged.
    #[must_use]
    pub fn passthrough(
        sender: &ParticipantId,
        original: serde_json::Map<String, Value>,
    ) -> Self {
        let mut envelope = serde_json::Map::new();
        let _ = envelope.insert("user".into(), Value::String(sender.to_string()));
        let _ = envelope.insert("timestamp".into(), Value::String(now_timestamp()));
        envelope.extend(original);
        Self::Passthrough(envelope)
    }

    /// The wire `type` string (for logging and tests).
    #[must_use]
    pub fn message_type(&self) -> &str {
        match self {
            Self::Chat { .. } => "message",
            Self::Typing { .. } => "typing",
            Self::System { .. } => "system",
            Self::AllUsers { .. } => "all-users",
            Self::UserJoined { .. } => "user-joined",
            Self::Signal { .. } => "signal",
            Self::UserLeftVideo { .. } => "user-left-video",
            Self::Passthrough(fields) => fields
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("passthrough"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
