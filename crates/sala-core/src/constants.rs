//! Shared constants.

/// Author name attached to server-authored `system` messages.
pub const SYSTEM_USER: &str = "Sistema";

/// Prefix applied to the caller-chosen token when deriving a participant
/// identifier at the transport boundary.
pub const GUEST_PREFIX: &str = "Guest-";
