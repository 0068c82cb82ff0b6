//! Branded identifier newtypes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::GUEST_PREFIX;

/// Identifier of a connected participant.
///
/// Opaque and caller-derived: the transport layer builds one from the
/// caller-chosen path token via [`ParticipantId::from_token`]. Unique among
/// currently-connected participants; uniqueness is enforced by the registry's
/// last-writer-wins insert, not here.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Wrap an already-derived identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive an identifier from a caller-chosen connection token.
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        Self(format!("{GUEST_PREFIX}{token}"))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
