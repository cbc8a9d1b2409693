//! Wire protocol for room synchronization events.
//!
//! Messages are flat JSON objects with a `type` discriminator, exchanged
//! symmetrically between every participant and the relay:
//!
//! ```text
//! {"type": "code_update", "content": "x = 1\n"}
//! {"type": "user_joined"}
//! {"type": "user_left"}
//! ```
//!
//! `code_update` always carries the full current document text, not a diff.
//! The protocol is fire-and-forget: no versioning, no sequence numbers, no
//! acknowledgments. Ordering is whatever the underlying connection preserves.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A synchronization event on the room channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomMessage {
    /// Full current document text.
    CodeUpdate {
        content: String,
        /// Byte offset of the author's cursor, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cursor_position: Option<u64>,
    },
    /// Another participant attached to the room.
    UserJoined,
    /// A participant detached from the room.
    UserLeft,
}

impl RoomMessage {
    /// Create a `code_update` with no cursor offset.
    pub fn code_update(content: impl Into<String>) -> Self {
        Self::CodeUpdate {
            content: content.into(),
            cursor_position: None,
        }
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from a JSON text frame.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Protocol errors. Malformed inbound frames are dropped by the transport,
/// never surfaced to the session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}
