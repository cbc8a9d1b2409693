//! Client-visible session state and its pure transitions.
//!
//! `SessionStore` holds everything a text surface needs to render a room:
//! the shared document, presence count, pending suggestion and connection
//! state. Every transition is atomic and side-effect-free — the store never
//! touches the transport or the completion service. The sync controller is
//! the only writer, which keeps I/O/state interleaving (and therefore
//! ordering bugs) confined to one place.

use coderoom_api::DEFAULT_LANGUAGE;

/// Lifecycle of the room's transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal: the room lookup failed and the session is being discarded.
    Failed,
}

/// Authoritative client-side state for one room session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    room_id: Option<String>,
    document: String,
    language: String,
    presence: usize,
    suggestion: Option<String>,
    connection: ConnectionState,
    /// Armed right before a remote update is applied; consumed by the next
    /// local-edit notification so the surface's programmatic echo is not
    /// re-broadcast.
    suppress_next_edit: bool,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            room_id: None,
            document: String::new(),
            language: DEFAULT_LANGUAGE.to_string(),
            presence: 1,
            suggestion: None,
            connection: ConnectionState::Disconnected,
            suppress_next_edit: false,
        }
    }

    // ── Transitions ─────────────────────────────────────────────────

    /// Bind the session to a room. Immutable once set.
    pub fn set_room_id(&mut self, room_id: impl Into<String>) {
        if self.room_id.is_none() {
            self.room_id = Some(room_id.into());
        } else {
            log::warn!("ignoring room id change on an active session");
        }
    }

    /// Replace the document text. Newest write wins, local or remote.
    pub fn set_document(&mut self, text: impl Into<String>) {
        self.document = text.into();
    }

    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = language.into();
    }

    pub fn increment_presence(&mut self) {
        self.presence += 1;
    }

    /// Decrement the participant count, clamped at 1 (self is always
    /// present). Lost notifications can make the counter drift; it never
    /// goes below the floor.
    pub fn decrement_presence(&mut self) {
        self.presence = self.presence.saturating_sub(1).max(1);
    }

    pub fn set_suggestion(&mut self, suggestion: impl Into<String>) {
        self.suggestion = Some(suggestion.into());
    }

    /// Clear the pending suggestion. Returns whether one was present.
    pub fn clear_suggestion(&mut self) -> bool {
        self.suggestion.take().is_some()
    }

    pub fn set_connection(&mut self, state: ConnectionState) {
        self.connection = state;
    }

    /// Arm echo suppression. Must happen before the remote update is
    /// applied, so a synchronous change notification from the surface finds
    /// the flag already set.
    pub fn arm_echo_suppression(&mut self) {
        self.suppress_next_edit = true;
    }

    /// Consume the echo-suppression flag. Returns whether it was armed.
    pub fn take_echo_suppression(&mut self) -> bool {
        std::mem::take(&mut self.suppress_next_edit)
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn presence(&self) -> usize {
        self.presence
    }

    pub fn suggestion(&self) -> Option<&str> {
        self.suggestion.as_deref()
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
