//! Per-room orchestration: the only place where I/O and state mutation
//! interleave.
//!
//! The controller owns the session store, the transport and the completion
//! scheduler for exactly one room. All mutations happen on a single event
//! loop that interleaves three inputs in arrival order:
//!
//! ```text
//! text surface ──commands──▶ ┌────────────────┐ ◀──events── RoomTransport
//!                            │ SyncController │
//!        SessionEvent ◀───── │   run() loop   │ ◀──notices─ CompletionScheduler
//!                            └───────┬────────┘
//!                                    ▼
//!                              SessionStore
//! ```
//!
//! A session is created on room entry (after a successful directory lookup)
//! and destroyed on exit; there is no process-wide state. Leaving the room
//! cancels both timers and closes the connection; async results that resolve
//! afterwards find their channels closed and mutate nothing.

use std::sync::Arc;

use coderoom_api::{ApiError, CompletionProvider, RoomDirectory};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

use crate::protocol::RoomMessage;
use crate::scheduler::{CompletionScheduler, SchedulerConfig, SchedulerNotice};
use crate::session::{ConnectionState, SessionStore};
use crate::transport::{RoomTransport, TransportEvent};

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;

/// Events emitted to the text surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The room channel is open; edits now propagate.
    Connected,
    /// The room channel closed; edits keep applying locally only.
    Disconnected,
    /// A remote update replaced the document. The surface should display
    /// `content`; its change notification for doing so is suppressed.
    DocumentReplaced { content: String },
    PresenceChanged { count: usize },
    SuggestionChanged { suggestion: Option<String> },
}

/// Commands a surface sends into the event loop.
#[derive(Debug, Clone)]
enum Command {
    Edit { content: String, cursor: usize },
    DismissSuggestion,
    Leave,
}

/// Room entry failed; the caller should leave the room entirely.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("room lookup failed: {0}")]
    RoomLookup(#[source] ApiError),
}

/// Clonable handle for feeding surface input into a running session.
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    /// Report a keystroke-level content change with the cursor's byte
    /// offset. Best-effort: silently ignored after the session ends.
    pub async fn edit(&self, content: impl Into<String>, cursor: usize) {
        let _ = self
            .command_tx
            .send(Command::Edit {
                content: content.into(),
                cursor,
            })
            .await;
    }

    /// Dismiss the pending suggestion, if any.
    pub async fn dismiss_suggestion(&self) {
        let _ = self.command_tx.send(Command::DismissSuggestion).await;
    }

    /// Leave the room, tearing the session down.
    pub async fn leave(&self) {
        let _ = self.command_tx.send(Command::Leave).await;
    }
}

/// Orchestrator for one room session. See the module docs for the data flow.
pub struct SyncController {
    session: Arc<RwLock<SessionStore>>,
    transport: RoomTransport,
    scheduler: CompletionScheduler,
    transport_rx: mpsc::Receiver<TransportEvent>,
    notice_rx: mpsc::Receiver<SchedulerNotice>,
    command_rx: mpsc::Receiver<Command>,
    /// Held only until `run` starts, so that once every external handle is
    /// dropped the command channel closes and the loop winds down.
    command_tx: Option<mpsc::Sender<Command>>,
    event_tx: mpsc::Sender<SessionEvent>,
    event_rx: Option<mpsc::Receiver<SessionEvent>>,
    /// Seq of the last applied suggestion response; older responses arriving
    /// late are discarded rather than overwriting a newer outcome.
    applied_seq: u64,
}

/// One resolved input for the event loop.
enum Step {
    Transport(Option<TransportEvent>),
    Command(Option<Command>),
    Notice(Option<SchedulerNotice>),
}

impl SyncController {
    /// Enter a room: look it up in the directory, seed the session and open
    /// the transport.
    ///
    /// A failed lookup destroys the session immediately — the caller should
    /// redirect away. A failed transport connect does NOT fail the join: the
    /// user can still edit locally, the edits just will not propagate (no
    /// automatic reconnect exists).
    pub async fn join(
        directory: Arc<dyn RoomDirectory>,
        completions: Arc<dyn CompletionProvider>,
        relay_url: impl Into<String>,
        room_id: impl Into<String>,
        config: SchedulerConfig,
    ) -> Result<Self, JoinError> {
        let room_id = room_id.into();
        let room = match directory.get_room(&room_id).await {
            Ok(room) => room,
            Err(err) => {
                log::warn!("room {room_id}: lookup failed: {err}");
                return Err(JoinError::RoomLookup(err));
            }
        };

        let mut store = SessionStore::new();
        store.set_room_id(room.room_id.as_str());
        store.set_document(room.code);
        store.set_language(room.language.as_str());
        store.set_connection(ConnectionState::Connecting);
        let session = Arc::new(RwLock::new(store));

        let mut transport = RoomTransport::new(relay_url, room_id.as_str());
        let transport_rx = transport
            .take_event_rx()
            .expect("event receiver taken from a fresh transport");
        if let Err(err) = transport.connect().await {
            log::warn!("room {room_id}: connect failed, editing locally: {err}");
            session
                .write()
                .await
                .set_connection(ConnectionState::Disconnected);
        }

        let mut scheduler =
            CompletionScheduler::new(completions, room.language.as_str(), config);
        let notice_rx = scheduler
            .take_notice_rx()
            .expect("notice receiver taken from a fresh scheduler");

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);

        Ok(Self {
            session,
            transport,
            scheduler,
            transport_rx,
            notice_rx,
            command_rx,
            command_tx: Some(command_tx),
            event_tx,
            event_rx: Some(event_rx),
            applied_seq: 0,
        })
    }

    /// Shared read access to the session state. The controller is the only
    /// writer.
    pub fn session(&self) -> Arc<RwLock<SessionStore>> {
        self.session.clone()
    }

    /// Create a command handle. Must be called before [`Self::run`], which
    /// consumes the controller.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            command_tx: self
                .command_tx
                .clone()
                .expect("command channel open until run() consumes the controller"),
        }
    }

    /// Take the surface event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.event_rx.take()
    }

    /// Run the session event loop until the surface leaves the room (or all
    /// handles are dropped), then tear everything down.
    pub async fn run(mut self) {
        // From here on, only external handles keep the command channel open.
        self.command_tx = None;
        loop {
            let step = tokio::select! {
                event = self.transport_rx.recv() => Step::Transport(event),
                command = self.command_rx.recv() => Step::Command(command),
                notice = self.notice_rx.recv() => Step::Notice(notice),
            };

            match step {
                Step::Transport(Some(event)) => self.on_transport(event).await,
                Step::Command(Some(command)) => {
                    if !self.on_command(command).await {
                        break;
                    }
                }
                Step::Notice(Some(notice)) => self.on_notice(notice).await,
                // A closed channel means an owner went away; the session is
                // over either way.
                Step::Transport(None) | Step::Command(None) | Step::Notice(None) => break,
            }
        }
        self.teardown().await;
    }

    async fn on_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                self.session
                    .write()
                    .await
                    .set_connection(ConnectionState::Connected);
                self.emit(SessionEvent::Connected).await;
            }
            TransportEvent::Closed => {
                // No automatic reconnect and no resync on reconnection —
                // the session degrades to local-only editing.
                self.session
                    .write()
                    .await
                    .set_connection(ConnectionState::Disconnected);
                self.emit(SessionEvent::Disconnected).await;
            }
            TransportEvent::Message(message) => self.on_message(message).await,
        }
    }

    async fn on_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::CodeUpdate { content, .. } => {
                {
                    let mut session = self.session.write().await;
                    // Arm before applying: if the surface synchronously
                    // echoes the programmatic update as a local edit, the
                    // flag is already set when that edit arrives.
                    session.arm_echo_suppression();
                    session.set_document(content.clone());
                }
                self.emit(SessionEvent::DocumentReplaced { content }).await;
            }
            RoomMessage::UserJoined => {
                let count = {
                    let mut session = self.session.write().await;
                    session.increment_presence();
                    session.presence()
                };
                self.emit(SessionEvent::PresenceChanged { count }).await;
            }
            RoomMessage::UserLeft => {
                let count = {
                    let mut session = self.session.write().await;
                    session.decrement_presence();
                    session.presence()
                };
                self.emit(SessionEvent::PresenceChanged { count }).await;
            }
        }
    }

    /// Returns false when the session should end.
    async fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::Edit { content, cursor } => {
                {
                    let mut session = self.session.write().await;
                    if session.take_echo_suppression() {
                        // The surface echoing a remote application; the
                        // store already holds this text. Re-broadcasting it
                        // would bounce updates between participants forever.
                        return true;
                    }
                    session.set_document(content.clone());
                }
                self.transport
                    .send(&RoomMessage::code_update(content.clone()))
                    .await;
                self.scheduler.record_edit(&content, cursor);
            }
            Command::DismissSuggestion => {
                self.scheduler.cancel_expiry();
                if self.session.write().await.clear_suggestion() {
                    self.emit(SessionEvent::SuggestionChanged { suggestion: None })
                        .await;
                }
            }
            Command::Leave => return false,
        }
        true
    }

    async fn on_notice(&mut self, notice: SchedulerNotice) {
        match notice {
            SchedulerNotice::SuggestionReady { seq, suggestion } => {
                if seq < self.applied_seq {
                    log::debug!("discarding stale completion response (seq {seq})");
                    return;
                }
                self.applied_seq = seq;
                self.session
                    .write()
                    .await
                    .set_suggestion(suggestion.clone());
                self.scheduler.schedule_expiry(seq);
                self.emit(SessionEvent::SuggestionChanged {
                    suggestion: Some(suggestion),
                })
                .await;
            }
            SchedulerNotice::SuggestionExpired { seq } => {
                // Only the currently displayed suggestion expires; a newer
                // one already re-armed its own timer.
                if seq != self.applied_seq {
                    return;
                }
                if self.session.write().await.clear_suggestion() {
                    self.emit(SessionEvent::SuggestionChanged { suggestion: None })
                        .await;
                }
            }
        }
    }

    async fn teardown(&mut self) {
        self.scheduler.shutdown();
        self.transport.disconnect();
        let mut session = self.session.write().await;
        session.set_connection(ConnectionState::Disconnected);
        if let Some(room_id) = session.room_id() {
            log::info!("left room {room_id}");
        }
    }

    async fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event).await;
    }
}
