//! # coderoom-collab — session synchronization engine for shared code editing
//!
//! Lets two or more participants edit one document concurrently through a
//! central relay, with an on-demand completion helper driven by typing
//! pauses. Reconciliation is deliberately simple: every update carries the
//! full document text and the newest write wins — no operational transforms,
//! no CRDTs.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  keystrokes  ┌────────────────┐   CodeUpdate    ┌───────┐
//! │ text surface │ ───────────▶ │ SyncController │ ◄─────────────► │ relay │
//! │  (external)  │ ◄─────────── │  (event loop)  │  UserJoined/Left└───────┘
//! └──────────────┘ SessionEvent └───────┬────────┘
//!                                       │
//!                     ┌─────────────────┼──────────────────┐
//!                     ▼                 ▼                  ▼
//!              ┌──────────────┐ ┌──────────────┐ ┌─────────────────────┐
//!              │ SessionStore │ │ RoomTransport│ │ CompletionScheduler │
//!              │ (pure state) │ │ (WebSocket)  │ │ (debounce + expiry) │
//!              └──────────────┘ └──────────────┘ └─────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — flat JSON wire messages (`code_update`, `user_joined`,
//!   `user_left`)
//! - [`transport`] — one WebSocket connection per room, best-effort sends
//! - [`session`] — client-visible room state with pure transitions
//! - [`scheduler`] — idle-window debounce driving the completion service
//! - [`controller`] — the per-room event loop tying everything together
//! - [`timer`] — single-purpose cancellable timers
//!
//! Room records and completions come from the external HTTP services behind
//! the traits in `coderoom-api`.

pub mod controller;
pub mod protocol;
pub mod scheduler;
pub mod session;
pub mod timer;
pub mod transport;

// Re-exports for convenience
pub use controller::{JoinError, SessionEvent, SessionHandle, SyncController};
pub use protocol::{ProtocolError, RoomMessage};
pub use scheduler::{CompletionScheduler, SchedulerConfig, SchedulerNotice};
pub use session::{ConnectionState, SessionStore};
pub use timer::ResettableTimer;
pub use transport::{RoomTransport, TransportError, TransportEvent};
