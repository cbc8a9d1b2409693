//! WebSocket transport: one full-duplex connection per room.
//!
//! The transport owns the socket and nothing else. It serializes outbound
//! [`RoomMessage`]s, decodes inbound frames, and forwards them in arrival
//! order through a single event channel. Connection failures and closes are
//! reported as events; the transport never retries on its own — reconnect
//! policy (if any) belongs to the controller, and today there is none.
//!
//! Sends are best-effort: while the connection is not open they are silently
//! dropped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::RoomMessage;

/// Buffered outbound frames before the writer applies backpressure.
const OUTGOING_CAPACITY: usize = 256;
/// Buffered inbound events before the reader applies backpressure.
const EVENT_CAPACITY: usize = 256;

/// Events delivered to the transport's consumer, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is open.
    Opened,
    /// A well-formed message arrived.
    Message(RoomMessage),
    /// The connection closed or errored. Not followed by further events.
    Closed,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket connect failed: {0}")]
    Connect(String),
}

/// One WebSocket connection scoped to a single room.
pub struct RoomTransport {
    relay_url: String,
    room_id: String,
    connected: Arc<AtomicBool>,
    outgoing_tx: Option<mpsc::Sender<String>>,
    event_tx: mpsc::Sender<TransportEvent>,
    event_rx: Option<mpsc::Receiver<TransportEvent>>,
    reader_task: Option<JoinHandle<()>>,
}

impl RoomTransport {
    pub fn new(relay_url: impl Into<String>, room_id: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        Self {
            relay_url: relay_url.into(),
            room_id: room_id.into(),
            connected: Arc::new(AtomicBool::new(false)),
            outgoing_tx: None,
            event_tx,
            event_rx: Some(event_rx),
            reader_task: None,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.event_rx.take()
    }

    fn url(&self) -> String {
        format!(
            "{}/ws/{}",
            self.relay_url.trim_end_matches('/'),
            self.room_id
        )
    }

    /// Open the connection and spawn the reader/writer tasks.
    ///
    /// Emits [`TransportEvent::Opened`] on success; the caller observes
    /// failure through the returned error and may keep the session alive in
    /// a disconnected state.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        let url = self.url();
        let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: drain the outgoing channel into the socket.
        let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTGOING_CAPACITY);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if ws_writer.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.send(Message::Close(None)).await;
        });

        self.connected.store(true, Ordering::Relaxed);
        let _ = self.event_tx.send(TransportEvent::Opened).await;
        log::info!("connected to room {} at {url}", self.room_id);

        // Reader task: decode frames in arrival order. Malformed payloads
        // are dropped, never fatal.
        let event_tx = self.event_tx.clone();
        let connected = self.connected.clone();
        self.reader_task = Some(tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match RoomMessage::decode(text.as_str()) {
                        Ok(message) => {
                            let _ = event_tx.send(TransportEvent::Message(message)).await;
                        }
                        Err(err) => log::debug!("dropping malformed frame: {err}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
            connected.store(false, Ordering::Relaxed);
            let _ = event_tx.send(TransportEvent::Closed).await;
        }));

        Ok(())
    }

    /// Send a message if the connection is open; silently drop it otherwise.
    pub async fn send(&self, message: &RoomMessage) {
        if !self.connected.load(Ordering::Relaxed) {
            log::debug!("dropping outbound message while disconnected");
            return;
        }
        let encoded = match message.encode() {
            Ok(encoded) => encoded,
            Err(err) => {
                log::warn!("failed to encode outbound message: {err}");
                return;
            }
        };
        if let Some(tx) = &self.outgoing_tx {
            if tx.send(encoded).await.is_err() {
                log::debug!("writer task gone; outbound message dropped");
            }
        }
    }

    /// Close the connection. Idempotent; safe to call when never connected.
    pub fn disconnect(&mut self) {
        self.connected.store(false, Ordering::Relaxed);
        // Dropping the sender ends the writer task, which sends a Close
        // frame on its way out.
        self.outgoing_tx = None;
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }
}

impl Drop for RoomTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> RoomTransport {
        RoomTransport::new("ws://127.0.0.1:9", "abc123")
    }

    #[test]
    fn test_url_keyed_by_room() {
        let t = transport();
        assert_eq!(t.url(), "ws://127.0.0.1:9/ws/abc123");

        let t = RoomTransport::new("ws://relay.example.com/", "r2");
        assert_eq!(t.url(), "ws://relay.example.com/ws/r2");
    }

    #[tokio::test]
    async fn test_send_while_disconnected_is_dropped() {
        let t = transport();
        assert!(!t.is_connected());
        // Best-effort contract: no error, no queueing, no panic.
        t.send(&RoomMessage::code_update("x = 1")).await;
    }

    #[tokio::test]
    async fn test_connect_failure_reported() {
        // Nothing listens on this port.
        let mut t = RoomTransport::new("ws://127.0.0.1:1", "nowhere");
        let result = t.connect().await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
        assert!(!t.is_connected());
    }

    #[test]
    fn test_take_event_rx_only_once() {
        let mut t = transport();
        assert!(t.take_event_rx().is_some());
        assert!(t.take_event_rx().is_none());
    }

    #[test]
    fn test_disconnect_idempotent() {
        let mut t = transport();
        t.disconnect();
        t.disconnect();
        assert!(!t.is_connected());
    }
}
