//! Inbound message routing.
//!
//! Every message lands in exactly one place: the single server-notify slot
//! (`to_server = true`) or the buffer of its room. Room buffers grow at the
//! tail for live traffic and at the head for backfilled history; the router
//! never re-sorts them.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};

use parley_protocol::{ChatMessage, DecodeError, InboundFrame};

use crate::notify::Notifier;
use crate::types::ChatEvent;

/// Buffer key for room-addressed messages that carry no `room_id`
/// (single-room widget traffic).
pub const DEFAULT_ROOM: &str = "";

/// Where a message was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Overwrote the server-notify slot.
    Server,
    /// Inserted into the buffer of this room.
    Room(String),
}

/// Room buffers plus the server-notify slot.
#[derive(Debug, Clone, Default)]
pub struct Conversations {
    rooms: HashMap<String, Vec<ChatMessage>>,
    server_notify: Option<ChatMessage>,
}

impl Conversations {
    /// Room buffers in no particular order.
    pub fn rooms(&self) -> impl Iterator<Item = (&str, &[ChatMessage])> {
        self.rooms
            .iter()
            .map(|(id, msgs)| (id.as_str(), msgs.as_slice()))
    }

    pub fn room(&self, room_id: &str) -> Option<&[ChatMessage]> {
        self.rooms.get(room_id).map(Vec::as_slice)
    }

    pub fn server_notify(&self) -> Option<&ChatMessage> {
        self.server_notify.as_ref()
    }
}

/// Classifies inbound messages and applies them to [`Conversations`].
pub struct MessageRouter {
    conversations: Mutex<Conversations>,
    notifier: Notifier,
    events_tx: mpsc::Sender<ChatEvent>,
    max_message_size: usize,
}

impl MessageRouter {
    pub(crate) fn new(
        notifier: Notifier,
        events_tx: mpsc::Sender<ChatEvent>,
        max_message_size: usize,
    ) -> Self {
        Self {
            conversations: Mutex::new(Conversations::default()),
            notifier,
            events_tx,
            max_message_size,
        }
    }

    /// Applies a live message: server-addressed messages overwrite the
    /// notify slot and may raise a notification, room messages append to
    /// the tail of their room.
    pub fn handle(&self, mut message: ChatMessage) -> Result<Route, DecodeError> {
        message.decode_files()?;

        if message.is_server_addressed() {
            self.set_server_notify(&message);
            self.notifier.notify(&message);
            return Ok(Route::Server);
        }

        let room_id = room_key(&message);
        self.lock()
            .rooms
            .entry(room_id.clone())
            .or_default()
            .push(message);
        trace!(room = %room_id, "message appended");
        self.emit(ChatEvent::MessageAppended {
            room_id: room_id.clone(),
        });
        Ok(Route::Room(room_id))
    }

    /// Applies a backfilled history message: room messages are inserted at
    /// the head of their room. The caller feeds history newest-first so
    /// that each insert predates what is already buffered.
    pub fn handle_add_first_message(&self, mut message: ChatMessage) -> Result<Route, DecodeError> {
        message.decode_files()?;

        if message.is_server_addressed() {
            self.set_server_notify(&message);
            return Ok(Route::Server);
        }

        let room_id = room_key(&message);
        self.lock()
            .rooms
            .entry(room_id.clone())
            .or_default()
            .insert(0, message);
        self.emit(ChatEvent::HistoryPrepended {
            room_id: room_id.clone(),
        });
        Ok(Route::Room(room_id))
    }

    /// Parses and routes one inbound text frame. Malformed frames are
    /// dropped with a warning.
    pub fn route_frame(&self, text: &str) -> Option<Route> {
        if text.len() > self.max_message_size {
            warn!("message too large ({} bytes), dropping", text.len());
            return None;
        }

        match InboundFrame::parse(text) {
            Ok(InboundFrame::Message(message)) => match self.handle(*message) {
                Ok(route) => Some(route),
                Err(e) => {
                    warn!(error = %e, "dropping message with undecodable attachments");
                    None
                }
            },
            Ok(InboundFrame::Reply(reply)) => {
                debug!(%reply, "server reply");
                self.emit(ChatEvent::ServerReply(reply));
                None
            }
            Err(e) => {
                warn!(error = %e, "failed to parse frame");
                None
            }
        }
    }

    /// Empties a room buffer, typically before reloading its history.
    pub fn reset_room(&self, room_id: &str) {
        self.lock().rooms.insert(room_id.to_string(), Vec::new());
        self.emit(ChatEvent::RoomReset {
            room_id: room_id.to_string(),
        });
    }

    /// Snapshot of a room buffer, oldest first.
    pub fn room_messages(&self, room_id: &str) -> Vec<ChatMessage> {
        self.lock().rooms.get(room_id).cloned().unwrap_or_default()
    }

    /// Room ids that have a buffer.
    pub fn rooms(&self) -> Vec<String> {
        self.lock().rooms.keys().cloned().collect()
    }

    /// Most recent server-addressed message.
    pub fn server_notify(&self) -> Option<ChatMessage> {
        self.lock().server_notify.clone()
    }

    /// Snapshot of all buffers and the notify slot.
    pub fn snapshot(&self) -> Conversations {
        self.lock().clone()
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    fn set_server_notify(&self, message: &ChatMessage) {
        self.lock().server_notify = Some(message.clone());
        self.emit(ChatEvent::ServerNotify(Box::new(message.clone())));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Conversations> {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ChatEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("event channel full, dropping event"),
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

fn room_key(message: &ChatMessage) -> String {
    message
        .room_id
        .clone()
        .unwrap_or_else(|| DEFAULT_ROOM.to_string())
}
