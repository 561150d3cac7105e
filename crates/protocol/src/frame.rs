//! Chat frames exchanged over the WebSocket channel.
//!
//! Every JSON frame carries one [`ChatMessage`]. The server may also answer
//! directives (`/join ...`) with short plain-text replies; those are
//! surfaced as [`InboundFrame::Reply`] and never routed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Timestamp format used by the chat server for the `time` field.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors decoding inbound data.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Frame(#[source] serde_json::Error),

    #[error("malformed attachment list: {0}")]
    Attachments(#[source] serde_json::Error),
}

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub url: String,
    #[serde(default)]
    pub name: String,
}

/// Unread counters pushed to the console with server-addressed frames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyCounts {
    pub total_unread: i32,
    pub new_message: bool,
    #[serde(default)]
    pub message_counts: HashMap<String, i32>,
}

/// One chat frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub time: String,
    /// `true` when the current user authored the message.
    #[serde(default)]
    pub user: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Attachment list serialized as a JSON string (server-side storage form).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub str_files: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRef>,
    #[serde(default)]
    pub notify: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_server: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<NotifyCounts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
}

impl ChatMessage {
    /// Composes a talk message authored by the current user, stamped with
    /// the local time.
    pub fn text(text: impl Into<String>, room_id: Option<String>) -> Self {
        Self {
            text: text.into(),
            time: chrono::Local::now().format(TIME_FORMAT).to_string(),
            user: true,
            room_id,
            ..Self::default()
        }
    }

    /// Whether the frame targets the server-console slot instead of a room.
    pub fn is_server_addressed(&self) -> bool {
        self.to_server.unwrap_or(false)
    }

    /// Decodes `str_files` into `files`.
    ///
    /// An absent or blank string leaves `files` untouched. On success the
    /// raw string is consumed; on failure it is left in place.
    pub fn decode_files(&mut self) -> Result<(), DecodeError> {
        let Some(raw) = self.str_files.take() else {
            return Ok(());
        };
        if raw.trim().is_empty() {
            return Ok(());
        }
        match serde_json::from_str::<Vec<FileRef>>(&raw) {
            Ok(files) => {
                self.files = files;
                Ok(())
            }
            Err(e) => {
                self.str_files = Some(raw);
                Err(DecodeError::Attachments(e))
            }
        }
    }
}

/// A classified inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// A JSON chat frame.
    Message(Box<ChatMessage>),
    /// A plain-text reply to a directive (`joined`, `!!! ...`).
    Reply(String),
}

impl InboundFrame {
    /// Classifies a text frame. Anything that looks like a JSON object must
    /// parse as a [`ChatMessage`].
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        let trimmed = text.trim();
        if trimmed.starts_with('{') {
            serde_json::from_str(trimmed)
                .map(|m| Self::Message(Box::new(m)))
                .map_err(DecodeError::Frame)
        } else {
            Ok(Self::Reply(trimmed.to_string()))
        }
    }
}
