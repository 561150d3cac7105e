//! Error types for the chat client.

use std::time::Duration;

use parley_protocol::{DecodeError, EndpointError};
use tokio_tungstenite::tungstenite;

/// Errors from the physical connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("connection is not open")]
    NotOpen,

    #[error("connection closed")]
    Closed,
}

/// Errors surfaced to callers of the chat client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("reconnect did not open within {0:?}")]
    ReconnectTimeout(Duration),

    #[error("send failed: {reason}")]
    SendFailed { reason: String },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    pub(crate) fn send_failed(reason: impl std::fmt::Display) -> Self {
        Self::SendFailed {
            reason: reason.to_string(),
        }
    }
}
