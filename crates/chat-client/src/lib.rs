//! Resilient real-time chat client.
//!
//! [`ChatClient`] keeps a single WebSocket connection to the chat server
//! alive for as long as the session is active: an idle watch closes it after
//! a period without traffic, a health check reopens it after unexpected
//! drops, and every send reconnects first when needed. Inbound messages are
//! routed into per-room buffers or the server-notify slot by
//! [`MessageRouter`].

pub mod auth;
pub mod client;
pub mod error;
pub mod notify;
pub mod router;
pub mod transport;
pub mod types;

mod clock;
mod pumps;
mod supervisor;

#[cfg(test)]
mod testing;

pub use auth::{NoToken, StaticToken, TokenProvider};
pub use client::{ChatClient, ChatClientBuilder};
pub use error::{ClientError, TransportError};
pub use notify::{NotificationPresenter, NotifyGate, ViewFocus};
pub use router::{Conversations, DEFAULT_ROOM, MessageRouter, Route};
pub use transport::{Connector, WsConnector};
pub use types::{ChatEvent, ClientConfig, ConnectionState, NotifyConfig, ReconnectConfig};
