//! Wire protocol for the Parley chat channel.
//!
//! Newline-free JSON text frames over a WebSocket, plus plain-text
//! directives such as `/join <room>`.

pub mod constants;
pub mod endpoint;
pub mod frame;

pub use endpoint::{ChatEndpoint, EndpointError};
pub use frame::{ChatMessage, DecodeError, FileRef, InboundFrame, NotifyCounts};
