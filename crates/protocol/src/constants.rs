//! Protocol constants shared by the client and its tests.

use std::time::Duration;

/// Path of the chat WebSocket endpoint.
pub const CHAT_ENDPOINT_PATH: &str = "/ws/chat";

/// `client` query value identifying a console (operator) client.
pub const CLIENT_TYPE_CONSOLE: u8 = 0;

/// `client` query value identifying a visitor (widget) client.
pub const CLIENT_TYPE_VISITOR: u8 = 1;

/// Prefix of the plain-text directive that joins a room.
pub const JOIN_COMMAND: &str = "/join";

/// Maximum accepted text frame size (1 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Interval between keepalive pings.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(30);

/// Read deadline: no frame within this window means the connection is dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// Idle timeout of the always-on console client.
pub const CONSOLE_IDLE_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Idle timeout of the embeddable widget.
pub const WIDGET_IDLE_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Interval of the connection health check.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound on a single reconnect attempt.
pub const RECONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval while waiting for a reconnect to open.
pub const RECONNECT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Window during which a second notification is suppressed.
pub const NOTIFY_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Builds the directive that joins `room_id`.
pub fn join_directive(room_id: &str) -> String {
    format!("{JOIN_COMMAND} {room_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_directive_format() {
        assert_eq!(join_directive("r1"), "/join r1");
    }

    #[test]
    fn widget_idles_out_before_console() {
        assert!(WIDGET_IDLE_TIMEOUT < CONSOLE_IDLE_TIMEOUT);
        assert_eq!(CONSOLE_IDLE_TIMEOUT.as_secs(), 604_800);
    }
}
