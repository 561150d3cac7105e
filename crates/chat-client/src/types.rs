//! Public types for the chat client.

use std::time::Duration;

use parley_protocol::ChatEndpoint;
use parley_protocol::ChatMessage;
use parley_protocol::constants::{
    CLIENT_TYPE_VISITOR, CONSOLE_IDLE_TIMEOUT, HEALTH_CHECK_INTERVAL, NOTIFY_GRACE_PERIOD, RECONNECT_POLL_INTERVAL,
    RECONNECT_TIMEOUT, WIDGET_IDLE_TIMEOUT, WS_MAX_MESSAGE_SIZE, WS_PING_PERIOD, WS_PONG_WAIT,
};

/// State of the logical connection.
///
/// Failures always fall back to `Disconnected`; only an explicit
/// [`close`](crate::ChatClient::close) ends the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No physical handle is open.
    Disconnected,
    /// A handle was created and its handshake is in flight.
    Connecting,
    /// The handle is open and frames flow.
    Open,
    /// An explicit or idle close is tearing the handle down.
    Closing,
}

/// Events emitted to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// The logical connection changed state.
    StateChanged(ConnectionState),
    /// A message was appended to the tail of a room buffer.
    MessageAppended { room_id: String },
    /// Older history was inserted at the head of a room buffer.
    HistoryPrepended { room_id: String },
    /// A room buffer was emptied.
    RoomReset { room_id: String },
    /// The server-notify slot was overwritten.
    ServerNotify(Box<ChatMessage>),
    /// The server answered a directive with plain text.
    ServerReply(String),
}

/// Bounded wait for a reconnect to reach `Open`.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Total time a single reconnect may wait for the handle to open.
    pub timeout: Duration,
    /// Delay before the first readiness re-check.
    pub poll_interval: Duration,
    /// Upper bound on the delay between re-checks.
    pub max_poll_interval: Duration,
    /// Multiplier applied to the delay after each re-check.
    pub backoff_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            timeout: RECONNECT_TIMEOUT,
            poll_interval: RECONNECT_POLL_INTERVAL,
            max_poll_interval: Duration::from_secs(1),
            backoff_factor: 1.0,
        }
    }
}

impl ReconnectConfig {
    /// Delay before re-check number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let base = self.poll_interval.as_secs_f64();
        let secs = base * self.backoff_factor.max(1.0).powi(exp);
        let cap = self.max_poll_interval.as_secs_f64().max(base);
        Duration::from_secs_f64(secs.min(cap))
    }
}

/// Notification de-duplication settings.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// How long an issued notification suppresses the next one.
    pub grace_period: Duration,
    /// Title handed to the presenter.
    pub title: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            grace_period: NOTIFY_GRACE_PERIOD,
            title: "You have new messages".into(),
        }
    }
}

/// Chat client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: ChatEndpoint,
    /// Close the handle after this long without send or receive activity.
    pub idle_timeout: Duration,
    /// Interval of the closed-handle health check.
    pub health_check_interval: Duration,
    /// Keepalive ping period; `None` disables pings.
    pub ping_period: Option<Duration>,
    /// Treat the connection as dead when nothing arrives for this long.
    pub read_deadline: Option<Duration>,
    /// Inbound text frames above this size are dropped.
    pub max_message_size: usize,
    pub reconnect: ReconnectConfig,
    pub notify: NotifyConfig,
}

impl ClientConfig {
    /// Always-on operator console: idles out after a week.
    pub fn console(endpoint: ChatEndpoint) -> Self {
        Self {
            endpoint,
            idle_timeout: CONSOLE_IDLE_TIMEOUT,
            health_check_interval: HEALTH_CHECK_INTERVAL,
            ping_period: Some(WS_PING_PERIOD),
            read_deadline: Some(WS_PONG_WAIT),
            max_message_size: WS_MAX_MESSAGE_SIZE,
            reconnect: ReconnectConfig::default(),
            notify: NotifyConfig::default(),
        }
    }

    /// Embeddable visitor widget: connects as a visitor and idles out after
    /// a few minutes.
    pub fn widget(mut endpoint: ChatEndpoint) -> Self {
        endpoint.client_type = CLIENT_TYPE_VISITOR;
        Self {
            idle_timeout: WIDGET_IDLE_TIMEOUT,
            ..Self::console(endpoint)
        }
    }
}
