//! Public chat client.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tracing::{debug, info};

use parley_protocol::ChatMessage;
use parley_protocol::constants::join_directive;

use crate::auth::{NoToken, TokenProvider};
use crate::error::ClientError;
use crate::notify::{NotificationPresenter, Notifier, ViewFocus};
use crate::router::{MessageRouter, Route};
use crate::supervisor::Supervisor;
use crate::transport::{Connector, WsConnector};
use crate::types::{ChatEvent, ClientConfig, ConnectionState};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Builder for [`ChatClient`].
pub struct ChatClientBuilder {
    config: ClientConfig,
    tokens: Arc<dyn TokenProvider>,
    connector: Option<Arc<dyn Connector>>,
    presenter: Option<Arc<dyn NotificationPresenter>>,
    focus: Option<Arc<dyn ViewFocus>>,
}

impl ChatClientBuilder {
    /// Supplies the access token, read afresh on every connect.
    pub fn token_provider(mut self, tokens: impl TokenProvider) -> Self {
        self.tokens = Arc::new(tokens);
        self
    }

    /// Replaces the WebSocket connector.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Shows notifications for server-addressed messages.
    pub fn presenter(mut self, presenter: Arc<dyn NotificationPresenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    /// Suppresses notifications while the conversation view is open.
    pub fn view_focus(mut self, focus: Arc<dyn ViewFocus>) -> Self {
        self.focus = Some(focus);
        self
    }

    /// Builds the client. No connection is made until the first
    /// [`connect`](ChatClient::connect) or send.
    pub fn build(self) -> ChatClient {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let notifier = Notifier::new(
            self.presenter,
            self.focus,
            self.config.notify.grace_period,
            self.config.notify.title.clone(),
        );
        let router = Arc::new(MessageRouter::new(
            notifier,
            events_tx.clone(),
            self.config.max_message_size,
        ));
        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(WsConnector::new(self.config.max_message_size)),
        };
        let supervisor = Supervisor::new(
            self.config,
            connector,
            self.tokens,
            router.clone(),
            events_tx,
        );

        ChatClient {
            supervisor,
            router,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }
}

/// Resilient chat client.
///
/// Keeps one WebSocket connection alive while the session is active,
/// routes inbound messages into per-room buffers, and reconnects
/// transparently before a send when the connection has dropped.
pub struct ChatClient {
    supervisor: Arc<Supervisor>,
    router: Arc<MessageRouter>,
    events_rx: Mutex<Option<mpsc::Receiver<ChatEvent>>>,
}

impl ChatClient {
    pub fn builder(config: ClientConfig) -> ChatClientBuilder {
        ChatClientBuilder {
            config,
            tokens: Arc::new(NoToken),
            connector: None,
            presenter: None,
            focus: None,
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<ChatEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Starts connecting. A no-op while a connection is open or opening.
    pub fn connect(&self) -> Result<(), ClientError> {
        self.supervisor.connect()
    }

    /// Connects and waits until the connection is open, or fails with
    /// [`ClientError::ReconnectTimeout`].
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        self.supervisor.reconnect().await
    }

    /// Closes the connection and stops the idle and health timers. A later
    /// connect or send starts a new session.
    pub fn close(&self) {
        self.supervisor.close();
    }

    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// Whether the connection is physically open right now.
    pub fn is_open(&self) -> bool {
        self.supervisor.is_open()
    }

    /// When the idle watch will close the connection, if it is armed.
    pub fn idle_deadline(&self) -> Option<Instant> {
        self.supervisor.idle_deadline()
    }

    /// Transmits one raw text frame, reconnecting first when the connection
    /// is not open. Nothing is transmitted if the reconnect fails.
    pub async fn send(&self, payload: impl Into<String>) -> Result<(), ClientError> {
        let payload = payload.into();
        if !self.supervisor.is_open() {
            info!("connection not open, reconnecting before send");
            self.supervisor
                .reconnect()
                .await
                .map_err(ClientError::send_failed)?;
        }
        self.supervisor
            .write(payload)
            .await
            .map_err(ClientError::send_failed)?;
        debug!("frame sent");
        Ok(())
    }

    /// Asks the server to attach this connection to a room.
    pub async fn join_room(&self, room_id: &str) -> Result<(), ClientError> {
        self.send(join_directive(room_id)).await
    }

    /// Records an outgoing message in its room buffer, then transmits it.
    pub async fn send_talk(&self, message: ChatMessage) -> Result<Route, ClientError> {
        let frame = serde_json::to_string(&message)?;
        let route = self.router.handle(message)?;
        self.send(frame).await?;
        Ok(route)
    }

    /// Message buffers and routing.
    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    /// Re-enables notifications before the grace period runs out, e.g.
    /// when the user clicks the current one.
    pub fn dismiss_notification(&self) {
        self.router.notifier().gate().dismiss();
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.supervisor.close();
    }
}
