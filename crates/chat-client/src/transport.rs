//! Physical WebSocket connection.
//!
//! A [`TransportHandle`] wraps exactly one socket. It is created in the
//! `Connecting` state and performs its handshake in the background, the way
//! a browser `WebSocket` does; the owner learns about progress through an
//! [`EventCallback`] and can poll [`TransportHandle::ready_state`]. Handles
//! are never reused: a reconnect opens a fresh one.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures_util::{Sink, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TransportError;

/// Outbound half of a connected socket.
pub type FrameSink = Pin<Box<dyn Sink<tungstenite::Message, Error = tungstenite::Error> + Send>>;

/// Inbound half of a connected socket.
pub type FrameStream =
    Pin<Box<dyn Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Send>>;

/// A boxed handshake future returned by [`Connector::connect`].
pub type ConnectFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(FrameSink, FrameStream), tungstenite::Error>> + Send + 'a>>;

/// Opens physical connections.
///
/// [`WsConnector`] is the production implementation; tests substitute
/// in-memory sockets.
pub trait Connector: Send + Sync + 'static {
    fn connect<'a>(&'a self, url: &'a str) -> ConnectFuture<'a>;
}

/// Socket-level cap as a multiple of the routing limit. Oversized messages
/// below it are read and dropped by the router; anything larger closes the
/// socket.
const HARD_LIMIT_FACTOR: usize = 16;

/// Connects over `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    max_message_size: usize,
}

impl WsConnector {
    /// `max_message_size` is the routing limit; the socket accepts up to
    /// 16 times more.
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    fn hard_limit(&self) -> usize {
        self.max_message_size.saturating_mul(HARD_LIMIT_FACTOR)
    }
}

impl Connector for WsConnector {
    fn connect<'a>(&'a self, url: &'a str) -> ConnectFuture<'a> {
        Box::pin(async move {
            let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
            ws_config.max_message_size = Some(self.hard_limit());
            let (ws_stream, _) =
                tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
            let (write, read) = ws_stream.split();
            Ok((Box::pin(write) as FrameSink, Box::pin(read) as FrameStream))
        })
    }
}

/// Readiness of one handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Lifecycle notifications from a handle, delivered in order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TransportEvent {
    Opened,
    Frame(String),
    Error(String),
    Closed,
}

/// Receives [`TransportEvent`]s. Invoked from the handle's driver task.
pub(crate) type EventCallback = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// Per-handle settings.
#[derive(Debug, Clone)]
pub(crate) struct TransportSettings {
    pub(crate) connect_timeout: Duration,
    pub(crate) ping_period: Option<Duration>,
    pub(crate) read_deadline: Option<Duration>,
}

/// Short-lived write access to an open handle.
#[derive(Clone)]
pub(crate) struct TransportWriter {
    write_tx: mpsc::Sender<tungstenite::Message>,
    ready: Arc<AtomicU8>,
}

impl TransportWriter {
    /// Queues a text frame. Fails unless the handle is open.
    pub(crate) async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if ReadyState::from_u8(self.ready.load(Ordering::Acquire)) != ReadyState::Open {
            return Err(TransportError::NotOpen);
        }
        self.write_tx
            .send(tungstenite::Message::Text(text.into()))
            .await
            .map_err(|_| TransportError::Closed)
    }
}

/// One physical connection.
pub(crate) struct TransportHandle {
    write_tx: mpsc::Sender<tungstenite::Message>,
    ready: Arc<AtomicU8>,
    cancel: CancellationToken,
    _driver: tokio::task::JoinHandle<()>,
}

impl TransportHandle {
    /// Starts connecting to `url` in the background.
    pub(crate) fn open(
        connector: Arc<dyn Connector>,
        url: String,
        settings: TransportSettings,
        on_event: EventCallback,
    ) -> Self {
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(256);
        let ready = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));
        let cancel = CancellationToken::new();

        let driver = tokio::spawn(drive(
            connector,
            url,
            settings,
            write_tx.clone(),
            write_rx,
            ready.clone(),
            cancel.clone(),
            on_event,
        ));

        Self {
            write_tx,
            ready,
            cancel,
            _driver: driver,
        }
    }

    pub(crate) fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.ready.load(Ordering::Acquire))
    }

    pub(crate) fn writer(&self) -> TransportWriter {
        TransportWriter {
            write_tx: self.write_tx.clone(),
            ready: self.ready.clone(),
        }
    }

    /// Starts closing the handle. Idempotent.
    pub(crate) fn close(&self) {
        let _ = self.ready.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
            match ReadyState::from_u8(v) {
                ReadyState::Connecting | ReadyState::Open => Some(ReadyState::Closing as u8),
                _ => None,
            }
        });
        self.cancel.cancel();
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Handshake, pumps and teardown for one handle.
#[allow(clippy::too_many_arguments)]
async fn drive(
    connector: Arc<dyn Connector>,
    url: String,
    settings: TransportSettings,
    write_tx: mpsc::Sender<tungstenite::Message>,
    write_rx: mpsc::Receiver<tungstenite::Message>,
    ready: Arc<AtomicU8>,
    cancel: CancellationToken,
    on_event: EventCallback,
) {
    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("handshake cancelled");
            ready.store(ReadyState::Closed as u8, Ordering::Release);
            on_event(TransportEvent::Closed);
            return;
        }
        result = tokio::time::timeout(settings.connect_timeout, connector.connect(&url)) => result,
    };

    let (sink, stream) = match connected {
        Ok(Ok(pair)) => pair,
        Ok(Err(e)) => {
            warn!(error = %e, "WebSocket connect failed");
            ready.store(ReadyState::Closed as u8, Ordering::Release);
            on_event(TransportEvent::Error(e.to_string()));
            on_event(TransportEvent::Closed);
            return;
        }
        Err(_) => {
            warn!(timeout = ?settings.connect_timeout, "WebSocket handshake timed out");
            ready.store(ReadyState::Closed as u8, Ordering::Release);
            on_event(TransportEvent::Error("handshake timed out".into()));
            on_event(TransportEvent::Closed);
            return;
        }
    };

    // A close() racing the handshake wins.
    if ready
        .compare_exchange(
            ReadyState::Connecting as u8,
            ReadyState::Open as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        )
        .is_err()
    {
        ready.store(ReadyState::Closed as u8, Ordering::Release);
        on_event(TransportEvent::Closed);
        return;
    }
    info!("WebSocket connection opened");
    on_event(TransportEvent::Opened);

    let write_handle = tokio::spawn(crate::pumps::write::write_pump(
        sink,
        write_rx,
        on_event.clone(),
        cancel.clone(),
    ));
    let ping_handle = settings.ping_period.map(|period| {
        tokio::spawn(crate::pumps::ping::ping_pump(
            write_tx.clone(),
            period,
            cancel.clone(),
        ))
    });

    crate::pumps::read::read_pump(
        stream,
        &on_event,
        &write_tx,
        settings.read_deadline,
        cancel.clone(),
    )
    .await;

    ready.store(ReadyState::Closed as u8, Ordering::Release);
    cancel.cancel();
    if let Some(ping) = ping_handle {
        ping.abort();
    }
    match write_handle.await {
        Ok(exit) => debug!(?exit, "write pump finished"),
        Err(e) => warn!(error = %e, "write pump task failed"),
    }
    info!("WebSocket connection closed");
    on_event(TransportEvent::Closed);
}
