//! Connection supervisor.
//!
//! Owns the single live [`TransportHandle`] and drives the logical
//! connection through `Disconnected → Connecting → Open → Disconnected`.
//! Two timers run while the session is active:
//!
//! - the idle watch closes the handle after `idle_timeout` without send or
//!   receive activity;
//! - the health check notices a closed handle every
//!   `health_check_interval` and reconnects it.
//!
//! Handles are tagged with a generation; events from a superseded handle are
//! ignored so a late `Closed` can never clobber a newer connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::auth::TokenProvider;
use crate::clock::deadline_after;
use crate::error::{ClientError, TransportError};
use crate::router::MessageRouter;
use crate::transport::{
    Connector, EventCallback, ReadyState, TransportEvent, TransportHandle, TransportSettings,
};
use crate::types::{ChatEvent, ClientConfig, ConnectionState};

/// Mutable connection bookkeeping, guarded by one lock.
struct Link {
    handle: Option<TransportHandle>,
    state: ConnectionState,
    /// The session wants a connection; cleared by explicit or idle close.
    active: bool,
    idle_deadline: Option<Instant>,
    idle_timer: Option<CancellationToken>,
    health_timer: Option<CancellationToken>,
}

impl Link {
    fn set_state(&mut self, state: ConnectionState) -> bool {
        if self.state == state {
            return false;
        }
        self.state = state;
        true
    }

    fn handle_state(&self) -> Option<ReadyState> {
        self.handle.as_ref().map(TransportHandle::ready_state)
    }

    fn stop_idle_timer(&mut self) {
        if let Some(token) = self.idle_timer.take() {
            token.cancel();
        }
        self.idle_deadline = None;
    }

    fn stop_health_timer(&mut self) {
        if let Some(token) = self.health_timer.take() {
            token.cancel();
        }
    }
}

pub(crate) struct Supervisor {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    tokens: Arc<dyn TokenProvider>,
    router: Arc<MessageRouter>,
    events_tx: mpsc::Sender<ChatEvent>,
    link: Mutex<Link>,
    generation: AtomicU64,
    this: Weak<Supervisor>,
}

impl Supervisor {
    pub(crate) fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        tokens: Arc<dyn TokenProvider>,
        router: Arc<MessageRouter>,
        events_tx: mpsc::Sender<ChatEvent>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            connector,
            tokens,
            router,
            events_tx,
            link: Mutex::new(Link {
                handle: None,
                state: ConnectionState::Disconnected,
                active: false,
                idle_deadline: None,
                idle_timer: None,
                health_timer: None,
            }),
            generation: AtomicU64::new(0),
            this: this.clone(),
        })
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.link().state
    }

    /// Whether the current handle is physically open.
    pub(crate) fn is_open(&self) -> bool {
        self.link().handle_state() == Some(ReadyState::Open)
    }

    pub(crate) fn idle_deadline(&self) -> Option<Instant> {
        self.link().idle_deadline
    }

    /// Opens a new handle unless one is already open or connecting.
    ///
    /// Returns once the handle exists; the handshake completes in the
    /// background.
    pub(crate) fn connect(&self) -> Result<(), ClientError> {
        let mut link = self.link();
        if matches!(
            link.handle_state(),
            Some(ReadyState::Open | ReadyState::Connecting)
        ) {
            trace!("connect: handle already live");
            return Ok(());
        }

        let token = self.tokens.access_token().unwrap_or_default();
        let url = self.config.endpoint.url(&token)?;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        if let Some(stale) = link.handle.take() {
            stale.close();
        }

        info!(
            generation,
            host = url.host_str().unwrap_or_default(),
            path = url.path(),
            "connecting to chat server"
        );

        let this = self.this.clone();
        let on_event: EventCallback = Arc::new(move |event| {
            if let Some(supervisor) = this.upgrade() {
                supervisor.on_transport_event(generation, event);
            }
        });
        let settings = TransportSettings {
            connect_timeout: self.config.reconnect.timeout,
            ping_period: self.config.ping_period,
            read_deadline: self.config.read_deadline,
        };
        link.handle = Some(TransportHandle::open(
            self.connector.clone(),
            url.to_string(),
            settings,
            on_event,
        ));
        link.active = true;
        let changed = link.set_state(ConnectionState::Connecting);
        drop(link);

        if changed {
            self.emit(ChatEvent::StateChanged(ConnectionState::Connecting));
        }
        Ok(())
    }

    /// Connects and waits, polling readiness, until the handle is open or
    /// the reconnect timeout elapses.
    pub(crate) async fn reconnect(&self) -> Result<(), ClientError> {
        self.connect()?;

        let cfg = &self.config.reconnect;
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            if self.is_open() {
                debug!(attempt, "reconnect: handle open");
                return Ok(());
            }
            let elapsed = started.elapsed();
            if elapsed >= cfg.timeout {
                warn!(timeout = ?cfg.timeout, "reconnect: handle did not open in time");
                return Err(ClientError::ReconnectTimeout(cfg.timeout));
            }
            attempt = attempt.saturating_add(1);
            let delay = cfg.delay_for_attempt(attempt).min(cfg.timeout - elapsed);
            tokio::time::sleep(delay).await;
        }
    }

    /// Queues `payload` on the open handle and records the activity.
    pub(crate) async fn write(&self, payload: String) -> Result<(), TransportError> {
        let writer = {
            let link = self.link();
            match link.handle.as_ref() {
                Some(h) if h.ready_state() == ReadyState::Open => h.writer(),
                _ => return Err(TransportError::NotOpen),
            }
        };
        writer.send_text(payload).await?;
        self.touch();
        Ok(())
    }

    /// Explicit close: stops both timers and closes the handle.
    pub(crate) fn close(&self) {
        info!("closing chat connection");
        self.shutdown();
    }

    fn idle_close(&self) {
        info!(idle = ?self.config.idle_timeout, "connection idle, closing");
        self.shutdown();
    }

    fn shutdown(&self) {
        let mut link = self.link();
        link.active = false;
        link.stop_idle_timer();
        link.stop_health_timer();
        let handle = link.handle.take();
        let mut transitions = Vec::new();
        if handle.is_some() && link.set_state(ConnectionState::Closing) {
            transitions.push(ConnectionState::Closing);
        }
        if link.set_state(ConnectionState::Disconnected) {
            transitions.push(ConnectionState::Disconnected);
        }
        drop(link);

        if let Some(handle) = handle {
            handle.close();
        }
        for state in transitions {
            self.emit(ChatEvent::StateChanged(state));
        }
    }

    /// Pushes the idle deadline forward after send or receive activity.
    fn touch(&self) {
        let mut link = self.link();
        if link.idle_timer.is_none() {
            return;
        }
        link.idle_deadline = Some(next_deadline(
            link.idle_deadline,
            Instant::now(),
            self.config.idle_timeout,
        ));
    }

    /// Whether the health check should repair the connection.
    fn needs_repair(&self) -> bool {
        let link = self.link();
        link.active && matches!(link.handle_state(), None | Some(ReadyState::Closed))
    }

    fn on_transport_event(&self, generation: u64, event: TransportEvent) {
        if generation != self.generation.load(Ordering::Acquire) {
            trace!(generation, ?event, "ignoring event from superseded handle");
            return;
        }
        match event {
            TransportEvent::Opened => self.on_open(generation),
            TransportEvent::Frame(text) => {
                self.touch();
                self.router.route_frame(&text);
            }
            TransportEvent::Error(e) => {
                warn!(generation, error = %e, "chat transport error");
                self.link().stop_idle_timer();
            }
            TransportEvent::Closed => self.on_closed(generation),
        }
    }

    fn on_open(&self, generation: u64) {
        let mut link = self.link();
        if link.handle.is_none() {
            debug!(generation, "handle opened after close, ignoring");
            return;
        }

        link.stop_idle_timer();
        link.stop_health_timer();
        let idle = CancellationToken::new();
        let health = CancellationToken::new();
        link.idle_deadline = Some(deadline_after(Instant::now(), self.config.idle_timeout));
        link.idle_timer = Some(idle.clone());
        link.health_timer = Some(health.clone());
        let changed = link.set_state(ConnectionState::Open);
        drop(link);

        tokio::spawn(idle_watch(self.this.clone(), idle));
        tokio::spawn(health_check(
            self.this.clone(),
            self.config.health_check_interval,
            health,
        ));

        info!(generation, "chat connection open");
        if changed {
            self.emit(ChatEvent::StateChanged(ConnectionState::Open));
        }
    }

    fn on_closed(&self, generation: u64) {
        let mut link = self.link();
        link.stop_idle_timer();
        let active = link.active;
        let changed = link.set_state(ConnectionState::Disconnected);
        drop(link);

        if active {
            info!(generation, "chat connection lost, health check will reconnect");
        } else {
            debug!(generation, "chat connection closed");
        }
        if changed {
            self.emit(ChatEvent::StateChanged(ConnectionState::Disconnected));
        }
    }

    fn emit(&self, event: ChatEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("event channel full, dropping event"),
            Err(TrySendError::Closed(_)) => {}
        }
    }

    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        let link = self
            .link
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        link.stop_idle_timer();
        link.stop_health_timer();
        if let Some(handle) = link.handle.take() {
            handle.close();
        }
    }
}

/// Next idle deadline. Always strictly later than the previous one so
/// that every activity is observable even when the clock has not moved.
fn next_deadline(prev: Option<Instant>, now: Instant, idle: Duration) -> Instant {
    let candidate = deadline_after(now, idle);
    match prev {
        Some(prev) if candidate <= prev => deadline_after(prev, Duration::from_nanos(1)),
        _ => candidate,
    }
}

/// Sleeps until the idle deadline, re-arming while activity pushes it
/// forward, then closes the connection.
async fn idle_watch(supervisor: Weak<Supervisor>, cancel: CancellationToken) {
    loop {
        let Some(deadline) = supervisor.upgrade().and_then(|s| s.idle_deadline()) else {
            return;
        };
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep_until(deadline) => {}
        }
        let Some(sup) = supervisor.upgrade() else {
            return;
        };
        if cancel.is_cancelled() {
            return;
        }
        if sup.idle_deadline().is_some_and(|d| d <= Instant::now()) {
            sup.idle_close();
            return;
        }
    }
}

/// Periodically reconnects a closed handle while the session is active.
async fn health_check(supervisor: Weak<Supervisor>, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }
        let Some(sup) = supervisor.upgrade() else {
            return;
        };
        if !sup.needs_repair() {
            continue;
        }
        info!("health check: connection closed, reconnecting");
        if let Err(e) = sup.reconnect().await {
            warn!(error = %e, "health check: reconnect failed, retrying next tick");
        }
    }
}
