//! Outward notifications for server-addressed messages.
//!
//! The presenter decides how a notification looks; this module decides
//! when one is raised. A notification is raised only while the
//! conversation view is not open, and at most one is considered active at
//! a time: the next is suppressed until the user interacts with the first
//! ([`NotifyGate::dismiss`]) or the grace period lapses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use parley_protocol::ChatMessage;

use crate::clock::deadline_after;

/// Surfaces a system notification.
pub trait NotificationPresenter: Send + Sync + 'static {
    fn present(&self, title: &str, body: &str);
}

/// Reports whether the conversation view is currently open and focused.
pub trait ViewFocus: Send + Sync + 'static {
    fn is_conversation_open(&self) -> bool;
}

impl ViewFocus for AtomicBool {
    fn is_conversation_open(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// Suppression flag with a grace-period expiry.
#[derive(Debug)]
pub struct NotifyGate {
    grace: Duration,
    active_until: Mutex<Option<Instant>>,
}

impl NotifyGate {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            active_until: Mutex::new(None),
        }
    }

    /// Marks a notification as active if none is. Returns `false` while a
    /// previous notification still suppresses new ones.
    pub fn try_acquire(&self) -> bool {
        let mut guard = self
            .active_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if guard.is_some_and(|until| now < until) {
            return false;
        }
        *guard = Some(deadline_after(now, self.grace));
        true
    }

    /// Whether a previously issued notification is still active.
    pub fn is_active(&self) -> bool {
        self.active_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some_and(|until| Instant::now() < until)
    }

    /// Clears the active flag (the user clicked or closed the notification).
    pub fn dismiss(&self) {
        *self
            .active_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Presenter, focus check and gate wired together.
pub(crate) struct Notifier {
    presenter: Option<Arc<dyn NotificationPresenter>>,
    focus: Option<Arc<dyn ViewFocus>>,
    gate: NotifyGate,
    title: String,
}

impl Notifier {
    pub(crate) fn new(
        presenter: Option<Arc<dyn NotificationPresenter>>,
        focus: Option<Arc<dyn ViewFocus>>,
        grace: Duration,
        title: String,
    ) -> Self {
        Self {
            presenter,
            focus,
            gate: NotifyGate::new(grace),
            title,
        }
    }

    pub(crate) fn gate(&self) -> &NotifyGate {
        &self.gate
    }

    /// Raises a notification for `message` unless the view is open or a
    /// previous notification is still active. Returns whether the
    /// presenter was invoked.
    pub(crate) fn notify(&self, message: &ChatMessage) -> bool {
        let Some(presenter) = self.presenter.as_ref() else {
            return false;
        };
        if self.focus.as_ref().is_some_and(|f| f.is_conversation_open()) {
            trace!("conversation view open, not notifying");
            return false;
        }
        if !self.gate.try_acquire() {
            debug!("notification suppressed: previous one still active");
            return false;
        }
        let body = serde_json::to_string(message).unwrap_or_else(|_| message.text.clone());
        presenter.present(&self.title, &body);
        true
    }
}
