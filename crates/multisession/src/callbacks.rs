//! Callback dispatch registry.
//!
//! Two tables route session events to listeners:
//!
//! - **Global**: one listener per [`EventKind`], shared by every session.
//!   Registering again for a kind replaces the previous listener.
//! - **Per-session**: any number of listeners per `(session, kind)`, invoked
//!   in subscription order, only for events of that session.
//!
//! Dispatch invokes the per-session listeners first, then the global one.
//! Listener errors are returned to the caller, not handled here.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use multisession_core::{
    EventKind, MessageUpdated, PairingCode, QrUpdate, ReceivedMessage, SessionEvent, SessionId,
};

/// A listener for session events.
pub type Listener = Arc<dyn Fn(&SessionEvent) -> anyhow::Result<()> + Send + Sync>;

/// Routes session events to registered listeners.
#[derive(Default)]
pub struct CallbackRegistry {
    global: RwLock<HashMap<EventKind, Listener>>,
    scoped: RwLock<HashMap<(SessionId, EventKind), Vec<Listener>>>,
}

impl CallbackRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the global listener for `kind`, returning the one it replaced.
    pub fn register(&self, kind: EventKind, listener: Listener) -> Option<Listener> {
        self.global.write().insert(kind, listener)
    }

    /// Remove the global listener for `kind`.
    pub fn unregister(&self, kind: EventKind) -> bool {
        self.global.write().remove(&kind).is_some()
    }

    /// Whether a global listener is registered for `kind`.
    pub fn has_listener(&self, kind: EventKind) -> bool {
        self.global.read().contains_key(&kind)
    }

    /// Add a listener for one session's events of `kind`.
    pub fn subscribe(&self, session_id: SessionId, kind: EventKind, listener: Listener) {
        self.scoped
            .write()
            .entry((session_id, kind))
            .or_default()
            .push(listener);
    }

    /// Number of per-session listeners registered for a session.
    pub fn subscriptions(&self, session_id: &SessionId) -> usize {
        self.scoped
            .read()
            .iter()
            .filter(|((id, _), _)| id == session_id)
            .map(|(_, listeners)| listeners.len())
            .sum()
    }

    /// Drop every per-session listener of a session. Returns how many were removed.
    pub fn unsubscribe_session(&self, session_id: &SessionId) -> usize {
        let mut scoped = self.scoped.write();
        let before: usize = scoped.values().map(Vec::len).sum();
        scoped.retain(|(id, _), _| id != session_id);
        let after: usize = scoped.values().map(Vec::len).sum();
        before - after
    }

    /// Deliver an event to its per-session listeners and the global listener.
    ///
    /// Every listener is invoked even if an earlier one fails; the first
    /// failure is returned. Having no listener is not an error.
    pub fn dispatch(&self, event: &SessionEvent) -> anyhow::Result<()> {
        let kind = event.kind();
        let mut listeners: Vec<Listener> = self
            .scoped
            .read()
            .get(&(event.session_id().clone(), kind))
            .cloned()
            .unwrap_or_default();
        if let Some(global) = self.global.read().get(&kind) {
            listeners.push(Arc::clone(global));
        }

        // Locks are released before listeners run so they may re-register.
        let mut first_error = None;
        for listener in listeners {
            if let Err(e) = listener(event) {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Set the global QR listener.
    pub fn on_qr_updated<F>(&self, listener: F)
    where
        F: Fn(&QrUpdate) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(
            EventKind::QrUpdated,
            Arc::new(move |event: &SessionEvent| match event {
                SessionEvent::QrUpdated(qr) => listener(qr),
                _ => Ok(()),
            }),
        );
    }

    /// Set the global connecting listener.
    pub fn on_connecting<F>(&self, listener: F)
    where
        F: Fn(&SessionId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(
            EventKind::Connecting,
            Arc::new(move |event: &SessionEvent| match event {
                SessionEvent::Connecting(id) => listener(id),
                _ => Ok(()),
            }),
        );
    }

    /// Set the global connected listener.
    pub fn on_connected<F>(&self, listener: F)
    where
        F: Fn(&SessionId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(
            EventKind::Connected,
            Arc::new(move |event: &SessionEvent| match event {
                SessionEvent::Connected(id) => listener(id),
                _ => Ok(()),
            }),
        );
    }

    /// Set the global disconnected listener.
    pub fn on_disconnected<F>(&self, listener: F)
    where
        F: Fn(&SessionId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(
            EventKind::Disconnected,
            Arc::new(move |event: &SessionEvent| match event {
                SessionEvent::Disconnected(id) => listener(id),
                _ => Ok(()),
            }),
        );
    }

    /// Set the global message-received listener.
    pub fn on_message_received<F>(&self, listener: F)
    where
        F: Fn(&ReceivedMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(
            EventKind::MessageReceived,
            Arc::new(move |event: &SessionEvent| match event {
                SessionEvent::MessageReceived(msg) => listener(msg),
                _ => Ok(()),
            }),
        );
    }

    /// Set the global message-updated listener.
    pub fn on_message_update<F>(&self, listener: F)
    where
        F: Fn(&MessageUpdated) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(
            EventKind::MessageUpdated,
            Arc::new(move |event: &SessionEvent| match event {
                SessionEvent::MessageUpdated(update) => listener(update),
                _ => Ok(()),
            }),
        );
    }

    /// Set the global pairing-code listener.
    pub fn on_pairing_code<F>(&self, listener: F)
    where
        F: Fn(&PairingCode) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(
            EventKind::PairingCode,
            Arc::new(move |event: &SessionEvent| match event {
                SessionEvent::PairingCode(code) => listener(code),
                _ => Ok(()),
            }),
        );
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut global: Vec<_> = self.global.read().keys().copied().collect();
        global.sort();
        f.debug_struct("CallbackRegistry")
            .field("global", &global)
            .field("scoped", &self.scoped.read().len())
            .finish()
    }
}
