//! Per-session supervisor task.
//!
//! Every started session is driven by one task. It consumes the connection's
//! event stream in order, forwards events to listeners and per-call options,
//! and on a close applies the retry policy: a retryable close opens a fresh
//! connection for the same session in place, a terminal close tears the
//! session down.
//!
//! The task exits when its cancellation token fires (stop or delete), when its
//! run is no longer the registered one, or when the session terminates.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use multisession_core::{
    AuthState, ConnectConfig, Connection, EventStream, MessageUpdated, PairingCode, ProtocolEvent,
    ProtocolVersion, ProxyAgent, QrUpdate, ReceivedMessage, Result, SessionEvent, SessionId,
};

use crate::manager::Shared;
use crate::options::StartOptions;
use crate::retry::{RetryDecision, TerminationReason, MAX_RETRY_ATTEMPTS};

/// Everything needed to (re)open a session.
#[derive(Debug, Clone)]
pub(crate) struct SessionPlan {
    pub(crate) id: SessionId,
    pub(crate) options: StartOptions,
    pub(crate) agent: Option<ProxyAgent>,
    pub(crate) pairing_phone: Option<String>,
}

impl SessionPlan {
    /// Pairing by phone number never shows a QR code.
    fn print_qr(&self) -> bool {
        self.pairing_phone.is_none() && self.options.print_qr
    }
}

/// A live connection together with its event stream and credential state.
pub(crate) struct Link {
    pub(crate) connection: Arc<dyn Connection>,
    pub(crate) events: EventStream,
    pub(crate) auth: Arc<dyn AuthState>,
}

/// Load credentials and open a connection for `plan`.
pub(crate) async fn connect(
    shared: &Shared,
    plan: &SessionPlan,
    version: ProtocolVersion,
) -> Result<Link> {
    let dir = shared.layout.session_dir(&plan.id);
    let auth = shared.store.load(&dir).await?;

    match &plan.agent {
        Some(agent) => info!(session_id = %plan.id, "Connecting through proxy {}", agent),
        None => debug!(session_id = %plan.id, "Connecting without proxy"),
    }

    let config = ConnectConfig {
        version,
        auth: Arc::clone(&auth),
        agent: plan.agent.clone(),
        print_qr_in_terminal: plan.print_qr(),
        mark_online_on_connect: shared.config.client.mark_online_on_connect,
        browser: shared.config.client.browser.clone(),
    };
    let (connection, events) = shared.client.open(config);

    Ok(Link {
        connection,
        events,
        auth,
    })
}

/// Request a pairing code when the plan pairs by phone and the credentials
/// are not registered yet, and forward it to the pairing-code listeners.
///
/// Failures are logged; the session keeps running.
pub(crate) async fn announce_pairing(shared: &Shared, plan: &SessionPlan, link: &Link) {
    let Some(phone) = plan.pairing_phone.as_deref() else {
        return;
    };
    if link.auth.is_registered() {
        return;
    }

    info!(session_id = %plan.id, "First time pairing, requesting pairing code");
    match link.connection.request_pairing_code(phone).await {
        Ok(code) => {
            let event = SessionEvent::PairingCode(PairingCode {
                session_id: plan.id.clone(),
                code,
            });
            if let Err(e) = shared.callbacks.dispatch(&event) {
                warn!(session_id = %plan.id, "Pairing code listener failed: {:#}", e);
            }
        }
        Err(e) => warn!(session_id = %plan.id, "Failed to request pairing code: {}", e),
    }
}

/// Drives one run of a session.
pub(crate) struct Supervisor {
    shared: Arc<Shared>,
    plan: SessionPlan,
    version: ProtocolVersion,
    generation: u64,
    cancel: CancellationToken,
}

impl Supervisor {
    pub(crate) fn new(
        shared: Arc<Shared>,
        plan: SessionPlan,
        version: ProtocolVersion,
        generation: u64,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            shared,
            plan,
            version,
            generation,
            cancel,
        }
    }

    /// Consume events until the session is stopped or terminated.
    pub(crate) async fn run(self, mut link: Link) {
        let id = self.plan.id.clone();
        debug!(session_id = %id, generation = self.generation, "Supervisor started");

        loop {
            let code = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(session_id = %id, "Supervisor cancelled");
                    return;
                }
                code = self.consume(&mut link) => code,
            };

            match self.recover(code).await {
                Some(next) => link = next,
                None => return,
            }
        }
    }

    /// Forward events until the connection closes. Returns the close code.
    ///
    /// A stream that ends without a close counts as a close without a code.
    async fn consume(&self, link: &mut Link) -> Option<u16> {
        while let Some(event) = link.events.recv().await {
            match event {
                ProtocolEvent::Close { code } => return code,
                other => self.handle(other, &link.connection, &link.auth),
            }
        }

        debug!(session_id = %self.plan.id, "Event stream ended without a close");
        None
    }

    fn handle(
        &self,
        event: ProtocolEvent,
        connection: &Arc<dyn Connection>,
        auth: &Arc<dyn AuthState>,
    ) {
        let id = &self.plan.id;
        let options = &self.plan.options;

        match event {
            ProtocolEvent::Connecting => {
                debug!(session_id = %id, "Connecting");
                self.emit(SessionEvent::Connecting(id.clone()));
                if let Some(hook) = &options.on_connecting {
                    self.report("on_connecting", hook());
                }
            }
            ProtocolEvent::Qr(qr) => {
                debug!(session_id = %id, "QR code updated");
                self.emit(SessionEvent::QrUpdated(QrUpdate {
                    session_id: id.clone(),
                    qr: qr.clone(),
                }));
                if let Some(hook) = &options.on_qr_updated {
                    self.report("on_qr_updated", hook(qr.as_str()));
                }
            }
            ProtocolEvent::Open => {
                if let Some(attempts) = self.shared.retries.reset(id) {
                    info!(session_id = %id, attempts, "Reconnected");
                } else {
                    info!(session_id = %id, "Connected");
                }
                self.emit(SessionEvent::Connected(id.clone()));
                if let Some(hook) = &options.on_connected {
                    self.report("on_connected", hook());
                }
            }
            ProtocolEvent::CredsUpdate => {
                let auth = Arc::clone(auth);
                let id = id.clone();
                tokio::spawn(async move {
                    if let Err(e) = auth.persist().await {
                        warn!(session_id = %id, "Failed to persist credentials: {}", e);
                    }
                });
            }
            ProtocolEvent::MessagesUpsert(messages) => {
                if let Some(message) = messages.into_iter().next() {
                    debug!(session_id = %id, "Message received");
                    let received = ReceivedMessage::new(id.clone(), message, Arc::clone(connection));
                    if let Some(hook) = &options.on_message_received {
                        self.report("on_message_received", hook(&received));
                    }
                    self.emit(SessionEvent::MessageReceived(received));
                }
            }
            ProtocolEvent::MessagesUpdate(updates) => {
                if let Some(update) = updates.into_iter().next() {
                    let updated = MessageUpdated::new(id.clone(), update);
                    debug!(session_id = %id, status = %updated.message_status, "Message updated");
                    if let Some(hook) = &options.on_message_updated {
                        self.report("on_message_updated", hook(&updated));
                    }
                    self.emit(SessionEvent::MessageUpdated(updated));
                }
            }
            ProtocolEvent::Close { .. } => {}
        }
    }

    /// Apply the retry policy to a close, reconnecting as long as it allows.
    ///
    /// Returns the new link, or `None` when this run is over. A reconnect that
    /// fails before a connection exists counts as another close without a code.
    async fn recover(&self, mut code: Option<u16>) -> Option<Link> {
        let id = &self.plan.id;

        loop {
            // Checking the run and recording the close is one step, so a
            // concurrent stop cannot leave a count behind for a dead session.
            let decision = if self.cancel.is_cancelled() {
                None
            } else {
                self.shared.sessions.with_current(id, self.generation, || {
                    self.shared.retries.record_close(id, code)
                })
            };
            let Some(decision) = decision else {
                debug!(session_id = %id, "Run superseded, not reconnecting");
                return None;
            };

            match decision {
                RetryDecision::Retry { attempt } => {
                    info!(session_id = %id, ?code, attempt, "Connection closed, reconnecting");
                    let connected = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            debug!(session_id = %id, "Cancelled during reconnect");
                            return None;
                        }
                        connected = connect(&self.shared, &self.plan, self.version) => connected,
                    };
                    match connected {
                        Ok(next) => {
                            let connection = Arc::clone(&next.connection);
                            if !self
                                .shared
                                .sessions
                                .replace_connection(id, self.generation, connection)
                            {
                                debug!(session_id = %id, "Session gone during reconnect");
                                next.connection.end();
                                return None;
                            }
                            announce_pairing(&self.shared, &self.plan, &next).await;
                            return Some(next);
                        }
                        Err(e) => {
                            warn!(session_id = %id, attempt, "Reconnect failed: {}", e);
                            code = None;
                        }
                    }
                }
                RetryDecision::Terminate(reason) => {
                    self.terminate(reason);
                    return None;
                }
            }
        }
    }

    fn terminate(&self, reason: TerminationReason) {
        let id = &self.plan.id;
        match reason {
            TerminationReason::LoggedOut => info!(session_id = %id, "Logged out, ending session"),
            TerminationReason::RetriesExhausted => warn!(
                session_id = %id,
                attempts = MAX_RETRY_ATTEMPTS,
                "Max retry attempts reached, ending session"
            ),
        }

        let Some(entry) = self.shared.sessions.remove_if_current(id, self.generation) else {
            return;
        };
        entry.shut_down();

        if reason == TerminationReason::LoggedOut
            && self.shared.config.session.purge_credentials_on_logout
        {
            if let Err(e) = self.shared.layout.remove_session_dir(id) {
                warn!(session_id = %id, "Failed to remove credentials after logout: {}", e);
            }
        }

        self.emit(SessionEvent::Disconnected(id.clone()));
        if let Some(hook) = &self.plan.options.on_disconnected {
            self.report("on_disconnected", hook());
        }
        self.shared.callbacks.unsubscribe_session(id);
    }

    fn emit(&self, event: SessionEvent) {
        let kind = event.kind();
        if let Err(e) = self.shared.callbacks.dispatch(&event) {
            warn!(session_id = %self.plan.id, ?kind, "Listener failed: {:#}", e);
        }
    }

    fn report(&self, hook: &str, result: anyhow::Result<()>) {
        if let Err(e) = result {
            warn!(session_id = %self.plan.id, hook, "Session callback failed: {:#}", e);
        }
    }
}
