//! Session manager for starting, stopping and deleting messaging sessions.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use multisession_core::{
    Connection, Error, ManagerConfig, MessageUpdated, PairingCode, ProtocolClient, ProxyAgent,
    QrUpdate, ReceivedMessage, Result, SessionId, SessionInfo,
};
use multisession_storage::{CredentialLayout, CredentialStore};

use crate::callbacks::CallbackRegistry;
use crate::options::{PairingCodeOptions, StartOptions};
use crate::registry::SessionRegistry;
use crate::retry::RetryCounter;
use crate::supervisor::{self, SessionPlan, Supervisor};

/// Upper bound on the logout performed while deleting a session.
pub const LOGOUT_TIMEOUT: Duration = Duration::from_secs(10);

/// State shared between the manager and every supervisor task.
pub(crate) struct Shared {
    pub(crate) client: Arc<dyn ProtocolClient>,
    pub(crate) store: Arc<dyn CredentialStore>,
    pub(crate) layout: CredentialLayout,
    pub(crate) config: ManagerConfig,
    pub(crate) sessions: SessionRegistry,
    pub(crate) retries: RetryCounter,
    pub(crate) callbacks: CallbackRegistry,
}

/// Session manager for coordinating multiple messaging sessions.
///
/// Cloning is cheap; clones share the same sessions and listeners.
#[derive(Clone)]
pub struct SessionManager {
    pub(crate) shared: Arc<Shared>,
}

impl SessionManager {
    /// Create a session manager over the given collaborators.
    pub fn new(
        client: Arc<dyn ProtocolClient>,
        store: Arc<dyn CredentialStore>,
        config: ManagerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let layout = CredentialLayout::from_settings(&config.storage);

        Ok(Self {
            shared: Arc::new(Shared {
                client,
                store,
                layout,
                config,
                sessions: SessionRegistry::new(),
                retries: RetryCounter::new(),
                callbacks: CallbackRegistry::new(),
            }),
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// Credential directory layout in use.
    pub fn layout(&self) -> &CredentialLayout {
        &self.shared.layout
    }

    /// Listeners for session events.
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.shared.callbacks
    }

    /// Start a session and supervise it until stopped or terminated.
    ///
    /// Returns once the connection is opened; events are handled in the
    /// background. Fails with [`Error::SessionAlreadyExists`] if the session
    /// is running and its credentials are persisted.
    pub async fn start_session(
        &self,
        id: SessionId,
        options: StartOptions,
        agent: Option<ProxyAgent>,
    ) -> Result<Arc<dyn Connection>> {
        self.start(SessionPlan {
            id,
            options,
            agent,
            pairing_phone: None,
        })
        .await
    }

    /// Start the configured default session.
    pub async fn start_default_session(
        &self,
        options: StartOptions,
    ) -> Result<Arc<dyn Connection>> {
        let id = self.shared.config.default_session_id();
        self.start_session(id, options, None).await
    }

    /// Alias of [`SessionManager::start_session`].
    #[deprecated(note = "use start_session")]
    pub async fn start_whatsapp(
        &self,
        id: SessionId,
        options: StartOptions,
        agent: Option<ProxyAgent>,
    ) -> Result<Arc<dyn Connection>> {
        self.start_session(id, options, agent).await
    }

    /// Start a session paired by phone number instead of a QR code.
    ///
    /// While the credentials are unregistered, each connection requests a
    /// pairing code for `options.phone_number` and forwards it to the
    /// pairing-code listeners.
    #[deprecated(note = "use start_session")]
    pub async fn start_session_with_pairing_code(
        &self,
        id: SessionId,
        options: PairingCodeOptions,
        agent: Option<ProxyAgent>,
    ) -> Result<Arc<dyn Connection>> {
        self.start(SessionPlan {
            id,
            options: StartOptions::silent(),
            agent,
            pairing_phone: Some(options.phone_number),
        })
        .await
    }

    async fn start(&self, plan: SessionPlan) -> Result<Arc<dyn Connection>> {
        let id = plan.id.clone();
        if self.shared.sessions.contains(&id) && self.shared.layout.has_credentials(&id) {
            return Err(Error::SessionAlreadyExists(id));
        }

        let version = self.shared.client.fetch_latest_version().await?;
        debug!(session_id = %id, %version, "Using protocol version");

        let link = supervisor::connect(&self.shared, &plan, version).await?;
        let connection = Arc::clone(&link.connection);
        let cancel = CancellationToken::new();
        let (generation, previous) = self.shared.sessions.insert(
            id.clone(),
            Arc::clone(&connection),
            plan.agent.clone(),
            cancel.clone(),
        );
        if let Some(previous) = previous {
            warn!(session_id = %id, "Replacing a session that never finished loading");
            previous.shut_down();
        }
        self.shared.retries.reset(&id);
        info!(session_id = %id, proxy = plan.agent.is_some(), "Session started");

        supervisor::announce_pairing(&self.shared, &plan, &link).await;

        let supervisor = Supervisor::new(Arc::clone(&self.shared), plan, version, generation, cancel);
        tokio::spawn(supervisor.run(link));

        Ok(connection)
    }

    /// Close a session's connection, keeping its credentials.
    ///
    /// Per-session listeners stay registered so a later start picks them up
    /// again. Deletion and termination drop them. Returns whether the
    /// session was running.
    pub fn stop_session(&self, id: &SessionId) -> bool {
        match self.shared.sessions.remove(id) {
            Some(entry) => {
                entry.shut_down();
                self.shared.retries.reset(id);
                info!(session_id = %id, "Session stopped");
                true
            }
            None => {
                info!(session_id = %id, "Session not found, nothing to stop");
                false
            }
        }
    }

    /// Log a session out and remove it together with its credentials.
    ///
    /// Works whether or not the session is running. The logout is best
    /// effort; only a failure to remove the credential directory is returned.
    pub async fn delete_session(&self, id: &SessionId) -> Result<()> {
        match self.shared.sessions.remove(id) {
            Some(entry) => {
                // The supervisor must not start a reconnect while logout runs.
                entry.cancel();
                match tokio::time::timeout(LOGOUT_TIMEOUT, entry.connection().logout()).await {
                    Ok(Ok(())) => debug!(session_id = %id, "Logged out"),
                    Ok(Err(e)) => warn!(session_id = %id, "Logout failed: {}", e),
                    Err(_) => warn!(session_id = %id, "Logout timed out"),
                }
                entry.end();
            }
            None => debug!(session_id = %id, "Session not running, deleting stored credentials"),
        }

        self.shared.retries.reset(id);
        self.shared.callbacks.unsubscribe_session(id);
        self.shared.layout.remove_session_dir(id)?;
        info!(session_id = %id, "Session deleted");
        Ok(())
    }

    /// Ids of every session with persisted credentials, running or not.
    pub fn list_stored_sessions(&self) -> Result<BTreeSet<SessionId>> {
        self.shared.layout.stored_session_ids()
    }

    /// Connection of a running session.
    pub fn get_session(&self, id: &SessionId) -> Option<Arc<dyn Connection>> {
        self.shared.sessions.get(id)
    }

    /// Ids of every running session, sorted.
    pub fn get_all_sessions(&self) -> Vec<SessionId> {
        self.shared.sessions.ids()
    }

    /// Consecutive reconnect attempts of a session, `None` if it has not failed.
    pub fn retry_count(&self, id: &SessionId) -> Option<u32> {
        self.shared.retries.get(id)
    }

    /// Information about every running session.
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        self.shared
            .sessions
            .entries()
            .into_iter()
            .map(|(id, entry)| SessionInfo {
                retry_count: self.shared.retries.get(&id),
                has_proxy: entry.agent().is_some(),
                credentials_dir: self.shared.layout.session_dir(&id),
                id,
            })
            .collect()
    }

    /// Log every running session and its retry state.
    pub fn log_state(&self) {
        let sessions = self.snapshot();
        info!(count = sessions.len(), "Running sessions");
        for session in &sessions {
            info!(
                session_id = %session.id,
                retry_count = ?session.retry_count,
                has_proxy = session.has_proxy,
                "Session credentials in {}",
                session.credentials_dir.display()
            );
        }
    }

    /// Set the global QR listener.
    pub fn on_qr_updated<F>(&self, listener: F)
    where
        F: Fn(&QrUpdate) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.callbacks.on_qr_updated(listener);
    }

    /// Set the global connecting listener.
    pub fn on_connecting<F>(&self, listener: F)
    where
        F: Fn(&SessionId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.callbacks.on_connecting(listener);
    }

    /// Set the global connected listener.
    pub fn on_connected<F>(&self, listener: F)
    where
        F: Fn(&SessionId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.callbacks.on_connected(listener);
    }

    /// Set the global disconnected listener.
    pub fn on_disconnected<F>(&self, listener: F)
    where
        F: Fn(&SessionId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.callbacks.on_disconnected(listener);
    }

    /// Set the global message-received listener.
    pub fn on_message_received<F>(&self, listener: F)
    where
        F: Fn(&ReceivedMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.callbacks.on_message_received(listener);
    }

    /// Set the global message-updated listener.
    pub fn on_message_update<F>(&self, listener: F)
    where
        F: Fn(&MessageUpdated) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.callbacks.on_message_update(listener);
    }

    /// Set the global pairing-code listener.
    pub fn on_pairing_code<F>(&self, listener: F)
    where
        F: Fn(&PairingCode) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.callbacks.on_pairing_code(listener);
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("layout", &self.shared.layout)
            .field("sessions", &self.shared.sessions.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{wait_until, FakeCredentialStore, FakeProtocolClient};
    use multisession_core::{ProtocolEvent, StorageSettings};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        _tmp: tempfile::TempDir,
        client: Arc<FakeProtocolClient>,
        store: Arc<FakeCredentialStore>,
        manager: SessionManager,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let config = ManagerConfig {
            storage: StorageSettings {
                credentials_dir: tmp.path().join("wa_credentials"),
                ..StorageSettings::default()
            },
            ..ManagerConfig::default()
        };
        let client = Arc::new(FakeProtocolClient::new());
        let store = Arc::new(FakeCredentialStore::new());
        let manager = SessionManager::new(client.clone(), store.clone(), config).unwrap();
        Fixture {
            _tmp: tmp,
            client,
            store,
            manager,
        }
    }

    fn id(raw: &str) -> SessionId {
        SessionId::new(raw).unwrap()
    }

    #[tokio::test]
    async fn test_manager_rejects_invalid_config() {
        let mut config = ManagerConfig::default();
        config.storage.directory_suffix = "session".to_string();
        let result = SessionManager::new(
            Arc::new(FakeProtocolClient::new()),
            Arc::new(FakeCredentialStore::new()),
            config,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_start_registers_session() {
        let fx = fixture();

        fx.manager
            .start_session(id("alice"), StartOptions::silent(), None)
            .await
            .unwrap();

        assert_eq!(fx.manager.get_all_sessions(), vec![id("alice")]);
        assert!(fx.manager.get_session(&id("alice")).is_some());
        assert!(fx.manager.layout().session_dir(&id("alice")).is_dir());
        assert_eq!(fx.store.load_count(), 1);
    }

    #[tokio::test]
    async fn test_start_passes_client_identity() {
        let fx = fixture();
        let agent = ProxyAgent::parse("socks5://proxy:1080").unwrap();

        fx.manager
            .start_session(id("alice"), StartOptions::new(), Some(agent.clone()))
            .await
            .unwrap();

        let opened = fx.client.opened();
        let config = &opened[0].config;
        assert_eq!(config.agent, Some(agent));
        assert!(config.print_qr_in_terminal);
        assert!(!config.mark_online_on_connect);
        assert_eq!(config.browser[0], "Ubuntu");
        assert_eq!(config.browser[1], "Chrome");
        assert_eq!(config.version, fx.client.version());
    }

    #[tokio::test]
    async fn test_start_default_session() {
        let fx = fixture();

        fx.manager
            .start_default_session(StartOptions::silent())
            .await
            .unwrap();

        assert_eq!(fx.manager.get_all_sessions(), vec![id("mysession")]);
    }

    #[tokio::test]
    async fn test_start_live_persisted_session_fails() {
        let fx = fixture();
        fx.manager
            .start_session(id("alice"), StartOptions::silent(), None)
            .await
            .unwrap();
        let dir = fx.manager.layout().session_dir(&id("alice"));
        std::fs::write(dir.join("creds.json"), b"{}").unwrap();

        let result = fx
            .manager
            .start_session(id("alice"), StartOptions::silent(), None)
            .await;

        assert!(matches!(result, Err(Error::SessionAlreadyExists(ref s)) if s == &id("alice")));
        assert_eq!(fx.client.open_count(), 1);
    }

    #[tokio::test]
    async fn test_start_replaces_unloaded_session() {
        let fx = fixture();
        fx.manager
            .start_session(id("alice"), StartOptions::silent(), None)
            .await
            .unwrap();

        fx.manager
            .start_session(id("alice"), StartOptions::silent(), None)
            .await
            .unwrap();

        let first = fx.client.connection(0).unwrap();
        assert!(first.is_ended());
        assert_eq!(fx.manager.get_all_sessions(), vec![id("alice")]);
        assert_eq!(fx.client.open_count(), 2);
    }

    #[tokio::test]
    async fn test_stop_session() {
        let fx = fixture();
        fx.manager
            .start_session(id("alice"), StartOptions::silent(), None)
            .await
            .unwrap();

        assert!(fx.manager.stop_session(&id("alice")));

        assert!(fx.client.connection(0).unwrap().is_ended());
        assert!(fx.manager.get_all_sessions().is_empty());
        assert!(fx.manager.layout().session_dir(&id("alice")).exists());
        assert!(!fx.manager.stop_session(&id("alice")));
    }

    #[tokio::test]
    async fn test_delete_running_session() {
        let fx = fixture();
        fx.manager
            .start_session(id("alice"), StartOptions::silent(), None)
            .await
            .unwrap();

        fx.manager.delete_session(&id("alice")).await.unwrap();

        let connection = fx.client.connection(0).unwrap();
        assert_eq!(connection.logout_count(), 1);
        assert!(connection.is_ended());
        assert!(fx.manager.get_session(&id("alice")).is_none());
        assert!(!fx.manager.layout().session_dir(&id("alice")).exists());
    }

    #[tokio::test]
    async fn test_delete_swallows_logout_failure() {
        let fx = fixture();
        fx.client.fail_logouts(true);
        fx.manager
            .start_session(id("alice"), StartOptions::silent(), None)
            .await
            .unwrap();

        fx.manager.delete_session(&id("alice")).await.unwrap();

        assert!(fx.client.connection(0).unwrap().is_ended());
        assert!(!fx.manager.layout().session_dir(&id("alice")).exists());
    }

    #[tokio::test]
    async fn test_snapshot() {
        let fx = fixture();
        let agent = ProxyAgent::parse("http://proxy:8080").unwrap();
        fx.manager
            .start_session(id("bob"), StartOptions::silent(), Some(agent))
            .await
            .unwrap();
        fx.manager
            .start_session(id("alice"), StartOptions::silent(), None)
            .await
            .unwrap();

        fx.client.connection(0).unwrap().close(Some(408));
        assert!(fx.client.wait_for_opens(3).await);

        let snapshot = fx.manager.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, id("alice"));
        assert!(!snapshot[0].has_proxy);
        assert_eq!(snapshot[0].retry_count, None);
        assert_eq!(snapshot[1].id, id("bob"));
        assert!(snapshot[1].has_proxy);
        assert_eq!(snapshot[1].retry_count, Some(1));
        assert_eq!(
            snapshot[1].credentials_dir,
            fx.manager.layout().session_dir(&id("bob"))
        );

        fx.manager.log_state();
    }

    #[tokio::test]
    #[allow(deprecated)]
    async fn test_pairing_code_requested_when_unregistered() {
        let fx = fixture();
        let codes = Arc::new(AtomicUsize::new(0));
        let seen = codes.clone();
        fx.manager.on_pairing_code(move |code: &PairingCode| {
            assert_eq!(code.code, "PAIR-1234");
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        fx.manager
            .start_session_with_pairing_code(
                id("alice"),
                PairingCodeOptions::new("6281234567890"),
                None,
            )
            .await
            .unwrap();

        let connection = fx.client.connection(0).unwrap();
        assert_eq!(connection.pairing_requests(), vec!["6281234567890"]);
        assert_eq!(codes.load(Ordering::SeqCst), 1);
        assert!(!fx.client.opened()[0].config.print_qr_in_terminal);
    }

    #[tokio::test]
    #[allow(deprecated)]
    async fn test_pairing_skipped_when_registered() {
        let fx = fixture();
        let dir = fx.manager.layout().session_dir(&id("alice"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("creds.json"), b"{}").unwrap();

        fx.manager
            .start_session_with_pairing_code(id("alice"), PairingCodeOptions::new("62812"), None)
            .await
            .unwrap();

        assert!(fx.client.connection(0).unwrap().pairing_requests().is_empty());
    }

    #[tokio::test]
    async fn test_creds_update_persists() {
        let fx = fixture();
        fx.manager
            .start_session(id("alice"), StartOptions::silent(), None)
            .await
            .unwrap();

        fx.client
            .connection(0)
            .unwrap()
            .emit(ProtocolEvent::CredsUpdate);

        let creds = fx
            .manager
            .layout()
            .session_dir(&id("alice"))
            .join("creds.json");
        assert!(wait_until(Duration::from_secs(5), || creds.exists()).await);
    }
}
