//! In-memory test doubles for the protocol and credential collaborators.
//!
//! `FakeProtocolClient` records every connection it opens and lets tests push
//! protocol events into each one. `FakeCredentialStore` keeps credential state
//! in real directories so on-disk behavior can be asserted.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use multisession_core::{
    AuthState, ConnectConfig, Connection, Error, EventStream, ProtocolClient, ProtocolEvent,
    ProtocolVersion, Result, WireMessage,
};
use multisession_storage::CredentialStore;

/// Name of the file the fake credential state persists to.
pub const CREDS_FILE: &str = "creds.json";

/// Close code a fake connection reports when it is ended locally.
pub const LOCAL_END_CODE: u16 = 428;

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// A connection whose events are driven by the test.
#[derive(Debug)]
pub struct FakeConnection {
    events: mpsc::UnboundedSender<ProtocolEvent>,
    ended: AtomicBool,
    logouts: AtomicUsize,
    fail_logout: bool,
    pairing_code: String,
    pairing_requests: Mutex<Vec<String>>,
    media: Vec<u8>,
}

impl FakeConnection {
    fn new(
        events: mpsc::UnboundedSender<ProtocolEvent>,
        pairing_code: String,
        fail_logout: bool,
    ) -> Self {
        Self {
            events,
            ended: AtomicBool::new(false),
            logouts: AtomicUsize::new(0),
            fail_logout,
            pairing_code,
            pairing_requests: Mutex::new(Vec::new()),
            media: b"fake-media".to_vec(),
        }
    }

    /// A connection nobody listens to.
    pub fn detached() -> Arc<Self> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Arc::new(Self::new(tx, "DETACHED".to_string(), false))
    }

    /// Push a protocol event to the session consuming this connection.
    ///
    /// Returns `false` once the consumer is gone.
    pub fn emit(&self, event: ProtocolEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Push a close event.
    pub fn close(&self, code: Option<u16>) -> bool {
        self.emit(ProtocolEvent::Close { code })
    }

    /// Whether `end` has been called.
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Number of logout calls.
    pub fn logout_count(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    /// Phone numbers a pairing code was requested for.
    pub fn pairing_requests(&self) -> Vec<String> {
        self.pairing_requests.lock().clone()
    }

    /// Bytes returned for any media download.
    pub fn media(&self) -> &[u8] {
        &self.media
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn request_pairing_code(&self, phone_number: &str) -> Result<String> {
        self.pairing_requests.lock().push(phone_number.to_string());
        Ok(self.pairing_code.clone())
    }

    async fn logout(&self) -> Result<()> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        if self.fail_logout {
            return Err(Error::Protocol("logout rejected".to_string()));
        }
        self.close(Some(multisession_core::DisconnectReason::LOGGED_OUT_CODE));
        Ok(())
    }

    fn end(&self) {
        if !self.ended.swap(true, Ordering::SeqCst) {
            self.close(Some(LOCAL_END_CODE));
        }
    }

    async fn download_media(&self, _message: &WireMessage) -> Result<Vec<u8>> {
        Ok(self.media.clone())
    }
}

/// One `open` call seen by [`FakeProtocolClient`].
#[derive(Debug, Clone)]
pub struct OpenedConnection {
    /// Configuration the connection was opened with
    pub config: ConnectConfig,
    /// The connection handed out
    pub connection: Arc<FakeConnection>,
}

/// Protocol client that hands out [`FakeConnection`]s.
#[derive(Debug)]
pub struct FakeProtocolClient {
    version: ProtocolVersion,
    pairing_code: String,
    fail_logout: AtomicBool,
    opened: Mutex<Vec<OpenedConnection>>,
}

impl Default for FakeProtocolClient {
    fn default() -> Self {
        Self {
            version: ProtocolVersion([2, 3000, 1]),
            pairing_code: "PAIR-1234".to_string(),
            fail_logout: AtomicBool::new(false),
            opened: Mutex::new(Vec::new()),
        }
    }
}

impl FakeProtocolClient {
    /// Create a client with default behavior.
    pub fn new() -> Self {
        Self::default()
    }

    /// Version reported by `fetch_latest_version`.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Code every connection returns for a pairing request.
    pub fn pairing_code(&self) -> &str {
        &self.pairing_code
    }

    /// Make logout fail on connections opened from now on.
    pub fn fail_logouts(&self, fail: bool) {
        self.fail_logout.store(fail, Ordering::SeqCst);
    }

    /// Number of connections opened so far.
    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    /// Every `open` call so far, oldest first.
    pub fn opened(&self) -> Vec<OpenedConnection> {
        self.opened.lock().clone()
    }

    /// The `index`-th opened connection.
    pub fn connection(&self, index: usize) -> Option<Arc<FakeConnection>> {
        self.opened
            .lock()
            .get(index)
            .map(|opened| Arc::clone(&opened.connection))
    }

    /// The most recently opened connection.
    pub fn last_connection(&self) -> Option<Arc<FakeConnection>> {
        self.opened
            .lock()
            .last()
            .map(|opened| Arc::clone(&opened.connection))
    }

    /// Wait until at least `count` connections were opened.
    pub async fn wait_for_opens(&self, count: usize) -> bool {
        wait_until(Duration::from_secs(5), || self.open_count() >= count).await
    }
}

#[async_trait]
impl ProtocolClient for FakeProtocolClient {
    async fn fetch_latest_version(&self) -> Result<ProtocolVersion> {
        Ok(self.version)
    }

    fn open(&self, config: ConnectConfig) -> (Arc<dyn Connection>, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Arc::new(FakeConnection::new(
            tx,
            self.pairing_code.clone(),
            self.fail_logout.load(Ordering::SeqCst),
        ));
        self.opened.lock().push(OpenedConnection {
            config,
            connection: Arc::clone(&connection),
        });
        (connection, rx)
    }
}

/// Credential state backed by a `creds.json` file.
#[derive(Debug)]
pub struct FakeAuthState {
    dir: PathBuf,
    registered: bool,
}

impl FakeAuthState {
    /// Directory the state lives in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl AuthState for FakeAuthState {
    fn is_registered(&self) -> bool {
        self.registered
    }

    async fn persist(&self) -> Result<()> {
        tokio::fs::write(self.dir.join(CREDS_FILE), b"{\"registered\":true}").await?;
        Ok(())
    }
}

/// Credential store over real directories.
///
/// A directory holding `creds.json` loads as registered state.
#[derive(Debug, Default)]
pub struct FakeCredentialStore {
    fail_loads: AtomicBool,
    fail_next: AtomicUsize,
    loads: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl FakeCredentialStore {
    /// Create a store that loads successfully.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every load fail until switched back.
    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` loads fail.
    pub fn fail_next_loads(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Wait `delay` in every load before touching the directory.
    pub fn delay_loads(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Number of load calls, failed ones included.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for FakeCredentialStore {
    async fn load(&self, dir: &Path) -> Result<Arc<dyn AuthState>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let fail_once = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail_once || self.fail_loads.load(Ordering::SeqCst) {
            return Err(Error::Other(format!(
                "credential load failed for {}",
                dir.display()
            )));
        }

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        tokio::fs::create_dir_all(dir).await?;
        let registered = tokio::fs::try_exists(dir.join(CREDS_FILE))
            .await
            .unwrap_or(false);
        Ok(Arc::new(FakeAuthState {
            dir: dir.to_path_buf(),
            registered,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_end_emits_close_once() {
        let client = FakeProtocolClient::new();
        let auth: Arc<dyn AuthState> = Arc::new(FakeAuthState {
            dir: PathBuf::from("unused"),
            registered: false,
        });
        let config = ConnectConfig {
            version: client.version(),
            auth,
            agent: None,
            print_qr_in_terminal: false,
            mark_online_on_connect: false,
            browser: ["Ubuntu".into(), "Chrome".into(), "22.04.4".into()],
        };
        let (connection, mut events) = client.open(config);

        connection.end();
        connection.end();

        assert_eq!(
            events.recv().await,
            Some(ProtocolEvent::Close {
                code: Some(LOCAL_END_CODE)
            })
        );
        assert!(events.try_recv().is_err());
        assert!(client.connection(0).unwrap().is_ended());
    }

    #[tokio::test]
    async fn test_store_creates_dir_and_detects_registration() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("alice_session");
        let store = FakeCredentialStore::new();

        let state = store.load(&dir).await.unwrap();
        assert!(dir.is_dir());
        assert!(!state.is_registered());

        state.persist().await.unwrap();
        let reloaded = store.load(&dir).await.unwrap();
        assert!(reloaded.is_registered());
        assert_eq!(store.load_count(), 2);
    }

    #[tokio::test]
    async fn test_store_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FakeCredentialStore::new();
        store.fail_loads(true);

        assert!(store.load(&tmp.path().join("bob_session")).await.is_err());
    }

    #[tokio::test]
    async fn test_wait_until_times_out() {
        assert!(!wait_until(Duration::from_millis(20), || false).await);
        assert!(wait_until(Duration::from_millis(20), || true).await);
    }
}
