//! Registry of live sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use multisession_core::{Connection, ProxyAgent, SessionId};

/// A registered session.
///
/// `generation` identifies one supervised run of the session: it survives
/// reconnects and changes whenever the session is started again.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    connection: Arc<dyn Connection>,
    agent: Option<ProxyAgent>,
    generation: u64,
    cancel: CancellationToken,
}

impl SessionEntry {
    /// Current connection handle.
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Outbound proxy of the session.
    pub fn agent(&self) -> Option<&ProxyAgent> {
        self.agent.as_ref()
    }

    /// Run this entry belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop the supervisor of this run.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Close the current connection.
    pub(crate) fn end(&self) {
        self.connection.end();
    }

    /// Stop the supervisor and close the connection.
    pub(crate) fn shut_down(&self) {
        self.cancel();
        self.end();
    }
}

/// Session id to live connection handle.
///
/// The single source of truth for whether a session is running. At most one
/// entry exists per id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: RwLock<HashMap<SessionId, SessionEntry>>,
    next_generation: AtomicU64,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new run of a session.
    ///
    /// Returns the run's generation and the entry it displaced, if any.
    pub fn insert(
        &self,
        id: SessionId,
        connection: Arc<dyn Connection>,
        agent: Option<ProxyAgent>,
        cancel: CancellationToken,
    ) -> (u64, Option<SessionEntry>) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = SessionEntry {
            connection,
            agent,
            generation,
            cancel,
        };
        let previous = self.entries.write().insert(id, entry);
        (generation, previous)
    }

    /// Swap in the connection of a reconnect.
    ///
    /// Only succeeds while `generation` is still the registered run.
    pub fn replace_connection(
        &self,
        id: &SessionId,
        generation: u64,
        connection: Arc<dyn Connection>,
    ) -> bool {
        match self.entries.write().get_mut(id) {
            Some(entry) if entry.generation == generation => {
                entry.connection = connection;
                true
            }
            _ => false,
        }
    }

    /// Whether `generation` is the registered run of the session.
    pub fn is_current(&self, id: &SessionId, generation: u64) -> bool {
        self.entries
            .read()
            .get(id)
            .is_some_and(|entry| entry.generation == generation)
    }

    /// Run `f` only while `generation` is the registered run of the session.
    ///
    /// The registry stays locked for the duration of `f`, so a concurrent
    /// removal either happens before (and `f` is skipped) or after it.
    pub fn with_current<R>(
        &self,
        id: &SessionId,
        generation: u64,
        f: impl FnOnce() -> R,
    ) -> Option<R> {
        let entries = self.entries.read();
        match entries.get(id) {
            Some(entry) if entry.generation == generation => Some(f()),
            _ => None,
        }
    }

    /// Current connection of a session.
    pub fn get(&self, id: &SessionId) -> Option<Arc<dyn Connection>> {
        self.entries
            .read()
            .get(id)
            .map(|entry| Arc::clone(&entry.connection))
    }

    /// Whether the session is registered.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Registered session ids, sorted.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.entries.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Registered entries, sorted by id.
    pub fn entries(&self) -> Vec<(SessionId, SessionEntry)> {
        let mut entries: Vec<_> = self
            .entries
            .read()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Remove a session regardless of run.
    pub fn remove(&self, id: &SessionId) -> Option<SessionEntry> {
        self.entries.write().remove(id)
    }

    /// Remove a session only if `generation` is its registered run.
    pub fn remove_if_current(&self, id: &SessionId, generation: u64) -> Option<SessionEntry> {
        let mut entries = self.entries.write();
        match entries.get(id) {
            Some(entry) if entry.generation == generation => entries.remove(id),
            _ => None,
        }
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeConnection;

    fn id(raw: &str) -> SessionId {
        SessionId::new(raw).unwrap()
    }

    fn connection() -> Arc<dyn Connection> {
        FakeConnection::detached()
    }

    #[test]
    fn test_insert_and_get() {
        let registry = SessionRegistry::new();
        let (generation, previous) =
            registry.insert(id("alice"), connection(), None, CancellationToken::new());

        assert!(previous.is_none());
        assert!(registry.contains(&id("alice")));
        assert!(registry.get(&id("alice")).is_some());
        assert!(registry.is_current(&id("alice"), generation));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_insert_displaces_previous_run() {
        let registry = SessionRegistry::new();
        let (first, _) = registry.insert(id("alice"), connection(), None, CancellationToken::new());
        let (second, previous) =
            registry.insert(id("alice"), connection(), None, CancellationToken::new());

        assert_ne!(first, second);
        assert_eq!(previous.map(|entry| entry.generation()), Some(first));
        assert!(!registry.is_current(&id("alice"), first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_replace_connection_requires_current_generation() {
        let registry = SessionRegistry::new();
        let original = connection();
        let (generation, _) = registry.insert(
            id("alice"),
            Arc::clone(&original),
            None,
            CancellationToken::new(),
        );

        let replacement = connection();
        assert!(registry.replace_connection(&id("alice"), generation, Arc::clone(&replacement)));
        let current = registry.get(&id("alice")).unwrap();
        assert_eq!(
            Arc::as_ptr(&current) as *const (),
            Arc::as_ptr(&replacement) as *const ()
        );

        assert!(!registry.replace_connection(&id("alice"), generation + 1, connection()));
        assert!(!registry.replace_connection(&id("bob"), generation, connection()));
    }

    #[test]
    fn test_remove_if_current() {
        let registry = SessionRegistry::new();
        let (generation, _) =
            registry.insert(id("alice"), connection(), None, CancellationToken::new());

        assert!(registry.remove_if_current(&id("alice"), generation + 1).is_none());
        assert!(registry.contains(&id("alice")));
        assert!(registry.remove_if_current(&id("alice"), generation).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ids_sorted() {
        let registry = SessionRegistry::new();
        for name in ["carol", "alice", "bob"] {
            registry.insert(id(name), connection(), None, CancellationToken::new());
        }

        assert_eq!(registry.ids(), vec![id("alice"), id("bob"), id("carol")]);
    }

    #[test]
    fn test_entry_keeps_agent() {
        let registry = SessionRegistry::new();
        let agent = ProxyAgent::parse("http://proxy:8080").unwrap();
        registry.insert(
            id("carol"),
            connection(),
            Some(agent.clone()),
            CancellationToken::new(),
        );

        let entries = registry.entries();
        assert_eq!(entries[0].1.agent(), Some(&agent));
    }

    #[test]
    fn test_with_current_skips_removed_run() {
        let registry = SessionRegistry::new();
        let (generation, _) =
            registry.insert(id("alice"), connection(), None, CancellationToken::new());

        assert_eq!(registry.with_current(&id("alice"), generation, || 7), Some(7));
        assert_eq!(registry.with_current(&id("alice"), generation + 1, || 7), None);

        registry.remove(&id("alice"));
        let mut ran = false;
        assert!(registry
            .with_current(&id("alice"), generation, || ran = true)
            .is_none());
        assert!(!ran);
    }

    #[test]
    fn test_cancel_keeps_connection_open() {
        let registry = SessionRegistry::new();
        let fake = FakeConnection::detached();
        let cancel = CancellationToken::new();
        registry.insert(id("alice"), fake.clone(), None, cancel.clone());

        let entry = registry.remove(&id("alice")).unwrap();
        entry.cancel();
        assert!(cancel.is_cancelled());
        assert!(!fake.is_ended());

        entry.end();
        assert!(fake.is_ended());
    }

    #[test]
    fn test_shut_down_cancels_and_ends() {
        let registry = SessionRegistry::new();
        let fake = FakeConnection::detached();
        let cancel = CancellationToken::new();
        registry.insert(id("alice"), fake.clone(), None, cancel.clone());

        registry.remove(&id("alice")).unwrap().shut_down();

        assert!(cancel.is_cancelled());
        assert!(fake.is_ended());
    }
}
