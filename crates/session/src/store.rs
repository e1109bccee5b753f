//! Token-keyed registry of live sessions.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use framestitch_common::error::{ExportError, ExportResult};
use parking_lot::Mutex;

use crate::session::Session;

/// Concurrency-safe map from token to live [`Session`].
///
/// All operations serialize on one lock. A session being finished stays
/// registered, so its token cannot be reused until the export is done. The
/// store also records which session generation owns each token's storage
/// directory so that a late cleanup for an old session never removes files
/// of a newer one.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: Mutex<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    sessions: HashMap<String, Arc<Session>>,
    finishing: HashSet<String>,
    storage_owners: HashMap<String, u64>,
    next_generation: u64,
}

impl StoreInner {
    fn is_current(&self, session: &Arc<Session>) -> bool {
        self.sessions
            .get(session.token())
            .is_some_and(|current| Arc::ptr_eq(current, session))
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Fails with `DuplicateSession` while the token is live.
    pub fn create(
        &self,
        token: &str,
        expected: u32,
        storage_dir: PathBuf,
    ) -> ExportResult<Arc<Session>> {
        if expected == 0 {
            return Err(ExportError::invalid_frame_count("0"));
        }

        let mut inner = self.inner.lock();
        if inner.sessions.contains_key(token) {
            return Err(ExportError::duplicate_session(token));
        }

        inner.next_generation += 1;
        let generation = inner.next_generation;
        let session = Arc::new(Session::new(
            token.to_string(),
            generation,
            expected,
            storage_dir,
        ));
        inner.sessions.insert(token.to_string(), session.clone());
        inner.storage_owners.insert(token.to_string(), generation);
        Ok(session)
    }

    pub fn get(&self, token: &str) -> ExportResult<Arc<Session>> {
        self.inner
            .lock()
            .sessions
            .get(token)
            .cloned()
            .ok_or_else(|| ExportError::session_not_found(token))
    }

    /// Remove whatever session holds `token`. Removing an absent token is a no-op.
    pub fn delete(&self, token: &str) -> Option<Arc<Session>> {
        let mut inner = self.inner.lock();
        inner.finishing.remove(token);
        inner.sessions.remove(token)
    }

    /// Remove `session` only if it is still the live holder of its token.
    pub fn remove_if_current(&self, session: &Arc<Session>) -> bool {
        let mut inner = self.inner.lock();
        if !inner.is_current(session) {
            return false;
        }
        inner.finishing.remove(session.token());
        inner.sessions.remove(session.token());
        true
    }

    /// Mark `session` as finishing. Only one caller wins; the session stays
    /// registered until [`remove_if_current`](Self::remove_if_current).
    pub fn claim(&self, session: &Arc<Session>) -> bool {
        let mut inner = self.inner.lock();
        inner.is_current(session) && inner.finishing.insert(session.token().to_string())
    }

    /// Remove `session` unless it is being finished.
    pub fn evict_if_idle(&self, session: &Arc<Session>) -> bool {
        let mut inner = self.inner.lock();
        if !inner.is_current(session) || inner.finishing.contains(session.token()) {
            return false;
        }
        inner.sessions.remove(session.token());
        true
    }

    pub fn is_finishing(&self, token: &str) -> bool {
        self.inner.lock().finishing.contains(token)
    }

    /// Give up storage ownership for `(token, generation)`.
    ///
    /// Returns true when that generation still owned the directory and the
    /// caller may delete it.
    pub fn release_storage(&self, token: &str, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.sessions.contains_key(token) {
            return false;
        }
        match inner.storage_owners.get(token) {
            Some(owner) if *owner == generation => {
                inner.storage_owners.remove(token);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.inner.lock().sessions.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir(token: &str) -> PathBuf {
        PathBuf::from("/tmp/framestitch-test").join(token)
    }

    #[test]
    fn test_create_initializes_counters() {
        let store = SessionStore::new();
        let session = store.create("a", 5, dir("a")).unwrap();
        assert_eq!(session.expected(), 5);
        assert_eq!(session.barrier().remaining(), 5);
        assert_eq!(session.storage_dir(), dir("a").as_path());
        assert!(store.contains("a"));
    }

    #[test]
    fn test_duplicate_token_rejected() {
        let store = SessionStore::new();
        store.create("a", 2, dir("a")).unwrap();
        let err = store.create("a", 3, dir("a")).unwrap_err();
        assert!(matches!(err, ExportError::DuplicateSession { .. }));
        assert_eq!(store.get("a").unwrap().expected(), 2);
    }

    #[test]
    fn test_zero_expected_rejected() {
        let store = SessionStore::new();
        assert!(matches!(
            store.create("a", 0, dir("a")),
            Err(ExportError::InvalidFrameCount { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = SessionStore::new();
        store.create("a", 1, dir("a")).unwrap();
        assert!(store.delete("a").is_some());
        assert!(store.delete("a").is_none());
        assert!(matches!(
            store.get("a"),
            Err(ExportError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_remove_if_current_ignores_replaced_session() {
        let store = SessionStore::new();
        let old = store.create("a", 1, dir("a")).unwrap();
        store.delete("a");
        let new = store.create("a", 1, dir("a")).unwrap();

        assert!(!store.remove_if_current(&old));
        assert!(store.contains("a"));
        assert!(store.remove_if_current(&new));
        assert!(!store.contains("a"));
    }

    #[test]
    fn test_finishing_session_keeps_token_reserved() {
        let store = SessionStore::new();
        let session = store.create("a", 1, dir("a")).unwrap();

        assert!(store.claim(&session));
        assert!(!store.claim(&session));
        assert!(store.is_finishing("a"));
        assert!(matches!(
            store.create("a", 1, dir("a")),
            Err(ExportError::DuplicateSession { .. })
        ));
        assert!(!store.evict_if_idle(&session));
        assert!(!store.release_storage("a", session.generation()));

        assert!(store.remove_if_current(&session));
        assert!(!store.is_finishing("a"));
        assert!(store.create("a", 1, dir("a")).is_ok());
    }

    #[test]
    fn test_evicted_session_cannot_be_claimed() {
        let store = SessionStore::new();
        let session = store.create("a", 1, dir("a")).unwrap();
        assert!(store.evict_if_idle(&session));
        assert!(!store.claim(&session));
    }

    #[test]
    fn test_storage_release_follows_latest_generation() {
        let store = SessionStore::new();
        let old = store.create("a", 1, dir("a")).unwrap();
        store.delete("a");
        let new = store.create("a", 1, dir("a")).unwrap();

        // Live session holds the directory.
        assert!(!store.release_storage("a", new.generation()));

        store.delete("a");
        assert!(!store.release_storage("a", old.generation()));
        assert!(store.release_storage("a", new.generation()));
        assert!(!store.release_storage("a", new.generation()));
    }
}
