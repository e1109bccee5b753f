//! Session creation, timed eviction, and storage reclamation.

use std::sync::Arc;
use std::time::Duration;

use framestitch_common::error::{ExportError, ExportResult};

use crate::session::{validate_token, Session};
use crate::storage::FrameStorage;
use crate::store::SessionStore;

/// Creates sessions and bounds their lifetime.
///
/// Every session is evicted `grace_period` after creation unless `finish`
/// claims it first. Eviction cancels the session's barrier, so a `finish`
/// caller blocked in `wait` returns instead of hanging.
#[derive(Clone)]
pub struct LifecycleManager {
    store: Arc<SessionStore>,
    storage: Arc<dyn FrameStorage>,
    grace_period: Duration,
    artifact_retention: Duration,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<SessionStore>,
        storage: Arc<dyn FrameStorage>,
        grace_period: Duration,
        artifact_retention: Duration,
    ) -> Self {
        Self {
            store,
            storage,
            grace_period,
            artifact_retention,
        }
    }

    /// Register a session, create its directory, and arm eviction.
    pub async fn open(&self, token: &str, expected: u32) -> ExportResult<Arc<Session>> {
        validate_token(token)?;
        let dir = self.storage.session_dir(token);
        let session = self.store.create(token, expected, dir)?;

        if let Err(err) = self.storage.create_session_dir(session.storage_dir()).await {
            tracing::error!(token, error = %err, "Failed to create session directory");
            self.store.remove_if_current(&session);
            self.store.release_storage(token, session.generation());
            return Err(err.into());
        }

        self.arm_eviction(&session);
        tracing::info!(
            token,
            expected,
            dir = %session.storage_dir().display(),
            grace_secs = self.grace_period.as_secs_f64(),
            "Session created"
        );
        Ok(session)
    }

    fn arm_eviction(&self, session: &Arc<Session>) {
        let manager = self.clone();
        let weak = Arc::downgrade(session);
        let grace = self.grace_period;
        let task = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            // A dropped session was already claimed and cleaned up.
            if let Some(session) = weak.upgrade() {
                manager.evict(&session).await;
            }
        });
        session.arm_eviction(task.abort_handle());
    }

    /// Forcefully remove `session` and its storage.
    ///
    /// No-op (returns false) when the session is no longer live or `finish`
    /// already claimed it.
    pub async fn evict(&self, session: &Arc<Session>) -> bool {
        if !self.store.evict_if_idle(session) {
            return false;
        }
        session.barrier().cancel();

        // Wait out any frame write in progress; later writes see the
        // cancelled barrier and back off.
        let ledger = session.ledger().lock().await;
        let received = ledger.received_count();
        drop(ledger);

        self.reclaim(session).await;
        tracing::info!(
            token = session.token(),
            received,
            expected = session.expected(),
            "Session evicted"
        );
        true
    }

    /// Reserve `session` for finishing and disarm its eviction. The token
    /// stays registered until the session is retained or discarded.
    pub fn claim(&self, session: &Arc<Session>) -> ExportResult<()> {
        if !self.store.claim(session) {
            return Err(ExportError::session_not_found(session.token()));
        }
        session.disarm_eviction();
        Ok(())
    }

    /// Release a claimed session and delete its directory now.
    pub async fn discard(&self, session: &Arc<Session>) {
        self.store.remove_if_current(session);
        self.reclaim(session).await;
    }

    /// Drop a finished session's frames, release its token, and keep the
    /// artifact for the retention window.
    pub async fn retain_artifact(&self, session: &Arc<Session>) {
        if let Err(err) = self.storage.remove_frames(session.storage_dir()).await {
            tracing::warn!(token = session.token(), error = %err, "Failed to remove frames");
        }
        self.store.remove_if_current(session);

        let manager = self.clone();
        let session = session.clone();
        let retention = self.artifact_retention;
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            manager.reclaim(&session).await;
            tracing::debug!(token = session.token(), "Artifact retention expired");
        });
    }

    async fn reclaim(&self, session: &Session) {
        if !self
            .store
            .release_storage(session.token(), session.generation())
        {
            return;
        }
        if let Err(err) = self
            .storage
            .remove_session_dir(session.storage_dir())
            .await
        {
            tracing::warn!(
                token = session.token(),
                dir = %session.storage_dir().display(),
                error = %err,
                "Failed to remove session directory"
            );
        }
    }
}
