//! Frame ingestion: validate, deduplicate, persist, then signal.

use std::sync::Arc;

use framestitch_common::error::{ExportError, ExportResult};

use crate::storage::FrameStorage;
use crate::store::SessionStore;

/// Result of offering one frame to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Stored and counted.
    Accepted { remaining: u32 },
    /// Index already stored; payload discarded.
    Duplicate,
    /// No live session for the token; nothing was stored.
    Ignored,
}

/// Accepts frame payloads for live sessions.
#[derive(Clone)]
pub struct FrameIngestor {
    store: Arc<SessionStore>,
    storage: Arc<dyn FrameStorage>,
}

impl FrameIngestor {
    pub fn new(store: Arc<SessionStore>, storage: Arc<dyn FrameStorage>) -> Self {
        Self { store, storage }
    }

    /// Offer frame `index` of session `token`.
    ///
    /// Unknown or evicted tokens yield [`FrameOutcome::Ignored`]. A storage
    /// failure leaves the index uncounted so a retried upload can succeed.
    pub async fn ingest(
        &self,
        token: &str,
        index: u32,
        payload: &[u8],
    ) -> ExportResult<FrameOutcome> {
        let session = match self.store.get(token) {
            Ok(session) => session,
            Err(ExportError::SessionNotFound { .. }) => {
                tracing::debug!(token, index, "Frame for unknown session ignored");
                return Ok(FrameOutcome::Ignored);
            }
            Err(e) => return Err(e),
        };

        if index >= session.expected() {
            return Err(ExportError::InvalidFrameIndex {
                index,
                expected: session.expected(),
            });
        }

        let mut ledger = session.ledger().lock().await;
        if session.barrier().is_cancelled() {
            tracing::debug!(token, index, "Frame for evicted session ignored");
            return Ok(FrameOutcome::Ignored);
        }
        if ledger.contains(index) {
            tracing::debug!(token, index, "Duplicate frame discarded");
            return Ok(FrameOutcome::Duplicate);
        }

        self.storage
            .write_frame(session.storage_dir(), index, payload)
            .await
            .map_err(|source| {
                tracing::warn!(token, index, error = %source, "Failed to store frame");
                ExportError::IngestionFailed { index, source }
            })?;

        let recorded = ledger.record(index);
        debug_assert!(recorded, "frame {index} counted twice");
        let remaining = ledger.remaining();
        // Only after the write: a released waiter may read every frame.
        session.barrier().signal();
        drop(ledger);

        tracing::debug!(token, index, remaining, bytes = payload.len(), "Frame stored");
        if remaining == 0 {
            tracing::info!(token, frames = session.expected(), "All frames received");
        }
        Ok(FrameOutcome::Accepted { remaining })
    }
}
