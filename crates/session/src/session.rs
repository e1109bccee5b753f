//! Session records and the per-session frame ledger.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use framestitch_common::error::{ExportError, ExportResult};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::AbortHandle;

use crate::barrier::CompletionBarrier;

/// Longest accepted session token.
pub const MAX_TOKEN_LEN: usize = 128;

/// Distinct frame indices received for one session.
///
/// `remaining` reaches zero exactly when `received` holds `expected` indices.
#[derive(Debug, Clone)]
pub struct FrameLedger {
    expected: u32,
    received: BTreeSet<u32>,
    remaining: u32,
}

impl FrameLedger {
    pub fn new(expected: u32) -> Self {
        Self {
            expected,
            received: BTreeSet::new(),
            remaining: expected,
        }
    }

    pub fn contains(&self, index: u32) -> bool {
        self.received.contains(&index)
    }

    /// Record a stored frame. Returns false for an index already counted or
    /// outside `[0, expected)`.
    pub fn record(&mut self, index: u32) -> bool {
        if index >= self.expected || !self.received.insert(index) {
            return false;
        }
        self.remaining -= 1;
        true
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn received_count(&self) -> u32 {
        self.received.len() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

/// One live export job.
pub struct Session {
    token: String,
    generation: u64,
    expected: u32,
    storage_dir: PathBuf,
    created_at: DateTime<Utc>,
    created: Instant,
    ledger: tokio::sync::Mutex<FrameLedger>,
    barrier: CompletionBarrier,
    eviction: Mutex<Option<AbortHandle>>,
}

impl Session {
    pub(crate) fn new(token: String, generation: u64, expected: u32, storage_dir: PathBuf) -> Self {
        Self {
            token,
            generation,
            expected,
            storage_dir,
            created_at: Utc::now(),
            created: Instant::now(),
            ledger: tokio::sync::Mutex::new(FrameLedger::new(expected)),
            barrier: CompletionBarrier::new(expected),
            eviction: Mutex::new(None),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Registration counter distinguishing sessions that reuse a token.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn expected(&self) -> u32 {
        self.expected
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn barrier(&self) -> &CompletionBarrier {
        &self.barrier
    }

    /// Lock guarding the ledger. Held across the frame write so that a
    /// duplicate delivery can never race the first copy to disk.
    pub(crate) fn ledger(&self) -> &tokio::sync::Mutex<FrameLedger> {
        &self.ledger
    }

    pub(crate) fn arm_eviction(&self, handle: AbortHandle) {
        if let Some(previous) = self.eviction.lock().replace(handle) {
            previous.abort();
        }
    }

    pub(crate) fn disarm_eviction(&self) {
        if let Some(handle) = self.eviction.lock().take() {
            handle.abort();
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let ledger = self.ledger.lock().await;
        SessionSnapshot {
            token: self.token.clone(),
            expected: self.expected,
            received: ledger.received_count(),
            remaining: ledger.remaining(),
            created_at: self.created_at.to_rfc3339(),
            age_secs: self.created.elapsed().as_secs_f64(),
            finishing: false,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token)
            .field("generation", &self.generation)
            .field("expected", &self.expected)
            .field("storage_dir", &self.storage_dir)
            .field("barrier", &self.barrier.state())
            .finish()
    }
}

/// Point-in-time progress of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub token: String,
    pub expected: u32,
    pub received: u32,
    pub remaining: u32,
    /// Creation time (RFC 3339).
    pub created_at: String,
    pub age_secs: f64,
    /// Claimed by `finish` and being encoded.
    pub finishing: bool,
}

/// Tokens double as directory names, so only `[A-Za-z0-9_-]` is accepted.
pub fn validate_token(token: &str) -> ExportResult<()> {
    let valid = !token.is_empty()
        && token.len() <= MAX_TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(ExportError::invalid_token(token))
    }
}
