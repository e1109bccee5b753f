//! framestitch Session Core
//!
//! Coordinates export sessions whose frames arrive concurrently and out of
//! order. A session is registered with an expected frame count, frames are
//! deduplicated by index and persisted, and a completion barrier releases the
//! single `finish` caller once every frame is on disk. Sessions that are never
//! finished are evicted after a grace period.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────── ExportOrchestrator ────────────────────────┐
//! │  start ─────► LifecycleManager ──► SessionStore ◄── FrameIngestor ◄─ frame
//! │                    │ eviction timer      │               │         │
//! │                    ▼                     ▼               ▼         │
//! │               FrameStorage ◄──── Session { ledger, CompletionBarrier }
//! │                                          │                         │
//! │  finish ── wait ─────────────────────────┘── EncoderBackend ──► artifact
//! └────────────────────────────────────────────────────────────────────┘
//! ```

pub mod barrier;
pub mod ingest;
pub mod lifecycle;
pub mod orchestrator;
pub mod session;
pub mod storage;
pub mod store;

pub use barrier::{BarrierError, BarrierState, CompletionBarrier};
pub use ingest::{FrameIngestor, FrameOutcome};
pub use lifecycle::LifecycleManager;
pub use orchestrator::{ArtifactLocation, ExportOrchestrator, OrchestratorSettings};
pub use session::{validate_token, FrameLedger, Session, SessionSnapshot};
pub use storage::{FrameStorage, LocalFrameStorage};
pub use store::SessionStore;
