//! Export orchestration: start, frame, finish.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use framestitch_common::config::AppConfig;
use framestitch_common::error::{ExportError, ExportResult};
use framestitch_encoder::{EncodeJob, EncodeProgress, EncoderBackend, ProgressCallback};

use crate::ingest::{FrameIngestor, FrameOutcome};
use crate::lifecycle::LifecycleManager;
use crate::session::{Session, SessionSnapshot};
use crate::storage::FrameStorage;
use crate::store::SessionStore;

/// Tunables for an [`ExportOrchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Time after creation at which an unfinished session is evicted.
    pub grace_period: Duration,

    /// Time a finished artifact stays on disk.
    pub artifact_retention: Duration,

    /// Frame rate handed to the encoder.
    pub fps: u32,

    /// Artifact file name inside the session directory.
    pub output_file: String,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            grace_period: config.session.grace_period(),
            artifact_retention: config.session.artifact_retention(),
            fps: config.encoder.fps,
            output_file: config.encoder.output_file.clone(),
        }
    }
}

/// Where a finished artifact can be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    pub token: String,

    /// Artifact path on disk.
    pub path: PathBuf,

    /// Path relative to the download root, e.g. `output/<token>/output.mp4`.
    pub url_path: String,
}

impl ArtifactLocation {
    /// Absolute URL under `base` (e.g. `http://host:8067`).
    pub fn url(&self, base: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), self.url_path)
    }
}

/// Composes store, ingestion, lifecycle, and the encoder collaborator.
#[derive(Clone)]
pub struct ExportOrchestrator {
    store: Arc<SessionStore>,
    storage: Arc<dyn FrameStorage>,
    ingestor: FrameIngestor,
    lifecycle: LifecycleManager,
    encoder: Arc<dyn EncoderBackend>,
    settings: OrchestratorSettings,
}

impl ExportOrchestrator {
    pub fn new(
        storage: Arc<dyn FrameStorage>,
        encoder: Arc<dyn EncoderBackend>,
        settings: OrchestratorSettings,
    ) -> Self {
        let store = Arc::new(SessionStore::new());
        let ingestor = FrameIngestor::new(store.clone(), storage.clone());
        let lifecycle = LifecycleManager::new(
            store.clone(),
            storage.clone(),
            settings.grace_period,
            settings.artifact_retention,
        );
        Self {
            store,
            storage,
            ingestor,
            lifecycle,
            encoder,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn encoder(&self) -> &dyn EncoderBackend {
        self.encoder.as_ref()
    }

    /// Number of live sessions.
    pub fn active_sessions(&self) -> usize {
        self.store.len()
    }

    /// Register a session expecting `expected` frames. A token is generated
    /// when none is supplied.
    pub async fn start(&self, token: Option<String>, expected: u32) -> ExportResult<String> {
        let token = token.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        self.lifecycle.open(&token, expected).await?;
        Ok(token)
    }

    /// Store frame `index` for `token`.
    pub async fn frame(
        &self,
        token: &str,
        index: u32,
        payload: &[u8],
    ) -> ExportResult<FrameOutcome> {
        self.ingestor.ingest(token, index, payload).await
    }

    /// Progress of a live session.
    pub async fn status(&self, token: &str) -> ExportResult<SessionSnapshot> {
        let mut snapshot = self.store.get(token)?.snapshot().await;
        snapshot.finishing = self.store.is_finishing(token);
        Ok(snapshot)
    }

    /// Wait for every frame of `token`, encode them, and return the artifact.
    ///
    /// Fails with `SessionNotFound` if the session is unknown, is evicted
    /// while waiting, or was already claimed by a concurrent caller. The
    /// token cannot be registered again until the encoder is done.
    pub async fn finish(&self, token: &str) -> ExportResult<ArtifactLocation> {
        let session = self.store.get(token)?;
        self.finish_session(&session).await
    }

    async fn finish_session(&self, session: &Arc<Session>) -> ExportResult<ArtifactLocation> {
        let token = session.token();
        tracing::info!(
            token,
            remaining = session.barrier().remaining(),
            "Waiting for frames"
        );
        session
            .barrier()
            .wait()
            .await
            .map_err(|_| ExportError::session_not_found(token))?;
        // The token stays reserved while encoding.
        self.lifecycle.claim(session)?;

        match self.encode(session).await {
            Ok(location) => {
                self.lifecycle.retain_artifact(session).await;
                tracing::info!(
                    token,
                    artifact = %location.path.display(),
                    "Export finished"
                );
                Ok(location)
            }
            Err(err) => {
                tracing::error!(token, error = %err, "Export failed");
                self.lifecycle.discard(session).await;
                Err(err)
            }
        }
    }

    async fn encode(&self, session: &Session) -> ExportResult<ArtifactLocation> {
        let dir = session.storage_dir().to_path_buf();
        let frames = self.storage.list_frames(&dir).await?;
        if frames.len() != session.expected() as usize {
            return Err(ExportError::encoding(format!(
                "expected {} frames on disk, found {}",
                session.expected(),
                frames.len()
            )));
        }

        let job = EncodeJob {
            frames_dir: dir.clone(),
            frame_pattern: self.storage.frame_pattern(),
            frames,
            output_path: dir.join(&self.settings.output_file),
            fps: self.settings.fps,
        };

        let encoder = self.encoder.clone();
        let token = session.token().to_string();
        let progress: ProgressCallback = Box::new(move |p: EncodeProgress| {
            tracing::debug!(
                token = %token,
                stage = ?p.stage,
                frames = p.frames_encoded,
                total = p.total_frames,
                "Encoding progress"
            );
        });

        tracing::info!(
            token = session.token(),
            backend = encoder.name(),
            frames = job.frames.len(),
            fps = job.fps,
            "Starting encoder"
        );
        let path = tokio::task::spawn_blocking(move || encoder.encode(&job, Some(progress)))
            .await
            .map_err(|e| ExportError::encoding(format!("encoder task failed: {e}")))??;

        Ok(ArtifactLocation {
            token: session.token().to_string(),
            path,
            url_path: format!("output/{}/{}", session.token(), self.settings.output_file),
        })
    }
}
