use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use framestitch_common::error::{ExportError, ExportResult};
use framestitch_encoder::{EncodeJob, EncoderBackend, ProgressCallback};
use framestitch_session::{
    ExportOrchestrator, FrameOutcome, FrameStorage, LocalFrameStorage, OrchestratorSettings,
};
use parking_lot::Mutex;

/// Encoder double that concatenates frame payloads into the artifact.
#[derive(Default)]
struct RecordingEncoder {
    jobs: Mutex<Vec<EncodeJob>>,
    fail: bool,
    delay: Duration,
}

impl EncoderBackend for RecordingEncoder {
    fn encode(&self, job: &EncodeJob, _progress: Option<ProgressCallback>) -> ExportResult<PathBuf> {
        self.jobs.lock().push(job.clone());
        std::thread::sleep(self.delay);
        if self.fail {
            return Err(ExportError::encoding("exit status: 1"));
        }
        let mut artifact = Vec::new();
        for frame in &job.frames {
            artifact.extend(std::fs::read(frame)?);
        }
        std::fs::write(&job.output_path, artifact)?;
        Ok(job.output_path.clone())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct Harness {
    root: tempfile::TempDir,
    encoder: Arc<RecordingEncoder>,
    orchestrator: ExportOrchestrator,
}

fn harness_with(encoder: RecordingEncoder, grace: Duration) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalFrameStorage::new(root.path(), "png"));
    let encoder = Arc::new(encoder);
    let orchestrator = ExportOrchestrator::new(
        storage,
        encoder.clone(),
        OrchestratorSettings {
            grace_period: grace,
            artifact_retention: Duration::from_secs(60),
            fps: 30,
            output_file: "output.mp4".to_string(),
        },
    );
    Harness {
        root,
        encoder,
        orchestrator,
    }
}

fn harness() -> Harness {
    harness_with(RecordingEncoder::default(), Duration::from_secs(60))
}

#[tokio::test]
async fn end_to_end_two_frames_encoded_once_in_order() {
    let h = harness();
    let token = h
        .orchestrator
        .start(Some("a".to_string()), 2)
        .await
        .unwrap();
    assert_eq!(token, "a");

    h.orchestrator.frame("a", 1, b"B1").await.unwrap();
    h.orchestrator.frame("a", 0, b"B0").await.unwrap();
    let location = h.orchestrator.finish("a").await.unwrap();

    assert_eq!(location.url_path, "output/a/output.mp4");
    assert_eq!(
        location.url("http://localhost:8067/"),
        "http://localhost:8067/output/a/output.mp4"
    );
    assert_eq!(std::fs::read(&location.path).unwrap(), b"B0B1");

    let jobs = h.encoder.jobs.lock();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].frame_pattern, "frame_%d.png");
    assert_eq!(jobs[0].fps, 30);
    let names: Vec<_> = jobs[0]
        .frames
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["frame_0.png", "frame_1.png"]);
    drop(jobs);

    // Frames are dropped once the artifact exists; the session is gone.
    assert!(!h.root.path().join("a").join("frame_0.png").exists());
    assert_eq!(h.orchestrator.active_sessions(), 0);
    assert!(matches!(
        h.orchestrator.finish("a").await,
        Err(ExportError::SessionNotFound { .. })
    ));
}

#[tokio::test]
async fn finish_waits_for_all_distinct_indices() {
    let h = harness();
    h.orchestrator.start(Some("a".to_string()), 3).await.unwrap();

    let finish = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.finish("a").await })
    };

    h.orchestrator.frame("a", 2, b"2").await.unwrap();
    h.orchestrator.frame("a", 0, b"0").await.unwrap();
    assert_eq!(
        h.orchestrator.frame("a", 2, b"x").await.unwrap(),
        FrameOutcome::Duplicate
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!finish.is_finished());

    let status = h.orchestrator.status("a").await.unwrap();
    assert_eq!((status.received, status.remaining), (2, 1));

    h.orchestrator.frame("a", 1, b"1").await.unwrap();
    let location = finish.await.unwrap().unwrap();
    assert_eq!(std::fs::read(location.path).unwrap(), b"012");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_uploads_release_single_finish() {
    const FRAMES: u32 = 64;
    let h = harness();
    h.orchestrator
        .start(Some("many".to_string()), FRAMES)
        .await
        .unwrap();

    let finish = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.finish("many").await })
    };

    let uploads: Vec<_> = (0..FRAMES)
        .rev()
        .map(|index| {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move {
                // Every frame is delivered twice.
                let payload = index.to_le_bytes();
                let a = orchestrator.frame("many", index, &payload).await.unwrap();
                let b = orchestrator.frame("many", index, &payload).await.unwrap();
                (a, b)
            })
        })
        .collect();

    let mut accepted = 0;
    let mut releases = 0;
    for upload in uploads {
        let (a, b) = upload.await.unwrap();
        for outcome in [a, b] {
            match outcome {
                FrameOutcome::Accepted { remaining } => {
                    accepted += 1;
                    if remaining == 0 {
                        releases += 1;
                    }
                }
                // Re-deliveries racing a completed finish find no session.
                FrameOutcome::Duplicate | FrameOutcome::Ignored => {}
            }
        }
    }
    assert_eq!(accepted, FRAMES);
    assert_eq!(releases, 1);

    finish.await.unwrap().unwrap();
    let jobs = h.encoder.jobs.lock();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].frames.len(), FRAMES as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn token_stays_reserved_while_encoding() {
    let h = harness_with(
        RecordingEncoder {
            delay: Duration::from_millis(300),
            ..RecordingEncoder::default()
        },
        Duration::from_secs(60),
    );
    h.orchestrator.start(Some("a".to_string()), 1).await.unwrap();
    h.orchestrator.frame("a", 0, b"0").await.unwrap();

    let finish = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.finish("a").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!finish.is_finished());
    assert!(h.orchestrator.status("a").await.unwrap().finishing);

    assert!(matches!(
        h.orchestrator.start(Some("a".to_string()), 1).await,
        Err(ExportError::DuplicateSession { .. })
    ));
    assert!(matches!(
        h.orchestrator.finish("a").await,
        Err(ExportError::SessionNotFound { .. })
    ));

    let location = finish.await.unwrap().unwrap();
    assert_eq!(std::fs::read(&location.path).unwrap(), b"0");
    assert_eq!(h.encoder.jobs.lock().len(), 1);

    // Released once the artifact is retained.
    h.orchestrator.start(Some("a".to_string()), 1).await.unwrap();
}

#[tokio::test]
async fn duplicate_start_is_rejected() {
    let h = harness();
    h.orchestrator.start(Some("a".to_string()), 2).await.unwrap();
    assert!(matches!(
        h.orchestrator.start(Some("a".to_string()), 5).await,
        Err(ExportError::DuplicateSession { .. })
    ));
    assert_eq!(h.orchestrator.status("a").await.unwrap().expected, 2);
}

#[tokio::test]
async fn generated_tokens_are_unique() {
    let h = harness();
    let a = h.orchestrator.start(None, 1).await.unwrap();
    let b = h.orchestrator.start(None, 1).await.unwrap();
    assert_ne!(a, b);
    assert_eq!(h.orchestrator.active_sessions(), 2);
}

#[tokio::test]
async fn abandoned_session_is_evicted_and_not_resurrected() {
    let h = harness_with(RecordingEncoder::default(), Duration::from_millis(80));
    h.orchestrator.start(Some("gone".to_string()), 5).await.unwrap();
    h.orchestrator.frame("gone", 0, b"0").await.unwrap();
    let dir = h.root.path().join("gone");
    assert!(dir.join("frame_0.png").exists());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!dir.exists());

    assert_eq!(
        h.orchestrator.frame("gone", 1, b"1").await.unwrap(),
        FrameOutcome::Ignored
    );
    assert!(!dir.exists());
    assert!(matches!(
        h.orchestrator.finish("gone").await,
        Err(ExportError::SessionNotFound { .. })
    ));
    assert!(h.encoder.jobs.lock().is_empty());
}

#[tokio::test]
async fn eviction_fails_pending_finish() {
    let h = harness_with(RecordingEncoder::default(), Duration::from_millis(80));
    h.orchestrator.start(Some("slow".to_string()), 3).await.unwrap();
    h.orchestrator.frame("slow", 0, b"0").await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), h.orchestrator.finish("slow"))
        .await
        .expect("finish must not hang after eviction");
    assert!(matches!(result, Err(ExportError::SessionNotFound { .. })));
}

#[tokio::test]
async fn encoder_failure_returns_error_and_removes_storage() {
    let h = harness_with(
        RecordingEncoder {
            fail: true,
            ..RecordingEncoder::default()
        },
        Duration::from_secs(60),
    );
    h.orchestrator.start(Some("bad".to_string()), 1).await.unwrap();
    h.orchestrator.frame("bad", 0, b"0").await.unwrap();

    let err = h.orchestrator.finish("bad").await.unwrap_err();
    assert!(matches!(err, ExportError::EncodingFailed { .. }));
    assert!(!h.root.path().join("bad").exists());
    assert_eq!(h.orchestrator.active_sessions(), 0);
}

#[tokio::test]
async fn missing_frame_files_fail_encoding() {
    let h = harness();
    h.orchestrator.start(Some("a".to_string()), 1).await.unwrap();
    h.orchestrator.frame("a", 0, b"0").await.unwrap();

    let storage = LocalFrameStorage::new(h.root.path(), "png");
    storage
        .remove_frames(&storage.session_dir("a"))
        .await
        .unwrap();

    assert!(matches!(
        h.orchestrator.finish("a").await,
        Err(ExportError::EncodingFailed { .. })
    ));
    assert!(h.encoder.jobs.lock().is_empty());
}
