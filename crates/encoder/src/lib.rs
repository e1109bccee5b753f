//! framestitch Encoder
//!
//! Assembles the ordered frame images of a finished export session into a
//! single video artifact by invoking an external encoder process.
//!
//! # Pipeline
//!
//! ```text
//! <session>/frame_0.png ──┐
//! <session>/frame_1.png ──┤
//!          ...            ├── ffmpeg -framerate N -i frame_%d.png
//! <session>/frame_K.png ──┘               │
//!                                         ▼
//!                                  <session>/output.mp4
//! ```

pub mod ffmpeg;

use std::path::PathBuf;

use framestitch_common::error::ExportResult;

pub use ffmpeg::{command_exists, FfmpegEncoder};

/// An encode job over one session's stored frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeJob {
    /// Session directory that holds the frame files.
    pub frames_dir: PathBuf,

    /// printf-style input pattern relative to `frames_dir` (e.g. `frame_%d.png`).
    pub frame_pattern: String,

    /// Frame files in index order.
    pub frames: Vec<PathBuf>,

    /// Artifact file to produce.
    pub output_path: PathBuf,

    /// Output frame rate.
    pub fps: u32,
}

/// Progress callback for encoding.
pub type ProgressCallback = Box<dyn Fn(EncodeProgress) + Send>;

/// Encoder progress report.
#[derive(Debug, Clone)]
pub struct EncodeProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Frames encoded so far.
    pub frames_encoded: u64,

    /// Total frames in the job.
    pub total_frames: u64,

    /// Current stage.
    pub stage: EncodeStage,
}

/// Stages of an encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeStage {
    Preparing,
    Encoding,
    Complete,
}

/// Trait for encoder backends (FFmpeg, test doubles, ...).
pub trait EncoderBackend: Send + Sync {
    /// Encode the job's frames into `job.output_path`, returning the artifact path.
    fn encode(&self, job: &EncodeJob, progress: Option<ProgressCallback>)
        -> ExportResult<PathBuf>;

    /// Check if this backend is available on the system.
    fn is_available(&self) -> bool;

    /// Backend name.
    fn name(&self) -> &str;
}
