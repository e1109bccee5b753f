//! FFmpeg-backed encoder.

use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use framestitch_common::config::EncoderConfig;
use framestitch_common::error::{ExportError, ExportResult};

use crate::{EncodeJob, EncodeProgress, EncodeStage, EncoderBackend, ProgressCallback};

/// Encoder that shells out to an `ffmpeg`-compatible binary.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    config: EncoderConfig,
}

impl FfmpegEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Program that will be invoked.
    pub fn program(&self) -> &str {
        &self.config.program
    }

    /// Build the argument list for an image-sequence encode.
    pub fn build_args(&self, job: &EncodeJob) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-nostats".to_string(),
            "-progress".to_string(),
            "pipe:1".to_string(),
            "-framerate".to_string(),
            job.fps.max(1).to_string(),
            "-start_number".to_string(),
            "0".to_string(),
            "-i".to_string(),
            job.frames_dir
                .join(&job.frame_pattern)
                .display()
                .to_string(),
            "-c:v".to_string(),
            self.config.codec.clone(),
            "-pix_fmt".to_string(),
            self.config.pixel_format.clone(),
            job.output_path.display().to_string(),
        ]
    }

    fn run_ffmpeg(
        &self,
        args: &[String],
        total_frames: u64,
        progress: Option<ProgressCallback>,
    ) -> ExportResult<()> {
        tracing::debug!(program = %self.config.program, ?args, "Running encoder");
        let mut cmd = Command::new(&self.config.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let start = std::time::Instant::now();
        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ExportError::encoder_unavailable(format!(
                "{} not found",
                self.config.program
            )),
            _ => ExportError::encoding(format!("Failed to start {}: {e}", self.config.program)),
        })?;

        tracing::info!(pid = child.id(), total_frames, "Encoder process started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExportError::encoding("Failed to capture encoder stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExportError::encoding("Failed to capture encoder stderr"))?;

        // Drain stderr concurrently so the encoder never blocks on a full pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read encoder stderr: {err}>"),
            }
        });

        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        let mut state = ProgressState::default();
        loop {
            line.clear();
            let bytes = reader
                .read_line(&mut line)
                .map_err(|e| ExportError::encoding(format!("Failed reading progress: {e}")))?;
            if bytes == 0 {
                break;
            }

            if let Some((key, value)) = line.trim().split_once('=') {
                state.update(key, value);
                if key == "progress" {
                    if let Some(cb) = &progress {
                        cb(progress_report(&state, total_frames));
                    }
                }
            }
        }

        let status = child
            .wait()
            .map_err(|e| ExportError::encoding(format!("Failed to wait on encoder: {e}")))?;

        let stderr_output = stderr_task
            .join()
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(ExportError::encoding(format!(
                "{} exited with {}: {}",
                self.config.program,
                status,
                stderr_output.trim()
            )));
        }

        tracing::info!(
            elapsed_secs = start.elapsed().as_secs_f64(),
            frames = state.frame,
            "Encoder process finished"
        );
        Ok(())
    }
}

impl EncoderBackend for FfmpegEncoder {
    fn encode(
        &self,
        job: &EncodeJob,
        progress: Option<ProgressCallback>,
    ) -> ExportResult<PathBuf> {
        if job.frames.is_empty() {
            return Err(ExportError::encoding("No frames to encode"));
        }
        if let Some(missing) = job.frames.iter().find(|frame| !frame.exists()) {
            return Err(ExportError::encoding(format!(
                "Frame file missing: {}",
                missing.display()
            )));
        }

        let total_frames = job.frames.len() as u64;
        if let Some(cb) = &progress {
            cb(EncodeProgress {
                progress: 0.0,
                frames_encoded: 0,
                total_frames,
                stage: EncodeStage::Preparing,
            });
        }

        let args = self.build_args(job);
        self.run_ffmpeg(&args, total_frames, progress)?;

        if !job.output_path.exists() {
            return Err(ExportError::encoding(format!(
                "{} produced no artifact at {}",
                self.config.program,
                job.output_path.display()
            )));
        }
        Ok(job.output_path.clone())
    }

    fn is_available(&self) -> bool {
        command_exists(&self.config.program)
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Whether `binary` resolves to an executable in the current environment.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v '{binary}' >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[derive(Debug, Default)]
struct ProgressState {
    frame: u64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            "frame" => {
                if let Ok(frame) = value.trim().parse::<u64>() {
                    self.frame = frame;
                }
            }
            "progress" => {
                self.complete = value.trim() == "end";
            }
            _ => {}
        }
    }
}

fn progress_report(state: &ProgressState, total_frames: u64) -> EncodeProgress {
    let progress = if state.complete {
        1.0
    } else if total_frames == 0 {
        0.0
    } else {
        (state.frame as f64 / total_frames as f64).clamp(0.0, 1.0)
    };

    EncodeProgress {
        progress,
        frames_encoded: state.frame.min(total_frames),
        total_frames,
        stage: if state.complete {
            EncodeStage::Complete
        } else {
            EncodeStage::Encoding
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn job_in(dir: &Path, frames: usize) -> EncodeJob {
        let frames = (0..frames)
            .map(|i| {
                let path = dir.join(format!("frame_{i}.png"));
                std::fs::write(&path, b"png").unwrap();
                path
            })
            .collect();
        EncodeJob {
            frames_dir: dir.to_path_buf(),
            frame_pattern: "frame_%d.png".to_string(),
            frames,
            output_path: dir.join("output.mp4"),
            fps: 30,
        }
    }

    #[test]
    fn test_build_args_reads_image_sequence_from_zero() {
        let encoder = FfmpegEncoder::new(EncoderConfig::default());
        let job = EncodeJob {
            frames_dir: PathBuf::from("/out/abc"),
            frame_pattern: "frame_%d.png".to_string(),
            frames: vec![PathBuf::from("/out/abc/frame_0.png")],
            output_path: PathBuf::from("/out/abc/output.mp4"),
            fps: 30,
        };

        let args = encoder.build_args(&job);
        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-framerate") + 1], "30");
        assert_eq!(args[pos("-start_number") + 1], "0");
        assert_eq!(args[pos("-i") + 1], "/out/abc/frame_%d.png");
        assert_eq!(args[pos("-c:v") + 1], "libx264");
        assert_eq!(args[pos("-pix_fmt") + 1], "yuv420p");
        assert_eq!(args.last().unwrap(), "/out/abc/output.mp4");
        assert!(pos("-i") < pos("-c:v"));
    }

    #[test]
    fn test_progress_state_tracks_frames_and_end() {
        let mut state = ProgressState::default();
        state.update("frame", "12");
        state.update("progress", "continue");
        let report = progress_report(&state, 24);
        assert_eq!(report.frames_encoded, 12);
        assert!((report.progress - 0.5).abs() < 1e-9);
        assert_eq!(report.stage, EncodeStage::Encoding);

        state.update("progress", "end");
        let report = progress_report(&state, 24);
        assert_eq!(report.stage, EncodeStage::Complete);
        assert!((report.progress - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_encode_rejects_empty_job() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FfmpegEncoder::new(EncoderConfig::default());
        let err = encoder.encode(&job_in(dir.path(), 0), None).unwrap_err();
        assert!(matches!(err, ExportError::EncodingFailed { .. }));
    }

    #[test]
    fn test_nonzero_exit_is_encoding_failure() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FfmpegEncoder::new(EncoderConfig {
            program: "false".to_string(),
            ..EncoderConfig::default()
        });
        let err = encoder.encode(&job_in(dir.path(), 2), None).unwrap_err();
        assert!(matches!(err, ExportError::EncodingFailed { .. }));
    }

    #[test]
    fn test_clean_exit_without_artifact_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FfmpegEncoder::new(EncoderConfig {
            program: "true".to_string(),
            ..EncoderConfig::default()
        });
        let err = encoder.encode(&job_in(dir.path(), 1), None).unwrap_err();
        assert!(err.to_string().contains("produced no artifact"));
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let encoder = FfmpegEncoder::new(EncoderConfig {
            program: "framestitch-no-such-encoder".to_string(),
            ..EncoderConfig::default()
        });
        assert!(!encoder.is_available());
        assert!(command_exists("sh"));

        let dir = tempfile::tempdir().unwrap();
        let err = encoder.encode(&job_in(dir.path(), 1), None).unwrap_err();
        assert!(matches!(err, ExportError::EncoderUnavailable { .. }));
    }
}
