//! Application configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ExportError, ExportResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory holding one subdirectory per export session.
    pub output_dir: PathBuf,

    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Session lifetime settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// External encoder settings.
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (e.g. "0.0.0.0:8067").
    pub bind: String,

    /// Maximum accepted frame payload in bytes.
    pub max_frame_bytes: usize,

    /// Base URL used when building artifact links. Derived from the
    /// request `Host` header when unset.
    pub public_base_url: Option<String>,

    /// Reject frames for unknown tokens with 404 instead of accepting silently.
    pub strict_unknown_tokens: bool,
}

/// Session lifetime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds after creation at which an unfinished session is evicted.
    pub grace_period_secs: u64,

    /// Seconds a finished artifact stays downloadable.
    pub artifact_retention_secs: u64,
}

/// External encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Encoder executable (looked up in PATH).
    pub program: String,

    /// Output frame rate.
    pub fps: u32,

    /// Video codec passed to `-c:v`.
    pub codec: String,

    /// Pixel format passed to `-pix_fmt`.
    pub pixel_format: String,

    /// File extension used for stored frames.
    pub frame_extension: String,

    /// Artifact file name inside the session directory.
    pub output_file: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "framestitch=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            encoder: EncoderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8067".to_string(),
            max_frame_bytes: 32 * 1024 * 1024,
            public_base_url: None,
            strict_unknown_tokens: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 60,
            artifact_retention_secs: 60,
        }
    }
}

impl SessionConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn artifact_retention(&self) -> Duration {
        Duration::from_secs(self.artifact_retention_secs)
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            fps: 30,
            codec: "libx264".to_string(),
            pixel_format: "yuv420p".to_string(),
            frame_extension: "png".to_string(),
            output_file: "output.mp4".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> ExportResult<()> {
        if self.encoder.fps == 0 {
            return Err(ExportError::config("encoder.fps must be positive"));
        }
        if self.server.max_frame_bytes == 0 {
            return Err(ExportError::config("server.max_frame_bytes must be positive"));
        }
        if self.session.grace_period_secs == 0 {
            return Err(ExportError::config("session.grace_period_secs must be positive"));
        }
        let ext = &self.encoder.frame_extension;
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ExportError::config(format!(
                "encoder.frame_extension must be alphanumeric, got {ext:?}"
            )));
        }
        let file = &self.encoder.output_file;
        if file.is_empty() || file.contains(['/', '\\']) || file.starts_with('.') {
            return Err(ExportError::config(format!(
                "encoder.output_file must be a plain file name, got {file:?}"
            )));
        }
        Ok(())
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("framestitch").join("config.json")
}

/// Default artifact output directory.
fn default_output_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("framestitch").join("output")
}
