//! On-disk storage for session frames and artifacts.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// File layer that holds one directory per session.
#[async_trait]
pub trait FrameStorage: Send + Sync {
    /// Directory assigned to `token`.
    fn session_dir(&self, token: &str) -> PathBuf;

    /// printf-style frame name pattern understood by the encoder.
    fn frame_pattern(&self) -> String;

    /// Create an empty session directory, clearing anything left behind.
    async fn create_session_dir(&self, dir: &Path) -> io::Result<()>;

    /// Durably write one frame. The file name is derived from `index`.
    async fn write_frame(&self, dir: &Path, index: u32, payload: &[u8]) -> io::Result<PathBuf>;

    /// Stored frame files in index order.
    async fn list_frames(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    /// Delete frame files, keeping anything else (the artifact).
    async fn remove_frames(&self, dir: &Path) -> io::Result<()>;

    /// Delete the whole directory. Missing directories are not an error.
    async fn remove_session_dir(&self, dir: &Path) -> io::Result<()>;
}

/// [`FrameStorage`] rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalFrameStorage {
    root: PathBuf,
    extension: String,
}

impl LocalFrameStorage {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage root.
    pub async fn ensure_root(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    fn frame_name(&self, index: u32) -> String {
        format!("frame_{index}.{}", self.extension)
    }

    fn parse_frame_name(&self, name: &str) -> Option<u32> {
        name.strip_prefix("frame_")?
            .strip_suffix(&self.extension)?
            .strip_suffix('.')?
            .parse()
            .ok()
    }
}

#[async_trait]
impl FrameStorage for LocalFrameStorage {
    fn session_dir(&self, token: &str) -> PathBuf {
        self.root.join(token)
    }

    fn frame_pattern(&self) -> String {
        format!("frame_%d.{}", self.extension)
    }

    async fn create_session_dir(&self, dir: &Path) -> io::Result<()> {
        if tokio::fs::try_exists(dir).await? {
            tracing::debug!(dir = %dir.display(), "Clearing stale session directory");
            tokio::fs::remove_dir_all(dir).await?;
        }
        tokio::fs::create_dir_all(dir).await
    }

    async fn write_frame(&self, dir: &Path, index: u32, payload: &[u8]) -> io::Result<PathBuf> {
        use tokio::io::AsyncWriteExt;

        let name = self.frame_name(index);
        let path = dir.join(&name);
        let partial = dir.join(format!(".{name}.part"));

        // `create` never makes parent directories, so a write into an evicted
        // session fails instead of recreating it.
        let mut file = tokio::fs::File::create(&partial).await?;
        let written = async {
            file.write_all(payload).await?;
            file.sync_all().await
        }
        .await;
        drop(file);
        if let Err(err) = written {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err);
        }
        tokio::fs::rename(&partial, &path).await?;
        Ok(path)
    }

    async fn list_frames(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut frames = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(index) = name.to_str().and_then(|n| self.parse_frame_name(n)) {
                frames.push((index, entry.path()));
            }
        }
        frames.sort_by_key(|(index, _)| *index);
        Ok(frames.into_iter().map(|(_, path)| path).collect())
    }

    async fn remove_frames(&self, dir: &Path) -> io::Result<()> {
        for frame in self.list_frames(dir).await? {
            tokio::fs::remove_file(frame).await?;
        }
        Ok(())
    }

    async fn remove_session_dir(&self, dir: &Path) -> io::Result<()> {
        match tokio::fs::remove_dir_all(dir).await {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
