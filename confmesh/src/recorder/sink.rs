use std::path::{Path, PathBuf};

use anyhow::anyhow;
use async_trait::async_trait;

use super::RecordingArtifact;

/// Where a finished recording was delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedRecording {
    pub file_name: String,
    pub mime_type: String,
    pub size: usize,
    pub location: Option<PathBuf>,
}

/// Delivers finished recordings to the user (the "download").
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn save(&self, artifact: RecordingArtifact) -> Result<SavedRecording, anyhow::Error>;
}

/// Writes recordings into a directory.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The user's download directory, falling back to the temp directory.
    pub fn downloads() -> Self {
        Self::new(dirs::download_dir().unwrap_or_else(std::env::temp_dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ArtifactSink for DirectorySink {
    async fn save(&self, artifact: RecordingArtifact) -> Result<SavedRecording, anyhow::Error> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| anyhow!("Failed to create {}: {}", self.dir.display(), e))?;
        let path = self.dir.join(&artifact.file_name);
        tokio::fs::write(&path, &artifact.data)
            .await
            .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))?;
        tracing::info!(path = %path.display(), size = artifact.data.len(), "Recording saved");
        Ok(SavedRecording {
            file_name: artifact.file_name,
            mime_type: artifact.mime_type,
            size: artifact.data.len(),
            location: Some(path),
        })
    }
}
