use async_trait::async_trait;

use crate::media::MediaStream;

/// A running encoder bound to one audio-only stream.
#[async_trait]
pub trait AudioEncoder: Send {
    /// Returns everything encoded since the previous call. May be empty.
    async fn request_data(&mut self) -> Result<Vec<u8>, anyhow::Error>;

    /// Stops encoding and returns trailing data.
    async fn stop(&mut self) -> Result<Vec<u8>, anyhow::Error>;
}

/// Platform audio encoder factory.
pub trait RecorderBackend: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// `mime_type` of `None` lets the backend pick its default container.
    fn open(
        &self,
        stream: MediaStream,
        mime_type: Option<&str>,
    ) -> Result<Box<dyn AudioEncoder>, anyhow::Error>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingFormat {
    /// Negotiated type, `None` when the backend default is used.
    pub requested: Option<String>,
    pub mime_type: String,
    pub extension: &'static str,
}

impl RecordingFormat {
    const FALLBACK_MIME_TYPE: &str = "audio/webm";

    /// First preferred type the backend supports, or the backend default.
    pub fn negotiate(backend: &dyn RecorderBackend, preferences: &[String]) -> Self {
        let requested = preferences
            .iter()
            .find(|mime_type| backend.is_type_supported(mime_type))
            .cloned();
        let mime_type = requested
            .clone()
            .unwrap_or_else(|| Self::FALLBACK_MIME_TYPE.to_string());
        let extension = if mime_type.starts_with("audio/ogg") {
            "ogg"
        } else {
            "webm"
        };
        Self {
            requested,
            mime_type,
            extension,
        }
    }
}
