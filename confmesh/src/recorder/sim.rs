use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::media::MediaStream;

use super::{AudioEncoder, RecorderBackend};

/// In-memory recorder backend producing synthetic encoded bytes.
#[derive(Clone)]
pub struct SimulatedRecorderBackend {
    supported: Arc<Vec<String>>,
    bytes_per_chunk: usize,
    fail_after: Option<usize>,
    opened: Arc<AtomicUsize>,
    last_stream: Arc<Mutex<Option<MediaStream>>>,
}

impl SimulatedRecorderBackend {
    pub fn new() -> Self {
        Self {
            supported: Arc::new(vec![
                "audio/webm;codecs=opus".to_string(),
                "audio/webm".to_string(),
            ]),
            bytes_per_chunk: 160,
            fail_after: None,
            opened: Arc::new(AtomicUsize::new(0)),
            last_stream: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_supported<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported = Arc::new(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_bytes_per_chunk(mut self, bytes: usize) -> Self {
        self.bytes_per_chunk = bytes;
        self
    }

    /// Encoders fail on the request following the `chunks`-th one.
    pub fn failing_after(mut self, chunks: usize) -> Self {
        self.fail_after = Some(chunks);
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn last_stream(&self) -> Option<MediaStream> {
        self.last_stream.lock().clone()
    }
}

impl Default for SimulatedRecorderBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecorderBackend for SimulatedRecorderBackend {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|t| t == mime_type)
    }

    fn open(
        &self,
        stream: MediaStream,
        mime_type: Option<&str>,
    ) -> Result<Box<dyn AudioEncoder>, anyhow::Error> {
        if let Some(mime_type) = mime_type.filter(|t| !self.is_type_supported(t)) {
            return Err(anyhow!("Unsupported mime type {mime_type}"));
        }
        if stream.audio_tracks().is_empty() {
            return Err(anyhow!("Stream has no audio track"));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        *self.last_stream.lock() = Some(stream.clone());
        Ok(Box::new(SimulatedEncoder {
            stream,
            bytes_per_chunk: self.bytes_per_chunk,
            fail_after: self.fail_after,
            requests: 0,
            stopped: false,
        }))
    }
}

struct SimulatedEncoder {
    stream: MediaStream,
    bytes_per_chunk: usize,
    fail_after: Option<usize>,
    requests: usize,
    stopped: bool,
}

impl SimulatedEncoder {
    fn capture(&self) -> Vec<u8> {
        let live = self.stream.audio_tracks().iter().any(|t| !t.is_ended());
        if !live {
            return Vec::new();
        }
        let marker = (self.requests % 251) as u8;
        vec![marker; self.bytes_per_chunk]
    }
}

#[async_trait]
impl AudioEncoder for SimulatedEncoder {
    async fn request_data(&mut self) -> Result<Vec<u8>, anyhow::Error> {
        if self.stopped {
            return Err(anyhow!("Encoder is stopped"));
        }
        if self.fail_after.is_some_and(|n| self.requests >= n) {
            return Err(anyhow!("Encoder failure"));
        }
        self.requests += 1;
        Ok(self.capture())
    }

    async fn stop(&mut self) -> Result<Vec<u8>, anyhow::Error> {
        if self.stopped {
            return Ok(Vec::new());
        }
        self.stopped = true;
        Ok(Vec::new())
    }
}
