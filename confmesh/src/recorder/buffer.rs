/// Encoded audio accumulated during one session.
#[derive(Debug, Default)]
pub struct RecordingBuffer {
    chunks: Vec<Vec<u8>>,
    mime_type: String,
}

impl RecordingBuffer {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            chunks: Vec::new(),
            mime_type: mime_type.into(),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Appends a chunk. Empty chunks are dropped.
    pub fn push(&mut self, chunk: Vec<u8>) {
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn byte_len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Joins all chunks into one artifact and clears the buffer. `None`
    /// when nothing was captured.
    pub fn finalize(&mut self, file_name: String) -> Option<RecordingArtifact> {
        if self.chunks.is_empty() {
            return None;
        }
        let mut data = Vec::with_capacity(self.byte_len());
        for chunk in self.chunks.drain(..) {
            data.extend_from_slice(&chunk);
        }
        Some(RecordingArtifact {
            file_name,
            mime_type: self.mime_type.clone(),
            data,
        })
    }
}

/// A finished recording ready to be handed to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingArtifact {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// `meeting-audio-{meeting_id}-{timestamp_millis}.{extension}`
pub fn artifact_file_name(meeting_id: &str, timestamp_millis: i64, extension: &str) -> String {
    let meeting_id = if meeting_id.is_empty() {
        "rec"
    } else {
        meeting_id
    };
    format!("meeting-audio-{meeting_id}-{timestamp_millis}.{extension}")
}
