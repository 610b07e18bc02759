use async_trait::async_trait;

use crate::error::CallError;

use super::SavedRecording;

#[async_trait]
pub trait RecordingListener: Send + Sync {
    async fn on_recording_started(&self, mime_type: &str);
    /// Fired exactly once per recording session, with `None` when nothing
    /// was captured or saving failed.
    async fn on_recording_finished(&self, recording: Option<SavedRecording>);
    async fn on_recording_error(&self, error: CallError);
}

pub struct StubListener;

#[async_trait]
impl RecordingListener for StubListener {
    async fn on_recording_started(&self, _mime_type: &str) {}
    async fn on_recording_finished(&self, _recording: Option<SavedRecording>) {}
    async fn on_recording_error(&self, _error: CallError) {}
}
