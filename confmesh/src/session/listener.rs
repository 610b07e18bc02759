use async_trait::async_trait;

use crate::error::CallError;
use crate::recorder::SavedRecording;

use super::SessionStatus;

#[async_trait]
pub trait SessionListener: Send + Sync {
    async fn on_status_changed(&self, status: SessionStatus);
    async fn on_error(&self, error: CallError);
    async fn on_recording_started(&self, mime_type: &str);
    /// Called once per call when the recording is finalized. `None` when
    /// nothing was recorded.
    async fn on_recording_finished(&self, recording: Option<SavedRecording>);
}

pub struct StubListener;

#[async_trait]
impl SessionListener for StubListener {
    async fn on_status_changed(&self, _status: SessionStatus) {}
    async fn on_error(&self, _error: CallError) {}
    async fn on_recording_started(&self, _mime_type: &str) {}
    async fn on_recording_finished(&self, _recording: Option<SavedRecording>) {}
}
