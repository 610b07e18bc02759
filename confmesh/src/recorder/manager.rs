use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex as TokioMutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::CallError;
use crate::media::MediaStream;

use super::{
    ArtifactSink, AudioEncoder, RecorderBackend, RecordingBuffer, RecordingFormat,
    RecordingListener, SavedRecording, StubListener, artifact_file_name,
};

/// The recording in progress - at most one at a time
struct ActiveRecording {
    mime_type: String,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

/// Records the local audio tracks for the duration of a call.
pub struct AudioRecorder {
    backend: Arc<dyn RecorderBackend>,
    sink: Arc<dyn ArtifactSink>,
    listener: Arc<dyn RecordingListener>,
    timeslice: Duration,
    preferences: Vec<String>,
    active: TokioMutex<Option<ActiveRecording>>,
    stop_scheduled: AtomicBool,
    /// Set by `start`, cleared once the next `stop` has signalled completion.
    completion_pending: AtomicBool,
}

impl AudioRecorder {
    pub fn new(
        backend: Arc<dyn RecorderBackend>,
        sink: Arc<dyn ArtifactSink>,
        timeslice: Duration,
        preferences: Vec<String>,
    ) -> Self {
        Self::with_listener(
            backend,
            sink,
            timeslice,
            preferences,
            Arc::new(StubListener),
        )
    }

    pub fn with_listener(
        backend: Arc<dyn RecorderBackend>,
        sink: Arc<dyn ArtifactSink>,
        timeslice: Duration,
        preferences: Vec<String>,
        listener: Arc<dyn RecordingListener>,
    ) -> Self {
        Self {
            backend,
            sink,
            listener,
            timeslice,
            preferences,
            active: TokioMutex::new(None),
            stop_scheduled: AtomicBool::new(false),
            completion_pending: AtomicBool::new(false),
        }
    }

    /// Starts recording the audio tracks of `stream`. Returns `Ok(false)`
    /// when there is nothing to record or a recording is already running.
    pub async fn start(&self, stream: &MediaStream, meeting_id: &str) -> Result<bool, CallError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            tracing::warn!("Recording already active, start ignored");
            return Ok(false);
        }
        self.completion_pending.store(true, Ordering::Release);
        let audio_tracks = stream.audio_tracks();
        if audio_tracks.is_empty() {
            tracing::warn!(stream_id = %stream.id(), "No audio track to record");
            return Ok(false);
        }
        let format = RecordingFormat::negotiate(self.backend.as_ref(), &self.preferences);
        tracing::info!(
            mime_type = %format.mime_type,
            backend_default = format.requested.is_none(),
            track = %audio_tracks[0].label(),
            "Starting audio recording"
        );
        // Record a dedicated audio-only stream so no video reaches the encoder.
        let audio_stream = MediaStream::with_tracks(audio_tracks);
        let encoder = self
            .backend
            .open(audio_stream, format.requested.as_deref())
            .map_err(|e| CallError::Recording(format!("Could not start audio recording: {e}")))?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = RecordingTask {
            encoder,
            buffer: RecordingBuffer::new(format.mime_type.clone()),
            meeting_id: meeting_id.to_string(),
            extension: format.extension,
            timeslice: self.timeslice,
            stop_rx,
            sink: self.sink.clone(),
            listener: self.listener.clone(),
        };
        *active = Some(ActiveRecording {
            mime_type: format.mime_type.clone(),
            stop_tx: Some(stop_tx),
            task: tokio::spawn(task.run()),
        });
        drop(active);

        self.listener.on_recording_started(&format.mime_type).await;
        Ok(true)
    }

    pub async fn is_recording(&self) -> bool {
        let active = self.active.lock().await;
        active.as_ref().is_some_and(|a| !a.task.is_finished())
    }

    pub async fn mime_type(&self) -> Option<String> {
        let active = self.active.lock().await;
        active.as_ref().map(|a| a.mime_type.clone())
    }

    /// Stops the recording and waits for finalization.
    ///
    /// Concurrent calls coalesce: only the first one finalizes, the others
    /// return `false` right away. The completion signal fires once per
    /// `start`, even when that start recorded nothing.
    pub async fn stop(&self) -> bool {
        if self.stop_scheduled.swap(true, Ordering::AcqRel) {
            tracing::debug!("Recorder stop already scheduled");
            return false;
        }
        let active = self.active.lock().await.take();
        let pending = self.completion_pending.swap(false, Ordering::AcqRel);
        let stopped = match active {
            Some(mut active) => {
                tracing::info!("Stopping audio recording");
                if let Some(stop_tx) = active.stop_tx.take() {
                    // The task may already be gone after an encoder failure.
                    let _ = stop_tx.send(());
                }
                if let Err(err) = (&mut active.task).await {
                    tracing::error!(?err, "Recording task failed");
                }
                true
            }
            None if pending => {
                tracing::info!("Recorder not active, nothing to finalize");
                self.listener.on_recording_finished(None).await;
                true
            }
            None => {
                tracing::debug!("Recording already finalized");
                false
            }
        };
        self.stop_scheduled.store(false, Ordering::Release);
        stopped
    }
}

impl Drop for AudioRecorder {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.task.abort();
        }
    }
}

struct RecordingTask {
    encoder: Box<dyn AudioEncoder>,
    buffer: RecordingBuffer,
    meeting_id: String,
    extension: &'static str,
    timeslice: Duration,
    stop_rx: oneshot::Receiver<()>,
    sink: Arc<dyn ArtifactSink>,
    listener: Arc<dyn RecordingListener>,
}

impl RecordingTask {
    async fn run(self) {
        let Self {
            mut encoder,
            mut buffer,
            meeting_id,
            extension,
            timeslice,
            mut stop_rx,
            sink,
            listener,
        } = self;

        let mut ticker = tokio::time::interval(timeslice);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        let failure = loop {
            tokio::select! {
                _ = &mut stop_rx => break None,
                _ = ticker.tick() => match encoder.request_data().await {
                    Ok(chunk) => {
                        tracing::trace!(size = chunk.len(), "Recorded audio chunk");
                        buffer.push(chunk);
                    }
                    Err(err) => break Some(err),
                },
            }
        };

        if let Some(err) = failure {
            tracing::error!(?err, "Audio encoder failed, finalizing captured audio");
            listener
                .on_recording_error(CallError::Recording(err.to_string()))
                .await;
        }
        match encoder.stop().await {
            Ok(tail) => buffer.push(tail),
            Err(err) => tracing::warn!(?err, "Encoder did not stop cleanly"),
        }

        let saved = Self::finalize(&mut buffer, &meeting_id, extension, sink.as_ref(), &listener).await;
        listener.on_recording_finished(saved).await;
    }

    async fn finalize(
        buffer: &mut RecordingBuffer,
        meeting_id: &str,
        extension: &str,
        sink: &dyn ArtifactSink,
        listener: &Arc<dyn RecordingListener>,
    ) -> Option<SavedRecording> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let Some(artifact) = buffer.finalize(artifact_file_name(meeting_id, timestamp, extension))
        else {
            tracing::info!("No audio chunks recorded, skipping download");
            return None;
        };
        tracing::debug!(
            file_name = %artifact.file_name,
            size = artifact.data.len(),
            "Preparing recording download"
        );
        match sink.save(artifact).await {
            Ok(saved) => Some(saved),
            Err(err) => {
                tracing::error!(?err, "Failed to save recording");
                listener
                    .on_recording_error(CallError::Recording(err.to_string()))
                    .await;
                None
            }
        }
    }
}
