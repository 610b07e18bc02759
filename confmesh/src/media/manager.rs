use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::MediaConstraints;
use crate::error::MediaAccessError;

use super::{MediaDevices, MediaStream, TrackKind};

/// Owns the local capture stream.
///
/// The stream's tracks are handed out for attaching and recording, but only
/// this manager ever ends them.
pub struct MediaCaptureManager {
    devices: Arc<dyn MediaDevices>,
    stream: Mutex<Option<MediaStream>>,
}

impl MediaCaptureManager {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            stream: Mutex::new(None),
        }
    }

    /// Request camera and microphone. Failures are returned as-is and never
    /// retried here.
    pub async fn acquire(
        &self,
        constraints: MediaConstraints,
    ) -> Result<MediaStream, MediaAccessError> {
        let existing = self.stream.lock().clone();
        if let Some(stream) = existing {
            tracing::debug!(stream_id = %stream.id(), "Local stream already acquired");
            return Ok(stream);
        }
        tracing::info!(
            audio = constraints.audio,
            video = constraints.video,
            "Requesting media devices"
        );
        let stream = match self.devices.get_user_media(constraints).await {
            Ok(v) => v,
            Err(err) => {
                tracing::error!(name = %err.name, message = %err.message, "Media access failed");
                return Err(err);
            }
        };
        let mut current = self.stream.lock();
        if let Some(existing) = current.as_ref() {
            // Lost a race with a concurrent acquire; keep the first stream.
            for track in stream.tracks() {
                track.stop();
            }
            return Ok(existing.clone());
        }
        tracing::info!(
            stream_id = %stream.id(),
            audio_tracks = stream.audio_tracks().len(),
            video_tracks = stream.video_tracks().len(),
            "Local media acquired"
        );
        *current = Some(stream.clone());
        Ok(stream)
    }

    pub fn stream(&self) -> Option<MediaStream> {
        self.stream.lock().clone()
    }

    pub fn set_audio_enabled(&self, enabled: bool) -> Option<bool> {
        self.set_enabled(TrackKind::Audio, enabled)
    }

    pub fn set_video_enabled(&self, enabled: bool) -> Option<bool> {
        self.set_enabled(TrackKind::Video, enabled)
    }

    pub fn audio_enabled(&self) -> Option<bool> {
        self.is_enabled(TrackKind::Audio)
    }

    pub fn video_enabled(&self) -> Option<bool> {
        self.is_enabled(TrackKind::Video)
    }

    /// Flips the enabled flag on every track of `kind`. Returns the
    /// resulting state, or `None` when there is no such track.
    fn set_enabled(&self, kind: TrackKind, enabled: bool) -> Option<bool> {
        let Some(stream) = self.stream() else {
            tracing::warn!(kind = kind.as_str(), "Local stream not available");
            return None;
        };
        let tracks = stream.tracks_of(kind);
        if tracks.is_empty() {
            tracing::warn!(kind = kind.as_str(), "No local track to toggle");
            return None;
        }
        for track in &tracks {
            track.set_enabled(enabled);
        }
        tracing::info!(kind = kind.as_str(), enabled, "Local track toggled");
        Some(enabled)
    }

    fn is_enabled(&self, kind: TrackKind) -> Option<bool> {
        let tracks = self.stream()?.tracks_of(kind);
        if tracks.is_empty() {
            return None;
        }
        Some(tracks.iter().any(|t| t.is_enabled()))
    }

    /// Stops every local track and drops the stream. Returns `false` when
    /// there was nothing to release.
    pub fn release(&self) -> bool {
        let Some(stream) = self.stream.lock().take() else {
            return false;
        };
        for track in stream.tracks() {
            if track.stop() {
                tracing::debug!(track_id = %track.id(), kind = track.kind().as_str(), "Stopped local track");
            }
        }
        tracing::info!(stream_id = %stream.id(), "Local media released");
        true
    }
}
