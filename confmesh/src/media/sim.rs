use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::MediaConstraints;
use crate::error::MediaAccessError;

use super::{MediaDevices, MediaStream, MediaTrack, TrackKind};

/// Device backend without hardware. Produces fresh tracks on every grant
/// and can be told to deny access.
pub struct SimulatedDevices {
    has_microphone: bool,
    has_camera: bool,
    prompt_delay: Duration,
    denial: Mutex<Option<MediaAccessError>>,
    requests: AtomicUsize,
}

impl SimulatedDevices {
    pub fn new() -> Self {
        Self {
            has_microphone: true,
            has_camera: true,
            prompt_delay: Duration::ZERO,
            denial: Mutex::new(None),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn without_camera(mut self) -> Self {
        self.has_camera = false;
        self
    }

    pub fn without_microphone(mut self) -> Self {
        self.has_microphone = false;
        self
    }

    /// Simulated time the user spends on the permission prompt.
    pub fn with_prompt_delay(mut self, delay: Duration) -> Self {
        self.prompt_delay = delay;
        self
    }

    /// Every following request fails with `err`.
    pub fn deny(&self, err: MediaAccessError) {
        *self.denial.lock() = Some(err);
    }

    pub fn allow(&self) {
        *self.denial.lock() = None;
    }

    /// Number of `get_user_media` calls seen so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaDevices for SimulatedDevices {
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<MediaStream, MediaAccessError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if !self.prompt_delay.is_zero() {
            tokio::time::sleep(self.prompt_delay).await;
        }
        let denial = self.denial.lock().clone();
        if let Some(err) = denial {
            return Err(err);
        }
        if !constraints.audio && !constraints.video {
            return Err(MediaAccessError::new(
                "TypeError",
                "At least one of audio and video must be requested",
            ));
        }
        if (constraints.audio && !self.has_microphone) || (constraints.video && !self.has_camera) {
            return Err(MediaAccessError::not_found("Requested device not found"));
        }
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(MediaTrack::new(TrackKind::Audio, "Simulated Microphone"));
        }
        if constraints.video {
            tracks.push(MediaTrack::new(TrackKind::Video, "Simulated Camera"));
        }
        Ok(MediaStream::with_tracks(tracks))
    }
}
