use std::collections::HashSet;
use std::sync::Arc;

use confmesh_signaling::IceCandidate;

use crate::media::{MediaStream, MediaTrack, TrackKind};

use super::{IceConnectionState, PeerConnection, SignalingState};

/// A remote meeting member with a live peer connection.
pub struct Participant {
    pub id: String,
    pub display_name: String,
    pub connection: Arc<dyn PeerConnection>,
    pub remote_stream: Option<MediaStream>,
    pub ice_state: IceConnectionState,
    pub(crate) generation: u64,
    attached: HashSet<String>,
    pending_candidates: Vec<IceCandidate>,
}

impl Participant {
    pub(crate) fn new(
        id: String,
        display_name: String,
        connection: Arc<dyn PeerConnection>,
        generation: u64,
    ) -> Self {
        Self {
            id,
            display_name,
            connection,
            remote_stream: None,
            ice_state: IceConnectionState::New,
            generation,
            attached: HashSet::new(),
            pending_candidates: Vec::new(),
        }
    }

    /// Attaches `track` unless it already is. Returns whether it was added.
    pub(crate) fn attach(
        &mut self,
        track: MediaTrack,
        stream: &MediaStream,
    ) -> Result<bool, anyhow::Error> {
        if self.attached.contains(track.id()) {
            return Ok(false);
        }
        let track_id = track.id().to_string();
        self.connection.add_track(track, stream)?;
        self.attached.insert(track_id);
        Ok(true)
    }

    pub fn attached_tracks(&self) -> usize {
        self.attached.len()
    }

    pub(crate) fn queue_candidate(&mut self, candidate: IceCandidate) {
        self.pending_candidates.push(candidate);
    }

    pub(crate) fn take_pending_candidates(&mut self) -> Vec<IceCandidate> {
        std::mem::take(&mut self.pending_candidates)
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Adds a remote track to the lazily created remote stream.
    pub(crate) fn add_remote_track(&mut self, track: MediaTrack) -> bool {
        self.remote_stream
            .get_or_insert_with(MediaStream::new)
            .add_track(track)
    }

    pub fn view(&self) -> ParticipantView {
        ParticipantView {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            remote_stream: self.remote_stream.clone(),
            audio_muted: self.muted(TrackKind::Audio),
            video_muted: self.muted(TrackKind::Video),
            ice_state: self.ice_state,
            signaling_state: self.connection.signaling_state(),
        }
    }

    /// Best effort: a disabled remote track is reported as muted.
    fn muted(&self, kind: TrackKind) -> Option<bool> {
        let tracks = self.remote_stream.as_ref()?.tracks_of(kind);
        if tracks.is_empty() {
            return None;
        }
        Some(tracks.iter().all(|t| !t.is_enabled()))
    }
}

/// Snapshot of a participant for the rendering layer.
#[derive(Debug, Clone)]
pub struct ParticipantView {
    pub id: String,
    pub display_name: String,
    pub remote_stream: Option<MediaStream>,
    pub audio_muted: Option<bool>,
    pub video_muted: Option<bool>,
    pub ice_state: IceConnectionState,
    pub signaling_state: SignalingState,
}

impl ParticipantView {
    pub fn remote_track_count(&self) -> usize {
        self.remote_stream.as_ref().map_or(0, MediaStream::len)
    }
}
