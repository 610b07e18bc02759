use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use super::{MediaTrack, TrackKind};

/// A set of tracks rendered together. Clones share the same track list.
#[derive(Clone)]
pub struct MediaStream {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    id: String,
    tracks: RwLock<Vec<MediaTrack>>,
}

impl MediaStream {
    pub fn new() -> Self {
        Self::with_tracks(Vec::new())
    }

    pub fn with_tracks(tracks: Vec<MediaTrack>) -> Self {
        let stream = Self {
            inner: Arc::new(StreamInner {
                id: Uuid::now_v7().to_string(),
                tracks: RwLock::new(Vec::with_capacity(tracks.len())),
            }),
        };
        for track in tracks {
            stream.add_track(track);
        }
        stream
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn tracks(&self) -> Vec<MediaTrack> {
        self.inner.tracks.read().clone()
    }

    pub fn tracks_of(&self, kind: TrackKind) -> Vec<MediaTrack> {
        self.inner
            .tracks
            .read()
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn audio_tracks(&self) -> Vec<MediaTrack> {
        self.tracks_of(TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> Vec<MediaTrack> {
        self.tracks_of(TrackKind::Video)
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.inner.tracks.read().iter().any(|t| t.id() == track_id)
    }

    /// Adds a track unless one with the same id is already present.
    pub fn add_track(&self, track: MediaTrack) -> bool {
        let mut tracks = self.inner.tracks.write();
        if tracks.iter().any(|t| t.id() == track.id()) {
            return false;
        }
        tracks.push(track);
        true
    }

    pub fn remove_track(&self, track_id: &str) -> Option<MediaTrack> {
        let mut tracks = self.inner.tracks.write();
        let index = tracks.iter().position(|t| t.id() == track_id)?;
        Some(tracks.remove(index))
    }

    pub fn len(&self) -> usize {
        self.inner.tracks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tracks.read().is_empty()
    }

    pub fn ptr_eq(&self, other: &MediaStream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for MediaStream {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.inner.id)
            .field("tracks", &*self.inner.tracks.read())
            .finish()
    }
}
