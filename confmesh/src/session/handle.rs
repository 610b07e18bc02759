use confmesh_signaling::{Member, channel_name};

use crate::error::CallError;
use crate::recorder::SavedRecording;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Idle,
    AcquiringMedia,
    Joining,
    Active,
    Leaving,
    Terminated,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AcquiringMedia => "acquiring-media",
            Self::Joining => "joining",
            Self::Active => "active",
            Self::Leaving => "leaving",
            Self::Terminated => "terminated",
        }
    }

    /// Whether a new session may be started from this status.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Terminated)
    }

    /// Leaving only ends in Terminated, and Terminated only restarts.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        match self {
            Self::Leaving => next == Self::Terminated,
            Self::Terminated => next == Self::AcquiringMedia,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSession {
    pub meeting_id: String,
    pub local_participant: Member,
    pub status: SessionStatus,
    pub channel_name: String,
}

impl CallSession {
    pub fn new(meeting_id: &str, local_participant: Member) -> Self {
        Self {
            meeting_id: meeting_id.to_string(),
            local_participant,
            status: SessionStatus::Idle,
            channel_name: channel_name(meeting_id),
        }
    }
}

/// State behind the call view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub connecting: bool,
    pub error: Option<CallError>,
    pub audio_muted: bool,
    pub video_muted: bool,
    /// Set once the recording of the last call was finalized; drives the
    /// post-call summary.
    pub recording_complete: bool,
    pub recording: Option<SavedRecording>,
}

impl Default for SessionView {
    fn default() -> Self {
        Self {
            connecting: true,
            error: None,
            audio_muted: false,
            video_muted: false,
            recording_complete: false,
            recording: None,
        }
    }
}

impl SessionView {
    /// Back to defaults, keeping the outcome of the finished recording.
    pub fn reset(&mut self) {
        *self = Self {
            recording_complete: self.recording_complete,
            recording: self.recording.take(),
            ..Self::default()
        };
    }
}
