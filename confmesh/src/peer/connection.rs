use std::sync::Arc;

use async_trait::async_trait;
use confmesh_signaling::{IceCandidate, SessionDescription};
use thiserror::Error;

use crate::config::RtcConfiguration;
use crate::media::{MediaStream, MediaTrack};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

impl SignalingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::HaveLocalOffer => "have-local-offer",
            Self::HaveRemoteOffer => "have-remote-offer",
            Self::HaveLocalPranswer => "have-local-pranswer",
            Self::HaveRemotePranswer => "have-remote-pranswer",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}

impl IceConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Disconnected => "disconnected",
            Self::Closed => "closed",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Completed)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Disconnected)
    }
}

#[derive(Debug, Error)]
pub enum IceCandidateError {
    /// The connection cannot take candidates right now (closed, or no
    /// remote description). Harmless during renegotiation or teardown.
    #[error("InvalidStateError: {0}")]
    InvalidState(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Callbacks raised by a peer connection. Implementations must not block.
pub trait PeerObserver: Send + Sync {
    fn on_ice_candidate(&self, candidate: IceCandidate);
    fn on_track(&self, track: MediaTrack);
    fn on_ice_connection_state_change(&self, state: IceConnectionState);
}

/// One WebRTC-style peer connection.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn signaling_state(&self) -> SignalingState;
    fn ice_connection_state(&self) -> IceConnectionState;

    /// Replaces the observer. `None` detaches it; no callback fires after
    /// this returns.
    fn set_observer(&self, observer: Option<Arc<dyn PeerObserver>>);

    fn add_track(&self, track: MediaTrack, stream: &MediaStream) -> Result<(), anyhow::Error>;

    /// Local tracks currently being sent.
    fn senders(&self) -> Vec<MediaTrack>;

    fn has_remote_description(&self) -> bool;

    async fn create_offer(&self) -> Result<SessionDescription, anyhow::Error>;
    async fn create_answer(&self) -> Result<SessionDescription, anyhow::Error>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), anyhow::Error>;
    async fn set_remote_description(&self, desc: SessionDescription)
    -> Result<(), anyhow::Error>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), IceCandidateError>;

    fn close(&self);
}

pub trait PeerConnectionFactory: Send + Sync {
    fn create(&self, config: &RtcConfiguration) -> Result<Arc<dyn PeerConnection>, anyhow::Error>;
}
