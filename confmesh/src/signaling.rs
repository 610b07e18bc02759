use std::sync::Arc;

use anyhow::anyhow;
use confmesh_signaling::{
    ChannelEvent, IceCandidate, Member, PresenceChannel, SessionDescription, Whisper,
    WhisperPayload, channel_name,
};
use tokio::sync::mpsc;

use crate::error::CallError;

/// A presence channel bound to one meeting and one local participant.
pub struct SignalingChannel {
    presence: Arc<dyn PresenceChannel>,
    channel: String,
    local: Member,
}

impl SignalingChannel {
    pub fn new(presence: Arc<dyn PresenceChannel>, meeting_id: &str, local: Member) -> Self {
        Self {
            presence,
            channel: channel_name(meeting_id),
            local,
        }
    }

    pub fn channel_name(&self) -> &str {
        &self.channel
    }

    pub fn local_member(&self) -> &Member {
        &self.local
    }

    pub fn local_id(&self) -> &str {
        &self.local.id
    }

    pub async fn subscribe(&self) -> Result<mpsc::Receiver<ChannelEvent>, CallError> {
        tracing::info!(channel = %self.channel, member = %self.local.id, "Joining meeting channel");
        self.presence
            .join(&self.channel, self.local.clone())
            .await
            .map_err(|e| {
                tracing::error!(channel = %self.channel, "Failed to join channel: {}", e);
                CallError::ChannelJoin(e.to_string())
            })
    }

    pub async fn send_offer(
        &self,
        recipient_id: &str,
        offer: SessionDescription,
    ) -> Result<(), anyhow::Error> {
        self.whisper(recipient_id, WhisperPayload::Offer(offer)).await
    }

    pub async fn send_answer(
        &self,
        recipient_id: &str,
        answer: SessionDescription,
    ) -> Result<(), anyhow::Error> {
        self.whisper(recipient_id, WhisperPayload::Answer(answer))
            .await
    }

    pub async fn send_candidate(
        &self,
        recipient_id: &str,
        candidate: IceCandidate,
    ) -> Result<(), anyhow::Error> {
        self.whisper(recipient_id, WhisperPayload::Candidate(candidate))
            .await
    }

    async fn whisper(&self, recipient_id: &str, payload: WhisperPayload) -> Result<(), anyhow::Error> {
        let whisper = Whisper::new(self.local.id.clone(), recipient_id, payload);
        let kind = whisper.kind();
        tracing::trace!(?recipient_id, kind = kind.as_str(), "Sending whisper");
        self.presence
            .whisper(&self.channel, whisper)
            .await
            .map_err(|e| anyhow!("Failed to send {} to {}: {}", kind.as_str(), recipient_id, e))
    }

    pub async fn unsubscribe(&self) -> Result<(), anyhow::Error> {
        tracing::info!(channel = %self.channel, "Leaving meeting channel");
        self.presence
            .leave(&self.channel)
            .await
            .map_err(|e| anyhow!("Failed to leave {}: {}", self.channel, e))
    }

    /// Whether an incoming whisper is meant for this participant. Drops our
    /// own echoes and whispers addressed to someone else.
    pub fn accepts(&self, whisper: &Whisper) -> bool {
        if whisper.sender_id == self.local.id {
            tracing::trace!("Ignoring own whisper");
            return false;
        }
        if !whisper.is_addressed_to(&self.local.id) {
            tracing::trace!(
                sender_id = %whisper.sender_id,
                recipient_id = %whisper.recipient_id,
                "Ignoring whisper for another participant"
            );
            return false;
        }
        true
    }
}
