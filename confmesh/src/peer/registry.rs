use std::collections::HashMap;
use std::sync::Arc;

use confmesh_signaling::{IceCandidate, Member, SessionDescription};
use tokio::sync::{mpsc, watch};

use crate::config::RtcConfiguration;
use crate::error::CallError;
use crate::media::{MediaStream, MediaTrack};
use crate::signaling::SignalingChannel;

use super::{
    IceCandidateError, IceConnectionState, Participant, ParticipantView, PeerConnection,
    PeerConnectionFactory, PeerObserver, SignalingState,
};

/// Observer callback, tagged with the connection it came from.
#[derive(Debug, Clone)]
pub struct PeerEvent {
    pub participant_id: String,
    pub generation: u64,
    pub kind: PeerEventKind,
}

#[derive(Debug, Clone)]
pub enum PeerEventKind {
    IceCandidate(IceCandidate),
    Track(MediaTrack),
    IceState(IceConnectionState),
}

/// Forwards observer callbacks into the session event loop.
struct EventForwarder {
    participant_id: String,
    generation: u64,
    tx: mpsc::UnboundedSender<PeerEvent>,
}

impl EventForwarder {
    fn forward(&self, kind: PeerEventKind) {
        let event = PeerEvent {
            participant_id: self.participant_id.clone(),
            generation: self.generation,
            kind,
        };
        if self.tx.send(event).is_err() {
            tracing::trace!(participant_id = %self.participant_id, "Session loop gone, dropping peer event");
        }
    }
}

impl PeerObserver for EventForwarder {
    fn on_ice_candidate(&self, candidate: IceCandidate) {
        self.forward(PeerEventKind::IceCandidate(candidate));
    }

    fn on_track(&self, track: MediaTrack) {
        self.forward(PeerEventKind::Track(track));
    }

    fn on_ice_connection_state_change(&self, state: IceConnectionState) {
        self.forward(PeerEventKind::IceState(state));
    }
}

/// Owns one peer connection per remote participant and drives the
/// offer/answer exchange over the signaling channel.
pub struct PeerConnectionRegistry {
    factory: Arc<dyn PeerConnectionFactory>,
    rtc_config: RtcConfiguration,
    signaling: Arc<SignalingChannel>,
    events: mpsc::UnboundedSender<PeerEvent>,
    participants: HashMap<String, Participant>,
    next_generation: u64,
    snapshot: Arc<watch::Sender<Vec<ParticipantView>>>,
}

impl PeerConnectionRegistry {
    /// Returns the registry and the stream of observer events its
    /// connections produce.
    pub fn new(
        factory: Arc<dyn PeerConnectionFactory>,
        rtc_config: RtcConfiguration,
        signaling: Arc<SignalingChannel>,
        snapshot: Arc<watch::Sender<Vec<ParticipantView>>>,
    ) -> (Self, mpsc::UnboundedReceiver<PeerEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let registry = Self {
            factory,
            rtc_config,
            signaling,
            events,
            participants: HashMap::new(),
            next_generation: 1,
            snapshot,
        };
        (registry, events_rx)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.participants.contains_key(participant_id)
    }

    pub fn get(&self, participant_id: &str) -> Option<&Participant> {
        self.participants.get(participant_id)
    }

    pub fn participants(&self) -> Vec<ParticipantView> {
        let mut views: Vec<ParticipantView> =
            self.participants.values().map(Participant::view).collect();
        views.sort_by(|a, b| a.id.cmp(&b.id));
        views
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<ParticipantView>> {
        self.snapshot.subscribe()
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.participants());
    }

    /// Looks up a participant for an observer event, dropping events from
    /// a connection that has since been replaced.
    fn current_mut(&mut self, participant_id: &str, generation: u64) -> Option<&mut Participant> {
        match self.participants.get_mut(participant_id) {
            Some(participant) if participant.generation == generation => Some(participant),
            _ => {
                tracing::trace!(?participant_id, generation, "Dropping stale peer event");
                None
            }
        }
    }

    /// Creates (or reuses) the connection to `member` and attaches every
    /// local track it does not carry yet. Returns `None` when there is no
    /// local media to send.
    pub fn create_connection(
        &mut self,
        member: &Member,
        local_stream: Option<&MediaStream>,
    ) -> Result<Option<Arc<dyn PeerConnection>>, CallError> {
        let Some(stream) = local_stream.filter(|s| !s.is_empty()) else {
            tracing::warn!(participant_id = %member.id, "No local media, not creating peer connection");
            return Ok(None);
        };

        if !self.participants.contains_key(&member.id) {
            let connection = self
                .factory
                .create(&self.rtc_config)
                .map_err(|e| CallError::negotiation(&member.id, e))?;
            let generation = self.next_generation;
            self.next_generation += 1;
            connection.set_observer(Some(Arc::new(EventForwarder {
                participant_id: member.id.clone(),
                generation,
                tx: self.events.clone(),
            })));
            tracing::info!(participant_id = %member.id, generation, "Peer connection created");
            self.participants.insert(
                member.id.clone(),
                Participant::new(member.id.clone(), member.display_name(), connection, generation),
            );
        }

        let Some(participant) = self.participants.get_mut(&member.id) else {
            return Ok(None);
        };
        for track in stream.tracks() {
            let track_id = track.id().to_string();
            match participant.attach(track, stream) {
                Ok(true) => {
                    tracing::debug!(participant_id = %member.id, %track_id, "Attached local track")
                }
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(participant_id = %member.id, %track_id, ?err, "Failed to attach local track")
                }
            }
        }
        let connection = participant.connection.clone();
        self.publish();
        Ok(Some(connection))
    }

    /// Offers to `participant_id`. Only starts a negotiation from stable.
    pub async fn send_offer(&mut self, participant_id: &str) -> Result<(), CallError> {
        let Some(participant) = self.participants.get(participant_id) else {
            tracing::warn!(?participant_id, "Cannot offer to unknown participant");
            return Ok(());
        };
        let connection = participant.connection.clone();
        let state = connection.signaling_state();
        if state != SignalingState::Stable {
            tracing::warn!(
                ?participant_id,
                state = state.as_str(),
                "Skipping offer, negotiation already in progress"
            );
            return Ok(());
        }

        tracing::debug!(?participant_id, "Creating offer");
        let offer = connection
            .create_offer()
            .await
            .map_err(|e| CallError::negotiation(participant_id, e))?;
        connection
            .set_local_description(offer.clone())
            .await
            .map_err(|e| CallError::negotiation(participant_id, e))?;
        self.signaling
            .send_offer(participant_id, offer)
            .await
            .map_err(|e| CallError::negotiation(participant_id, e))?;
        tracing::debug!(?participant_id, "Offer sent");
        self.publish();
        Ok(())
    }

    /// Answers an offer, creating the connection for an unknown sender. A
    /// newer offer simply replaces an older one.
    pub async fn handle_offer(
        &mut self,
        sender_id: &str,
        offer: SessionDescription,
        local_stream: Option<&MediaStream>,
    ) -> Result<(), CallError> {
        tracing::debug!(?sender_id, "Received offer");
        if !self.participants.contains_key(sender_id) {
            // Unknown sender: no roster name, show the short id instead.
            let member = Member::new(sender_id, "");
            if self.create_connection(&member, local_stream)?.is_none() {
                return Ok(());
            }
        }
        let Some(participant) = self.participants.get_mut(sender_id) else {
            return Ok(());
        };
        let connection = participant.connection.clone();

        connection
            .set_remote_description(offer)
            .await
            .map_err(|e| CallError::negotiation(sender_id, e))?;
        let pending = participant.take_pending_candidates();
        Self::apply_candidates(sender_id, connection.as_ref(), pending).await;

        let answer = connection
            .create_answer()
            .await
            .map_err(|e| CallError::negotiation(sender_id, e))?;
        connection
            .set_local_description(answer.clone())
            .await
            .map_err(|e| CallError::negotiation(sender_id, e))?;
        self.signaling
            .send_answer(sender_id, answer)
            .await
            .map_err(|e| CallError::negotiation(sender_id, e))?;
        tracing::debug!(?sender_id, "Answer sent");
        self.publish();
        Ok(())
    }

    /// Applies an answer to our pending offer. Answers arriving in any
    /// other state are stale and ignored.
    pub async fn handle_answer(
        &mut self,
        sender_id: &str,
        answer: SessionDescription,
    ) -> Result<(), CallError> {
        let Some(participant) = self.participants.get_mut(sender_id) else {
            tracing::warn!(?sender_id, "Answer from unknown participant ignored");
            return Ok(());
        };
        let connection = participant.connection.clone();
        let state = connection.signaling_state();
        if state != SignalingState::HaveLocalOffer {
            tracing::warn!(
                ?sender_id,
                state = state.as_str(),
                "Ignoring answer, no offer pending"
            );
            return Ok(());
        }

        connection
            .set_remote_description(answer)
            .await
            .map_err(|e| CallError::negotiation(sender_id, e))?;
        let pending = participant.take_pending_candidates();
        Self::apply_candidates(sender_id, connection.as_ref(), pending).await;
        tracing::debug!(?sender_id, "Answer applied");
        self.publish();
        Ok(())
    }

    /// Applies a remote candidate, or queues it until the remote
    /// description is known.
    pub async fn handle_ice_candidate(&mut self, sender_id: &str, candidate: IceCandidate) {
        let Some(participant) = self.participants.get_mut(sender_id) else {
            tracing::debug!(?sender_id, "Candidate for unknown participant dropped");
            return;
        };
        let connection = participant.connection.clone();
        match connection.signaling_state() {
            SignalingState::Closed => {
                tracing::debug!(?sender_id, "Candidate for closed connection dropped");
            }
            _ if !connection.has_remote_description() => {
                tracing::trace!(?sender_id, "Queueing early candidate");
                participant.queue_candidate(candidate);
            }
            _ => Self::apply_candidates(sender_id, connection.as_ref(), vec![candidate]).await,
        }
    }

    async fn apply_candidates(
        participant_id: &str,
        connection: &dyn PeerConnection,
        candidates: Vec<IceCandidate>,
    ) {
        for candidate in candidates {
            match connection.add_ice_candidate(candidate).await {
                Ok(()) => tracing::trace!(?participant_id, "Candidate applied"),
                Err(IceCandidateError::InvalidState(message)) => {
                    tracing::debug!(?participant_id, %message, "Candidate ignored")
                }
                Err(IceCandidateError::Other(err)) => {
                    tracing::warn!(?participant_id, ?err, "Failed to add ICE candidate")
                }
            }
        }
    }

    /// Routes an observer event from one of our connections.
    pub async fn handle_peer_event(&mut self, event: PeerEvent) {
        let PeerEvent {
            participant_id,
            generation,
            kind,
        } = event;
        match kind {
            PeerEventKind::IceCandidate(candidate) => {
                self.send_local_candidate(&participant_id, generation, candidate)
                    .await
            }
            PeerEventKind::Track(track) => {
                self.on_remote_track(&participant_id, generation, track);
            }
            PeerEventKind::IceState(state) => {
                self.update_ice_state(&participant_id, generation, state);
            }
        }
    }

    async fn send_local_candidate(
        &mut self,
        participant_id: &str,
        generation: u64,
        candidate: IceCandidate,
    ) {
        if self.current_mut(participant_id, generation).is_none() {
            return;
        }
        if let Err(err) = self.signaling.send_candidate(participant_id, candidate).await {
            tracing::warn!(?participant_id, ?err, "Failed to send ICE candidate");
        }
    }

    pub fn on_remote_track(&mut self, participant_id: &str, generation: u64, track: MediaTrack) {
        let Some(participant) = self.current_mut(participant_id, generation) else {
            return;
        };
        let track_id = track.id().to_string();
        let kind = track.kind();
        if participant.add_remote_track(track) {
            tracing::debug!(?participant_id, %track_id, kind = kind.as_str(), "Remote track added");
            self.publish();
        }
    }

    pub fn update_ice_state(
        &mut self,
        participant_id: &str,
        generation: u64,
        state: IceConnectionState,
    ) {
        let Some(participant) = self.current_mut(participant_id, generation) else {
            return;
        };
        participant.ice_state = state;
        if state.is_failure() {
            tracing::warn!(?participant_id, state = state.as_str(), "ICE connection degraded");
        } else {
            tracing::debug!(?participant_id, state = state.as_str(), "ICE connection state changed");
        }
        self.publish();
    }

    /// Closes and forgets the connection to `participant_id`.
    pub fn close_connection(&mut self, participant_id: &str) -> bool {
        let Some(participant) = self.participants.remove(participant_id) else {
            return false;
        };
        Self::close_participant(&participant);
        self.publish();
        true
    }

    pub fn close_all(&mut self) -> usize {
        let count = self.participants.len();
        for (_, participant) in self.participants.drain() {
            Self::close_participant(&participant);
        }
        if count > 0 {
            tracing::info!(count, "Closed all peer connections");
        }
        self.publish();
        count
    }

    fn close_participant(participant: &Participant) {
        participant.connection.set_observer(None);
        participant.connection.close();
        tracing::info!(participant_id = %participant.id, "Peer connection closed");
    }
}
