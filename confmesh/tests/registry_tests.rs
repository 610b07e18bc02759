use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use confmesh::config::CallConfig;
use confmesh::media::{MediaStream, MediaTrack, TrackKind};
use confmesh::peer::{
    IceConnectionState, PeerConnection, PeerConnectionRegistry, PeerEvent, SignalingState,
    SimulatedPeerFactory,
};
use confmesh::signaling::SignalingChannel;
use confmesh_signaling::{
    ChannelEvent, Error, IceCandidate, Member, PresenceChannel, SessionDescription, Whisper,
    WhisperPayload,
};
use tokio::sync::{mpsc, watch};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("confmesh=trace")
        .try_init();
}

/// Presence channel that only records outgoing whispers.
#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<Whisper>>,
}

impl Outbox {
    fn take(&self) -> Vec<Whisper> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

#[async_trait]
impl PresenceChannel for Outbox {
    async fn join(
        &self,
        _channel: &str,
        _member: Member,
    ) -> Result<mpsc::Receiver<ChannelEvent>, Error> {
        Err("not supported".into())
    }

    async fn whisper(&self, _channel: &str, whisper: Whisper) -> Result<(), Error> {
        self.sent.lock().unwrap().push(whisper);
        Ok(())
    }

    async fn leave(&self, _channel: &str) -> Result<(), Error> {
        Ok(())
    }
}

struct Peer {
    member: Member,
    stream: MediaStream,
    outbox: Arc<Outbox>,
    factory: Arc<SimulatedPeerFactory>,
    registry: PeerConnectionRegistry,
    events: mpsc::UnboundedReceiver<PeerEvent>,
}

impl Peer {
    fn new(id: &str, name: &str) -> Self {
        let member = Member::new(id, name);
        let outbox = Arc::new(Outbox::default());
        let factory = Arc::new(SimulatedPeerFactory::new());
        let signaling = Arc::new(SignalingChannel::new(outbox.clone(), "1", member.clone()));
        let (registry, events) = PeerConnectionRegistry::new(
            factory.clone(),
            CallConfig::default().rtc_configuration(),
            signaling,
            Arc::new(watch::Sender::new(Vec::new())),
        );
        let stream = MediaStream::with_tracks(vec![
            MediaTrack::new(TrackKind::Audio, "Microphone"),
            MediaTrack::new(TrackKind::Video, "Camera"),
        ]);
        Self {
            member,
            stream,
            outbox,
            factory,
            registry,
            events,
        }
    }

    fn connect_to(&mut self, other: &Peer) -> Arc<dyn PeerConnection> {
        self.registry
            .create_connection(&other.member, Some(&self.stream))
            .unwrap()
            .unwrap()
    }

    /// Feeds every pending observer event back into the registry.
    async fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.registry.handle_peer_event(event).await;
        }
    }

    fn single_whisper(&self) -> Whisper {
        let mut sent = self.outbox.take();
        sent.retain(|w| !matches!(w.payload, WhisperPayload::Candidate(_)));
        assert_eq!(sent.len(), 1, "Expected one offer or answer: {sent:?}");
        sent.remove(0)
    }
}

fn offer_of(whisper: Whisper) -> SessionDescription {
    match whisper.payload {
        WhisperPayload::Offer(offer) => offer,
        other => panic!("Expected offer, got {other:?}"),
    }
}

fn answer_of(whisper: Whisper) -> SessionDescription {
    match whisper.payload {
        WhisperPayload::Answer(answer) => answer,
        other => panic!("Expected answer, got {other:?}"),
    }
}

#[tokio::test]
async fn test_tracks_attached_once() {
    init_tracing();
    let mut alice = Peer::new("a", "Alice");
    let bob = Peer::new("b", "Bob");

    let first = alice.connect_to(&bob);
    let second = alice.connect_to(&bob);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(alice.factory.created(), 1);
    assert_eq!(first.senders().len(), 2);
    assert_eq!(alice.registry.get("b").unwrap().attached_tracks(), 2);

    // A track added to the local stream later is attached on the next call.
    alice
        .stream
        .add_track(MediaTrack::new(TrackKind::Video, "Screen"));
    alice.connect_to(&bob);
    assert_eq!(first.senders().len(), 3);
}

#[tokio::test]
async fn test_no_connection_without_local_media() {
    let mut alice = Peer::new("a", "Alice");
    let bob = Member::new("b", "Bob");

    assert!(alice.registry.create_connection(&bob, None).unwrap().is_none());
    let empty = MediaStream::new();
    assert!(
        alice
            .registry
            .create_connection(&bob, Some(&empty))
            .unwrap()
            .is_none()
    );
    assert!(alice.registry.is_empty());
    assert_eq!(alice.factory.created(), 0);
}

#[tokio::test]
async fn test_offer_answer_symmetry() {
    init_tracing();
    let mut alice = Peer::new("a", "Alice");
    let mut bob = Peer::new("b", "Bob");
    let alice_pc = alice.connect_to(&bob);
    let bob_pc = bob.connect_to(&alice);

    alice.registry.send_offer("b").await.unwrap();
    assert_eq!(alice_pc.signaling_state(), SignalingState::HaveLocalOffer);
    let offer = alice.single_whisper();
    assert_eq!(offer.sender_id, "a");
    assert_eq!(offer.recipient_id, "b");

    let stream = bob.stream.clone();
    bob.registry
        .handle_offer("a", offer_of(offer), Some(&stream))
        .await
        .unwrap();
    let answer = bob.single_whisper();
    assert_eq!(answer.recipient_id, "a");

    alice.registry.handle_answer("b", answer_of(answer)).await.unwrap();
    alice.pump().await;
    bob.pump().await;

    assert_eq!(alice_pc.signaling_state(), SignalingState::Stable);
    assert_eq!(bob_pc.signaling_state(), SignalingState::Stable);
    for peer in [&alice, &bob] {
        let views = peer.registry.participants();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].ice_state, IceConnectionState::Connected);
        assert_eq!(views[0].remote_track_count(), 2);
    }
    let alice_view = &bob.registry.participants()[0];
    assert_eq!(alice_view.display_name, "Alice");
    assert_eq!(alice_view.audio_muted, Some(false));
}

#[tokio::test]
async fn test_offer_skipped_outside_stable() {
    let mut alice = Peer::new("a", "Alice");
    let bob = Peer::new("b", "Bob");
    alice.connect_to(&bob);

    alice.registry.send_offer("b").await.unwrap();
    alice.single_whisper();
    alice.registry.send_offer("b").await.unwrap();
    assert!(alice.outbox.take().is_empty());
}

#[tokio::test]
async fn test_stale_answer_ignored() {
    let mut alice = Peer::new("a", "Alice");
    let bob = Peer::new("b", "Bob");
    let pc = alice.connect_to(&bob);

    let answer = SessionDescription::answer("v=0\r\na=track:audio x Mic\r\n");
    alice.registry.handle_answer("b", answer).await.unwrap();
    assert_eq!(pc.signaling_state(), SignalingState::Stable);
    assert!(!pc.has_remote_description());

    // Answers from unknown participants are ignored as well.
    let answer = SessionDescription::answer("v=0\r\n");
    alice.registry.handle_answer("zz", answer).await.unwrap();
    assert_eq!(alice.registry.len(), 1);
}

#[tokio::test]
async fn test_offer_from_unknown_sender_creates_participant() {
    let mut alice = Peer::new("a", "Alice");
    let mut bob = Peer::new("bob-1234", "");
    bob.connect_to(&alice);
    bob.registry.send_offer("a").await.unwrap();
    let offer = bob.single_whisper();

    let stream = alice.stream.clone();
    alice
        .registry
        .handle_offer("bob-1234", offer_of(offer), Some(&stream))
        .await
        .unwrap();
    let view = &alice.registry.participants()[0];
    assert_eq!(view.display_name, "User bob-");
    assert_eq!(view.signaling_state, SignalingState::Stable);
}

#[tokio::test]
async fn test_later_offer_replaces_earlier_one() {
    let mut alice = Peer::new("a", "Alice");
    let stream = alice.stream.clone();
    let first = SessionDescription::offer("v=0\r\na=track:audio bob-audio Mic\r\n");
    let second = SessionDescription::offer(
        "v=0\r\na=track:audio bob-audio Mic\r\na=track:video bob-screen Screen\r\n",
    );

    alice
        .registry
        .handle_offer("b", first, Some(&stream))
        .await
        .unwrap();
    alice
        .registry
        .handle_offer("b", second.clone(), Some(&stream))
        .await
        .unwrap();
    alice.pump().await;

    let answers: Vec<Whisper> = alice
        .outbox
        .take()
        .into_iter()
        .filter(|w| matches!(w.payload, WhisperPayload::Answer(_)))
        .collect();
    assert_eq!(answers.len(), 2);
    assert!(answers.iter().all(|w| w.recipient_id == "b"));

    assert_eq!(alice.factory.created(), 1);
    let pc = alice.factory.connections().remove(0);
    assert_eq!(pc.remote_description(), Some(second));
    assert_eq!(pc.signaling_state(), SignalingState::Stable);
    assert_eq!(alice.registry.participants()[0].remote_track_count(), 2);
}

#[tokio::test]
async fn test_early_candidates_applied_after_offer() {
    let mut alice = Peer::new("a", "Alice");
    let mut bob = Peer::new("b", "Bob");
    alice.connect_to(&bob);
    bob.connect_to(&alice);

    alice.registry.send_offer("b").await.unwrap();
    alice.pump().await;
    let mut sent = alice.outbox.take();
    let candidates: Vec<IceCandidate> = sent
        .iter()
        .filter_map(|w| match &w.payload {
            WhisperPayload::Candidate(c) => Some(c.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(candidates.len(), 2);
    sent.retain(|w| matches!(w.payload, WhisperPayload::Offer(_)));

    // Candidates overtake the offer.
    for candidate in candidates {
        bob.registry.handle_ice_candidate("a", candidate).await;
    }
    assert_eq!(bob.registry.get("a").unwrap().pending_candidates(), 2);

    let stream = bob.stream.clone();
    bob.registry
        .handle_offer("a", offer_of(sent.remove(0)), Some(&stream))
        .await
        .unwrap();
    assert_eq!(bob.registry.get("a").unwrap().pending_candidates(), 0);
    let bob_pc = bob.factory.connections().remove(0);
    assert_eq!(bob_pc.remote_candidates().len(), 2);

    // Unknown senders are dropped.
    bob.registry
        .handle_ice_candidate("zz", IceCandidate::new("candidate:9 1 udp 1 10.0.0.1 9 typ host"))
        .await;
    assert!(!bob.registry.contains("zz"));
}

#[tokio::test]
async fn test_leave_then_reconnect_gets_fresh_connection() {
    init_tracing();
    let mut alice = Peer::new("a", "Alice");
    let mut bob = Peer::new("b", "Bob");
    alice.connect_to(&bob);
    bob.connect_to(&alice);
    alice.registry.send_offer("b").await.unwrap();
    let offer = alice.single_whisper();
    let stream = bob.stream.clone();
    bob.registry
        .handle_offer("a", offer_of(offer), Some(&stream))
        .await
        .unwrap();
    let stale_events: Vec<PeerEvent> = std::iter::from_fn(|| bob.events.try_recv().ok()).collect();
    assert!(!stale_events.is_empty());

    assert!(bob.registry.close_connection("a"));
    assert!(!bob.registry.close_connection("a"));
    let old = bob.factory.connections().remove(0);
    assert_eq!(old.signaling_state(), SignalingState::Closed);
    assert!(!old.has_observer());
    assert_eq!(old.close_calls(), 1);

    let fresh = bob.connect_to(&alice);
    assert_eq!(bob.factory.created(), 2);
    assert_eq!(fresh.signaling_state(), SignalingState::Stable);

    // Events of the closed connection must not leak into the new one.
    for event in stale_events {
        bob.registry.handle_peer_event(event).await;
    }
    let view = &bob.registry.participants()[0];
    assert_eq!(view.remote_track_count(), 0);
    assert_eq!(view.ice_state, IceConnectionState::New);
}

#[tokio::test]
async fn test_close_all() {
    let mut alice = Peer::new("a", "Alice");
    let bob = Peer::new("b", "Bob");
    let carol = Peer::new("c", "Carol");
    alice.connect_to(&bob);
    alice.connect_to(&carol);
    let mut snapshots = alice.registry.subscribe();
    assert_eq!(snapshots.borrow_and_update().len(), 2);

    assert_eq!(alice.registry.close_all(), 2);
    assert!(alice.registry.is_empty());
    assert!(snapshots.borrow_and_update().is_empty());
    for pc in alice.factory.connections() {
        assert_eq!(pc.close_calls(), 1);
    }
    assert_eq!(alice.registry.close_all(), 0);
}
