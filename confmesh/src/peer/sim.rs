use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use confmesh_signaling::{IceCandidate, SdpKind, SessionDescription};
use parking_lot::Mutex;
use rand::Rng;

use crate::config::RtcConfiguration;
use crate::media::{MediaStream, MediaTrack, TrackKind};

use super::{
    IceCandidateError, IceConnectionState, PeerConnection, PeerConnectionFactory, PeerObserver,
    SignalingState,
};

/// Loopback peer connection implementing the offer/answer state machine.
///
/// The session description lists the sender tracks, so two simulated
/// connections exchanging descriptions through any signaling path learn
/// about each other's tracks. Candidates are gathered when the first local
/// description is applied and ICE connects once negotiation reaches stable.
pub struct SimulatedPeerConnection {
    session_id: u64,
    config: RtcConfiguration,
    state: Mutex<SimState>,
    observer: Mutex<Option<Arc<dyn PeerObserver>>>,
    close_calls: AtomicUsize,
}

struct SimState {
    signaling: SignalingState,
    ice: IceConnectionState,
    senders: Vec<MediaTrack>,
    stream_id: Option<String>,
    version: u32,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    remote_track_ids: HashSet<String>,
    candidates: Vec<IceCandidate>,
    gathered: bool,
}

impl SimulatedPeerConnection {
    pub fn new(config: RtcConfiguration) -> Self {
        Self {
            session_id: rand::random::<u32>() as u64,
            config,
            state: Mutex::new(SimState {
                signaling: SignalingState::Stable,
                ice: IceConnectionState::New,
                senders: Vec::new(),
                stream_id: None,
                version: 1,
                local: None,
                remote: None,
                remote_track_ids: HashSet::new(),
                candidates: Vec::new(),
                gathered: false,
            }),
            observer: Mutex::new(None),
            close_calls: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &RtcConfiguration {
        &self.config
    }

    /// Remote candidates applied so far.
    pub fn remote_candidates(&self) -> Vec<IceCandidate> {
        self.state.lock().candidates.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.state.lock().remote.clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn has_observer(&self) -> bool {
        self.observer.lock().is_some()
    }

    fn observer(&self) -> Option<Arc<dyn PeerObserver>> {
        self.observer.lock().clone()
    }

    fn render_sdp(&self, state: &mut SimState) -> String {
        state.version += 1;
        let mut sdp = format!(
            "v=0\r\no=- {} {} IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\na=group:BUNDLE 0\r\n",
            self.session_id, state.version
        );
        if let Some(stream_id) = &state.stream_id {
            sdp.push_str(&format!("a=msid-semantic: WMS {stream_id}\r\n"));
        }
        for track in &state.senders {
            sdp.push_str(&format!(
                "a=track:{} {} {}\r\n",
                track.kind().as_str(),
                track.id(),
                track.label()
            ));
        }
        sdp
    }

    fn gather_candidates(&self) -> Vec<IceCandidate> {
        let mut rng = rand::thread_rng();
        let ufrag: String = (0..4)
            .map(|_| rng.sample(rand::distributions::Alphanumeric) as char)
            .collect();
        let mut lines = vec![format!(
            "candidate:1 1 udp 2122260223 127.0.0.1 {} typ host",
            rng.gen_range(49152..65535)
        )];
        if !self.config.ice_servers.is_empty() {
            lines.push(format!(
                "candidate:2 1 udp 1686052607 203.0.113.7 {} typ srflx raddr 127.0.0.1 rport 9",
                rng.gen_range(49152..65535)
            ));
        }
        lines
            .into_iter()
            .map(|line| IceCandidate {
                candidate: line,
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
                username_fragment: Some(ufrag.clone()),
            })
            .collect()
    }

    /// Moves ICE to connected once both sides agreed on a session.
    fn connect_if_negotiated(state: &mut SimState) -> Vec<IceConnectionState> {
        if state.signaling != SignalingState::Stable
            || state.ice != IceConnectionState::New
            || state.local.is_none()
            || state.remote.is_none()
        {
            return Vec::new();
        }
        state.ice = IceConnectionState::Connected;
        vec![IceConnectionState::Checking, IceConnectionState::Connected]
    }

    fn notify_ice(&self, states: Vec<IceConnectionState>) {
        if states.is_empty() {
            return;
        }
        if let Some(observer) = self.observer() {
            for state in states {
                observer.on_ice_connection_state_change(state);
            }
        }
    }
}

fn parse_tracks(sdp: &str) -> Result<Vec<MediaTrack>, anyhow::Error> {
    if !sdp.starts_with("v=0") {
        return Err(anyhow!(
            "OperationError: Failed to parse SessionDescription"
        ));
    }
    let mut tracks = Vec::new();
    for line in sdp.lines() {
        let Some(rest) = line.strip_prefix("a=track:") else {
            continue;
        };
        let mut parts = rest.splitn(3, ' ');
        let kind = parts.next().and_then(TrackKind::parse);
        let id = parts.next();
        let label = parts.next().unwrap_or_default();
        match (kind, id) {
            (Some(kind), Some(id)) => tracks.push(MediaTrack::with_id(id, kind, label)),
            _ => return Err(anyhow!("OperationError: Invalid track line {line:?}")),
        }
    }
    Ok(tracks)
}

fn closed_error() -> anyhow::Error {
    anyhow!("InvalidStateError: The RTCPeerConnection's signalingState is 'closed'")
}

#[async_trait]
impl PeerConnection for SimulatedPeerConnection {
    fn signaling_state(&self) -> SignalingState {
        self.state.lock().signaling
    }

    fn ice_connection_state(&self) -> IceConnectionState {
        self.state.lock().ice
    }

    fn set_observer(&self, observer: Option<Arc<dyn PeerObserver>>) {
        *self.observer.lock() = observer;
    }

    fn add_track(&self, track: MediaTrack, stream: &MediaStream) -> Result<(), anyhow::Error> {
        let mut state = self.state.lock();
        if state.signaling == SignalingState::Closed {
            return Err(closed_error());
        }
        if state.senders.iter().any(|t| t.id() == track.id()) {
            return Err(anyhow!(
                "InvalidAccessError: A sender already exists for the track"
            ));
        }
        state.stream_id.get_or_insert_with(|| stream.id().to_string());
        state.senders.push(track);
        Ok(())
    }

    fn senders(&self) -> Vec<MediaTrack> {
        self.state.lock().senders.clone()
    }

    fn has_remote_description(&self) -> bool {
        self.state.lock().remote.is_some()
    }

    async fn create_offer(&self) -> Result<SessionDescription, anyhow::Error> {
        let mut state = self.state.lock();
        match state.signaling {
            SignalingState::Stable | SignalingState::HaveLocalOffer => {}
            SignalingState::Closed => return Err(closed_error()),
            other => {
                return Err(anyhow!(
                    "InvalidStateError: Cannot create offer in state {}",
                    other.as_str()
                ));
            }
        }
        Ok(SessionDescription::offer(self.render_sdp(&mut state)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, anyhow::Error> {
        let mut state = self.state.lock();
        match state.signaling {
            SignalingState::HaveRemoteOffer => {}
            SignalingState::Closed => return Err(closed_error()),
            other => {
                return Err(anyhow!(
                    "InvalidStateError: Cannot create answer in state {}",
                    other.as_str()
                ));
            }
        }
        Ok(SessionDescription::answer(self.render_sdp(&mut state)))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), anyhow::Error> {
        let (candidates, ice) = {
            let mut state = self.state.lock();
            let next = match (state.signaling, desc.kind) {
                (SignalingState::Closed, _) => return Err(closed_error()),
                (SignalingState::Stable | SignalingState::HaveLocalOffer, SdpKind::Offer) => {
                    SignalingState::HaveLocalOffer
                }
                (SignalingState::HaveRemoteOffer, SdpKind::Answer) => SignalingState::Stable,
                (SignalingState::HaveLocalOffer, SdpKind::Rollback) => {
                    state.signaling = SignalingState::Stable;
                    return Ok(());
                }
                (current, kind) => {
                    return Err(anyhow!(
                        "InvalidStateError: Failed to set local {:?} in state {}",
                        kind,
                        current.as_str()
                    ));
                }
            };
            state.signaling = next;
            state.local = Some(desc);
            let candidates = if state.gathered {
                Vec::new()
            } else {
                state.gathered = true;
                self.gather_candidates()
            };
            (candidates, Self::connect_if_negotiated(&mut state))
        };

        if let Some(observer) = self.observer() {
            for candidate in candidates {
                observer.on_ice_candidate(candidate);
            }
        }
        self.notify_ice(ice);
        Ok(())
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), anyhow::Error> {
        let tracks = parse_tracks(&desc.sdp)?;
        let (new_tracks, ice) = {
            let mut state = self.state.lock();
            let next = match (state.signaling, desc.kind) {
                (SignalingState::Closed, _) => return Err(closed_error()),
                // An offer arriving over our own pending offer rolls it back.
                (
                    SignalingState::Stable
                    | SignalingState::HaveRemoteOffer
                    | SignalingState::HaveLocalOffer,
                    SdpKind::Offer,
                ) => SignalingState::HaveRemoteOffer,
                (SignalingState::HaveLocalOffer, SdpKind::Answer) => SignalingState::Stable,
                (current, kind) => {
                    return Err(anyhow!(
                        "InvalidStateError: Failed to set remote {:?} in state {}",
                        kind,
                        current.as_str()
                    ));
                }
            };
            state.signaling = next;
            state.remote = Some(desc);
            let new_tracks: Vec<MediaTrack> = tracks
                .into_iter()
                .filter(|t| state.remote_track_ids.insert(t.id().to_string()))
                .collect();
            (new_tracks, Self::connect_if_negotiated(&mut state))
        };

        if let Some(observer) = self.observer() {
            for track in new_tracks {
                observer.on_track(track);
            }
        }
        self.notify_ice(ice);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), IceCandidateError> {
        let mut state = self.state.lock();
        if state.signaling == SignalingState::Closed {
            return Err(IceCandidateError::InvalidState(
                "The RTCPeerConnection's signalingState is 'closed'".to_string(),
            ));
        }
        if state.remote.is_none() {
            return Err(IceCandidateError::InvalidState(
                "The remote description was null".to_string(),
            ));
        }
        // Empty candidate marks the end of gathering.
        if candidate.candidate.is_empty() {
            return Ok(());
        }
        if !candidate.candidate.starts_with("candidate:") {
            return Err(anyhow!("OperationError: Error processing ICE candidate").into());
        }
        state.candidates.push(candidate);
        Ok(())
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.signaling = SignalingState::Closed;
        state.ice = IceConnectionState::Closed;
        drop(state);
        *self.observer.lock() = None;
    }
}

/// Creates [`SimulatedPeerConnection`]s and keeps them around for
/// inspection.
#[derive(Default)]
pub struct SimulatedPeerFactory {
    connections: Mutex<Vec<Arc<SimulatedPeerConnection>>>,
    failing: AtomicBool,
}

impl SimulatedPeerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `create` fail.
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn connections(&self) -> Vec<Arc<SimulatedPeerConnection>> {
        self.connections.lock().clone()
    }

    pub fn created(&self) -> usize {
        self.connections.lock().len()
    }
}

impl PeerConnectionFactory for SimulatedPeerFactory {
    fn create(&self, config: &RtcConfiguration) -> Result<Arc<dyn PeerConnection>, anyhow::Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("Peer connection creation failed"));
        }
        let connection = Arc::new(SimulatedPeerConnection::new(config.clone()));
        self.connections.lock().push(connection.clone());
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    #[derive(Default)]
    struct EventLog {
        candidates: StdMutex<Vec<IceCandidate>>,
        tracks: StdMutex<Vec<MediaTrack>>,
        states: StdMutex<Vec<IceConnectionState>>,
    }

    impl PeerObserver for EventLog {
        fn on_ice_candidate(&self, candidate: IceCandidate) {
            self.candidates.lock().unwrap().push(candidate);
        }

        fn on_track(&self, track: MediaTrack) {
            self.tracks.lock().unwrap().push(track);
        }

        fn on_ice_connection_state_change(&self, state: IceConnectionState) {
            self.states.lock().unwrap().push(state);
        }
    }

    fn config() -> RtcConfiguration {
        crate::config::CallConfig::default().rtc_configuration()
    }

    fn with_tracks(pc: &SimulatedPeerConnection) -> MediaStream {
        let stream = MediaStream::with_tracks(vec![
            MediaTrack::new(TrackKind::Audio, "Microphone"),
            MediaTrack::new(TrackKind::Video, "Camera"),
        ]);
        for track in stream.tracks() {
            pc.add_track(track, &stream).unwrap();
        }
        stream
    }

    #[tokio::test]
    async fn test_offer_answer_exchange() {
        let a = SimulatedPeerConnection::new(config());
        let b = SimulatedPeerConnection::new(config());
        let observer_a = Arc::new(EventLog::default());
        let observer_b = Arc::new(EventLog::default());
        a.set_observer(Some(observer_a.clone()));
        b.set_observer(Some(observer_b.clone()));
        let stream_a = with_tracks(&a);
        with_tracks(&b);

        let offer = a.create_offer().await.unwrap();
        a.set_local_description(offer.clone()).await.unwrap();
        assert_eq!(a.signaling_state(), SignalingState::HaveLocalOffer);
        assert_eq!(observer_a.candidates.lock().unwrap().len(), 2);

        b.set_remote_description(offer).await.unwrap();
        assert_eq!(b.signaling_state(), SignalingState::HaveRemoteOffer);
        let received: Vec<String> = observer_b
            .tracks
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.id().to_string())
            .collect();
        let sent: Vec<String> = stream_a.tracks().iter().map(|t| t.id().to_string()).collect();
        assert_eq!(received, sent);

        let answer = b.create_answer().await.unwrap();
        b.set_local_description(answer.clone()).await.unwrap();
        a.set_remote_description(answer).await.unwrap();

        assert_eq!(a.signaling_state(), SignalingState::Stable);
        assert_eq!(b.signaling_state(), SignalingState::Stable);
        assert_eq!(a.ice_connection_state(), IceConnectionState::Connected);
        assert_eq!(
            *observer_b.states.lock().unwrap(),
            vec![IceConnectionState::Checking, IceConnectionState::Connected]
        );
    }

    #[tokio::test]
    async fn test_answer_requires_local_offer() {
        let pc = SimulatedPeerConnection::new(config());
        let answer = SessionDescription::answer("v=0\r\n");
        assert!(pc.set_remote_description(answer).await.is_err());
        assert_eq!(pc.signaling_state(), SignalingState::Stable);
        assert!(pc.create_answer().await.is_err());
    }

    #[tokio::test]
    async fn test_candidate_before_remote_description() {
        let pc = SimulatedPeerConnection::new(config());
        let candidate = IceCandidate::new("candidate:1 1 udp 1 127.0.0.1 5000 typ host");
        let err = pc.add_ice_candidate(candidate.clone()).await.unwrap_err();
        assert!(matches!(err, IceCandidateError::InvalidState(_)));

        pc.set_remote_description(SessionDescription::offer("v=0\r\n"))
            .await
            .unwrap();
        pc.add_ice_candidate(candidate).await.unwrap();
        let err = pc
            .add_ice_candidate(IceCandidate::new("garbage"))
            .await
            .unwrap_err();
        assert!(matches!(err, IceCandidateError::Other(_)));
        assert_eq!(pc.remote_candidates().len(), 1);
    }

    #[test]
    fn test_duplicate_sender_rejected() {
        let pc = SimulatedPeerConnection::new(config());
        let stream = with_tracks(&pc);
        let track = stream.audio_tracks().remove(0);
        assert!(pc.add_track(track, &stream).is_err());
        assert_eq!(pc.senders().len(), 2);
    }

    #[test]
    fn test_close_detaches_observer() {
        let pc = SimulatedPeerConnection::new(config());
        pc.set_observer(Some(Arc::new(EventLog::default())));
        pc.close();
        assert!(!pc.has_observer());
        assert_eq!(pc.signaling_state(), SignalingState::Closed);
        assert_eq!(pc.close_calls(), 1);
    }
}
