use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use confmesh_signaling::{ChannelEvent, Member, PresenceChannel, WhisperPayload};
use parking_lot::Mutex;
use tokio::sync::{Mutex as TokioMutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::CallConfig;
use crate::error::CallError;
use crate::media::{MediaCaptureManager, MediaDevices, MediaStream, SimulatedDevices};
use crate::peer::{
    ParticipantView, PeerConnectionFactory, PeerConnectionRegistry, PeerEvent,
    SimulatedPeerFactory,
};
use crate::recorder::{
    ArtifactSink, AudioRecorder, DirectorySink, RecorderBackend, RecordingListener,
    SavedRecording, SimulatedRecorderBackend,
};
use crate::signaling::SignalingChannel;

use super::{CallSession, SessionListener, SessionStatus, SessionView, StubListener};

/// Platform collaborators of a controller.
#[derive(Clone)]
pub struct CallEnvironment {
    pub devices: Arc<dyn MediaDevices>,
    pub peers: Arc<dyn PeerConnectionFactory>,
    pub recorder: Arc<dyn RecorderBackend>,
    pub sink: Arc<dyn ArtifactSink>,
}

impl CallEnvironment {
    /// In-memory devices and connections, recordings written to `dir`.
    pub fn simulated(dir: impl Into<PathBuf>) -> Self {
        Self {
            devices: Arc::new(SimulatedDevices::new()),
            peers: Arc::new(SimulatedPeerFactory::new()),
            recorder: Arc::new(SimulatedRecorderBackend::new()),
            sink: Arc::new(DirectorySink::new(dir)),
        }
    }
}

/// Per-session state, alive between join and teardown.
struct ActiveSession {
    signaling: Arc<SignalingChannel>,
    registry: Arc<TokioMutex<PeerConnectionRegistry>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    event_loop: Option<JoinHandle<()>>,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        if let Some(event_loop) = self.event_loop.take() {
            event_loop.abort();
        }
    }
}

/// Everything the session event loop owns.
struct SessionLoop {
    signaling: Arc<SignalingChannel>,
    registry: Arc<TokioMutex<PeerConnectionRegistry>>,
    events: mpsc::Receiver<ChannelEvent>,
    peer_events: mpsc::UnboundedReceiver<PeerEvent>,
    shutdown_rx: oneshot::Receiver<()>,
}

/// Forwards recorder callbacks to the session listener and the view.
struct RecordingBridge {
    listener: Arc<dyn SessionListener>,
    view: Arc<watch::Sender<SessionView>>,
}

#[async_trait]
impl RecordingListener for RecordingBridge {
    async fn on_recording_started(&self, mime_type: &str) {
        self.listener.on_recording_started(mime_type).await;
    }

    async fn on_recording_finished(&self, recording: Option<SavedRecording>) {
        self.view.send_modify(|view| {
            view.recording_complete = true;
            view.recording = recording.clone();
        });
        self.listener.on_recording_finished(recording).await;
    }

    async fn on_recording_error(&self, error: CallError) {
        tracing::warn!(%error, "Recording error");
        self.listener.on_error(error).await;
    }
}

/// Runs one meeting at a time: local media, recording, signaling and the
/// mesh of peer connections.
pub struct CallSessionController {
    config: CallConfig,
    media: MediaCaptureManager,
    recorder: AudioRecorder,
    peers: Arc<dyn PeerConnectionFactory>,
    listener: Arc<dyn SessionListener>,
    session: Mutex<Option<CallSession>>,
    status: watch::Sender<SessionStatus>,
    view: Arc<watch::Sender<SessionView>>,
    participants: Arc<watch::Sender<Vec<ParticipantView>>>,
    active: TokioMutex<Option<ActiveSession>>,
    cleanup_scheduled: Arc<AtomicBool>,
}

impl CallSessionController {
    pub fn new(config: CallConfig, env: CallEnvironment) -> Arc<Self> {
        Self::with_listener(config, env, Arc::new(StubListener))
    }

    pub fn with_listener<L>(config: CallConfig, env: CallEnvironment, listener: Arc<L>) -> Arc<Self>
    where
        L: SessionListener + 'static,
    {
        let listener: Arc<dyn SessionListener> = listener;
        let view = Arc::new(watch::Sender::new(SessionView::default()));
        let recorder = AudioRecorder::with_listener(
            env.recorder,
            env.sink,
            config.recorder_timeslice(),
            config.recording_mime_preferences.clone(),
            Arc::new(RecordingBridge {
                listener: listener.clone(),
                view: view.clone(),
            }),
        );
        Arc::new(Self {
            media: MediaCaptureManager::new(env.devices),
            recorder,
            peers: env.peers,
            listener,
            session: Mutex::new(None),
            status: watch::Sender::new(SessionStatus::Idle),
            view,
            participants: Arc::new(watch::Sender::new(Vec::new())),
            active: TokioMutex::new(None),
            cleanup_scheduled: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn session(&self) -> Option<CallSession> {
        self.session.lock().clone()
    }

    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<SessionView> {
        self.view.subscribe()
    }

    pub fn participants(&self) -> Vec<ParticipantView> {
        self.participants.borrow().clone()
    }

    pub fn subscribe_participants(&self) -> watch::Receiver<Vec<ParticipantView>> {
        self.participants.subscribe()
    }

    pub fn local_stream(&self) -> Option<MediaStream> {
        self.media.stream()
    }

    pub async fn is_recording(&self) -> bool {
        self.recorder.is_recording().await
    }

    /// Joins `meeting_id` as `local`.
    ///
    /// Acquires local media first; the channel is only joined once media is
    /// available. Returns once the session is joined and its event loop is
    /// running.
    pub async fn start(
        self: &Arc<Self>,
        meeting_id: &str,
        local: Member,
        presence: Arc<dyn PresenceChannel>,
    ) -> Result<(), CallError> {
        let mut active = self.active.lock().await;

        if self.cleanup_scheduled.load(Ordering::Acquire) || !self.status().can_start() {
            tracing::warn!(status = self.status().as_str(), "Cannot start call - session in progress");
            return Err(CallError::AlreadyActive);
        }
        if meeting_id.is_empty() || local.id.is_empty() {
            let err = CallError::Config("Missing meeting or participant id".to_string());
            self.fail_start(err.clone()).await;
            return Err(err);
        }
        if let Err(err) = self.config.validate() {
            let err = CallError::Config(err.to_string());
            self.fail_start(err.clone()).await;
            return Err(err);
        }

        tracing::info!(%meeting_id, participant_id = %local.id, "Starting call session");
        *self.session.lock() = Some(CallSession::new(meeting_id, local.clone()));
        self.view.send_modify(|view| {
            *view = SessionView::default();
        });
        self.participants.send_replace(Vec::new());
        self.set_status(SessionStatus::AcquiringMedia).await;

        let stream = match self.media.acquire(self.config.media).await {
            Ok(stream) => stream,
            Err(err) => {
                let err = CallError::from(err);
                self.fail_start(err.clone()).await;
                return Err(err);
            }
        };
        self.sync_mute_state();

        // Recording covers the whole call, starting right after acquisition.
        match self.recorder.start(&stream, meeting_id).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!("Call is not being recorded"),
            Err(err) => self.report_error(err).await,
        }

        self.set_status(SessionStatus::Joining).await;
        let signaling = Arc::new(SignalingChannel::new(presence, meeting_id, local));
        let events = match signaling.subscribe().await {
            Ok(events) => events,
            Err(err) => {
                self.report_error(err.clone()).await;
                if !self.cleanup_scheduled.swap(true, Ordering::AcqRel) {
                    self.teardown(&mut active).await;
                    self.schedule_cleanup_reset();
                }
                self.view.send_modify(|view| {
                    view.connecting = false;
                    view.error = Some(err.clone());
                });
                return Err(err);
            }
        };

        let (registry, peer_events) = PeerConnectionRegistry::new(
            self.peers.clone(),
            self.config.rtc_configuration(),
            signaling.clone(),
            self.participants.clone(),
        );
        let registry = Arc::new(TokioMutex::new(registry));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let event_loop = tokio::spawn(self.clone().run_event_loop(SessionLoop {
            signaling: signaling.clone(),
            registry: registry.clone(),
            events,
            peer_events,
            shutdown_rx,
        }));
        *active = Some(ActiveSession {
            signaling,
            registry,
            shutdown_tx: Some(shutdown_tx),
            event_loop: Some(event_loop),
        });
        Ok(())
    }

    /// Start failed before joining: nothing to tear down.
    async fn fail_start(&self, err: CallError) {
        tracing::error!(%err, "Call session failed to start");
        self.view.send_modify(|view| {
            view.connecting = false;
            view.error = Some(err.clone());
        });
        self.listener.on_error(err).await;
        if self.session.lock().is_some() {
            self.set_status(SessionStatus::Terminated).await;
        }
    }

    /// Leaves the meeting and releases everything the session holds.
    ///
    /// Concurrent and repeated calls coalesce into one teardown; returns
    /// `false` for the calls that did not perform it.
    pub async fn stop(&self) -> bool {
        if self.cleanup_scheduled.swap(true, Ordering::AcqRel) {
            tracing::debug!("Cleanup already scheduled, skipping");
            return false;
        }
        let mut active = self.active.lock().await;
        if self.status().can_start() {
            tracing::debug!(status = self.status().as_str(), "No call session to stop");
            self.cleanup_scheduled.store(false, Ordering::Release);
            return false;
        }
        self.teardown(&mut active).await;
        drop(active);
        self.schedule_cleanup_reset();
        true
    }

    async fn teardown(&self, active: &mut Option<ActiveSession>) {
        tracing::info!("Tearing down call session");
        self.set_status(SessionStatus::Leaving).await;

        // 1. Finalize the recording while the tracks still exist.
        if !self.recorder.stop().await {
            tracing::debug!("Recorder had nothing to stop");
        }

        // 2. Local media.
        if !self.media.release() {
            tracing::debug!("No local media to release");
        }

        // 3. Peer connections.
        if let Some(session) = active.as_ref() {
            let closed = session.registry.lock().await.close_all();
            tracing::debug!(closed, "Peer connections closed");
        }

        // 4. Channel and event loop.
        if let Some(mut session) = active.take() {
            if let Err(err) = session.signaling.unsubscribe().await {
                tracing::warn!(?err, "Failed to leave meeting channel");
            }
            if let Some(shutdown_tx) = session.shutdown_tx.take() {
                let _ = shutdown_tx.send(());
            }
            if let Some(event_loop) = session.event_loop.take() {
                if let Err(err) = event_loop.await {
                    tracing::error!(?err, "Session event loop failed");
                }
            }
        }

        // 5. View state.
        self.view.send_modify(SessionView::reset);
        self.participants.send_replace(Vec::new());

        self.set_status(SessionStatus::Terminated).await;
        tracing::info!("Call session terminated");
    }

    fn schedule_cleanup_reset(&self) {
        let cleanup_scheduled = self.cleanup_scheduled.clone();
        let cooldown = self.config.cleanup_cooldown();
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            cleanup_scheduled.store(false, Ordering::Release);
        });
    }

    pub fn toggle_audio(&self) -> Option<bool> {
        let enabled = self.media.audio_enabled()?;
        self.set_audio_enabled(!enabled)
    }

    pub fn toggle_video(&self) -> Option<bool> {
        let enabled = self.media.video_enabled()?;
        self.set_video_enabled(!enabled)
    }

    /// Returns the effective state, `None` without a local audio track.
    pub fn set_audio_enabled(&self, enabled: bool) -> Option<bool> {
        let enabled = self.media.set_audio_enabled(enabled)?;
        self.view.send_modify(|view| view.audio_muted = !enabled);
        Some(enabled)
    }

    pub fn set_video_enabled(&self, enabled: bool) -> Option<bool> {
        let enabled = self.media.set_video_enabled(enabled)?;
        self.view.send_modify(|view| view.video_muted = !enabled);
        Some(enabled)
    }

    fn sync_mute_state(&self) {
        let audio = self.media.audio_enabled();
        let video = self.media.video_enabled();
        self.view.send_modify(|view| {
            view.audio_muted = audio == Some(false);
            view.video_muted = video == Some(false);
        });
    }

    async fn set_status(&self, status: SessionStatus) {
        let mut previous = status;
        let changed = self.status.send_if_modified(|current| {
            previous = *current;
            if *current == status || !current.can_transition_to(status) {
                return false;
            }
            *current = status;
            true
        });
        if !changed {
            if previous != status {
                tracing::debug!(
                    from = previous.as_str(),
                    to = status.as_str(),
                    "Status transition refused"
                );
            }
            return;
        }
        if let Some(session) = self.session.lock().as_mut() {
            session.status = status;
        }
        tracing::info!(from = previous.as_str(), to = status.as_str(), "Session status changed");
        self.listener.on_status_changed(status).await;
    }

    async fn report_error(&self, err: CallError) {
        match &err {
            CallError::Negotiation { participant_id, .. } => {
                tracing::warn!(%participant_id, %err, "Negotiation failed");
            }
            CallError::Recording(_) => tracing::warn!(%err, "Recording failed"),
            _ => {
                tracing::error!(%err, "Call session error");
                self.view.send_modify(|view| view.error = Some(err.clone()));
            }
        }
        self.listener.on_error(err).await;
    }

    fn is_leaving(&self) -> bool {
        matches!(
            self.status(),
            SessionStatus::Leaving | SessionStatus::Terminated
        )
    }

    async fn run_event_loop(self: Arc<Self>, mut ctx: SessionLoop) {
        tracing::debug!(channel = %ctx.signaling.channel_name(), "Session event loop started");
        let mut channel_open = true;
        loop {
            tokio::select! {
                biased;
                _ = &mut ctx.shutdown_rx => break,
                event = ctx.events.recv(), if channel_open => match event {
                    Some(event) => {
                        self.handle_channel_event(&ctx.signaling, &ctx.registry, event)
                            .await
                    }
                    None => {
                        channel_open = false;
                        if !self.is_leaving() {
                            self.report_error(CallError::Channel(
                                "Connection to meeting server lost".to_string(),
                            ))
                            .await;
                        }
                    }
                },
                Some(event) = ctx.peer_events.recv() => {
                    let mut registry = ctx.registry.lock().await;
                    if self.is_leaving() {
                        continue;
                    }
                    registry.handle_peer_event(event).await;
                }
            }
        }
        tracing::debug!("Session event loop stopped");
    }

    async fn handle_channel_event(
        &self,
        signaling: &SignalingChannel,
        registry: &TokioMutex<PeerConnectionRegistry>,
        event: ChannelEvent,
    ) {
        let mut registry = registry.lock().await;
        if self.is_leaving() {
            tracing::trace!(event = event.name(), "Session leaving, event ignored");
            return;
        }
        let local_id = signaling.local_id();
        match event {
            ChannelEvent::Here(members) => {
                tracing::info!(count = members.len(), "Joined meeting channel");
                let stream = self.media.stream();
                for member in members.iter().filter(|m| m.id != local_id) {
                    match registry.create_connection(member, stream.as_ref()) {
                        Ok(Some(_)) => {
                            if let Err(err) = registry.send_offer(&member.id).await {
                                self.report_error(err).await;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => self.report_error(err).await,
                    }
                }
                drop(registry);
                // A stop() may have started while offers were in flight.
                if self.is_leaving() {
                    return;
                }
                self.view.send_modify(|view| view.connecting = false);
                self.set_status(SessionStatus::Active).await;
            }
            ChannelEvent::Joining(member) => {
                if member.id == local_id {
                    return;
                }
                tracing::info!(participant_id = %member.id, "Participant joining");
                // The newcomer sends the offer.
                let stream = self.media.stream();
                if let Err(err) = registry.create_connection(&member, stream.as_ref()) {
                    self.report_error(err).await;
                }
            }
            ChannelEvent::Leaving(member) => {
                if member.id == local_id {
                    return;
                }
                tracing::info!(participant_id = %member.id, "Participant leaving");
                registry.close_connection(&member.id);
            }
            ChannelEvent::Whisper(whisper) => {
                if !signaling.accepts(&whisper) {
                    return;
                }
                let sender_id = whisper.sender_id;
                let result = match whisper.payload {
                    WhisperPayload::Offer(offer) => {
                        let stream = self.media.stream();
                        registry
                            .handle_offer(&sender_id, offer, stream.as_ref())
                            .await
                    }
                    WhisperPayload::Answer(answer) => {
                        registry.handle_answer(&sender_id, answer).await
                    }
                    WhisperPayload::Candidate(candidate) => {
                        registry.handle_ice_candidate(&sender_id, candidate).await;
                        Ok(())
                    }
                };
                if let Err(err) = result {
                    self.report_error(err).await;
                }
            }
            ChannelEvent::Error(message) => {
                drop(registry);
                self.report_error(CallError::Channel(message)).await;
            }
        }
    }
}
