//! The session state machine: the single owner of the current [`Session`].
//!
//! Negotiation is staged so that every suspension point ends in an event on
//! the machine's own queue:
//!
//! 1. `start` spawns the preparation (relay config, then local capture) and
//!    returns; the result comes back as [`SessionEvent::Prepared`].
//! 2. The machine builds the transport, adds the outbound track, opens the
//!    side channel, creates the offer and spawns the exchange; the answer
//!    comes back as [`SessionEvent::Answered`].
//! 3. Transport callbacks arrive as [`SessionEvent::Transport`].
//!
//! Every event carries the id of the session that produced it and is dropped
//! when that session is no longer current.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use crate::config::WidgetConfig;
use crate::error::{SignalingError, VoiceError};
use crate::media::devices::Enumeration;
use crate::media::{
    AudioSinkController, CaptureHandle, MediaDeviceManager, MediaPlatform, PlaybackElement,
    SinkStatus,
};
use crate::notify::{Notification, Notifier, WidgetState};
use crate::peer::types::{
    IceConnectivity, IceServerList, PeerState, SessionDescription, TransportDiagnostics,
    TransportEvent,
};
use crate::peer::{
    TransportEventSink, TransportFactory, TransportHandle, WebRtcTransportFactory,
    SIDE_CHANNEL_LABEL,
};
use crate::session::{
    transition, Outcome, Prepared, Session, SessionEvent, SessionId, SessionState, Trigger,
};
use crate::signaling::{HttpSignaling, Signaling};

/// Everything the machine talks to.
pub struct Collaborators {
    pub signaling: Arc<dyn Signaling>,
    pub media: Arc<dyn MediaPlatform>,
    pub playback: Arc<dyn PlaybackElement>,
    pub transports: Arc<dyn TransportFactory>,
}

impl Collaborators {
    /// HTTP signaling and `webrtc` transports; audio I/O comes from the host.
    pub fn with_defaults(
        config: &WidgetConfig,
        media: Arc<dyn MediaPlatform>,
        playback: Arc<dyn PlaybackElement>,
    ) -> Result<Self, VoiceError> {
        Ok(Self {
            signaling: Arc::new(HttpSignaling::new(config)?),
            media,
            playback,
            transports: Arc::new(WebRtcTransportFactory),
        })
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TrackStatus {
    pub id: String,
    pub enabled: bool,
    pub stopped: bool,
}

/// Аналог debugAudioStatus: снимок всего, что влияет на звук
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Diagnostics {
    pub session_state: SessionState,
    pub session_id: Option<SessionId>,
    pub is_muted: bool,
    pub sink: SinkStatus,
    pub capture_tracks: Vec<TrackStatus>,
    pub transport: Option<TransportDiagnostics>,
}

pub struct SessionStateMachine {
    signaling: Arc<dyn Signaling>,
    transports: Arc<dyn TransportFactory>,
    devices: MediaDeviceManager,
    sink: AudioSinkController,
    notifier: Notifier,
    session: Option<Session>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionStateMachine {
    pub fn new(collaborators: Collaborators) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            signaling: collaborators.signaling,
            transports: collaborators.transports,
            devices: MediaDeviceManager::new(collaborators.media),
            sink: AudioSinkController::new(collaborators.playback),
            notifier: Notifier::new(),
            session: None,
            events_tx,
            events_rx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    pub fn state(&self) -> SessionState {
        self.session.as_ref().map(|s| s.state).unwrap_or_default()
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_ref().map(|s| &s.id)
    }

    fn is_current(&self, id: &SessionId) -> bool {
        self.session_id() == Some(id)
    }

    // ---------- commands ----------

    pub async fn start(&mut self) -> Result<(), VoiceError> {
        match transition(self.state(), Trigger::Start) {
            Outcome::Ignored => {
                info!("connection attempt already in progress");
                return Ok(());
            }
            Outcome::Rejected => {
                warn!("start refused: a session is already connected");
                return Err(VoiceError::SessionActive);
            }
            Outcome::Moved(_) => {}
        }

        let id = SessionId::generate();
        info!(session = %id, "attempting to start voice chat setup");

        let signaling = self.signaling.clone();
        let media = self.devices.platform();
        let constraints = self.devices.capture_constraints();
        let tx = self.events_tx.clone();
        let session = id.clone();
        // Не отменяем: захват должен вернуться в машину и быть явно остановлен
        tokio::spawn(async move {
            let ice_servers = signaling.fetch_ice_servers().await;
            let acquired = media.acquire_capture(&constraints).await;
            let result = match acquired {
                Ok(stream) => Ok(Prepared {
                    ice_servers,
                    capture: CaptureHandle::new(stream),
                    constraints,
                }),
                Err(e) => {
                    warn!(session = %session, "error accessing microphone: {e}");
                    Err(VoiceError::from(e))
                }
            };
            if let Err(mpsc::error::SendError(event)) =
                tx.send(SessionEvent::Prepared { session, result })
            {
                release_prepared(event);
            }
        });

        self.session = Some(Session::connecting(id.clone()));
        self.notifier.state(SessionState::Connecting, Some(&id));
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), VoiceError> {
        match transition(self.state(), Trigger::Stop) {
            Outcome::Moved(state) => {
                info!("shutting down WebRTC connection");
                self.teardown_session().await;
                self.notifier.state(state, None);
            }
            _ => debug!("stop requested with no active session"),
        }
        Ok(())
    }

    pub fn toggle_mute(&mut self) -> Result<bool, VoiceError> {
        let muted = self.devices.toggle_mute(self.session.as_ref())?;
        self.notifier.send(Notification::MuteChanged(muted));
        Ok(muted)
    }

    pub async fn select_input(&mut self, device_id: &str) -> Result<(), VoiceError> {
        match self
            .devices
            .select_input(device_id, self.session.as_mut())
            .await
        {
            Ok(()) => {
                self.notify_selection();
                Ok(())
            }
            Err(e) => {
                if e.user_notice().is_some() {
                    self.notifier.error(&e);
                }
                Err(e)
            }
        }
    }

    pub async fn select_output(&mut self, device_id: &str) -> Result<(), VoiceError> {
        self.devices.select_output(device_id, &self.sink).await?;
        self.notify_selection();
        Ok(())
    }

    pub async fn enumerate(&mut self) -> Enumeration {
        let result = self.devices.enumerate().await;
        self.notifier.send(Notification::DevicesChanged {
            inputs: result.inputs.clone(),
            outputs: result.outputs.clone(),
        });
        self.notify_selection();
        if let Some(e) = &result.degraded {
            self.notifier.error(e);
        }
        result
    }

    /// Any user gesture inside the widget: unlocks playback if the platform
    /// held it back.
    pub async fn user_interaction(&mut self) {
        if self.sink.is_muted() {
            let output = self.devices.selection().output_id().to_owned();
            self.sink.force_unmute(Some(&output)).await;
        }
        self.sink.ensure_playback().await;
    }

    pub fn snapshot(&self) -> WidgetState {
        WidgetState {
            session_state: self.state(),
            session_id: self.session_id().cloned(),
            is_muted: self.devices.is_muted(),
            input_devices: self.devices.inputs().to_vec(),
            output_devices: self.devices.outputs().to_vec(),
            selection: self.devices.selection().clone(),
        }
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        let capture_tracks = self
            .session
            .as_ref()
            .and_then(|s| s.capture.as_ref())
            .map(|c| {
                c.audio_tracks()
                    .iter()
                    .map(|t| TrackStatus {
                        id: t.id().to_owned(),
                        enabled: t.is_enabled(),
                        stopped: t.is_stopped(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let transport = match self.session.as_ref().and_then(|s| s.transport.clone()) {
            Some(t) => Some(t.diagnostics().await),
            None => None,
        };

        Diagnostics {
            session_state: self.state(),
            session_id: self.session_id().cloned(),
            is_muted: self.devices.is_muted(),
            sink: self.sink.status(),
            capture_tracks,
            transport,
        }
    }

    /// Hangs up and releases the playback source; the machine is done after this.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stop().await {
            warn!("error while stopping session on shutdown: {e}");
        }
        self.sink.detach();
    }

    // ---------- events ----------

    /// Waits for the next inbound event and applies it.
    pub async fn process_next_event(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.handle_event(event).await;
                true
            }
            None => false,
        }
    }

    pub(crate) async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.recv().await
    }

    pub async fn handle_event(&mut self, event: SessionEvent) {
        if !self.is_current(event.session()) {
            debug!(session = %event.session(), "discarding event from a stale session");
            release_prepared(event);
            return;
        }

        match event {
            SessionEvent::Prepared { result, .. } => self.on_prepared(result).await,
            SessionEvent::Answered { result, .. } => self.on_answered(result).await,
            SessionEvent::Transport { event, .. } => self.on_transport_event(event).await,
        }
    }

    async fn on_prepared(&mut self, result: Result<Prepared, VoiceError>) {
        let Prepared {
            ice_servers,
            capture,
            constraints,
        } = match result {
            Ok(prepared) => prepared,
            Err(e) => return self.abort_negotiation(e).await,
        };
        if self.session.is_none() {
            capture.stop();
            return;
        }

        // Микрофон могли сменить, пока шёл захват
        let before = self.devices.selection().clone();
        let capture = self.devices.reconcile_capture(capture, &constraints).await;
        if *self.devices.selection() != before {
            self.notify_selection();
        }
        match self.session.as_mut() {
            Some(session) => session.capture = Some(capture),
            None => {
                capture.stop();
                return;
            }
        }

        if let Err(e) = self.negotiate(&ice_servers).await {
            self.abort_negotiation(e).await;
        }
    }

    async fn negotiate(&mut self, ice_servers: &IceServerList) -> Result<(), VoiceError> {
        let session = self.session.as_ref().ok_or(VoiceError::NoSession)?;
        let id = session.id.clone();
        let track = session
            .capture
            .as_ref()
            .and_then(|c| c.first_audio_track())
            .ok_or_else(|| VoiceError::DeviceUnavailable("capture has no audio track".to_owned()))?;

        let events = TransportEventSink::new(id.clone(), self.events_tx.clone());
        let transport = TransportHandle::new(self.transports.create(ice_servers, events).await?);
        // Сразу кладём в сессию, чтобы откат закрыл транспорт
        if let Some(session) = self.session.as_mut() {
            session.transport = Some(transport.clone());
        }

        transport.add_audio_track(track).await?;
        transport.create_side_channel(SIDE_CHANNEL_LABEL).await?;
        if let Some(session) = self.session.as_mut() {
            session.side_channel = Some(SIDE_CHANNEL_LABEL.to_owned());
        }

        let offer = transport.create_offer().await?;
        let signaling = self.signaling.clone();
        let tx = self.events_tx.clone();
        let session = id.clone();
        let exchange = tokio::spawn(async move {
            let result = signaling.exchange_offer(&offer, &session).await;
            let _ = tx.send(SessionEvent::Answered { session, result });
        });
        if let Some(session) = self.session.as_mut() {
            session.track_task(exchange.abort_handle());
        }
        debug!(session = %id, "offer sent; waiting for answer");
        Ok(())
    }

    async fn on_answered(&mut self, result: Result<SessionDescription, SignalingError>) {
        let answer = match result {
            Ok(answer) => answer,
            Err(e) => return self.abort_negotiation(e.into()).await,
        };
        let Some(transport) = self.session.as_ref().and_then(|s| s.transport.clone()) else {
            debug!("answer arrived without a transport; ignoring");
            return;
        };
        match transport.apply_answer(answer).await {
            Ok(()) => debug!("remote description applied"),
            Err(e) => {
                let err = SignalingError::RemoteDescription(e.to_string());
                self.abort_negotiation(err.into()).await;
            }
        }
    }

    async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::IceConnectivity(IceConnectivity::Connected | IceConnectivity::Completed)
            | TransportEvent::ConnectionState(PeerState::Connected)
            | TransportEvent::SideChannelOpen
            | TransportEvent::SideChannelMessage { .. } => self.promote(&event).await,

            TransportEvent::IceConnectivity(IceConnectivity::Failed | IceConnectivity::Disconnected)
            | TransportEvent::ConnectionState(
                PeerState::Failed | PeerState::Disconnected | PeerState::Closed,
            ) => self.fail(&event).await,

            TransportEvent::LocalCandidate(candidate) => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                let signaling = self.signaling.clone();
                let id = session.id.clone();
                let relay = tokio::spawn(async move {
                    signaling.relay_candidate(&candidate, &id).await;
                });
                session.track_task(relay.abort_handle());
            }

            TransportEvent::RemoteStream(stream) => {
                self.sink.attach(stream);
                self.sink.ensure_playback().await;
            }

            TransportEvent::GatheringComplete
            | TransportEvent::SideChannelClosed
            | TransportEvent::IceConnectivity(_)
            | TransportEvent::ConnectionState(_) => trace!(?event, "no state change"),
        }
    }

    async fn promote(&mut self, cause: &TransportEvent) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Outcome::Moved(state) = transition(session.state, Trigger::Promote) else {
            return;
        };
        session.state = state;
        info!(session = %session.id, ?cause, "session connected");
        self.notifier.state(state, Some(&session.id));

        let output = self.devices.selection().output_id().to_owned();
        self.sink.force_unmute(Some(&output)).await;
    }

    async fn fail(&mut self, cause: &TransportEvent) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Outcome::Moved(state) = transition(session.state, Trigger::Fail) else {
            return;
        };
        session.state = state;
        warn!(session = %session.id, ?cause, "transport failed; demoting session");
        let id = session.id.clone();
        self.notifier.state(state, Some(&id));
        self.notifier
            .error(&VoiceError::TransportFailure(format!("{cause:?}")));

        self.teardown_session().await;
        self.notifier.state(SessionState::Idle, None);
    }

    /// Failure before the transport is up: straight back to `Idle`.
    async fn abort_negotiation(&mut self, err: VoiceError) {
        warn!(session = ?self.session_id(), "negotiation failed: {err}");
        self.teardown_session().await;
        self.notifier.error(&err);
        self.notifier.state(SessionState::Idle, None);
    }

    async fn teardown_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.teardown().await;
        }
        if self.devices.reset_mute() {
            self.notifier.send(Notification::MuteChanged(false));
        }
    }

    fn notify_selection(&self) {
        self.notifier
            .send(Notification::SelectionChanged(self.devices.selection().clone()));
    }
}

/// A capture that nobody will own any more must still be released.
fn release_prepared(event: SessionEvent) {
    if let SessionEvent::Prepared {
        session,
        result: Ok(prepared),
    } = event
    {
        debug!(session = %session, "releasing capture of an abandoned attempt");
        prepared.capture.stop();
    }
}
