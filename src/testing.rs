//! In-memory collaborators for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{MediaError, SignalingError, TransportError};
use crate::media::codec;
use crate::media::sink::{PlaybackElement, RemoteStream};
use crate::media::{
    AudioFrame, CaptureConstraints, CaptureStream, LocalAudioTrack, MediaDeviceInfo, MediaPlatform,
};
use crate::peer::transport::{PeerTransport, TransportEventSink, TransportFactory};
use crate::peer::types::{
    IceCandidate, IceConnectivity, IceServerList, PeerState, SessionDescription,
    TransportDiagnostics, TransportEvent,
};
use crate::session::SessionId;
use crate::signaling::Signaling;

// ---------- media ----------

pub struct FakeTrack {
    id: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
    fail_mutation: Arc<AtomicBool>,
}

#[async_trait]
impl LocalAudioTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) -> Result<(), MediaError> {
        if self.fail_mutation.load(Ordering::SeqCst) {
            return Err(MediaError::Other("track is locked".into()));
        }
        self.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    async fn next_frame(&self) -> Option<AudioFrame> {
        if self.is_stopped() {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        Some(codec::silence(160))
    }
}

pub struct FakeCapture {
    id: String,
    tracks: Vec<Arc<FakeTrack>>,
}

impl FakeCapture {
    pub fn is_stopped(&self) -> bool {
        self.tracks.iter().all(|t| t.is_stopped())
    }
}

impl CaptureStream for FakeCapture {
    fn id(&self) -> &str {
        &self.id
    }

    fn audio_tracks(&self) -> Vec<Arc<dyn LocalAudioTrack>> {
        self.tracks
            .iter()
            .map(|t| t.clone() as Arc<dyn LocalAudioTrack>)
            .collect()
    }
}

#[derive(Default)]
struct MediaState {
    devices: Vec<MediaDeviceInfo>,
    capture_failures: Vec<MediaError>,
    enumeration_failure: Option<MediaError>,
    captures: Vec<Arc<FakeCapture>>,
    constraints: Vec<CaptureConstraints>,
}

#[derive(Default)]
pub struct FakeMedia {
    state: Mutex<MediaState>,
    acquired: AtomicUsize,
    fail_mutation: Arc<AtomicBool>,
}

impl FakeMedia {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_devices(&self, devices: Vec<MediaDeviceInfo>) {
        self.state.lock().unwrap().devices = devices;
    }

    pub fn fail_next_capture(&self, err: MediaError) {
        self.state.lock().unwrap().capture_failures.push(err);
    }

    pub fn fail_enumeration(&self, err: MediaError) {
        self.state.lock().unwrap().enumeration_failure = Some(err);
    }

    pub fn fail_track_mutation(&self, fail: bool) {
        self.fail_mutation.store(fail, Ordering::SeqCst);
    }

    pub fn captures(&self) -> Vec<Arc<FakeCapture>> {
        self.state.lock().unwrap().captures.clone()
    }

    pub fn acquire_count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn last_constraints(&self) -> Option<CaptureConstraints> {
        self.state.lock().unwrap().constraints.last().cloned()
    }
}

#[async_trait]
impl MediaPlatform for FakeMedia {
    async fn acquire_capture(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Arc<dyn CaptureStream>, MediaError> {
        let n = self.acquired.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock().unwrap();
        state.constraints.push(constraints.clone());
        if !state.capture_failures.is_empty() {
            return Err(state.capture_failures.remove(0));
        }
        let capture = Arc::new(FakeCapture {
            id: format!("capture-{n}"),
            tracks: vec![Arc::new(FakeTrack {
                id: format!("track-{n}"),
                enabled: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
                fail_mutation: self.fail_mutation.clone(),
            })],
        });
        state.captures.push(capture.clone());
        Ok(capture)
    }

    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, MediaError> {
        let state = self.state.lock().unwrap();
        match &state.enumeration_failure {
            Some(err) => Err(err.clone()),
            None => Ok(state.devices.clone()),
        }
    }
}

// ---------- playback ----------

struct PlaybackState {
    source: Option<RemoteStream>,
    paused: bool,
    muted: bool,
    volume: f32,
    play_calls: usize,
    refuse: bool,
    routing: bool,
    output: Option<String>,
}

pub struct FakePlayback {
    state: Mutex<PlaybackState>,
}

impl FakePlayback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PlaybackState {
                source: None,
                paused: true,
                muted: false,
                volume: 1.0,
                play_calls: 0,
                refuse: false,
                routing: true,
                output: None,
            }),
        })
    }

    pub fn play_calls(&self) -> usize {
        self.state.lock().unwrap().play_calls
    }

    pub fn refuse_play(&self, refuse: bool) {
        self.state.lock().unwrap().refuse = refuse;
    }

    pub fn set_playing(&self) {
        self.state.lock().unwrap().paused = false;
    }

    pub fn output_device(&self) -> Option<String> {
        self.state.lock().unwrap().output.clone()
    }

    pub fn source(&self) -> Option<RemoteStream> {
        self.state.lock().unwrap().source.clone()
    }
}

#[async_trait]
impl PlaybackElement for FakePlayback {
    fn set_source(&self, stream: Option<RemoteStream>) {
        self.state.lock().unwrap().source = stream;
    }

    fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    async fn play(&self) -> Result<(), MediaError> {
        let mut state = self.state.lock().unwrap();
        state.play_calls += 1;
        if state.refuse {
            return Err(MediaError::NotAllowed);
        }
        state.paused = false;
        Ok(())
    }

    fn pause(&self) {
        self.state.lock().unwrap().paused = true;
    }

    fn is_muted(&self) -> bool {
        self.state.lock().unwrap().muted
    }

    fn set_muted(&self, muted: bool) {
        self.state.lock().unwrap().muted = muted;
    }

    fn volume(&self) -> f32 {
        self.state.lock().unwrap().volume
    }

    fn set_volume(&self, volume: f32) {
        self.state.lock().unwrap().volume = volume;
    }

    fn supports_output_routing(&self) -> bool {
        self.state.lock().unwrap().routing
    }

    async fn set_output_device(&self, device_id: &str) -> Result<(), MediaError> {
        self.state.lock().unwrap().output = Some(device_id.to_owned());
        Ok(())
    }
}

// ---------- signaling ----------

pub struct FakeSignaling {
    answer: Mutex<Result<SessionDescription, SignalingError>>,
    gate: Mutex<Option<Arc<Notify>>>,
    offers: Mutex<Vec<(SessionDescription, SessionId)>>,
    candidates: Mutex<Vec<(IceCandidate, SessionId)>>,
}

impl FakeSignaling {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Ok(SessionDescription::answer("v=0 answer"))),
            gate: Mutex::new(None),
            offers: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
        })
    }

    pub fn answer_with(&self, answer: Result<SessionDescription, SignalingError>) {
        *self.answer.lock().unwrap() = answer;
    }

    /// Holds every exchange until the returned gate is notified.
    pub fn hold_answers(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn offers(&self) -> Vec<(SessionDescription, SessionId)> {
        self.offers.lock().unwrap().clone()
    }

    pub fn candidates(&self) -> Vec<(IceCandidate, SessionId)> {
        self.candidates.lock().unwrap().clone()
    }
}

#[async_trait]
impl Signaling for FakeSignaling {
    async fn fetch_ice_servers(&self) -> IceServerList {
        IceServerList::fallback()
    }

    async fn exchange_offer(
        &self,
        offer: &SessionDescription,
        session: &SessionId,
    ) -> Result<SessionDescription, SignalingError> {
        self.offers
            .lock()
            .unwrap()
            .push((offer.clone(), session.clone()));
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.answer.lock().unwrap().clone()
    }

    async fn relay_candidate(&self, candidate: &IceCandidate, session: &SessionId) {
        self.candidates
            .lock()
            .unwrap()
            .push((candidate.clone(), session.clone()));
    }
}

// ---------- transport ----------

#[derive(Default)]
struct TransportState {
    sender: Option<Arc<dyn LocalAudioTrack>>,
    replace_calls: usize,
    side_channels: Vec<String>,
    answer: Option<SessionDescription>,
    reject_answer: bool,
    closed: bool,
}

#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<TransportState>,
    events: Mutex<Option<TransportEventSink>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn emit(&self, event: TransportEvent) {
        if let Some(sink) = self.events.lock().unwrap().as_ref() {
            sink.emit(event);
        }
    }

    pub fn sender_track_id(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .sender
            .as_ref()
            .map(|t| t.id().to_owned())
    }

    pub fn replace_calls(&self) -> usize {
        self.state.lock().unwrap().replace_calls
    }

    pub fn side_channels(&self) -> Vec<String> {
        self.state.lock().unwrap().side_channels.clone()
    }

    pub fn applied_answer(&self) -> Option<SessionDescription> {
        self.state.lock().unwrap().answer.clone()
    }

    pub fn reject_answers(&self) {
        self.state.lock().unwrap().reject_answer = true;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn add_audio_track(&self, track: Arc<dyn LocalAudioTrack>) -> Result<(), TransportError> {
        self.state.lock().unwrap().sender = Some(track);
        Ok(())
    }

    fn has_audio_sender(&self) -> bool {
        self.state.lock().unwrap().sender.is_some()
    }

    async fn replace_audio_track(
        &self,
        track: Arc<dyn LocalAudioTrack>,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.sender.is_none() {
            return Err(TransportError::NoSender);
        }
        state.replace_calls += 1;
        state.sender = Some(track);
        Ok(())
    }

    async fn create_side_channel(&self, label: &str) -> Result<(), TransportError> {
        self.state
            .lock()
            .unwrap()
            .side_channels
            .push(label.to_owned());
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        Ok(SessionDescription::offer("v=0 offer"))
    }

    async fn apply_answer(&self, answer: SessionDescription) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.reject_answer {
            return Err(TransportError::Rtc("bad sdp".into()));
        }
        state.answer = Some(answer);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }

    async fn diagnostics(&self) -> TransportDiagnostics {
        let state = self.state.lock().unwrap();
        TransportDiagnostics {
            connection_state: if state.closed { PeerState::Closed } else { PeerState::New },
            ice_connectivity: IceConnectivity::New,
            senders: usize::from(state.sender.is_some()),
            receivers: 0,
            selected_pair: None,
        }
    }
}

#[derive(Default)]
pub struct FakeTransportFactory {
    created: Mutex<Vec<Arc<FakeTransport>>>,
    failure: Mutex<Option<TransportError>>,
}

impl FakeTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, err: TransportError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn latest(&self) -> Arc<FakeTransport> {
        self.created
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no transport created yet")
    }

    pub fn created(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait]
impl TransportFactory for FakeTransportFactory {
    async fn create(
        &self,
        _ice_servers: &IceServerList,
        events: TransportEventSink,
    ) -> Result<Arc<dyn PeerTransport>, TransportError> {
        if let Some(err) = self.failure.lock().unwrap().take() {
            return Err(err);
        }
        let transport = FakeTransport::new();
        *transport.events.lock().unwrap() = Some(events);
        self.created.lock().unwrap().push(transport.clone());
        Ok(transport)
    }
}
