//! Peer transport on top of the `webrtc` crate.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::error::TransportError;
use crate::logger::{dump_candidate, dump_selected_pair, selected_pair};
use crate::media::{LocalAudioTrack, RemoteStream};
use crate::peer::data_channel::attach_side_channel;
use crate::peer::ice::{analyze_candidates, rtc_config};
use crate::peer::sender::{pcmu_track, AudioSender};
use crate::peer::transport::{PeerTransport, TransportEventSink, TransportFactory};
use crate::peer::types::{
    IceCandidate, IceServerList, SdpType, SessionDescription, TransportDiagnostics,
    TransportEvent,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct WebRtcTransportFactory;

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        ice_servers: &IceServerList,
        events: TransportEventSink,
    ) -> Result<Arc<dyn PeerTransport>, TransportError> {
        let transport = WebRtcTransport::new(ice_servers, events).await?;
        Ok(Arc::new(transport))
    }
}

pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
    events: TransportEventSink,
    sender: Mutex<Option<AudioSender>>,
    side_channel: Mutex<Option<Arc<RTCDataChannel>>>,
}

impl WebRtcTransport {
    /// создаём Peer и подписываемся на все колбэки
    pub async fn new(
        ice_servers: &IceServerList,
        events: TransportEventSink,
    ) -> Result<Self, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(
            api.new_peer_connection(rtc_config(ice_servers))
                .await
                .map_err(|e| TransportError::Setup(e.to_string()))?,
        );
        install_callbacks(&pc, &events);
        debug!(session = %events.session(), "peer connection created");

        Ok(Self {
            pc,
            events,
            sender: Mutex::new(None),
            side_channel: Mutex::new(None),
        })
    }

    fn take_sender(&self) -> Option<AudioSender> {
        self.sender.lock().ok().and_then(|mut s| s.take())
    }
}

fn install_callbacks(pc: &Arc<RTCPeerConnection>, events: &TransportEventSink) {
    let gathered: Arc<Mutex<Vec<IceCandidate>>> = Arc::new(Mutex::new(Vec::new()));

    pc.on_ice_candidate(Box::new({
        let events = events.clone();
        move |cand: Option<RTCIceCandidate>| {
            match cand {
                Some(c) => {
                    dump_candidate("LOCAL", &c);
                    if let Ok(init) = c.to_json() {
                        let candidate = IceCandidate::from(init);
                        if let Ok(mut all) = gathered.lock() {
                            all.push(candidate.clone());
                        }
                        events.emit(TransportEvent::LocalCandidate(candidate));
                    }
                }
                None => {
                    // cand == None означает конец сбора
                    if let Ok(all) = gathered.lock() {
                        analyze_candidates(&all);
                    }
                    events.emit(TransportEvent::GatheringComplete);
                }
            }
            Box::pin(async {})
        }
    }));

    pc.on_ice_gathering_state_change(Box::new(move |state| {
        debug!("ICE gathering state changed to: {state:?}");
        Box::pin(async {})
    }));

    pc.on_ice_connection_state_change(Box::new({
        let events = events.clone();
        move |state: RTCIceConnectionState| {
            info!("ICE connection state changed to: {state:?}");
            events.emit(TransportEvent::IceConnectivity(state.into()));
            Box::pin(async {})
        }
    }));

    // Weak, чтобы колбэк не держал соединение живым
    let pc_stats = Arc::downgrade(pc);
    pc.on_peer_connection_state_change(Box::new({
        let events = events.clone();
        move |st: RTCPeerConnectionState| {
            info!("peer connection state changed to: {st:?}");
            if matches!(
                st,
                RTCPeerConnectionState::Failed | RTCPeerConnectionState::Disconnected
            ) {
                if let Some(pc) = pc_stats.upgrade() {
                    tokio::spawn(async move {
                        dump_selected_pair(&pc, "BEFORE-FAIL").await;
                    });
                }
            }
            events.emit(TransportEvent::ConnectionState(st.into()));
            Box::pin(async {})
        }
    }));

    let track_events = events.clone();
    pc.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
        let kind = track.kind();
        if is_playable(kind) {
            info!(?kind, stream = %track.stream_id(), "remote track received");
            track_events.emit(TransportEvent::RemoteStream(RemoteStream::from_track(track)));
        } else {
            debug!(?kind, "ignoring non-audio remote track");
        }
        Box::pin(async {})
    }));
}

/// Only audio reaches the playback sink.
fn is_playable(kind: RTPCodecType) -> bool {
    kind == RTPCodecType::Audio
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn add_audio_track(&self, track: Arc<dyn LocalAudioTrack>) -> Result<(), TransportError> {
        if self.has_audio_sender() {
            return self.replace_audio_track(track).await;
        }

        let outbound = pcmu_track(self.events.session().as_str());
        let rtp_sender = self
            .pc
            .add_track(outbound.clone() as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        // RTCP нужно вычитывать, иначе перехватчики не работают
        tokio::spawn(async move {
            while rtp_sender.read_rtcp().await.is_ok() {}
        });

        let sender = AudioSender::spawn(outbound, track);
        self.sender
            .lock()
            .map_err(|_| TransportError::Closed)?
            .replace(sender);
        Ok(())
    }

    fn has_audio_sender(&self) -> bool {
        self.sender.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    async fn replace_audio_track(
        &self,
        track: Arc<dyn LocalAudioTrack>,
    ) -> Result<(), TransportError> {
        let guard = self.sender.lock().map_err(|_| TransportError::Closed)?;
        let sender = guard.as_ref().ok_or(TransportError::NoSender)?;
        sender.replace(track);
        Ok(())
    }

    async fn create_side_channel(&self, label: &str) -> Result<(), TransportError> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };
        let dc = self.pc.create_data_channel(label, Some(init)).await?;
        attach_side_channel(&dc, self.events.clone());
        if let Ok(mut slot) = self.side_channel.lock() {
            *slot = Some(dc);
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer).await?;
        let local = self
            .pc
            .local_description()
            .await
            .ok_or(TransportError::NoLocalDescription)?;
        Ok(SessionDescription::offer(local.sdp))
    }

    async fn apply_answer(&self, answer: SessionDescription) -> Result<(), TransportError> {
        let desc = match answer.sdp_type {
            SdpType::Pranswer => RTCSessionDescription::pranswer(answer.sdp)?,
            _ => RTCSessionDescription::answer(answer.sdp)?,
        };
        self.pc.set_remote_description(desc).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if let Some(sender) = self.take_sender() {
            sender.stop();
        }
        let dc = self.side_channel.lock().ok().and_then(|mut s| s.take());
        if let Some(dc) = dc {
            if let Err(e) = dc.close().await {
                debug!("data channel close failed: {e}");
            }
        }
        self.pc.close().await?;
        Ok(())
    }

    async fn diagnostics(&self) -> TransportDiagnostics {
        let senders = self.pc.get_senders().await.len();
        let receivers = self.pc.get_receivers().await.len();
        let pair = selected_pair(&self.pc).await;
        if pair.is_none() {
            warn!(session = %self.events.session(), "no nominated candidate pair yet");
        }
        TransportDiagnostics {
            connection_state: self.pc.connection_state().into(),
            ice_connectivity: self.pc.ice_connection_state().into(),
            senders,
            receivers,
            selected_pair: pair,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_audio_tracks_are_played() {
        assert!(is_playable(RTPCodecType::Audio));
        assert!(!is_playable(RTPCodecType::Video));
        assert!(!is_playable(RTPCodecType::Unspecified));
    }
}
