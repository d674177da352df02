//! Outbound audio: the sample track plus a pump that can change its source
//! without renegotiation.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use webrtc::api::media_engine::MIME_TYPE_PCMU;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::media::codec::{self, PCMU_CHANNELS, PCMU_CLOCK_RATE};
use crate::media::{AudioFrame, LocalAudioTrack};

type Source = Option<Arc<dyn LocalAudioTrack>>;

pub fn pcmu_track(stream_id: &str) -> Arc<TrackLocalStaticSample> {
    Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_PCMU.to_owned(),
            clock_rate: PCMU_CLOCK_RATE,
            channels: PCMU_CHANNELS,
            ..Default::default()
        },
        "audio".to_owned(),
        stream_id.to_owned(),
    ))
}

pub struct AudioSender {
    track: Arc<TrackLocalStaticSample>,
    source: watch::Sender<Source>,
    pump: JoinHandle<()>,
}

impl AudioSender {
    pub fn spawn(track: Arc<TrackLocalStaticSample>, source: Arc<dyn LocalAudioTrack>) -> Self {
        let (tx, rx) = watch::channel(Some(source));
        let pump = tokio::spawn(pump(track.clone(), rx));
        Self {
            track,
            source: tx,
            pump,
        }
    }

    pub fn track(&self) -> Arc<TrackLocalStaticSample> {
        self.track.clone()
    }

    /// Switches the pump to `source`; the previous track is left running for
    /// its owner to stop.
    pub fn replace(&self, source: Arc<dyn LocalAudioTrack>) {
        debug!(track = source.id(), "outbound source replaced");
        self.source.send_replace(Some(source));
    }

    pub fn source_id(&self) -> Option<String> {
        self.source.borrow().as_ref().map(|t| t.id().to_owned())
    }

    pub fn stop(&self) {
        self.source.send_replace(None);
        self.pump.abort();
    }
}

impl Drop for AudioSender {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Отключённый трек отправляет тишину той же длительности
fn outgoing(frame: AudioFrame, enabled: bool) -> Sample {
    let data = if enabled {
        frame.data
    } else {
        codec::silence(frame.data.len()).data
    };
    Sample {
        data,
        duration: frame.duration,
        ..Default::default()
    }
}

async fn pump(track: Arc<TrackLocalStaticSample>, mut rx: watch::Receiver<Source>) {
    loop {
        let current = rx.borrow_and_update().clone();
        let Some(source) = current else {
            if rx.changed().await.is_err() {
                return;
            }
            continue;
        };

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            frame = source.next_frame() => match frame {
                Some(frame) => {
                    let sample = outgoing(frame, source.is_enabled());
                    if let Err(e) = track.write_sample(&sample).await {
                        trace!("write_sample failed: {e}");
                    }
                }
                None => {
                    debug!(track = source.id(), "local track ended; waiting for a replacement");
                    if rx.changed().await.is_err() {
                        return;
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn disabled_track_sends_silence() {
        let frame = codec::pcmu_frame(&[1200i16; 160]);
        let live = outgoing(frame.clone(), true);
        assert_eq!(live.data, frame.data);

        let muted = outgoing(frame, false);
        assert_eq!(muted.data, codec::silence(160).data);
        assert_eq!(muted.duration, Duration::from_millis(20));
    }
}
