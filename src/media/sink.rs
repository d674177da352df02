//! Remote-audio playback sink.
//!
//! The controller owns the platform playback element for the whole life of
//! the client, so presentation rebuilds never recreate it, and makes sure one
//! attached stream gets one successful play request.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};
use webrtc::track::track_remote::TrackRemote;

use super::DEFAULT_DEVICE_ID;
use crate::error::MediaError;

/// Входящий поток с удалённой стороны
#[derive(Clone)]
pub struct RemoteStream {
    id: String,
    track: Option<Arc<TrackRemote>>,
}

impl RemoteStream {
    /// A stream known only by id; platforms that don't consume RTP use this.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            track: None,
        }
    }

    pub fn from_track(track: Arc<TrackRemote>) -> Self {
        Self {
            id: track.stream_id().to_string(),
            track: Some(track),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn track(&self) -> Option<&Arc<TrackRemote>> {
        self.track.as_ref()
    }

    /// Same underlying track when both carry one, otherwise same stream id.
    pub fn is_same_stream(&self, other: &RemoteStream) -> bool {
        match (&self.track, &other.track) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => self.id == other.id,
        }
    }
}

impl fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStream")
            .field("id", &self.id)
            .field("has_track", &self.track.is_some())
            .finish()
    }
}

/// Platform playback element (the hidden `<audio>` of a browser, an output
/// stream of a native host).
#[async_trait]
pub trait PlaybackElement: Send + Sync {
    fn set_source(&self, stream: Option<RemoteStream>);

    fn is_paused(&self) -> bool;

    /// Resolves once the platform accepted or refused to start playback.
    async fn play(&self) -> Result<(), MediaError>;

    fn pause(&self);

    fn is_muted(&self) -> bool;

    fn set_muted(&self, muted: bool);

    fn volume(&self) -> f32;

    fn set_volume(&self, volume: f32);

    fn supports_output_routing(&self) -> bool;

    async fn set_output_device(&self, device_id: &str) -> Result<(), MediaError>;
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SinkStatus {
    pub attached_stream: Option<String>,
    pub playback_started: bool,
    pub muted: bool,
    pub volume: f32,
    pub paused: bool,
    pub play_requests: u64,
}

pub struct AudioSinkController {
    element: Arc<dyn PlaybackElement>,
    attached: Option<RemoteStream>,
    playback_started: bool,
    play_requests: u64,
}

impl AudioSinkController {
    pub fn new(element: Arc<dyn PlaybackElement>) -> Self {
        Self {
            element,
            attached: None,
            playback_started: false,
            play_requests: 0,
        }
    }

    /// Returns `true` when `stream` replaced a different stream.
    pub fn attach(&mut self, stream: RemoteStream) -> bool {
        if let Some(current) = &self.attached {
            if current.is_same_stream(&stream) {
                debug!(stream = stream.id(), "remote stream already attached");
                return false;
            }
        }

        info!(stream = stream.id(), "attaching remote stream");
        // Новый поток, снова нужен play()
        self.playback_started = false;
        self.element.set_source(Some(stream.clone()));
        self.element.set_volume(1.0);
        self.element.set_muted(false);
        self.attached = Some(stream);
        true
    }

    pub async fn ensure_playback(&mut self) {
        if self.playback_started || self.attached.is_none() {
            return;
        }

        if !self.element.is_paused() {
            self.playback_started = true;
            return;
        }

        self.play_requests += 1;
        match self.element.play().await {
            Ok(()) => {
                debug!("remote playback started");
                self.playback_started = true;
            }
            Err(e) => {
                // Ждём следующего триггера (например, клика пользователя)
                debug!("play request refused: {e}");
            }
        }
    }

    /// Unmutes, applies the output selection and retries playback.
    pub async fn force_unmute(&mut self, output_device: Option<&str>) {
        self.element.set_muted(false);
        self.element.set_volume(1.0);

        if let Some(id) = output_device {
            // "default" тоже применяем: иначе маршрут к прошлому устройству останется
            if self.element.supports_output_routing() && !id.is_empty() {
                if let Err(e) = self.element.set_output_device(id).await {
                    debug!(device = id, "output routing during unmute failed: {e}");
                }
            }
        }

        self.ensure_playback().await;
    }

    pub async fn route_output(&self, device_id: &str) {
        if !self.element.supports_output_routing() {
            warn!("audio output device change not supported by this platform");
            return;
        }
        if device_id == DEFAULT_DEVICE_ID {
            debug!("using default audio output device");
            return;
        }
        match self.element.set_output_device(device_id).await {
            Ok(()) => info!(device = device_id, "audio output device changed"),
            Err(e) => warn!(device = device_id, "error setting audio output device: {e}"),
        }
    }

    pub fn is_muted(&self) -> bool {
        self.element.is_muted()
    }

    /// Releases the stream and pauses the element; the element itself stays.
    pub fn detach(&mut self) {
        debug!("cleaning up audio element");
        self.element.set_source(None);
        self.element.pause();
        self.attached = None;
        self.playback_started = false;
    }

    pub fn status(&self) -> SinkStatus {
        SinkStatus {
            attached_stream: self.attached.as_ref().map(|s| s.id().to_owned()),
            playback_started: self.playback_started,
            muted: self.element.is_muted(),
            volume: self.element.volume(),
            paused: self.element.is_paused(),
            play_requests: self.play_requests,
        }
    }
}
