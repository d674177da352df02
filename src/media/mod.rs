//! Local audio: the platform seam, device management and the playback sink.
//!
//! The platform (browser shim, native audio host, test fake) implements
//! [`MediaPlatform`] and [`sink::PlaybackElement`]; everything above those two
//! traits is platform independent.

pub mod codec;
pub mod devices;
pub mod sink;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::MediaError;

pub use devices::{Device, DeviceKind, DeviceSelection, MediaDeviceManager};
pub use sink::{AudioSinkController, PlaybackElement, RemoteStream, SinkStatus};

/// Sentinel id meaning "whatever the platform considers default".
pub const DEFAULT_DEVICE_ID: &str = "default";

/// Параметры запроса захвата микрофона
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    /// `None` lets the platform pick; `Some` demands that exact device.
    pub device_id: Option<String>,
    pub noise_suppression: bool,
    pub echo_cancellation: bool,
    pub auto_gain_control: bool,
}

impl CaptureConstraints {
    pub fn for_device(device_id: &str) -> Self {
        let device_id = match device_id.trim() {
            "" | DEFAULT_DEVICE_ID => None,
            id => Some(id.to_owned()),
        };
        Self {
            device_id,
            noise_suppression: true,
            echo_cancellation: true,
            auto_gain_control: true,
        }
    }
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self::for_device(DEFAULT_DEVICE_ID)
    }
}

/// Raw platform enumeration entry, before label resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDeviceInfo {
    pub device_id: String,
    pub label: String,
    pub kind: DeviceKind,
}

/// One encoded audio frame ready for the outbound track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub data: Bytes,
    pub duration: Duration,
}

#[async_trait]
pub trait LocalAudioTrack: Send + Sync {
    fn id(&self) -> &str;

    fn is_enabled(&self) -> bool;

    /// Enables or disables sending without removing the track.
    fn set_enabled(&self, enabled: bool) -> Result<(), MediaError>;

    fn stop(&self);

    fn is_stopped(&self) -> bool;

    /// Next captured frame; `None` once the track has ended.
    async fn next_frame(&self) -> Option<AudioFrame>;
}

pub trait CaptureStream: Send + Sync {
    fn id(&self) -> &str;

    fn audio_tracks(&self) -> Vec<Arc<dyn LocalAudioTrack>>;

    fn stop(&self) {
        for track in self.audio_tracks() {
            track.stop();
        }
    }
}

/// Cloneable owning handle to a live capture.
#[derive(Clone)]
pub struct CaptureHandle(Arc<dyn CaptureStream>);

impl CaptureHandle {
    pub fn new(stream: Arc<dyn CaptureStream>) -> Self {
        Self(stream)
    }

    pub fn id(&self) -> &str {
        self.0.id()
    }

    pub fn audio_tracks(&self) -> Vec<Arc<dyn LocalAudioTrack>> {
        self.0.audio_tracks()
    }

    pub fn first_audio_track(&self) -> Option<Arc<dyn LocalAudioTrack>> {
        self.0.audio_tracks().into_iter().next()
    }

    pub fn stop(&self) {
        self.0.stop();
    }
}

impl fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("id", &self.0.id())
            .field("tracks", &self.0.audio_tracks().len())
            .finish()
    }
}

/// Доступ к микрофонам и списку устройств конкретной платформы
#[async_trait]
pub trait MediaPlatform: Send + Sync {
    async fn acquire_capture(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Arc<dyn CaptureStream>, MediaError>;

    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, MediaError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_selection_does_not_pin_a_device() {
        assert_eq!(CaptureConstraints::for_device("default").device_id, None);
        assert_eq!(CaptureConstraints::for_device("").device_id, None);
        let pinned = CaptureConstraints::for_device("d2");
        assert_eq!(pinned.device_id.as_deref(), Some("d2"));
        assert!(pinned.noise_suppression && pinned.echo_cancellation && pinned.auto_gain_control);
    }
}
