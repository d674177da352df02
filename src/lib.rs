//! Voice session lifecycle for a WebRTC media server: signaling, device
//! hot-swap, playback unlock and the state machine that ties them together.
//!
//! Hosts provide audio I/O through [`media::MediaPlatform`] and
//! [`media::PlaybackElement`] and drive everything through [`VoiceClient`].

pub mod commands;
pub mod config;
pub mod error;
pub mod logger;
pub mod machine;
pub mod media;
pub mod notify;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod utils;

#[cfg(test)]
mod testing;

pub use commands::VoiceClient;
pub use config::{MenuPosition, WidgetConfig};
pub use error::{ErrorKind, ErrorReport, VoiceError};
pub use machine::{Collaborators, Diagnostics, SessionStateMachine};
pub use media::{Device, DeviceKind, DeviceSelection};
pub use notify::{Notification, WidgetState};
pub use session::{SessionId, SessionState};
pub use signaling::{HttpSignaling, Signaling};
