//! Error taxonomy shared by every component.
//!
//! Failures are translated into one of the categories in [`ErrorKind`] at the
//! point where they happen; the presentation layer only ever sees a
//! [`VoiceError`] and, for user-facing categories, its notice text.

use serde::Serialize;
use thiserror::Error;

/// Ошибки платформы захвата/воспроизведения звука
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("capture permission refused")]
    NotAllowed,

    #[error("no matching audio device")]
    NotFound,

    #[error("audio device is busy: {0}")]
    NotReadable(String),

    #[error("media platform error: {0}")]
    Other(String),
}

/// Ошибки обмена offer/answer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalingError {
    #[error("signaling request failed: {0}")]
    Request(String),

    #[error("signaling endpoint answered with status {0}")]
    Status(u16),

    #[error("invalid server response: {0}")]
    MalformedResponse(String),

    #[error("remote description rejected: {0}")]
    RemoteDescription(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("peer connection setup failed: {0}")]
    Setup(String),

    #[error("no outbound audio sender")]
    NoSender,

    #[error("local description unavailable")]
    NoLocalDescription,

    #[error("transport closed")]
    Closed,

    #[error("webrtc: {0}")]
    Rtc(String),
}

impl From<webrtc::Error> for TransportError {
    fn from(err: webrtc::Error) -> Self {
        TransportError::Rtc(err.to_string())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VoiceError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("relay configuration unavailable: {0}")]
    RelayConfigUnavailable(String),

    #[error("a session is already active; hang up first")]
    SessionActive,

    #[error("no active session")]
    NoSession,

    #[error("invalid device id {0:?}")]
    InvalidDevice(String),

    #[error("session has no outbound audio sender")]
    NoAudioSender,

    #[error("voice client is shut down")]
    Closed,
}

/// Категории из таксономии ошибок; `Rejected` это отклонённые команды.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    DeviceUnavailable,
    SignalingError,
    TransportFailure,
    RelayConfigUnavailable,
    Rejected,
}

impl VoiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VoiceError::PermissionDenied => ErrorKind::PermissionDenied,
            VoiceError::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            VoiceError::Signaling(_) => ErrorKind::SignalingError,
            VoiceError::TransportFailure(_) => ErrorKind::TransportFailure,
            VoiceError::RelayConfigUnavailable(_) => ErrorKind::RelayConfigUnavailable,
            VoiceError::SessionActive
            | VoiceError::NoSession
            | VoiceError::InvalidDevice(_)
            | VoiceError::NoAudioSender
            | VoiceError::Closed => ErrorKind::Rejected,
        }
    }

    /// Text the presentation layer shows to the user, if this category is
    /// user-facing at all.
    pub fn user_notice(&self) -> Option<String> {
        match self {
            VoiceError::PermissionDenied => Some(
                "Microphone access denied. Please allow microphone access in your settings."
                    .to_owned(),
            ),
            VoiceError::DeviceUnavailable(reason) if reason.contains("busy") => Some(
                "Microphone is in use by another application. Please close other apps using the microphone."
                    .to_owned(),
            ),
            VoiceError::DeviceUnavailable(_) => Some(
                "No microphone found. Please connect a microphone and try again.".to_owned(),
            ),
            VoiceError::Signaling(SignalingError::MalformedResponse(_))
            | VoiceError::Signaling(SignalingError::RemoteDescription(_)) => Some(
                "WebRTC connection failed: Invalid server response. Please check your WebRTC backend."
                    .to_owned(),
            ),
            VoiceError::Signaling(err) => Some(format!("WebRTC connection failed: {err}")),
            VoiceError::TransportFailure(_)
            | VoiceError::RelayConfigUnavailable(_)
            | VoiceError::SessionActive
            | VoiceError::NoSession
            | VoiceError::InvalidDevice(_)
            | VoiceError::NoAudioSender
            | VoiceError::Closed => None,
        }
    }
}

impl From<MediaError> for VoiceError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::NotAllowed => VoiceError::PermissionDenied,
            MediaError::NotFound => VoiceError::DeviceUnavailable("not found".to_owned()),
            MediaError::NotReadable(reason) => {
                VoiceError::DeviceUnavailable(format!("busy: {reason}"))
            }
            MediaError::Other(reason) => VoiceError::DeviceUnavailable(reason),
        }
    }
}

impl From<TransportError> for VoiceError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NoSender => VoiceError::NoAudioSender,
            other => VoiceError::TransportFailure(other.to_string()),
        }
    }
}

/// Serializable view of an error for observers.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    pub notice: Option<String>,
}

impl From<&VoiceError> for ErrorReport {
    fn from(err: &VoiceError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            notice: err.user_notice(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_failures_are_classified() {
        assert_eq!(VoiceError::from(MediaError::NotAllowed).kind(), ErrorKind::PermissionDenied);
        assert_eq!(VoiceError::from(MediaError::NotFound).kind(), ErrorKind::DeviceUnavailable);
        let busy = VoiceError::from(MediaError::NotReadable("in use".into()));
        assert_eq!(busy.kind(), ErrorKind::DeviceUnavailable);
        assert!(busy.user_notice().unwrap().contains("in use by another application"));
    }

    #[test]
    fn silent_categories_have_no_notice() {
        assert!(VoiceError::TransportFailure("ice failed".into()).user_notice().is_none());
        assert!(VoiceError::RelayConfigUnavailable("timeout".into()).user_notice().is_none());
    }

    #[test]
    fn malformed_answer_notice_mentions_backend() {
        let err = VoiceError::from(SignalingError::MalformedResponse("missing sdp or type".into()));
        let report = ErrorReport::from(&err);
        assert_eq!(report.kind, ErrorKind::SignalingError);
        assert!(report.notice.unwrap().contains("Invalid server response"));
    }

    #[test]
    fn missing_sender_is_a_rejection() {
        assert_eq!(VoiceError::from(TransportError::NoSender), VoiceError::NoAudioSender);
    }
}
