//! Session value, its states and the pure transition table.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::error::{SignalingError, VoiceError};
use crate::media::{CaptureConstraints, CaptureHandle};
use crate::peer::transport::TransportHandle;
use crate::peer::types::{IceServerList, SessionDescription, TransportEvent};
use crate::utils::random_id;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    /// Transient: reported to observers, then normalized to `Idle`.
    Failed,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Connected)
    }
}

/// `webrtc_id` одной попытки согласования
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(random_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Start,
    Promote,
    Fail,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Moved(SessionState),
    /// Nothing to do; logged and dropped.
    Ignored,
    /// The command is refused and the caller is told why.
    Rejected,
}

/// Таблица переходов. Побочные эффекты выполняет машина состояний.
pub fn transition(current: SessionState, trigger: Trigger) -> Outcome {
    use SessionState::*;

    match (current, trigger) {
        (Idle | Failed, Trigger::Start) => Outcome::Moved(Connecting),
        (Connecting, Trigger::Start) => Outcome::Ignored,
        (Connected, Trigger::Start) => Outcome::Rejected,

        (Connecting, Trigger::Promote) => Outcome::Moved(Connected),
        (_, Trigger::Promote) => Outcome::Ignored,

        (Connecting | Connected, Trigger::Fail) => Outcome::Moved(Failed),
        (_, Trigger::Fail) => Outcome::Ignored,

        (Connecting | Connected, Trigger::Stop) => Outcome::Moved(Idle),
        (_, Trigger::Stop) => Outcome::Ignored,
    }
}

/// Result of the first negotiation stage: relay config plus local capture.
#[derive(Debug)]
pub struct Prepared {
    pub ice_servers: IceServerList,
    pub capture: CaptureHandle,
    /// What the capture was requested with; the selection may have moved on.
    pub constraints: CaptureConstraints,
}

/// Inbound events consumed by the state machine, each tagged with the session
/// that produced it.
#[derive(Debug)]
pub enum SessionEvent {
    Prepared {
        session: SessionId,
        result: Result<Prepared, VoiceError>,
    },
    Answered {
        session: SessionId,
        result: Result<SessionDescription, SignalingError>,
    },
    Transport {
        session: SessionId,
        event: TransportEvent,
    },
}

impl SessionEvent {
    pub fn session(&self) -> &SessionId {
        match self {
            SessionEvent::Prepared { session, .. }
            | SessionEvent::Answered { session, .. }
            | SessionEvent::Transport { session, .. } => session,
        }
    }
}

#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub state: SessionState,
    pub capture: Option<CaptureHandle>,
    pub transport: Option<TransportHandle>,
    pub side_channel: Option<String>,
    pub started_at: DateTime<Utc>,
    tasks: Vec<AbortHandle>,
}

impl Session {
    pub fn connecting(id: SessionId) -> Self {
        Self {
            id,
            state: SessionState::Connecting,
            capture: None,
            transport: None,
            side_channel: None,
            started_at: Utc::now(),
            tasks: Vec::new(),
        }
    }

    /// Capture and transport are both in place.
    pub fn is_live(&self) -> bool {
        self.capture.is_some() && self.transport.is_some()
    }

    pub fn track_task(&mut self, handle: AbortHandle) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(handle);
    }

    /// Stops capture synchronously, cancels session-scoped tasks and closes
    /// the transport.
    pub async fn teardown(mut self) {
        if let Some(capture) = self.capture.take() {
            debug!(session = %self.id, capture = capture.id(), "stopping local capture");
            capture.stop();
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.side_channel = None;
        if let Some(transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                warn!(session = %self.id, "failed to close transport: {e}");
            }
        }
        debug!(
            session = %self.id,
            lasted_ms = (Utc::now() - self.started_at).num_milliseconds(),
            "session released"
        );
    }
}
