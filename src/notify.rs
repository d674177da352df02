//! State-change notifications for the presentation layer.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::{ErrorReport, VoiceError};
use crate::media::{Device, DeviceSelection};
use crate::session::{SessionId, SessionState};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Notification {
    StateChanged {
        state: SessionState,
        session_id: Option<SessionId>,
    },
    MuteChanged(bool),
    DevicesChanged {
        inputs: Vec<Device>,
        outputs: Vec<Device>,
    },
    SelectionChanged(DeviceSelection),
    Error(ErrorReport),
}

/// Exposed state, as the presentation layer renders it.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WidgetState {
    pub session_state: SessionState,
    pub session_id: Option<SessionId>,
    pub is_muted: bool,
    pub input_devices: Vec<Device>,
    pub output_devices: Vec<Device>,
    pub selection: DeviceSelection,
}

/// Fan-out of [`Notification`]s; slow observers lose the oldest entries.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn send(&self, notification: Notification) {
        trace!(?notification, "notify");
        // Нет подписчиков: не ошибка
        let _ = self.tx.send(notification);
    }

    pub fn state(&self, state: SessionState, session_id: Option<&SessionId>) {
        self.send(Notification::StateChanged {
            state,
            session_id: session_id.cloned(),
        });
    }

    pub fn error(&self, err: &VoiceError) {
        self.send(Notification::Error(ErrorReport::from(err)));
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
