//! Transport seam between the state machine and a concrete peer connection.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::TransportError;
use crate::media::LocalAudioTrack;
use crate::peer::types::{IceServerList, SessionDescription, TransportDiagnostics, TransportEvent};
use crate::session::{SessionEvent, SessionId};

/// Routes transport callbacks into the state machine, stamped with the id of
/// the session that created the transport.
#[derive(Clone)]
pub struct TransportEventSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl TransportEventSink {
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn emit(&self, event: TransportEvent) {
        trace!(session = %self.session, ?event, "transport event");
        // Машина уже остановлена, событие никому не нужно
        let _ = self.tx.send(SessionEvent::Transport {
            session: self.session.clone(),
            event,
        });
    }
}

impl fmt::Debug for TransportEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportEventSink")
            .field("session", &self.session)
            .finish()
    }
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Adds the single outbound audio sender, fed by `track`.
    async fn add_audio_track(&self, track: Arc<dyn LocalAudioTrack>) -> Result<(), TransportError>;

    fn has_audio_sender(&self) -> bool;

    /// Swaps the track behind the outbound sender without renegotiation.
    async fn replace_audio_track(
        &self,
        track: Arc<dyn LocalAudioTrack>,
    ) -> Result<(), TransportError>;

    /// Creates the ordered side channel used as a secondary liveness signal.
    async fn create_side_channel(&self, label: &str) -> Result<(), TransportError>;

    /// Creates the local offer and installs it as the local description.
    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;

    async fn apply_answer(&self, answer: SessionDescription) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;

    async fn diagnostics(&self) -> TransportDiagnostics;
}

#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        ice_servers: &IceServerList,
        events: TransportEventSink,
    ) -> Result<Arc<dyn PeerTransport>, TransportError>;
}

#[derive(Clone)]
pub struct TransportHandle(Arc<dyn PeerTransport>);

impl TransportHandle {
    pub fn new(transport: Arc<dyn PeerTransport>) -> Self {
        Self(transport)
    }
}

impl std::ops::Deref for TransportHandle {
    type Target = dyn PeerTransport;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle")
            .field("has_audio_sender", &self.0.has_audio_sender())
            .finish()
    }
}
