//! Presentation-facing handle. Commands go through one task that owns the
//! [`SessionStateMachine`], so they never interleave with inbound events.

mod device_api;
mod session_api;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

use crate::config::WidgetConfig;
use crate::error::VoiceError;
use crate::logger;
use crate::machine::{Collaborators, Diagnostics, SessionStateMachine};
use crate::media::devices::Enumeration;
use crate::media::{MediaPlatform, PlaybackElement};
use crate::notify::{Notification, Notifier, WidgetState};

const COMMAND_QUEUE: usize = 32;

type Reply<T> = oneshot::Sender<T>;

pub(crate) enum Command {
    Start(Reply<Result<(), VoiceError>>),
    Stop(Reply<Result<(), VoiceError>>),
    ToggleMute(Reply<Result<bool, VoiceError>>),
    SelectInput(String, Reply<Result<(), VoiceError>>),
    SelectOutput(String, Reply<Result<(), VoiceError>>),
    Enumerate(Reply<Enumeration>),
    UserInteraction(Reply<()>),
    Snapshot(Reply<WidgetState>),
    Diagnostics(Reply<Diagnostics>),
    Shutdown(Reply<()>),
}

#[derive(Clone)]
pub struct VoiceClient {
    commands: mpsc::Sender<Command>,
    notifier: Notifier,
}

impl VoiceClient {
    /// Spawns the owning task on the current runtime.
    pub fn spawn(collaborators: Collaborators) -> Self {
        let machine = SessionStateMachine::new(collaborators);
        let notifier = machine.notifier();
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        tokio::spawn(serve(machine, rx));
        Self {
            commands: tx,
            notifier,
        }
    }

    /// HTTP signaling against `config.api_url` and `webrtc` transports.
    pub fn connect(
        config: &WidgetConfig,
        media: Arc<dyn MediaPlatform>,
        playback: Arc<dyn PlaybackElement>,
    ) -> Result<Self, VoiceError> {
        logger::init_logging(config);
        let collaborators = Collaborators::with_defaults(config, media, playback)?;
        Ok(Self::spawn(collaborators))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, VoiceError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| VoiceError::Closed)?;
        rx.await.map_err(|_| VoiceError::Closed)
    }
}

async fn dispatch(machine: &mut SessionStateMachine, command: Command) {
    // Клиент мог уйти, не дождавшись ответа
    match command {
        Command::Start(reply) => {
            let _ = reply.send(machine.start().await);
        }
        Command::Stop(reply) => {
            let _ = reply.send(machine.stop().await);
        }
        Command::ToggleMute(reply) => {
            let _ = reply.send(machine.toggle_mute());
        }
        Command::SelectInput(id, reply) => {
            let _ = reply.send(machine.select_input(&id).await);
        }
        Command::SelectOutput(id, reply) => {
            let _ = reply.send(machine.select_output(&id).await);
        }
        Command::Enumerate(reply) => {
            let _ = reply.send(machine.enumerate().await);
        }
        Command::UserInteraction(reply) => {
            machine.user_interaction().await;
            let _ = reply.send(());
        }
        Command::Snapshot(reply) => {
            let _ = reply.send(machine.snapshot());
        }
        Command::Diagnostics(reply) => {
            let _ = reply.send(machine.diagnostics().await);
        }
        Command::Shutdown(reply) => {
            machine.shutdown().await;
            let _ = reply.send(());
        }
    }
}

async fn serve(mut machine: SessionStateMachine, mut commands: mpsc::Receiver<Command>) {
    info!("voice session task started");
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Shutdown(reply)) => {
                    machine.shutdown().await;
                    let _ = reply.send(());
                    break;
                }
                Some(command) => dispatch(&mut machine, command).await,
                None => {
                    debug!("all client handles dropped");
                    machine.shutdown().await;
                    break;
                }
            },
            Some(event) = machine.next_event() => machine.handle_event(event).await,
        }
    }
    info!("voice session task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::peer::types::{IceConnectivity, TransportEvent};
    use crate::session::SessionState;
    use crate::testing::{FakeMedia, FakePlayback, FakeSignaling, FakeTransportFactory};

    fn client() -> (VoiceClient, Arc<FakeTransportFactory>) {
        let transports = FakeTransportFactory::new();
        let client = VoiceClient::spawn(Collaborators {
            signaling: FakeSignaling::new(),
            media: FakeMedia::new(),
            playback: FakePlayback::new(),
            transports: transports.clone(),
        });
        (client, transports)
    }

    async fn wait_for_state(rx: &mut broadcast::Receiver<Notification>, wanted: SessionState) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(Notification::StateChanged { state, .. }) = rx.recv().await {
                    if state == wanted {
                        return;
                    }
                }
            }
        })
        .await
        .expect("state notification not received");
    }

    #[tokio::test]
    async fn commands_and_events_flow_through_one_task() {
        let (client, transports) = client();
        let mut notes = client.subscribe();

        client.start().await.unwrap();
        wait_for_state(&mut notes, SessionState::Connecting).await;

        // ждём, пока транспорт будет создан
        tokio::time::timeout(Duration::from_secs(2), async {
            while transports.created() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        transports
            .latest()
            .emit(TransportEvent::IceConnectivity(IceConnectivity::Completed));
        wait_for_state(&mut notes, SessionState::Connected).await;

        let snapshot = client.snapshot().await.unwrap();
        assert_eq!(snapshot.session_state, SessionState::Connected);
        assert!(snapshot.session_id.is_some());

        assert_eq!(client.toggle_mute().await, Ok(true));
        client.stop().await.unwrap();
        assert_eq!(client.snapshot().await.unwrap().session_state, SessionState::Idle);
    }

    #[tokio::test]
    async fn enumerate_and_select_through_handle() {
        let (client, _) = client();
        let listed = client.enumerate().await.unwrap();
        assert_eq!(listed.inputs[0].label, "No microphone detected");

        client.select_input("mic-2").await.unwrap();
        client.select_output("speaker-2").await.unwrap();
        let snapshot = client.snapshot().await.unwrap();
        assert_eq!(snapshot.selection.input_id(), "mic-2");
        assert_eq!(snapshot.selection.output_id(), "speaker-2");
    }

    #[tokio::test]
    async fn shutdown_closes_the_handle() {
        let (client, _) = client();
        client.shutdown().await.unwrap();
        assert_eq!(client.snapshot().await.unwrap_err(), VoiceError::Closed);
        assert_eq!(client.start().await, Err(VoiceError::Closed));
    }
}
