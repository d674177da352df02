use super::{Command, VoiceClient};
use crate::error::VoiceError;
use crate::machine::Diagnostics;
use crate::notify::WidgetState;

impl VoiceClient {
    /// Begins a new session. A no-op while one is connecting; refused while
    /// one is connected.
    pub async fn start(&self) -> Result<(), VoiceError> {
        self.request(Command::Start).await?
    }

    /// Hangs up; capture and transport are released before this returns.
    pub async fn stop(&self) -> Result<(), VoiceError> {
        self.request(Command::Stop).await?
    }

    /// Клик внутри виджета: снимает блокировку воспроизведения
    pub async fn user_interaction(&self) -> Result<(), VoiceError> {
        self.request(Command::UserInteraction).await
    }

    pub async fn snapshot(&self) -> Result<WidgetState, VoiceError> {
        self.request(Command::Snapshot).await
    }

    pub async fn diagnostics(&self) -> Result<Diagnostics, VoiceError> {
        self.request(Command::Diagnostics).await
    }

    /// Stops any session, releases the playback source and ends the task.
    pub async fn shutdown(&self) -> Result<(), VoiceError> {
        self.request(Command::Shutdown).await
    }
}
