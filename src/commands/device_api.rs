use super::{Command, VoiceClient};
use crate::error::VoiceError;
use crate::media::devices::Enumeration;

impl VoiceClient {
    pub async fn enumerate(&self) -> Result<Enumeration, VoiceError> {
        self.request(Command::Enumerate).await
    }

    /// Switches the microphone; a live session keeps its old capture if the
    /// new one can't be acquired.
    pub async fn select_input(&self, device_id: impl Into<String>) -> Result<(), VoiceError> {
        let id = device_id.into();
        self.request(|reply| Command::SelectInput(id, reply)).await?
    }

    pub async fn select_output(&self, device_id: impl Into<String>) -> Result<(), VoiceError> {
        let id = device_id.into();
        self.request(|reply| Command::SelectOutput(id, reply)).await?
    }

    /// Returns the new mute flag.
    pub async fn toggle_mute(&self) -> Result<bool, VoiceError> {
        self.request(Command::ToggleMute).await?
    }
}
