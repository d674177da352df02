//! Audio endpoint enumeration, selection and live hot-swap.

use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use super::{CaptureConstraints, CaptureHandle, MediaDeviceInfo, MediaPlatform, DEFAULT_DEVICE_ID};
use crate::error::{MediaError, VoiceError};
use crate::media::sink::AudioSinkController;
use crate::session::Session;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Input,
    Output,
}

impl DeviceKind {
    fn default_label(self) -> &'static str {
        match self {
            DeviceKind::Input => "Default Microphone",
            DeviceKind::Output => "Default Speaker",
        }
    }

    fn unknown_label(self) -> &'static str {
        match self {
            DeviceKind::Input => "Unknown Microphone",
            DeviceKind::Output => "Unknown Speaker",
        }
    }

    fn missing_label(self) -> &'static str {
        match self {
            DeviceKind::Input => "No microphone detected",
            DeviceKind::Output => "No speaker detected",
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub label: String,
    pub kind: DeviceKind,
}

impl Device {
    fn from_info(info: &MediaDeviceInfo) -> Self {
        Self {
            id: info.device_id.clone(),
            label: resolve_label(&info.device_id, &info.label, info.kind),
            kind: info.kind,
        }
    }

    fn synthetic_default(kind: DeviceKind) -> Self {
        Self {
            id: DEFAULT_DEVICE_ID.to_owned(),
            label: kind.default_label().to_owned(),
            kind,
        }
    }

    fn placeholder(kind: DeviceKind) -> Self {
        Self {
            id: String::new(),
            label: kind.missing_label().to_owned(),
            kind,
        }
    }
}

/// Платформа может скрывать названия устройств до выдачи разрешения
pub fn resolve_label(device_id: &str, label: &str, kind: DeviceKind) -> String {
    let trimmed = label.trim();
    if !trimmed.is_empty() {
        trimmed.to_owned()
    } else if device_id == DEFAULT_DEVICE_ID {
        kind.default_label().to_owned()
    } else {
        kind.unknown_label().to_owned()
    }
}

/// Current endpoint choice; `None` means nothing chosen yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSelection {
    input: Option<String>,
    output: Option<String>,
}

// Наружу отдаём `{ inputId, outputId }`, пустой выбор как "default"
impl Serialize for DeviceSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DeviceSelection", 2)?;
        state.serialize_field("inputId", self.input_id())?;
        state.serialize_field("outputId", self.output_id())?;
        state.end()
    }
}

impl DeviceSelection {
    pub fn input_id(&self) -> &str {
        self.input.as_deref().unwrap_or(DEFAULT_DEVICE_ID)
    }

    pub fn output_id(&self) -> &str {
        self.output.as_deref().unwrap_or(DEFAULT_DEVICE_ID)
    }

    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }
}

fn first_id_or_default(devices: &[Device]) -> Option<String> {
    devices.first().map(|d| {
        if d.id.is_empty() {
            DEFAULT_DEVICE_ID.to_owned()
        } else {
            d.id.clone()
        }
    })
}

/// Outcome of an enumeration; lists are never empty.
#[derive(Debug, Clone)]
pub struct Enumeration {
    pub inputs: Vec<Device>,
    pub outputs: Vec<Device>,
    /// Set when the lists were degraded to synthetic entries.
    pub degraded: Option<VoiceError>,
}

pub struct MediaDeviceManager {
    platform: Arc<dyn MediaPlatform>,
    inputs: Vec<Device>,
    outputs: Vec<Device>,
    selection: DeviceSelection,
    muted: bool,
}

impl MediaDeviceManager {
    pub fn new(platform: Arc<dyn MediaPlatform>) -> Self {
        Self {
            platform,
            inputs: Vec::new(),
            outputs: Vec::new(),
            selection: DeviceSelection::default(),
            muted: false,
        }
    }

    pub fn inputs(&self) -> &[Device] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Device] {
        &self.outputs
    }

    pub fn selection(&self) -> &DeviceSelection {
        &self.selection
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn capture_constraints(&self) -> CaptureConstraints {
        CaptureConstraints::for_device(self.selection.input_id())
    }

    pub async fn acquire_capture(&self) -> Result<CaptureHandle, VoiceError> {
        acquire(self.platform.as_ref(), &self.capture_constraints()).await
    }

    pub fn platform(&self) -> Arc<dyn MediaPlatform> {
        self.platform.clone()
    }

    pub async fn enumerate(&mut self) -> Enumeration {
        let mut degraded = None;

        // Короткий захват, чтобы платформа раскрыла названия устройств
        match self.platform.acquire_capture(&CaptureConstraints::default()).await {
            Ok(probe) => {
                probe.stop();
                debug!("microphone access granted for device enumeration");
            }
            Err(MediaError::NotAllowed) => {
                warn!("microphone permission refused; offering default devices");
                degraded = Some(VoiceError::PermissionDenied);
            }
            Err(e) => debug!("permission probe failed, enumerating anyway: {e}"),
        }

        if degraded.is_some() {
            self.inputs = vec![Device::synthetic_default(DeviceKind::Input)];
            self.outputs = vec![Device::synthetic_default(DeviceKind::Output)];
        } else {
            match self.platform.enumerate_devices().await {
                Ok(infos) => {
                    self.inputs = collect(&infos, DeviceKind::Input);
                    self.outputs = collect(&infos, DeviceKind::Output);
                    if self.inputs.is_empty() {
                        self.inputs.push(Device::placeholder(DeviceKind::Input));
                    }
                    if self.outputs.is_empty() {
                        self.outputs.push(Device::placeholder(DeviceKind::Output));
                    }
                }
                Err(MediaError::NotAllowed) => {
                    warn!("device enumeration not allowed; offering default devices");
                    self.inputs = vec![Device::synthetic_default(DeviceKind::Input)];
                    self.outputs = vec![Device::synthetic_default(DeviceKind::Output)];
                    degraded = Some(VoiceError::PermissionDenied);
                }
                Err(e) => {
                    warn!("error enumerating devices: {e}");
                    self.inputs = vec![Device::placeholder(DeviceKind::Input)];
                    self.outputs = vec![Device::placeholder(DeviceKind::Output)];
                    degraded = Some(VoiceError::from(e));
                }
            }
        }

        if !self.selection.has_input() {
            self.selection.input = first_id_or_default(&self.inputs);
        }
        if !self.selection.has_output() {
            self.selection.output = first_id_or_default(&self.outputs);
        }

        info!(
            inputs = self.inputs.len(),
            outputs = self.outputs.len(),
            input = self.selection.input_id(),
            output = self.selection.output_id(),
            "devices enumerated"
        );

        Enumeration {
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            degraded,
        }
    }

    /// Selects a microphone, hot-swapping the outbound track of a live
    /// session. On any failure the previous selection and capture stay.
    pub async fn select_input(
        &mut self,
        device_id: &str,
        session: Option<&mut Session>,
    ) -> Result<(), VoiceError> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            warn!("invalid input device id");
            return Err(VoiceError::InvalidDevice(device_id.to_owned()));
        }
        if self.selection.input.as_deref() == Some(device_id) {
            debug!(device = device_id, "input device already selected");
            return Ok(());
        }
        if !self.inputs.is_empty() && !self.inputs.iter().any(|d| d.id == device_id) {
            debug!(device = device_id, "selected input not in the enumerated list");
        }

        let Some(session) = session.filter(|s| s.is_live()) else {
            self.selection.input = Some(device_id.to_owned());
            return Ok(());
        };

        info!(device = device_id, session = %session.id, "switching input device");
        let Some(transport) = session.transport.clone() else {
            return Err(VoiceError::NoSession);
        };
        if !transport.has_audio_sender() {
            warn!("could not find audio sender; keeping current microphone");
            return Err(VoiceError::NoAudioSender);
        }

        let replacement =
            acquire(self.platform.as_ref(), &CaptureConstraints::for_device(device_id)).await?;
        let Some(track) = replacement.first_audio_track() else {
            replacement.stop();
            return Err(VoiceError::DeviceUnavailable("new stream has no audio track".to_owned()));
        };
        if self.muted {
            if let Err(e) = track.set_enabled(false) {
                warn!("could not carry mute over to the new track: {e}");
            }
        }

        if let Err(e) = transport.replace_audio_track(track).await {
            warn!("error replacing audio track: {e}");
            replacement.stop();
            return Err(e.into());
        }

        // Старый захват останавливаем только после успешной замены
        if let Some(previous) = session.capture.replace(replacement) {
            previous.stop();
        }
        self.selection.input = Some(device_id.to_owned());
        info!(device = device_id, "audio track replaced successfully");
        Ok(())
    }

    /// Hands back a capture matching the current input selection. A session
    /// still preparing keeps only the selection, so its capture may have been
    /// requested for the previous device; on failure the prepared capture
    /// stays and the selection goes back to it.
    pub async fn reconcile_capture(
        &mut self,
        capture: CaptureHandle,
        used: &CaptureConstraints,
    ) -> CaptureHandle {
        let wanted = self.capture_constraints();
        if wanted.device_id == used.device_id {
            return capture;
        }

        info!(from = ?used.device_id, to = ?wanted.device_id, "input changed during preparation; re-acquiring");
        match acquire(self.platform.as_ref(), &wanted).await {
            Ok(fresh) => {
                capture.stop();
                fresh
            }
            Err(e) => {
                warn!("keeping the prepared capture: {e}");
                self.selection.input = Some(
                    used.device_id
                        .clone()
                        .unwrap_or_else(|| DEFAULT_DEVICE_ID.to_owned()),
                );
                capture
            }
        }
    }

    pub async fn select_output(
        &mut self,
        device_id: &str,
        sink: &AudioSinkController,
    ) -> Result<(), VoiceError> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            warn!("invalid output device id");
            return Err(VoiceError::InvalidDevice(device_id.to_owned()));
        }
        self.selection.output = Some(device_id.to_owned());
        sink.route_output(device_id).await;
        Ok(())
    }

    /// Flips the mute flag by disabling every local audio track.
    pub fn toggle_mute(&mut self, session: Option<&Session>) -> Result<bool, VoiceError> {
        let Some(capture) = session.and_then(|s| s.capture.as_ref()) else {
            warn!("cannot toggle mute - not connected or no stream");
            return Err(VoiceError::NoSession);
        };
        let tracks = capture.audio_tracks();
        if tracks.is_empty() {
            warn!("no audio tracks found in current stream");
            return Err(VoiceError::NoAudioSender);
        }

        self.muted = !self.muted;
        let enabled = !self.muted;
        for (i, track) in tracks.iter().enumerate() {
            if let Err(e) = track.set_enabled(enabled) {
                warn!("error toggling mute: {e}");
                self.muted = !self.muted;
                for done in &tracks[..i] {
                    let _ = done.set_enabled(!enabled);
                }
                return Err(e.into());
            }
        }

        info!("microphone {}", if self.muted { "muted" } else { "unmuted" });
        Ok(self.muted)
    }

    /// Called when a session ends; new captures start enabled.
    pub fn reset_mute(&mut self) -> bool {
        std::mem::replace(&mut self.muted, false)
    }
}

fn collect(infos: &[MediaDeviceInfo], kind: DeviceKind) -> Vec<Device> {
    infos
        .iter()
        .filter(|info| info.kind == kind)
        .map(Device::from_info)
        .collect()
}

async fn acquire(
    platform: &dyn MediaPlatform,
    constraints: &CaptureConstraints,
) -> Result<CaptureHandle, VoiceError> {
    match platform.acquire_capture(constraints).await {
        Ok(stream) => Ok(CaptureHandle::new(stream)),
        Err(e) => {
            warn!(device = ?constraints.device_id, "capture acquisition failed: {e}");
            Err(e.into())
        }
    }
}
