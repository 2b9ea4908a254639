//! Scan session state machine.
//!
//! ```text
//! Initializing -> CredentialRequired | CameraReady | CameraUnavailable
//! CameraReady | CameraUnavailable -> Captured        (camera snapshot or upload)
//! Captured -> Analyzing -> Captured | CredentialRequired
//! Captured -> CameraReady | CameraUnavailable        (retake)
//! CredentialRequired -> CameraReady | CameraUnavailable | Captured
//! ```
//!
//! The session owns at most one camera stream and stops it exactly once on
//! capture, upload, credential re-entry, close and drop.

use serde_json::{json, Value};
use skinlens_contracts::analysis::AnalysisResult;
use skinlens_contracts::events::{EventPayload, EventWriter};
use thiserror::Error;

use crate::camera::{CameraConstraints, CameraDevice, CameraError, CameraStream};
use crate::capture::{CaptureError, CapturedImage};
use crate::credentials::CredentialContext;
use crate::error::AnalysisError;
use crate::pipeline::AnalysisPipeline;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    Initializing,
    CredentialRequired { reason: String },
    CameraReady,
    CameraUnavailable { reason: String },
    Captured,
    Analyzing,
}

impl ScanState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::CredentialRequired { .. } => "credential_required",
            Self::CameraReady => "camera_ready",
            Self::CameraUnavailable { .. } => "camera_unavailable",
            Self::Captured => "captured",
            Self::Analyzing => "analyzing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("cannot {operation} while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
}

pub struct ScanSession {
    state: ScanState,
    credentials: CredentialContext,
    camera: Box<dyn CameraDevice>,
    constraints: CameraConstraints,
    stream: Option<Box<dyn CameraStream>>,
    camera_error: Option<CameraError>,
    captured: Option<CapturedImage>,
    events: EventWriter,
}

impl ScanSession {
    pub fn new(
        credentials: CredentialContext,
        camera: Box<dyn CameraDevice>,
        events: EventWriter,
    ) -> Self {
        Self {
            state: ScanState::Initializing,
            credentials,
            camera,
            constraints: CameraConstraints::default(),
            stream: None,
            camera_error: None,
            captured: None,
            events,
        }
    }

    pub fn with_constraints(mut self, constraints: CameraConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn captured(&self) -> Option<&CapturedImage> {
        self.captured.as_ref()
    }

    pub fn camera_error(&self) -> Option<&CameraError> {
        self.camera_error.as_ref()
    }

    pub fn has_active_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub fn credentials(&self) -> &CredentialContext {
        &self.credentials
    }

    /// Checks the credential, then tries to bring up the camera. Camera
    /// failures are not errors: the session lands in `CameraUnavailable`.
    pub fn initialize(&mut self) -> Result<(), SessionError> {
        self.release_stream();
        self.captured = None;
        self.state = ScanState::Initializing;
        self.emit(
            "session_started",
            payload([
                ("has_picker", json!(self.credentials.has_picker())),
                ("has_env_key", json!(self.credentials.has_env_key())),
            ]),
        );

        if let Err(err) = self.credentials.ensure_available() {
            self.enter_credential_required(&err);
            return Err(err.into());
        }
        self.emit("credential_checked", EventPayload::new());
        self.acquire_camera();
        Ok(())
    }

    /// Picks a new credential after `CredentialRequired`.
    pub fn select_credential(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, ScanState::CredentialRequired { .. }) {
            return Err(self.invalid_state("select a credential"));
        }
        if let Err(picker_err) = self.credentials.select() {
            let err = if self.credentials.has_picker() {
                AnalysisError::CredentialSelectionFailed(picker_err.to_string())
            } else {
                AnalysisError::CredentialRequiredNoPicker
            };
            self.enter_credential_required(&err);
            return Err(err.into());
        }
        self.emit("credential_checked", EventPayload::new());
        if self.captured.is_some() {
            self.state = ScanState::Captured;
        } else {
            self.acquire_camera();
        }
        Ok(())
    }

    /// Snapshots the live stream as JPEG and releases the camera.
    pub fn capture_from_camera(&mut self) -> Result<&CapturedImage, SessionError> {
        if self.state != ScanState::CameraReady {
            return Err(self.invalid_state("capture from the camera"));
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(self.invalid_state("capture from the camera"));
        };
        let frame = stream.snapshot()?;
        let image = CapturedImage::from_frame(&frame)?;
        self.release_stream();
        Ok(self.store_capture(image, "camera"))
    }

    /// Accepts an uploaded image, releasing any live stream.
    pub fn capture_from_upload(
        &mut self,
        bytes: &[u8],
        mime_hint: Option<&str>,
    ) -> Result<&CapturedImage, SessionError> {
        if !matches!(
            self.state,
            ScanState::CameraReady | ScanState::CameraUnavailable { .. } | ScanState::Captured
        ) {
            return Err(self.invalid_state("upload a photo"));
        }
        let image = CapturedImage::from_upload(bytes, mime_hint)?;
        self.release_stream();
        Ok(self.store_capture(image, "upload"))
    }

    /// Drops the captured image and returns to the live view. Capture and
    /// upload always release the stream, so a fresh one is acquired here.
    pub fn retake(&mut self) -> Result<(), SessionError> {
        if !matches!(
            self.state,
            ScanState::Captured | ScanState::CameraUnavailable { .. }
        ) {
            return Err(self.invalid_state("retake"));
        }
        self.captured = None;
        self.emit("retake", EventPayload::new());
        self.acquire_camera();
        Ok(())
    }

    /// Analyzes the captured image. Credential failures move the session to
    /// `CredentialRequired`; everything else returns it to `Captured`.
    pub fn analyze(&mut self, pipeline: &AnalysisPipeline) -> Result<AnalysisResult, SessionError> {
        let Some(image) = self.captured.as_ref() else {
            return Err(AnalysisError::NoImageToAnalyze.into());
        };
        if self.state != ScanState::Captured {
            return Err(self.invalid_state("analyze"));
        }
        self.state = ScanState::Analyzing;
        self.emit(
            "analysis_started",
            payload([
                ("model", json!(pipeline.model())),
                ("image_sha256", json!(image.sha256)),
            ]),
        );

        match pipeline.analyze(&mut self.credentials, image) {
            Ok(result) => {
                self.state = ScanState::Captured;
                self.emit(
                    "analysis_completed",
                    payload([
                        ("overall_score", Value::Number(result.overall_score.clone())),
                        ("skin_type", json!(result.skin_type.as_str())),
                        ("fitzpatrick_scale", json!(result.fitzpatrick_scale.as_str())),
                    ]),
                );
                Ok(result)
            }
            Err(err) => {
                self.emit(
                    "analysis_failed",
                    payload([("kind", json!(err.kind())), ("message", json!(err.to_string()))]),
                );
                if err.is_credential_error() {
                    self.enter_credential_required(&err);
                } else {
                    self.state = ScanState::Captured;
                }
                Err(err.into())
            }
        }
    }

    /// Releases the camera; used on teardown.
    pub fn close(&mut self) {
        self.release_stream();
        self.emit("session_closed", payload([("state", json!(self.state.name()))]));
    }

    fn acquire_camera(&mut self) {
        self.release_stream();
        match self.camera.open(&self.constraints) {
            Ok(stream) => {
                tracing::info!(
                    camera = stream.label(),
                    facing_mode = self.constraints.facing_mode.as_str(),
                    "camera stream acquired"
                );
                let label = stream.label().to_string();
                self.stream = Some(stream);
                self.camera_error = None;
                self.state = ScanState::CameraReady;
                self.emit("camera_ready", payload([("camera", json!(label))]));
            }
            Err(err) => {
                tracing::warn!(kind = err.kind(), error = %err, "camera unavailable");
                self.emit(
                    "camera_unavailable",
                    payload([("kind", json!(err.kind())), ("message", json!(err.to_string()))]),
                );
                self.state = ScanState::CameraUnavailable {
                    reason: err.to_string(),
                };
                self.camera_error = Some(err);
            }
        }
    }

    fn release_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            tracing::debug!(camera = stream.label(), "camera stream released");
        }
    }

    fn store_capture(&mut self, image: CapturedImage, source: &str) -> &CapturedImage {
        self.emit(
            "image_captured",
            payload([
                ("source", json!(source)),
                ("mime_type", json!(image.mime_type)),
                ("bytes", json!(image.byte_len)),
                ("sha256", json!(image.sha256)),
            ]),
        );
        self.state = ScanState::Captured;
        self.captured.insert(image)
    }

    fn enter_credential_required(&mut self, err: &AnalysisError) {
        self.release_stream();
        self.state = ScanState::CredentialRequired {
            reason: err.to_string(),
        };
        self.emit(
            "credential_required",
            payload([("kind", json!(err.kind())), ("message", json!(err.to_string()))]),
        );
    }

    fn invalid_state(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.state.name(),
        }
    }

    fn emit(&self, event_type: &str, payload: EventPayload) {
        if let Err(err) = self.events.emit(event_type, payload) {
            tracing::warn!(event = event_type, error = %err, "failed to write session event");
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.release_stream();
    }
}

fn payload<const N: usize>(entries: [(&str, Value); N]) -> EventPayload {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
