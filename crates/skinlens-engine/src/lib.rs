//! Capture flow and analysis pipeline for facial skin scans.
//!
//! A [`ScanSession`] drives credential checks, camera acquisition and image
//! capture; [`AnalysisPipeline`] sends the captured photo to a multimodal
//! model and returns a fully validated [`AnalysisResult`].

pub mod camera;
pub mod capture;
pub mod credentials;
mod error;
pub mod gemini;
pub mod pipeline;
pub mod session;
#[cfg(feature = "v4l")]
pub mod v4l_camera;

pub use camera::{CameraConstraints, CameraDevice, CameraError, CameraStream, FacingMode, NoCamera};
pub use capture::{CaptureError, CapturedImage};
pub use credentials::{CredentialContext, CredentialPicker, NullPicker, PickerError};
pub use error::{AnalysisError, RemoteError};
pub use gemini::{ContentGenerator, GeminiClient, GenerateContentRequest};
pub use pipeline::AnalysisPipeline;
pub use session::{ScanSession, ScanState, SessionError};
pub use skinlens_contracts::analysis::AnalysisResult;
