//! Camera capability seam. Backends hand out at most one live stream; the
//! session owns it and stops it when moving away from the live view.

use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("camera access was denied; allow camera access or upload a photo instead")]
    PermissionDenied,
    #[error("no camera was found; upload a photo instead")]
    NotFound,
    #[error("could not start the camera ({0}); upload a photo instead")]
    Other(String),
}

impl CameraError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "camera_permission_denied",
            Self::NotFound => "camera_not_found",
            Self::Other(_) => "camera_other_failure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    User,
    Environment,
}

impl FacingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Environment => "environment",
        }
    }
}

/// Preferred stream settings. Backends treat the resolution as a hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraConstraints {
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::User,
            ideal_width: 1280,
            ideal_height: 720,
        }
    }
}

pub trait CameraDevice {
    fn open(&mut self, constraints: &CameraConstraints) -> Result<Box<dyn CameraStream>, CameraError>;
}

pub trait CameraStream {
    fn label(&self) -> &str;

    /// Grabs the current frame as RGB.
    fn snapshot(&mut self) -> Result<RgbImage, CameraError>;

    /// Releases the hardware. Called exactly once per stream.
    fn stop(&mut self);
}

/// Backend used when the host has no camera at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCamera;

impl CameraDevice for NoCamera {
    fn open(&mut self, _constraints: &CameraConstraints) -> Result<Box<dyn CameraStream>, CameraError> {
        Err(CameraError::NotFound)
    }
}

/// Converts packed YUYV 4:2:2 to RGB using BT.601 limited-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Option<RgbImage> {
    let expected = (width as usize) * (height as usize) * 2;
    if width == 0 || height == 0 || yuyv.len() < expected {
        return None;
    }
    let mut rgb = Vec::with_capacity(expected / 2 * 3);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let u = f32::from(chunk[1]) - 128.0;
        let v = f32::from(chunk[3]) - 128.0;
        for y in [chunk[0], chunk[2]] {
            let c = 1.164 * (f32::from(y) - 16.0);
            rgb.push(clamp_channel(c + 1.596 * v));
            rgb.push(clamp_channel(c - 0.392 * u - 0.813 * v));
            rgb.push(clamp_channel(c + 2.017 * u));
        }
    }
    RgbImage::from_raw(width, height, rgb)
}

fn clamp_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
