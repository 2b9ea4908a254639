//! V4L2 camera backend via the `v4l` crate.

use std::io;
use std::path::{Path, PathBuf};

use image::RgbImage;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

use crate::camera::{yuyv_to_rgb, CameraConstraints, CameraDevice, CameraError, CameraStream};

pub const DEFAULT_DEVICE_PATH: &str = "/dev/video0";

/// Frames dropped before a snapshot so auto exposure can settle.
const WARMUP_FRAMES: usize = 3;

#[derive(Debug, Clone)]
pub struct V4lCamera {
    device_path: PathBuf,
}

impl V4lCamera {
    pub fn new(device_path: impl Into<PathBuf>) -> Self {
        Self {
            device_path: device_path.into(),
        }
    }

    pub fn device_path(&self) -> &Path {
        &self.device_path
    }
}

impl Default for V4lCamera {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE_PATH)
    }
}

impl CameraDevice for V4lCamera {
    fn open(&mut self, constraints: &CameraConstraints) -> Result<Box<dyn CameraStream>, CameraError> {
        if !self.device_path.exists() {
            return Err(CameraError::NotFound);
        }
        let device = Device::with_path(&self.device_path).map_err(map_open_error)?;
        let caps = device
            .query_caps()
            .map_err(|err| CameraError::Other(format!("failed to query capabilities: {err}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::NotFound);
        }

        let mut fmt = device
            .format()
            .map_err(|err| CameraError::Other(format!("failed to get format: {err}")))?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = constraints.ideal_width;
        fmt.height = constraints.ideal_height;
        let negotiated = device
            .set_format(&fmt)
            .map_err(|err| CameraError::Other(format!("failed to set format: {err}")))?;
        if negotiated.fourcc != FourCC::new(b"YUYV") {
            return Err(CameraError::Other(format!(
                "unsupported pixel format {:?} (need YUYV)",
                negotiated.fourcc
            )));
        }

        tracing::info!(
            device = %self.device_path.display(),
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            "opened camera"
        );
        Ok(Box::new(V4lStream {
            device: Some(device),
            label: caps.card,
            width: negotiated.width,
            height: negotiated.height,
        }))
    }
}

pub struct V4lStream {
    device: Option<Device>,
    label: String,
    width: u32,
    height: u32,
}

impl CameraStream for V4lStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn snapshot(&mut self) -> Result<RgbImage, CameraError> {
        let Some(device) = self.device.as_ref() else {
            return Err(CameraError::Other("camera stream already stopped".to_string()));
        };
        let mut stream = MmapStream::with_buffers(device, BufType::VideoCapture, 4)
            .map_err(|err| CameraError::Other(format!("failed to create mmap stream: {err}")))?;
        let mut last = Vec::new();
        for _ in 0..=WARMUP_FRAMES {
            let (buf, _meta) = stream
                .next()
                .map_err(|err| CameraError::Other(format!("failed to dequeue buffer: {err}")))?;
            last.clear();
            last.extend_from_slice(buf);
        }
        yuyv_to_rgb(&last, self.width, self.height).ok_or_else(|| {
            CameraError::Other(format!(
                "YUYV buffer too short for {}x{}: {} bytes",
                self.width,
                self.height,
                last.len()
            ))
        })
    }

    fn stop(&mut self) {
        if self.device.take().is_some() {
            tracing::debug!(camera = %self.label, "closed camera device");
        }
    }
}

fn map_open_error(err: io::Error) -> CameraError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => CameraError::PermissionDenied,
        io::ErrorKind::NotFound => CameraError::NotFound,
        _ => CameraError::Other(err.to_string()),
    }
}
