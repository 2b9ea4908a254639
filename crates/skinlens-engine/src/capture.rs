use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Quality used for every camera snapshot.
pub const CAPTURE_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("the selected file is empty")]
    EmptyUpload,
    #[error("the selected file is not a recognized image; choose a JPEG, PNG or WebP photo")]
    UnrecognizedImage,
    #[error("failed to encode the camera frame: {0}")]
    Encode(String),
}

/// A single still image ready to be sent for analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub mime_type: String,
    pub data_base64: String,
    pub byte_len: usize,
    pub sha256: String,
}

impl CapturedImage {
    fn from_bytes(bytes: &[u8], mime_type: String) -> Self {
        Self {
            mime_type,
            data_base64: BASE64.encode(bytes),
            byte_len: bytes.len(),
            sha256: hex::encode(Sha256::digest(bytes)),
        }
    }

    /// Encodes a camera frame as JPEG.
    pub fn from_frame(frame: &RgbImage) -> Result<Self, CaptureError> {
        let mut bytes = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, CAPTURE_JPEG_QUALITY);
        encoder
            .encode_image(frame)
            .map_err(|err| CaptureError::Encode(err.to_string()))?;
        Ok(Self::from_bytes(&bytes, "image/jpeg".to_string()))
    }

    /// Accepts uploaded file bytes verbatim. The MIME type comes from an
    /// `image/*` hint, then from content sniffing; anything else is rejected.
    pub fn from_upload(bytes: &[u8], mime_hint: Option<&str>) -> Result<Self, CaptureError> {
        if bytes.is_empty() {
            return Err(CaptureError::EmptyUpload);
        }
        let mime_type = mime_hint
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| value.starts_with("image/") && value.len() > "image/".len())
            .or_else(|| sniff_image_mime(bytes).map(str::to_string))
            .ok_or(CaptureError::UnrecognizedImage)?;
        Ok(Self::from_bytes(bytes, mime_type))
    }

    pub fn decoded_bytes(&self) -> Option<Vec<u8>> {
        BASE64.decode(self.data_base64.as_bytes()).ok()
    }
}

pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
}
