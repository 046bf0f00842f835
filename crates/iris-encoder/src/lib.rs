//! Still-frame encoding: raw RGB capture buffer to a JPEG data URI.

use base64::{engine::general_purpose, Engine as _};
use image::{codecs::jpeg::JpegEncoder, ColorType};
use iris_types::{config::EncoderConfig, frame::CameraFrame, IrisError, Result};

const DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Encodes frames at a fixed lossy quality.
///
/// Dimensions come from the frame itself on every call, so a feed that
/// changes resolution mid-session is handled transparently.
pub struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    pub fn new(config: &EncoderConfig) -> Self {
        let quality = (config.jpeg_quality * 100.0).round().clamp(1.0, 100.0) as u8;
        Self { quality }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn encode(&self, frame: &CameraFrame) -> Result<String> {
        if frame.width == 0 || frame.height == 0 {
            return Err(encode_error("cannot encode an empty frame"));
        }
        let expected = frame.width as usize * frame.height as usize * 3;
        if frame.data.len() != expected {
            return Err(encode_error(format!(
                "frame buffer is {} bytes, expected {} for {}x{} RGB",
                frame.data.len(),
                expected,
                frame.width,
                frame.height
            )));
        }

        let mut jpeg = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, self.quality);
        encoder
            .encode(&frame.data, frame.width, frame.height, ColorType::Rgb8)
            .map_err(|err| encode_error(format!("jpeg encode failed: {err}")))?;

        let mut uri = String::with_capacity(DATA_URI_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
        uri.push_str(DATA_URI_PREFIX);
        uri.push_str(&general_purpose::STANDARD.encode(&jpeg));
        Ok(uri)
    }
}

pub fn encode_error(message: impl Into<String>) -> IrisError {
    IrisError::Encode(message.into())
}
