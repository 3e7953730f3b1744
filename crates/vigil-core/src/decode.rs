//! Image transport decode: base64 payload → encoded bytes → normalized RGB frame.
//!
//! Kept apart from matching so a corrupt upload fails with its own error
//! before any face work starts.

use base64::Engine;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no image provided")]
    Empty,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unreadable image: {0}")]
    Image(#[from] image::ImageError),
    #[error("image has zero width or height")]
    ZeroSized,
}

/// A decoded still image.
#[derive(Clone)]
pub struct Frame {
    /// RGB8 pixel data, row-major (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// RGB triple at (x, y). Panics if out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Decode a base64 image payload.
///
/// Accepts an optional `data:<mime>;base64,` prefix and surrounding whitespace,
/// as browser canvas captures send them.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let trimmed = payload.trim();
    let body = match trimmed.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => trimmed,
    };
    if body.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(base64::engine::general_purpose::STANDARD.decode(body)?)
}

/// Decode encoded image bytes (PNG, JPEG, ...) into an RGB8 frame.
pub fn decode_image(bytes: &[u8]) -> Result<Frame, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(DecodeError::ZeroSized);
    }
    tracing::trace!(width, height, "decoded image");
    Ok(Frame {
        data: rgb.into_raw(),
        width,
        height,
    })
}
