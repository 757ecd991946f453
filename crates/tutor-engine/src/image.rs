use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use tutor_core::task::{ImageMime, ImagePayload};

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("Unsupported image format: {0}. Allowed: image/jpeg, image/png, image/webp")]
    UnsupportedType(String),

    #[error("image data is empty")]
    Empty,

    #[error("Invalid base64 data: {0}")]
    InvalidEncoding(String),

    #[error("Image size ({:.2}MB) exceeds limit (10MB)", megabytes(.bytes))]
    TooLarge { bytes: usize },
}

fn megabytes(bytes: &usize) -> f64 {
    *bytes as f64 / (1024.0 * 1024.0)
}

/// Check format, encoding and decoded size of an uploaded image.
pub fn validate_image(data: &str, mime_type: &str) -> Result<ImagePayload, ImageError> {
    let mime: ImageMime = mime_type
        .parse()
        .map_err(|_| ImageError::UnsupportedType(mime_type.to_string()))?;

    if data.is_empty() {
        return Err(ImageError::Empty);
    }

    let decoded = STANDARD
        .decode(data)
        .map_err(|e| ImageError::InvalidEncoding(e.to_string()))?;
    if decoded.len() > MAX_IMAGE_BYTES {
        return Err(ImageError::TooLarge { bytes: decoded.len() });
    }

    Ok(ImagePayload {
        data: data.to_string(),
        mime_type: mime,
    })
}

/// Inline `data:` URL for vision requests.
pub fn image_data_url(image: &ImagePayload) -> String {
    format!("data:{};base64,{}", image.mime_type.as_str(), image.data)
}
