use tutor_core::errors::GatewayError;

use crate::image::ImageError;

/// Wire `error.code` for failures that end the whole request.
pub const PROCESSING_ERROR: &str = "processing_error";
pub const IMAGE_PROCESSING_ERROR: &str = "image_processing_error";

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("prompt error: {0}")]
    Prompt(String),

    #[error("image processing failed: {0}")]
    ImageProcessing(String),

    #[error("{0}")]
    Internal(String),

    #[error("request cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ImageProcessing(_) => IMAGE_PROCESSING_ERROR,
            _ => PROCESSING_ERROR,
        }
    }

    /// Short classification for logs. Gateway failures keep their own kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Gateway(e) => e.error_kind(),
            Self::Prompt(_) => "prompt",
            Self::ImageProcessing(_) => "image_processing",
            Self::Internal(_) => "internal",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Gateway(GatewayError::Cancelled))
    }
}

impl From<ImageError> for EngineError {
    fn from(e: ImageError) -> Self {
        Self::ImageProcessing(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes() {
        assert_eq!(EngineError::ImageProcessing("x".into()).code(), "image_processing_error");
        assert_eq!(EngineError::Internal("x".into()).code(), "processing_error");
        assert_eq!(EngineError::from(GatewayError::NetworkError("x".into())).code(), "processing_error");
    }

    #[test]
    fn kinds_pass_through_gateway_classification() {
        assert_eq!(EngineError::from(GatewayError::RateLimited { retry_after: None }).kind(), "rate_limited");
        assert_eq!(EngineError::Prompt("p".into()).kind(), "prompt");
        assert_eq!(EngineError::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn cancellation_is_recognised_through_gateway() {
        assert!(EngineError::Cancelled.is_cancelled());
        assert!(EngineError::Gateway(GatewayError::Cancelled).is_cancelled());
        assert!(!EngineError::Prompt("p".into()).is_cancelled());
    }
}
