use tracing::{info, instrument};

use tutor_core::context::LlmContext;
use tutor_core::errors::GatewayError;
use tutor_core::messages::ImageDetail;
use tutor_core::provider::{AgentRole, ModelSource, StreamOptions};
use tutor_core::task::ImagePayload;

use crate::error::EngineError;
use crate::image::image_data_url;
use crate::prompts;

/// Extract the reading passage from an image with one vision call.
///
/// Returns the trimmed text, which may be empty when nothing legible was
/// found. Every failure is reported as [`EngineError::ImageProcessing`].
#[instrument(skip_all, fields(mime = image.mime_type.as_str(), detail = detail.as_str()))]
pub async fn extract_text(
    models: &dyn ModelSource,
    image: &ImagePayload,
    detail: ImageDetail,
) -> Result<String, EngineError> {
    let prompt = prompts::render("ocr", &[])?;
    let context = LlmContext::with_image(image_data_url(image), detail, prompt);

    let client = models
        .model_for(AgentRole::Ocr)
        .map_err(|e| EngineError::ImageProcessing(e.to_string()))?;
    let text = client
        .complete(&context, &StreamOptions::default())
        .await
        .map_err(|e| match e {
            GatewayError::Cancelled => EngineError::Cancelled,
            other => EngineError::ImageProcessing(other.to_string()),
        })?;

    let text = text.trim().to_string();
    info!(chars = text.len(), "ocr complete");
    Ok(text)
}
