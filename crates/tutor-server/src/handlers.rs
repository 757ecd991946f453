//! Route handlers and request validation.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument};

use tutor_core::ids::SessionId;
use tutor_core::task::{Level, TaskRequest};
use tutor_engine::validate_image;

use crate::error::ApiError;
use crate::server::AppState;
use crate::sse::sse_response;

const TEXT_CHARS: (usize, usize) = (10, 5000);
const QUESTION_CHARS: (usize, usize) = (1, 2000);

#[derive(Debug, Deserialize)]
pub struct AnalyzeBody {
    pub text: String,
    pub level: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeImageBody {
    pub image_data: String,
    pub mime_type: String,
    pub level: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub session_id: Option<String>,
    pub question: String,
    pub level: Option<i64>,
}

fn parse_level(level: Option<i64>) -> Result<Level, ApiError> {
    let Some(value) = level else {
        return Ok(Level::default());
    };
    u8::try_from(value)
        .ok()
        .and_then(|v| Level::new(v).ok())
        .ok_or_else(|| ApiError::Validation(format!("level must be between 1 and 5, got {value}")))
}

fn check_length(field: &str, value: &str, (min, max): (usize, usize)) -> Result<(), ApiError> {
    let chars = value.chars().count();
    if chars < min || chars > max {
        return Err(ApiError::Validation(format!(
            "{field} must be {min}-{max} characters, got {chars}"
        )));
    }
    Ok(())
}

impl AnalyzeBody {
    pub fn into_request(self) -> Result<TaskRequest, ApiError> {
        check_length("text", &self.text, TEXT_CHARS)?;
        Ok(TaskRequest::Analyze {
            level: parse_level(self.level)?,
            text: self.text,
        })
    }
}

impl AnalyzeImageBody {
    pub fn into_request(self) -> Result<TaskRequest, ApiError> {
        let level = parse_level(self.level)?;
        let image = validate_image(&self.image_data, &self.mime_type)?;
        Ok(TaskRequest::ImageProcess { image, level })
    }
}

impl ChatBody {
    pub fn into_request(self) -> Result<TaskRequest, ApiError> {
        check_length("question", &self.question, QUESTION_CHARS)?;
        Ok(TaskRequest::Chat {
            session_id: self.session_id.filter(|s| !s.is_empty()).map(SessionId::from_raw),
            level: parse_level(self.level)?,
            question: self.question,
        })
    }
}

fn stream(state: &AppState, request: TaskRequest) -> Response {
    let cancel = state.shutdown.child_token();
    sse_response(state.pipeline.run(request, cancel))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "version": env!("CARGO_PKG_VERSION") }))
}

#[instrument(skip_all)]
pub async fn analyze(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let request = body.into_request()?;
    Ok(stream(&state, request))
}

#[instrument(skip_all)]
pub async fn analyze_image(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeImageBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let request = body.into_request()?;
    Ok(stream(&state, request))
}

#[instrument(skip_all)]
pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let request = body.into_request()?;
    Ok(stream(&state, request))
}

#[instrument(skip(state))]
pub async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    if state.pipeline.sessions().delete(&SessionId::from_raw(id.as_str())) {
        info!(session_id = %id, "session deleted by client");
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(ApiError::SessionNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_core::task::ImageMime;

    const PNG: &str =
        "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    #[test]
    fn level_defaults_and_bounds() {
        assert_eq!(parse_level(None).unwrap(), Level::default());
        assert_eq!(parse_level(Some(5)).unwrap().get(), 5);
        assert!(parse_level(Some(0)).is_err());
        assert!(parse_level(Some(6)).is_err());
        assert!(parse_level(Some(-1)).is_err());
        assert!(parse_level(Some(300)).is_err());
    }

    #[test]
    fn analyze_text_length_is_counted_in_chars() {
        let short = AnalyzeBody { text: "too short".into(), level: None };
        assert!(matches!(short.into_request(), Err(ApiError::Validation(_))));

        // Ten Hangul syllables are thirty bytes but ten characters.
        let korean = AnalyzeBody { text: "가나다라마바사아자차".into(), level: Some(2) };
        assert!(matches!(korean.into_request(), Ok(TaskRequest::Analyze { .. })));

        let long = AnalyzeBody { text: "a".repeat(5001), level: None };
        assert!(long.into_request().is_err());
    }

    #[test]
    fn image_body_is_validated() {
        let ok = AnalyzeImageBody { image_data: PNG.into(), mime_type: "image/png".into(), level: None };
        match ok.into_request().unwrap() {
            TaskRequest::ImageProcess { image, .. } => assert_eq!(image.mime_type, ImageMime::Png),
            other => panic!("unexpected request {other:?}"),
        }

        let gif = AnalyzeImageBody { image_data: PNG.into(), mime_type: "image/gif".into(), level: None };
        assert!(matches!(gif.into_request(), Err(ApiError::InvalidImage(_))));
    }

    #[test]
    fn chat_body_keeps_optional_session() {
        let body = ChatBody { session_id: Some("sess_1".into()), question: "Why?".into(), level: None };
        match body.into_request().unwrap() {
            TaskRequest::Chat { session_id, .. } => assert_eq!(session_id, Some(SessionId::from_raw("sess_1"))),
            other => panic!("unexpected request {other:?}"),
        }

        let blank = ChatBody { session_id: Some(String::new()), question: "Why?".into(), level: None };
        assert!(matches!(blank.into_request(), Ok(TaskRequest::Chat { session_id: None, .. })));

        let empty = ChatBody { session_id: None, question: String::new(), level: None };
        assert!(empty.into_request().is_err());
    }
}
