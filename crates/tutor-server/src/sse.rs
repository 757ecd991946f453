//! Server-Sent Events framing for pipeline output.

use std::convert::Infallible;

use axum::http::{header, HeaderValue};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;

use tutor_core::events::TutorEvent;
use tutor_engine::EventStream;

/// Typed events become `event:`/`data:` frames; the keep-alive becomes a comment.
pub fn to_sse_event(event: &TutorEvent) -> Event {
    match event.event_type() {
        Some(tag) => Event::default().event(tag).data(event.payload().to_string()),
        None => Event::default().comment("heartbeat"),
    }
}

/// Stream `events` to the client. Dropping the response body drops the pipeline stream.
pub fn sse_response(events: EventStream) -> Response {
    let frames = events.map(|event| Ok::<_, Infallible>(to_sse_event(&event)));
    let mut response = Sse::new(frames).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}
