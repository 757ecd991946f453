//! # tutor-engine
//!
//! Streaming orchestration for tutoring requests.
//!
//! A request becomes a [`pipeline::EventStream`]: optional pre-analysis,
//! three token-streaming agents (reading, grammar, vocabulary) running
//! concurrently, a first-available [`multiplexer::Multiplexer`] over their
//! token channels, and per-section results once every agent has finished.
//! Slow single-shot phases (pre-analysis, OCR, chat) run behind a
//! [`heartbeat::HeartbeatStream`] so the client always sees traffic.

#![deny(unsafe_code)]

pub mod agents;
pub mod aggregator;
pub mod channel;
pub mod chat;
pub mod error;
pub mod heartbeat;
pub mod image;
pub mod multiplexer;
pub mod normalize;
pub mod ocr;
pub mod pipeline;
pub mod producer;
pub mod prompts;
pub mod supervisor;
pub mod vocabulary;

pub use error::{EngineError, IMAGE_PROCESSING_ERROR, PROCESSING_ERROR};
pub use image::{validate_image, ImageError, MAX_IMAGE_BYTES};
pub use pipeline::{EventStream, Pipeline, PipelineConfig};
