//! # tutor-server
//!
//! HTTP surface for the tutor: JSON requests in, Server-Sent Events out.
//! Requests are validated here; everything after validation streams.

#![deny(unsafe_code)]

pub mod error;
pub mod handlers;
pub mod server;
pub mod sse;

pub use error::ApiError;
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
