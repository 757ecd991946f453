pub mod analysis;
pub mod context;
pub mod errors;
pub mod events;
pub mod ids;
pub mod messages;
pub mod provider;
pub mod security;
pub mod stream;
pub mod task;

pub use errors::GatewayError;
pub use ids::SessionId;
pub use provider::{AgentRole, LlmProvider, ModelSource, StreamEventStream, StreamOptions};
pub use task::{ImageMime, ImagePayload, Level, TaskKind, TaskRequest};
