pub mod converter;
pub mod mock;
pub mod models;
pub mod provider;
pub mod reliable;
pub mod sse;

pub use mock::{MockModels, MockProvider, MockResponse};
pub use models::{ModelRegistry, ModelSpec, ProviderKind};
pub use provider::OpenAiProvider;
pub use reliable::{ReliableConfig, ReliableProvider};
