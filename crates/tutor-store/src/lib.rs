pub mod sessions;

pub use sessions::{Session, SessionStore};
