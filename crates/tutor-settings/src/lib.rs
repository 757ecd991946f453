//! # tutor-settings
//!
//! Configuration for the tutor backend, built once at startup and passed
//! explicitly to every component that needs it.
//!
//! Sources, in priority order:
//! 1. **Compiled defaults** ([`TutorSettings::default()`])
//! 2. **Settings file** (optional JSON, deep-merged over defaults)
//! 3. **Environment variables** (highest priority)
//!
//! ```no_run
//! use std::path::Path;
//! use tutor_settings::load_settings_from;
//!
//! let settings = load_settings_from(Some(Path::new("tutor.json")), |k| std::env::var(k).ok())?;
//! println!("listening on {}:{}", settings.server.host, settings.server.port);
//! # Ok::<(), tutor_settings::SettingsError>(())
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings_from};
pub use types::*;
