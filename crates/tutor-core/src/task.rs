use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

/// Learner proficiency, 1 (beginner) through 5 (advanced).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Level(u8);

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid comprehension level: {0}, must be 1-5")]
pub struct LevelError(pub i64);

impl Level {
    pub const MIN: Level = Level(1);
    pub const MAX: Level = Level(5);

    pub fn new(value: u8) -> Result<Self, LevelError> {
        if (1..=5).contains(&value) {
            Ok(Self(value))
        } else {
            Err(LevelError(value.into()))
        }
    }

    /// Clamp any integer into the valid range.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(1, 5) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Level {
    fn default() -> Self {
        Self(3)
    }
}

impl TryFrom<u8> for Level {
    type Error = LevelError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> Self {
        level.0
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Image formats accepted for OCR.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageMime {
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/webp")]
    Webp,
}

impl ImageMime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }
}

impl FromStr for ImageMime {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image/jpeg" => Ok(Self::Jpeg),
            "image/png" => Ok(Self::Png),
            "image/webp" => Ok(Self::Webp),
            other => Err(format!("unsupported image type: {other}")),
        }
    }
}

/// Base64-encoded image plus its declared format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePayload {
    pub data: String,
    pub mime_type: ImageMime,
}

/// Classification of an incoming request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Analyze,
    ImageProcess,
    Chat,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::ImageProcess => "image_process",
            Self::Chat => "chat",
        }
    }
}

/// One accepted request. Immutable once constructed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskRequest {
    Analyze {
        text: String,
        level: Level,
    },
    ImageProcess {
        image: ImagePayload,
        level: Level,
    },
    Chat {
        session_id: Option<SessionId>,
        question: String,
        level: Level,
    },
}

impl TaskRequest {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Analyze { .. } => TaskKind::Analyze,
            Self::ImageProcess { .. } => TaskKind::ImageProcess,
            Self::Chat { .. } => TaskKind::Chat,
        }
    }

    pub fn level(&self) -> Level {
        match self {
            Self::Analyze { level, .. } | Self::ImageProcess { level, .. } | Self::Chat { level, .. } => *level,
        }
    }
}
