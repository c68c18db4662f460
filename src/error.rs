//! Error types for the avatar animation core.
//!
//! Only loading and host commands can fail. Per-frame work (`update`,
//! `push_frequency_sample`) never returns an error; subsystems that misbehave
//! at runtime disable themselves instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AvatarError {
    #[error("Unknown emotion label: {0}")]
    UnknownEmotion(String),

    #[error("Unknown animation group: {0}")]
    UnknownGroup(String),

    #[error("Group '{group}' cannot start: base clip '{clip}' is not loaded")]
    MissingBaseClip { group: String, clip: String },

    #[error("No animation group or clip named '{0}'")]
    UnknownClip(String),

    #[error("Preset '{preset}' references unknown blend target '{name}'")]
    UnknownBlendTarget { preset: String, name: String },

    #[error("Blend target '{0}' is not supported by the loaded model")]
    UnsupportedBlendTarget(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AvatarError>;
