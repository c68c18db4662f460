pub mod avatar;
pub mod config;
pub mod error;

pub use avatar::{
    AnimationClip, AvatarController, AvatarEvent, AvatarFrame, BlendTarget, BlendWeights,
    ClipLibrary, Emotion, FrequencySample, ModelCapabilities, TalkingState, VisemeCode,
};
pub use config::AvatarConfig;
pub use error::{AvatarError, Result};
