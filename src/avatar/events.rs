//! Outbound notifications for the host (renderer, UI, logs).

use serde::Serialize;

use super::talking::TalkingState;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "params")]
pub enum AvatarEvent {
    /// The controller finished loading and is ticking.
    #[serde(rename = "ready")]
    Ready,
    /// The skeletal mixer should crossfade to `clip`.
    #[serde(rename = "clip_started")]
    ClipStarted {
        group: Option<String>,
        clip: String,
        fade_secs: f32,
    },
    #[serde(rename = "talking_state")]
    TalkingStateChanged { state: TalkingState },
    #[serde(rename = "emotion_changed")]
    EmotionChanged { label: String },
    /// The viseme performance guard tripped; lip-sync is off until restart.
    #[serde(rename = "lip_sync_disabled")]
    LipSyncDisabled { elapsed_ms: f64, budget_ms: f64 },
}
