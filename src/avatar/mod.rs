//! Avatar animation core — the per-frame compositor for the character's face
//! and body.
//!
//! Layers, each independently timed:
//! - [`scheduler`] / [`talking`]: skeletal idle and talking motion
//! - [`blink`]: randomized eyelid closures on their own targets
//! - [`emotion`]: smooth relaxation toward an emotion preset
//! - [`viseme`]: mouth shapes from the speech spectrum
//!
//! [`compositor`] merges emotion and viseme output; [`controller`] owns
//! everything and drives it from a single `update(dt)` call.

pub mod blend_target;
pub mod blink;
pub mod compositor;
pub mod controller;
pub mod emotion;
pub mod events;
pub mod presets;
pub mod scheduler;
pub mod talking;
pub mod viseme;

pub use blend_target::{BlendLayer, BlendTarget, BlendWeights, ModelCapabilities};
pub use controller::{AvatarController, AvatarFrame};
pub use events::AvatarEvent;
pub use presets::{Emotion, VisemeCode};
pub use scheduler::{AnimationClip, ClipLibrary, GroupSpec, SchedulePolicy};
pub use talking::TalkingState;
pub use viseme::FrequencySample;

#[cfg(test)]
mod tests;
