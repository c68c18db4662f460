//! Emotion Expression Blender — exponential relaxation toward a preset.
//!
//! Every tick each tracked target moves a fixed fraction of the remaining
//! distance toward the active preset. A new emotion simply becomes the new
//! relaxation point, so switching mid-transition never jumps.

use tracing::{debug, warn};

use super::blend_target::BlendWeights;
use super::presets::{Emotion, EmotionTable};
use crate::config::EmotionConfig;
use crate::error::Result;

pub struct EmotionBlender {
    presets: EmotionTable,
    target: Emotion,
    current: BlendWeights,
    speed: f32,
    epsilon: f32,
}

impl EmotionBlender {
    pub fn new(presets: EmotionTable, config: &EmotionConfig) -> Self {
        Self {
            presets,
            target: Emotion::Neutral,
            current: BlendWeights::new(),
            speed: config.speed.clamp(f32::EPSILON, 1.0),
            epsilon: config.epsilon.max(0.0),
        }
    }

    /// Switch the target preset by label. Unknown labels are rejected and
    /// leave the current preset in place.
    pub fn set_emotion(&mut self, label: &str) -> Result<bool> {
        match label.parse::<Emotion>() {
            Ok(emotion) => Ok(self.set(emotion)),
            Err(e) => {
                warn!(
                    "[Emotion] Rejected unknown emotion '{}' — keeping '{}'",
                    label, self.target
                );
                Err(e)
            }
        }
    }

    /// Returns `false` when `emotion` is already the target.
    pub fn set(&mut self, emotion: Emotion) -> bool {
        if emotion == self.target {
            return false;
        }
        debug!("[Emotion] Target {} -> {}", self.target, emotion);
        self.target = emotion;
        true
    }

    pub fn target(&self) -> Emotion {
        self.target
    }

    pub fn current(&self) -> &BlendWeights {
        &self.current
    }

    pub fn presets(&self) -> &EmotionTable {
        &self.presets
    }

    /// One relaxation step over every target in either the active preset or
    /// the currently applied weights.
    pub fn update(&mut self) {
        let preset = self.presets.weights(self.target);
        let mut tracked: Vec<_> = self.current.targets().collect();
        for target in preset.targets() {
            if !tracked.contains(&target) {
                tracked.push(target);
            }
        }

        for target in tracked {
            let goal = preset.get(target);
            let now = self.current.get(target);
            let next = now + (goal - now) * self.speed;
            if (goal - next).abs() <= self.epsilon {
                if goal == 0.0 {
                    self.current.remove(target);
                } else {
                    self.current.set(target, goal);
                }
            } else {
                self.current.set(target, next);
            }
        }
    }

    /// True once the applied weights match the active preset.
    pub fn is_settled(&self) -> bool {
        let preset = self.presets.weights(self.target);
        self.current.iter().all(|(t, w)| w == preset.get(t))
            && preset.iter().all(|(t, w)| self.current.get(t) == w)
    }
}
