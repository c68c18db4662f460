//! Blend Target Compositor — merges emotion and viseme weights per target.
//!
//! The compositor owns no timers. Each tick it sums the emotion blender's
//! relaxed weight and the active viseme's weight for every mouth/brow/cheek
//! target and clamps the result to [0, 1]. Blink targets never pass through
//! here.

use super::blend_target::{BlendLayer, BlendTarget, BlendWeights};

#[derive(Debug, Default)]
pub struct Compositor {
    output: BlendWeights,
    suppress_viseme: bool,
    last_pass_ran: bool,
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the viseme contribution to zero for the next pass.
    pub fn suppress_viseme_once(&mut self) {
        self.suppress_viseme = true;
    }

    /// Resolve one frame. Targets that fell to zero are written as 0.0 once
    /// and then dropped, so the renderer always sees them released.
    pub fn compose(&mut self, emotion: &BlendWeights, viseme: &BlendWeights) -> &BlendWeights {
        let suppress = std::mem::take(&mut self.suppress_viseme);
        let viseme_live = !suppress && !viseme.is_zero();

        if emotion.is_zero() && !viseme_live && self.output.is_zero() {
            self.last_pass_ran = false;
            return &self.output;
        }

        let mut targets: Vec<BlendTarget> = emotion.targets().collect();
        if !suppress {
            targets.extend(viseme.targets());
        }
        targets.extend(self.output.targets());
        targets.sort();
        targets.dedup();

        let mut next = BlendWeights::new();
        for target in targets {
            if target.layer() != BlendLayer::Expression {
                continue;
            }
            let from_viseme = if suppress { 0.0 } else { viseme.get(target) };
            let weight = (emotion.get(target) + from_viseme).clamp(0.0, 1.0);
            if weight > 0.0 || self.output.get(target) > 0.0 {
                next.set(target, weight);
            }
        }

        self.output = next;
        self.last_pass_ran = true;
        &self.output
    }

    pub fn output(&self) -> &BlendWeights {
        &self.output
    }

    /// Whether the most recent `compose` call produced a pass.
    pub fn ran_last_tick(&self) -> bool {
        self.last_pass_ran
    }
}
