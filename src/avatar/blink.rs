//! Blink Generator — randomized eyelid closures on their own two targets.
//!
//! A blink is a short fixed curve (close, hold, open). The next blink is
//! scheduled independently of the current one finishing, but a blink never
//! starts while another is still in flight.

use rand::rngs::StdRng;
use rand::Rng;

use super::blend_target::{BlendTarget, BlendWeights};
use crate::config::BlinkConfig;

/// Fraction of the blink spent closing.
const CLOSE_PHASE: f32 = 0.3;
/// Fraction of the blink held fully closed.
const HOLD_PHASE: f32 = 0.1;

/// Eyelid closure for normalized blink progress `t` in [0, 1].
pub fn blink_curve(t: f32) -> f32 {
    if !(0.0..=1.0).contains(&t) {
        return 0.0;
    }
    if t < CLOSE_PHASE {
        t / CLOSE_PHASE
    } else if t < CLOSE_PHASE + HOLD_PHASE {
        1.0
    } else {
        let open = (t - CLOSE_PHASE - HOLD_PHASE) / (1.0 - CLOSE_PHASE - HOLD_PHASE);
        (1.0 - open).clamp(0.0, 1.0)
    }
}

pub struct BlinkGenerator {
    config: BlinkConfig,
    rng: StdRng,
    /// Seconds until the next blink attempt. `None` while stopped.
    next_in: Option<f32>,
    /// Elapsed time of the blink in flight.
    active: Option<f32>,
    weight: f32,
    blink_count: u64,
}

impl BlinkGenerator {
    pub fn new(config: BlinkConfig, rng: StdRng) -> Self {
        Self {
            config,
            rng,
            next_in: None,
            active: None,
            weight: 0.0,
            blink_count: 0,
        }
    }

    pub fn start(&mut self) {
        if self.next_in.is_none() {
            self.next_in = Some(self.random_delay());
        }
    }

    /// Stop scheduling new blinks. A blink already in flight still finishes.
    pub fn stop(&mut self) {
        self.next_in = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_in.is_some()
    }

    pub fn is_blinking(&self) -> bool {
        self.active.is_some()
    }

    pub fn blink_count(&self) -> u64 {
        self.blink_count
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn next_blink_in(&self) -> Option<f32> {
        self.next_in
    }

    fn random_delay(&mut self) -> f32 {
        let (lo, hi) = (self.config.min_interval_secs, self.config.max_interval_secs);
        if hi > lo {
            self.rng.gen_range(lo..=hi)
        } else {
            lo
        }
    }

    /// Advance by `dt` seconds and return the current closure weight.
    pub fn update(&mut self, dt: f32) -> f32 {
        let dt = dt.max(0.0);
        let duration = self.config.duration_secs;

        if let Some(elapsed) = self.active.as_mut() {
            *elapsed += dt;
            if *elapsed >= duration {
                self.active = None;
            }
        }

        if let Some(remaining) = self.next_in {
            let remaining = remaining - dt;
            if remaining <= 0.0 {
                if self.active.is_none() {
                    self.active = Some(0.0);
                    self.blink_count += 1;
                }
                let next = (self.random_delay() + remaining).max(0.0);
                self.next_in = Some(next);
            } else {
                self.next_in = Some(remaining);
            }
        }

        self.weight = match self.active {
            Some(elapsed) if duration > 0.0 => blink_curve(elapsed / duration),
            _ => 0.0,
        };
        self.weight
    }

    /// Write the closure onto both eyelid targets.
    pub fn write(&self, weights: &mut BlendWeights) {
        for target in BlendTarget::BLINK {
            weights.set(target, self.weight);
        }
    }
}
