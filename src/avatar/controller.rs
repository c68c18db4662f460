//! Avatar Controller — owns every animation layer and runs them once per tick.
//!
//! Tick order: skeletal scheduling, blink, emotion relaxation, viseme
//! detection, then compositor resolution. Host commands (`set_emotion`,
//! `start_talking`, `stop_talking`, `play_animation`) are applied in full
//! before they return, so the next tick always sees a consistent state.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

use super::blend_target::{BlendTarget, BlendWeights, ModelCapabilities};
use super::blink::BlinkGenerator;
use super::compositor::Compositor;
use super::emotion::EmotionBlender;
use super::events::AvatarEvent;
use super::presets::{
    default_emotion_table, default_viseme_table, Emotion, VisemeCode, VisemeTable,
};
use super::scheduler::{AnimationScheduler, ClipLibrary, SchedulePolicy};
use super::talking::{TalkingController, TalkingState};
use super::viseme::{FrequencySample, VisemeDetector};
use crate::config::AvatarConfig;
use crate::error::{AvatarError, Result};

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone, Serialize)]
pub struct AvatarFrame {
    pub weights: BlendWeights,
    pub viseme: VisemeCode,
    pub talking: TalkingState,
    pub emotion: Emotion,
}

impl Default for AvatarFrame {
    fn default() -> Self {
        Self {
            weights: BlendWeights::new(),
            viseme: VisemeCode::Sil,
            talking: TalkingState::Idle,
            emotion: Emotion::Neutral,
        }
    }
}

pub struct AvatarController {
    scheduler: AnimationScheduler,
    talking: TalkingController,
    blink: BlinkGenerator,
    emotion: EmotionBlender,
    visemes: VisemeTable,
    detector: VisemeDetector,
    compositor: Compositor,
    sample: Option<FrequencySample>,
    frame: AvatarFrame,
    events: Vec<AvatarEvent>,
    torn_down: bool,
}

impl AvatarController {
    pub fn new(
        config: AvatarConfig,
        library: ClipLibrary,
        capabilities: &ModelCapabilities,
    ) -> Result<Self> {
        Self::build(config, library, capabilities, StdRng::from_entropy())
    }

    /// Same as [`AvatarController::new`] with deterministic randomness.
    pub fn with_seed(
        config: AvatarConfig,
        library: ClipLibrary,
        capabilities: &ModelCapabilities,
        seed: u64,
    ) -> Result<Self> {
        Self::build(config, library, capabilities, StdRng::seed_from_u64(seed))
    }

    fn build(
        config: AvatarConfig,
        library: ClipLibrary,
        capabilities: &ModelCapabilities,
        mut rng: StdRng,
    ) -> Result<Self> {
        config.validate()?;

        let mut emotions = default_emotion_table();
        emotions.apply_overrides(&config.presets.emotions)?;
        emotions.validate(capabilities)?;

        let mut visemes = default_viseme_table();
        visemes.apply_overrides(&config.presets.visemes)?;
        visemes.validate(capabilities)?;

        for target in BlendTarget::BLINK {
            capabilities.require(target)?;
        }

        let anim = &config.animation;
        let mut scheduler = AnimationScheduler::new(
            library,
            anim.crossfade_secs,
            StdRng::seed_from_u64(rng.gen()),
        );
        for spec in &anim.groups {
            scheduler.register(spec)?;
        }

        let mut talking = TalkingController::new(&anim.idle_group, &anim.talking_group);
        talking.begin(&mut scheduler)?;

        let mut blink = BlinkGenerator::new(config.blink.clone(), StdRng::seed_from_u64(rng.gen()));
        blink.start();

        let mut controller = Self {
            scheduler,
            talking,
            blink,
            emotion: EmotionBlender::new(emotions, &config.emotion),
            visemes,
            detector: VisemeDetector::new(config.viseme.clone()),
            compositor: Compositor::new(),
            sample: None,
            frame: AvatarFrame::default(),
            events: Vec::new(),
            torn_down: false,
        };
        controller.flush_clip_changes();
        controller.resolve();
        controller.events.push(AvatarEvent::Ready);
        info!("[Avatar] Ready");
        Ok(controller)
    }

    // ── Host commands ──────────────────────────────────────

    /// Switch the target expression. Unknown labels are rejected with a
    /// warning and leave the current expression untouched.
    pub fn set_emotion(&mut self, label: &str) -> Result<()> {
        if self.emotion.set_emotion(label)? {
            let label = self.emotion.target().to_string();
            info!("[Avatar] Emotion -> {}", label);
            self.events.push(AvatarEvent::EmotionChanged { label });
        }
        Ok(())
    }

    pub fn start_talking(&mut self) -> Result<()> {
        if self.torn_down {
            debug!("[Avatar] start_talking after teardown ignored");
            return Ok(());
        }
        if self.talking.start_talking(&mut self.scheduler)? {
            if self.detector.lip_sync_available() {
                self.detector.enable();
            }
            self.events.push(AvatarEvent::TalkingStateChanged {
                state: TalkingState::Talking,
            });
            self.flush_clip_changes();
        }
        Ok(())
    }

    /// Leave the talking state. Viseme contribution is removed right away,
    /// not on the next tick.
    pub fn stop_talking(&mut self) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        if self.talking.stop_talking(&mut self.scheduler)? {
            self.release_lip_sync();
            self.events.push(AvatarEvent::TalkingStateChanged {
                state: TalkingState::Idle,
            });
            self.flush_clip_changes();
        }
        Ok(())
    }

    /// Force a group or a single clip, outside the idle/talking lifecycle.
    /// A forced group replaces whichever group is armed and starts under its
    /// usual policy. A bare clip plays once with a crossfade and leaves every
    /// group timer alone. The talking state is not changed either way.
    pub fn play_animation(&mut self, name: &str) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        if self.scheduler.has_group(name) {
            let policy = if name == self.talking.talking_group() {
                SchedulePolicy::Chain
            } else {
                SchedulePolicy::Interval
            };
            self.scheduler.stop_other_groups(name);
            self.scheduler.start_group(name, policy)?;
        } else if self.scheduler.has_clip(name) {
            self.scheduler.play_clip(name)?;
        } else {
            return Err(AvatarError::UnknownClip(name.to_string()));
        }
        info!("[Avatar] Forced animation '{}'", name);
        self.flush_clip_changes();
        Ok(())
    }

    /// Spectrum for the next tick. Ignored unless talking; consumed by one
    /// `update`, so a tick without a fresh sample rests the mouth.
    pub fn push_frequency_sample(&mut self, sample: FrequencySample) {
        if self.detector.is_enabled() {
            self.sample = Some(sample);
        }
    }

    // ── Tick ───────────────────────────────────────────────

    /// Advance every layer by `dt` seconds and resolve the frame.
    pub fn update(&mut self, dt: f32) -> &AvatarFrame {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        self.scheduler.update(dt);
        self.flush_clip_changes();

        self.blink.update(dt);
        self.emotion.update();

        if self.talking.state() == TalkingState::Talking && self.detector.is_enabled() {
            match self.sample.take() {
                Some(sample) => {
                    self.detector.detect(&sample);
                }
                None => self.detector.rest(),
            }
            if let Some(trip) = self.detector.take_trip() {
                self.events.push(AvatarEvent::LipSyncDisabled {
                    elapsed_ms: trip.elapsed.as_secs_f64() * 1000.0,
                    budget_ms: trip.budget.as_secs_f64() * 1000.0,
                });
            }
        }

        self.resolve();
        &self.frame
    }

    fn resolve(&mut self) {
        let viseme = self.detector.current();
        let composed = self
            .compositor
            .compose(self.emotion.current(), self.visemes.weights(viseme));
        let mut weights = composed.clone();
        self.blink.write(&mut weights);

        self.frame = AvatarFrame {
            weights,
            viseme,
            talking: self.talking.state(),
            emotion: self.emotion.target(),
        };
    }

    fn release_lip_sync(&mut self) {
        self.detector.disable();
        self.sample = None;
        self.compositor.suppress_viseme_once();
        self.resolve();
    }

    fn flush_clip_changes(&mut self) {
        for change in self.scheduler.take_changes() {
            self.events.push(AvatarEvent::ClipStarted {
                group: change.group,
                clip: change.clip,
                fade_secs: change.fade_secs,
            });
        }
    }

    /// Cancel all timers and stop every layer that schedules work.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.scheduler.cancel_all();
        self.blink.stop();
        self.release_lip_sync();
        self.torn_down = true;
        info!("[Avatar] Torn down");
    }

    // ── Accessors ──────────────────────────────────────────

    pub fn frame(&self) -> &AvatarFrame {
        &self.frame
    }

    pub fn drain_events(&mut self) -> Vec<AvatarEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn talking_state(&self) -> TalkingState {
        self.talking.state()
    }

    pub fn emotion(&self) -> Emotion {
        self.emotion.target()
    }

    /// Emotion layer weights before compositing.
    pub fn emotion_weights(&self) -> &BlendWeights {
        self.emotion.current()
    }

    pub fn viseme(&self) -> VisemeCode {
        self.detector.current()
    }

    pub fn lip_sync_available(&self) -> bool {
        self.detector.lip_sync_available()
    }

    pub fn current_clip(&self) -> Option<&str> {
        self.scheduler.current_clip()
    }

    pub fn clip_weights(&self) -> Vec<(&str, f32)> {
        self.scheduler.clip_weights()
    }

    pub fn scheduler(&self) -> &AnimationScheduler {
        &self.scheduler
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    #[cfg(test)]
    pub(crate) fn detector_mut(&mut self) -> &mut VisemeDetector {
        &mut self.detector
    }
}
