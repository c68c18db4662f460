//! Animation Group Scheduler — base loops with randomized variation clips.
//!
//! Each named group owns a base clip and a list of short one-shot variations.
//! The scheduler decides which clip plays and when a variation fires. Timers
//! are plain countdowns advanced by [`AnimationScheduler::update`], one slot
//! per group, so stopping a group can never cancel another group's timer.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use crate::error::{AvatarError, Result};

/// Upper bound on timer firings processed per group in one update. Keeps a
/// huge `dt` (e.g. after a stalled frame) from spinning through many cycles.
const MAX_FIRINGS_PER_UPDATE: usize = 8;

/// Shortest duration a clip may report. Zero-length clips would otherwise
/// re-fire their chain timer immediately.
const MIN_CLIP_SECS: f32 = 0.05;

// ── Clips ──────────────────────────────────────────────────

/// A loaded skeletal clip. The core only cares about identity and length.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, duration: f32) -> Self {
        Self {
            name: name.into(),
            duration: duration.max(MIN_CLIP_SECS),
        }
    }
}

/// Every clip the asset loader managed to load, by name.
#[derive(Debug, Clone, Default)]
pub struct ClipLibrary {
    clips: HashMap<String, AnimationClip>,
}

impl ClipLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_clips<I: IntoIterator<Item = AnimationClip>>(clips: I) -> Self {
        let mut library = Self::new();
        for clip in clips {
            library.insert(clip);
        }
        library
    }

    pub fn insert(&mut self, clip: AnimationClip) {
        self.clips.insert(clip.name.clone(), clip);
    }

    pub fn get(&self, name: &str) -> Option<&AnimationClip> {
        self.clips.get(name)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

// ── Groups ─────────────────────────────────────────────────

/// Config-side description of a group, by clip name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    pub base: String,
    #[serde(default)]
    pub variations: Vec<String>,
    /// Random delay range (seconds) between variations under the interval policy.
    #[serde(default = "default_interval")]
    pub interval: [f32; 2],
}

fn default_interval() -> [f32; 2] {
    [4.0, 10.0]
}

/// A group whose clips have been resolved against the library.
#[derive(Debug, Clone)]
pub struct AnimationGroup {
    pub name: String,
    pub base: AnimationClip,
    pub variations: Vec<AnimationClip>,
    pub interval: (f32, f32),
}

impl AnimationGroup {
    /// Resolve a spec. Missing variations are dropped with a warning; a
    /// missing base clip is fatal for the group.
    pub fn resolve(spec: &GroupSpec, library: &ClipLibrary) -> Result<Self> {
        let base = library.get(&spec.base).cloned().ok_or_else(|| {
            error!(
                "[Scheduler] Group '{}' has no base clip '{}'",
                spec.name, spec.base
            );
            AvatarError::MissingBaseClip {
                group: spec.name.clone(),
                clip: spec.base.clone(),
            }
        })?;

        let mut variations = Vec::with_capacity(spec.variations.len());
        for name in &spec.variations {
            match library.get(name) {
                Some(clip) => variations.push(clip.clone()),
                None => warn!(
                    "[Scheduler] Variation clip '{}' for group '{}' not loaded — skipping",
                    name, spec.name
                ),
            }
        }

        let [lo, hi] = spec.interval;
        Ok(Self {
            name: spec.name.clone(),
            base,
            variations,
            interval: (lo.min(hi).max(0.0), hi.max(lo).max(0.0)),
        })
    }
}

/// How variations are scheduled while a group is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulePolicy {
    /// Base clip, random pause, one variation, back to base, repeat.
    Interval,
    /// Variations back-to-back with no pause in between.
    Chain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerAction {
    PlayVariation,
    ResumeBase,
}

/// The one outstanding timer a group may own.
#[derive(Debug, Clone, Copy)]
struct GroupTimer {
    remaining: f32,
    action: TimerAction,
}

#[derive(Debug)]
struct GroupRuntime {
    group: AnimationGroup,
    policy: Option<SchedulePolicy>,
    timer: Option<GroupTimer>,
    last_variation: Option<usize>,
}

/// Pick a variation index, avoiding `last` whenever there is an alternative.
pub fn pick_variation(count: usize, last: Option<usize>, rng: &mut impl Rng) -> Option<usize> {
    match (count, last) {
        (0, _) => None,
        (1, _) => Some(0),
        (n, Some(prev)) if prev < n => {
            // Draw from n-1 slots and skip over the previous index.
            let idx = rng.gen_range(0..n - 1);
            Some(if idx >= prev { idx + 1 } else { idx })
        }
        (n, _) => Some(rng.gen_range(0..n)),
    }
}

fn random_delay(range: (f32, f32), rng: &mut impl Rng) -> f32 {
    let (lo, hi) = range;
    if hi > lo {
        rng.gen_range(lo..=hi)
    } else {
        lo
    }
}

// ── Crossfade ──────────────────────────────────────────────

/// A clip switch the host's skeletal mixer should perform.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipChange {
    pub group: Option<String>,
    pub clip: String,
    pub fade_secs: f32,
}

/// Tracks the active clip and the linear crossfade out of the previous one.
#[derive(Debug, Clone)]
pub struct Playback {
    current: Option<String>,
    previous: Option<String>,
    fade_elapsed: f32,
    fade_secs: f32,
}

impl Playback {
    pub fn new(fade_secs: f32) -> Self {
        Self {
            current: None,
            previous: None,
            fade_elapsed: 0.0,
            fade_secs: fade_secs.max(0.0),
        }
    }

    /// Switch to `clip`. Returns the fade duration used, or `None` when the
    /// clip is already the active one.
    fn play(&mut self, clip: &str) -> Option<f32> {
        if self.current.as_deref() == Some(clip) {
            return None;
        }
        self.previous = self.current.replace(clip.to_string());
        self.fade_elapsed = 0.0;
        Some(if self.previous.is_some() {
            self.fade_secs
        } else {
            0.0
        })
    }

    fn advance(&mut self, dt: f32) {
        if self.previous.is_none() {
            return;
        }
        self.fade_elapsed += dt;
        if self.fade_elapsed >= self.fade_secs {
            self.previous = None;
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Mixer weights: the incoming clip fades in while the outgoing one
    /// fades out by the same amount.
    pub fn clip_weights(&self) -> Vec<(&str, f32)> {
        let mut out = Vec::with_capacity(2);
        if let Some(current) = self.current.as_deref() {
            match self.previous.as_deref() {
                Some(prev) if self.fade_secs > 0.0 => {
                    let t = (self.fade_elapsed / self.fade_secs).clamp(0.0, 1.0);
                    out.push((current, t));
                    out.push((prev, 1.0 - t));
                }
                _ => out.push((current, 1.0)),
            }
        }
        out
    }
}

// ── Scheduler ──────────────────────────────────────────────

pub struct AnimationScheduler {
    library: ClipLibrary,
    groups: HashMap<String, GroupRuntime>,
    playback: Playback,
    rng: StdRng,
    changes: Vec<ClipChange>,
}

impl AnimationScheduler {
    pub fn new(library: ClipLibrary, crossfade_secs: f32, rng: StdRng) -> Self {
        Self {
            library,
            groups: HashMap::new(),
            playback: Playback::new(crossfade_secs),
            rng,
            changes: Vec::new(),
        }
    }

    /// Resolve and register a group.
    pub fn register(&mut self, spec: &GroupSpec) -> Result<()> {
        let group = AnimationGroup::resolve(spec, &self.library)?;
        debug!(
            "[Scheduler] Registered group '{}' ({} variations)",
            group.name,
            group.variations.len()
        );
        self.groups.insert(
            group.name.clone(),
            GroupRuntime {
                group,
                policy: None,
                timer: None,
                last_variation: None,
            },
        );
        Ok(())
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn has_clip(&self, name: &str) -> bool {
        self.library.get(name).is_some()
    }

    /// Play the group's base clip and arm variation scheduling.
    pub fn start_group(&mut self, name: &str, policy: SchedulePolicy) -> Result<()> {
        let runtime = self
            .groups
            .get_mut(name)
            .ok_or_else(|| AvatarError::UnknownGroup(name.to_string()))?;

        runtime.policy = Some(policy);
        runtime.timer = None;
        let base = runtime.group.base.clone();

        if !runtime.group.variations.is_empty() {
            let delay = match policy {
                SchedulePolicy::Interval => random_delay(runtime.group.interval, &mut self.rng),
                SchedulePolicy::Chain => base.duration,
            };
            runtime.timer = Some(GroupTimer {
                remaining: delay,
                action: TimerAction::PlayVariation,
            });
        }

        info!("[Scheduler] Started group '{}' ({:?})", name, policy);
        play_into(&mut self.playback, &mut self.changes, Some(name), &base.name);
        Ok(())
    }

    /// Cancel the group's pending timer. Other groups are untouched.
    pub fn stop_group(&mut self, name: &str) -> bool {
        match self.groups.get_mut(name) {
            Some(runtime) => {
                let was_active = runtime.policy.take().is_some();
                runtime.timer = None;
                if was_active {
                    info!("[Scheduler] Stopped group '{}'", name);
                }
                was_active
            }
            None => false,
        }
    }

    /// Stop every active group except `keep`, so at most one group owns the
    /// playback. Returns how many were stopped.
    pub fn stop_other_groups(&mut self, keep: &str) -> usize {
        let others: Vec<String> = self
            .groups
            .iter()
            .filter(|(name, runtime)| name.as_str() != keep && runtime.policy.is_some())
            .map(|(name, _)| name.clone())
            .collect();
        for name in &others {
            self.stop_group(name);
        }
        others.len()
    }

    /// Crossfade to a single clip outside any group's lifecycle.
    pub fn play_clip(&mut self, name: &str) -> Result<()> {
        let clip = self
            .library
            .get(name)
            .ok_or_else(|| AvatarError::UnknownClip(name.to_string()))?;
        let clip_name = clip.name.clone();
        play_into(&mut self.playback, &mut self.changes, None, &clip_name);
        Ok(())
    }

    /// Cancel every outstanding timer.
    pub fn cancel_all(&mut self) {
        for runtime in self.groups.values_mut() {
            runtime.policy = None;
            runtime.timer = None;
        }
    }

    /// Advance crossfades and fire due timers.
    pub fn update(&mut self, dt: f32) {
        let dt = dt.max(0.0);
        self.playback.advance(dt);

        for (name, runtime) in self.groups.iter_mut() {
            let Some(timer) = runtime.timer.as_mut() else {
                continue;
            };
            timer.remaining -= dt;

            let mut firings = 0;
            while let Some(timer) = runtime.timer {
                if timer.remaining > 0.0 || firings >= MAX_FIRINGS_PER_UPDATE {
                    break;
                }
                firings += 1;
                let overshoot = timer.remaining;
                let Some(policy) = runtime.policy else {
                    runtime.timer = None;
                    break;
                };

                let (clip, next) = match timer.action {
                    TimerAction::PlayVariation => {
                        let Some(idx) = pick_variation(
                            runtime.group.variations.len(),
                            runtime.last_variation,
                            &mut self.rng,
                        ) else {
                            runtime.timer = None;
                            break;
                        };
                        runtime.last_variation = Some(idx);
                        let clip = &runtime.group.variations[idx];
                        let next = match policy {
                            SchedulePolicy::Interval => TimerAction::ResumeBase,
                            SchedulePolicy::Chain => TimerAction::PlayVariation,
                        };
                        let timer = GroupTimer {
                            remaining: clip.duration + overshoot,
                            action: next,
                        };
                        (clip.clone(), timer)
                    }
                    TimerAction::ResumeBase => {
                        let delay = random_delay(runtime.group.interval, &mut self.rng);
                        let timer = GroupTimer {
                            remaining: delay + overshoot,
                            action: TimerAction::PlayVariation,
                        };
                        (runtime.group.base.clone(), timer)
                    }
                };

                runtime.timer = Some(next);
                play_into(
                    &mut self.playback,
                    &mut self.changes,
                    Some(name.as_str()),
                    &clip.name,
                );
            }
        }
    }

    pub fn current_clip(&self) -> Option<&str> {
        self.playback.current()
    }

    pub fn clip_weights(&self) -> Vec<(&str, f32)> {
        self.playback.clip_weights()
    }

    /// Seconds until the group's next timer fires, if one is armed.
    pub fn pending_timer(&self, name: &str) -> Option<f32> {
        self.groups
            .get(name)
            .and_then(|r| r.timer)
            .map(|t| t.remaining)
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.groups
            .get(name)
            .map(|r| r.policy.is_some())
            .unwrap_or(false)
    }

    pub fn group(&self, name: &str) -> Option<&AnimationGroup> {
        self.groups.get(name).map(|r| &r.group)
    }

    /// Clip switches since the last call.
    pub fn take_changes(&mut self) -> Vec<ClipChange> {
        std::mem::take(&mut self.changes)
    }
}

fn play_into(
    playback: &mut Playback,
    changes: &mut Vec<ClipChange>,
    group: Option<&str>,
    clip: &str,
) {
    if let Some(fade_secs) = playback.play(clip) {
        debug!("[Scheduler] Clip -> '{}' (fade {:.2}s)", clip, fade_secs);
        changes.push(ClipChange {
            group: group.map(str::to_string),
            clip: clip.to_string(),
            fade_secs,
        });
    }
}
