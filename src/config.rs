//! Avatar configuration and shared helpers for loading/saving JSON config files.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::avatar::presets::{PresetOverrides, VisemeCode};
use crate::avatar::scheduler::GroupSpec;
use crate::avatar::viseme::{default_rules, VisemeRule};
use crate::error::{AvatarError, Result};

/// Read a JSON config section, or its defaults when the file is absent or
/// malformed. A missing file is normal on first run; anything else is warned.
pub fn load_json_config<T: DeserializeOwned + Default>(path: &Path, label: &str) -> T {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("[{}] {} absent, built-in defaults apply", label, path.display());
            return T::default();
        }
        Err(e) => {
            warn!("[{}] Cannot read {}: {}", label, path.display(), e);
            return T::default();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e: serde_json::Error| {
        warn!(
            "[{}] {} rejected at line {} col {}: {}",
            label,
            path.display(),
            e.line(),
            e.column(),
            e
        );
        T::default()
    })
}

/// Write pretty JSON through a sibling temp file, so a crash mid-write never
/// leaves a truncated config behind.
pub fn save_json_config<T: Serialize>(path: &Path, config: &T, label: &str) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let staging = path.with_extension("json.tmp");
    std::fs::write(&staging, serde_json::to_vec_pretty(config)?)?;
    std::fs::rename(&staging, path)?;
    debug!("[{}] Wrote {}", label, path.display());
    Ok(())
}

// ── Avatar Config ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvatarConfig {
    #[serde(default)]
    pub animation: AnimationConfig,
    #[serde(default)]
    pub blink: BlinkConfig,
    #[serde(default)]
    pub emotion: EmotionConfig,
    #[serde(default)]
    pub viseme: VisemeConfig,
    #[serde(default)]
    pub presets: PresetConfig,
}

impl AvatarConfig {
    /// Load the avatar section from `path`. A file that parses but fails
    /// validation is discarded as a whole rather than half-applied.
    pub fn load_or_default(path: &Path) -> Self {
        let config: Self = load_json_config(path, "Avatar");
        match config.validate() {
            Ok(()) => {
                info!("[Avatar] Config ready from {}", path.display());
                config
            }
            Err(e) => {
                warn!("[Avatar] {} ignored: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Reject values the per-frame code cannot work with.
    pub fn validate(&self) -> Result<()> {
        let anim = &self.animation;
        if !(anim.crossfade_secs >= 0.0) {
            return Err(invalid("animation.crossfade_secs must be >= 0"));
        }
        for group in &anim.groups {
            let [lo, hi] = group.interval;
            if !(lo >= 0.0 && hi >= lo) {
                return Err(invalid(&format!(
                    "group '{}' interval [{}, {}] is not a valid range",
                    group.name, lo, hi
                )));
            }
        }
        for name in [&anim.idle_group, &anim.talking_group] {
            if !anim.groups.iter().any(|g| &g.name == name) {
                return Err(invalid(&format!("group '{}' is not configured", name)));
            }
        }

        let blink = &self.blink;
        if !(blink.min_interval_secs > 0.0 && blink.max_interval_secs >= blink.min_interval_secs)
        {
            return Err(invalid("blink interval must satisfy 0 < min <= max"));
        }
        if !(blink.duration_secs > 0.0) {
            return Err(invalid("blink.duration_secs must be > 0"));
        }

        if !(self.emotion.speed > 0.0 && self.emotion.speed <= 1.0) {
            return Err(invalid("emotion.speed must be in (0, 1]"));
        }
        if !(self.emotion.epsilon >= 0.0) {
            return Err(invalid("emotion.epsilon must be >= 0"));
        }

        if !(self.viseme.budget_ms > 0.0 && self.viseme.budget_ms <= MAX_BUDGET_MS) {
            return Err(invalid("viseme.budget_ms must be in (0, 1000]"));
        }
        if !(self.viseme.silence_threshold >= 0.0) {
            return Err(invalid("viseme.silence_threshold must be >= 0"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> AvatarError {
    AvatarError::InvalidConfig(msg.to_string())
}

// ── Animation Config ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationConfig {
    #[serde(default = "default_crossfade_secs")]
    pub crossfade_secs: f32,
    #[serde(default = "default_idle_group")]
    pub idle_group: String,
    #[serde(default = "default_talking_group")]
    pub talking_group: String,
    #[serde(default = "default_groups")]
    pub groups: Vec<GroupSpec>,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            crossfade_secs: default_crossfade_secs(),
            idle_group: default_idle_group(),
            talking_group: default_talking_group(),
            groups: default_groups(),
        }
    }
}

fn default_crossfade_secs() -> f32 {
    0.5
}
fn default_idle_group() -> String {
    "idle".to_string()
}
fn default_talking_group() -> String {
    "talking".to_string()
}

fn default_groups() -> Vec<GroupSpec> {
    vec![
        GroupSpec {
            name: "idle".to_string(),
            base: "idle_breathing".to_string(),
            variations: vec![
                "idle_look_around".to_string(),
                "idle_shift_weight".to_string(),
                "idle_stretch".to_string(),
            ],
            interval: [4.0, 10.0],
        },
        GroupSpec {
            name: "talking".to_string(),
            base: "talking_base".to_string(),
            variations: vec![
                "talking_gesture_open".to_string(),
                "talking_gesture_point".to_string(),
                "talking_nod".to_string(),
            ],
            interval: [0.0, 0.0],
        },
    ]
}

// ── Blink Config ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlinkConfig {
    #[serde(default = "default_blink_min")]
    pub min_interval_secs: f32,
    #[serde(default = "default_blink_max")]
    pub max_interval_secs: f32,
    #[serde(default = "default_blink_duration")]
    pub duration_secs: f32,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_blink_min(),
            max_interval_secs: default_blink_max(),
            duration_secs: default_blink_duration(),
        }
    }
}

fn default_blink_min() -> f32 {
    2.0
}
fn default_blink_max() -> f32 {
    6.0
}
fn default_blink_duration() -> f32 {
    0.18
}

// ── Emotion Config ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionConfig {
    /// Fraction of the remaining distance covered per tick.
    #[serde(default = "default_emotion_speed")]
    pub speed: f32,
    /// Distance at which a target snaps onto its goal.
    #[serde(default = "default_emotion_epsilon")]
    pub epsilon: f32,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            speed: default_emotion_speed(),
            epsilon: default_emotion_epsilon(),
        }
    }
}

fn default_emotion_speed() -> f32 {
    0.1
}
fn default_emotion_epsilon() -> f32 {
    1e-3
}

// ── Viseme Config ──────────────────────────────────────────

/// Thresholds are tuning values per voice/model, not fixed semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisemeConfig {
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: f32,
    /// Per-invocation time budget for detection, in milliseconds.
    #[serde(default = "default_budget_ms")]
    pub budget_ms: f64,
    #[serde(default = "default_rules")]
    pub rules: Vec<VisemeRule>,
    /// Used when no rule matches a sample above the silence floor.
    #[serde(default = "default_fallback")]
    pub fallback: VisemeCode,
}

impl Default for VisemeConfig {
    fn default() -> Self {
        Self {
            silence_threshold: default_silence_threshold(),
            budget_ms: default_budget_ms(),
            rules: default_rules(),
            fallback: default_fallback(),
        }
    }
}

fn default_silence_threshold() -> f32 {
    0.04
}
/// A detection pass slower than a second is never acceptable.
const MAX_BUDGET_MS: f64 = 1000.0;

fn default_budget_ms() -> f64 {
    4.0
}
fn default_fallback() -> VisemeCode {
    VisemeCode::Mbp
}

// ── Preset Overrides ───────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresetConfig {
    #[serde(default)]
    pub emotions: PresetOverrides,
    #[serde(default)]
    pub visemes: PresetOverrides,
}
