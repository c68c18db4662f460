//! Presets — named target-weight mappings for emotions and visemes.
//!
//! Emotions and visemes share one representation: a closed key type mapped
//! to a [`BlendWeights`] set. The tables are built once at startup (defaults
//! plus optional overrides from config) and never change afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::blend_target::{BlendLayer, BlendTarget, BlendWeights, ModelCapabilities};
use crate::error::{AvatarError, Result};

/// Config-side preset overrides: `label -> { morphTargetName: weight }`.
pub type PresetOverrides = BTreeMap<String, BTreeMap<String, f32>>;

/// A closed set of preset names.
pub trait PresetKey: Copy + Ord + fmt::Debug + fmt::Display + 'static {
    fn catalog() -> &'static [Self];
    fn as_str(&self) -> &'static str;
    fn parse_label(label: &str) -> Result<Self>;
}

// ── Emotions ───────────────────────────────────────────────

/// The canonical emotion vocabulary accepted by `set_emotion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Neutral,
    Happy,
    Excited,
    Playful,
    Sad,
    Angry,
    Surprised,
    Thinking,
    Shy,
    Smug,
    Worried,
}

impl Emotion {
    pub const ALL: [Emotion; 11] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Excited,
        Emotion::Playful,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Surprised,
        Emotion::Thinking,
        Emotion::Shy,
        Emotion::Smug,
        Emotion::Worried,
    ];
}

impl PresetKey for Emotion {
    fn catalog() -> &'static [Self] {
        &Emotion::ALL
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Excited => "excited",
            Self::Playful => "playful",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Surprised => "surprised",
            Self::Thinking => "thinking",
            Self::Shy => "shy",
            Self::Smug => "smug",
            Self::Worried => "worried",
        }
    }

    fn parse_label(label: &str) -> Result<Self> {
        label.parse()
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Emotion {
    type Err = AvatarError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        Emotion::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == lower)
            .ok_or_else(|| AvatarError::UnknownEmotion(s.to_string()))
    }
}

// ── Visemes ────────────────────────────────────────────────

/// Coarse mouth-shape classes produced by the viseme detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisemeCode {
    /// Mouth at rest.
    Sil,
    /// Wide open vowel ("ah").
    Aa,
    /// Spread vowel ("ee").
    Ee,
    /// Half-open vowel ("ih").
    Ih,
    /// Rounded open vowel ("oh").
    Oh,
    /// Rounded closed vowel ("oo").
    Ou,
    /// Lip-teeth fricative ("f", "v").
    Ff,
    /// Sibilant ("s", "z").
    Ss,
    /// Closed-lip plosive ("m", "b", "p").
    Mbp,
}

impl VisemeCode {
    pub const ALL: [VisemeCode; 9] = [
        VisemeCode::Sil,
        VisemeCode::Aa,
        VisemeCode::Ee,
        VisemeCode::Ih,
        VisemeCode::Oh,
        VisemeCode::Ou,
        VisemeCode::Ff,
        VisemeCode::Ss,
        VisemeCode::Mbp,
    ];
}

impl PresetKey for VisemeCode {
    fn catalog() -> &'static [Self] {
        &VisemeCode::ALL
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Sil => "sil",
            Self::Aa => "aa",
            Self::Ee => "ee",
            Self::Ih => "ih",
            Self::Oh => "oh",
            Self::Ou => "ou",
            Self::Ff => "ff",
            Self::Ss => "ss",
            Self::Mbp => "mbp",
        }
    }

    fn parse_label(label: &str) -> Result<Self> {
        label.parse()
    }
}

impl fmt::Display for VisemeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisemeCode {
    type Err = AvatarError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        VisemeCode::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == lower)
            .ok_or_else(|| AvatarError::InvalidConfig(format!("unknown viseme code '{}'", s)))
    }
}

// ── Preset Table ───────────────────────────────────────────

/// Immutable key → weights table. Every key of the catalog has an entry;
/// keys without configured weights map to an empty set.
#[derive(Debug, Clone)]
pub struct PresetTable<K: PresetKey> {
    entries: BTreeMap<K, BlendWeights>,
    empty: BlendWeights,
}

impl<K: PresetKey> PresetTable<K> {
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, BlendWeights)>,
    {
        let mut map: BTreeMap<K, BlendWeights> = entries.into_iter().collect();
        for key in K::catalog() {
            map.entry(*key).or_default();
        }
        Self {
            entries: map,
            empty: BlendWeights::new(),
        }
    }

    pub fn weights(&self, key: K) -> &BlendWeights {
        self.entries.get(&key).unwrap_or(&self.empty)
    }

    /// Replace entries with config-provided weights. Target names are
    /// resolved against the closed vocabulary here, never per frame.
    pub fn apply_overrides(&mut self, overrides: &PresetOverrides) -> Result<()> {
        for (label, targets) in overrides {
            let key = K::parse_label(label)?;
            let mut weights = BlendWeights::new();
            for (name, weight) in targets {
                let target: BlendTarget =
                    name.parse().map_err(|_| AvatarError::UnknownBlendTarget {
                        preset: label.clone(),
                        name: name.clone(),
                    })?;
                if target.layer() != BlendLayer::Expression {
                    return Err(AvatarError::InvalidConfig(format!(
                        "preset '{}' may not drive blink target '{}'",
                        label, name
                    )));
                }
                weights.set(target, *weight);
            }
            self.entries.insert(key, weights);
        }
        Ok(())
    }

    /// Check that the loaded model exposes every target this table uses.
    pub fn validate(&self, capabilities: &ModelCapabilities) -> Result<()> {
        for weights in self.entries.values() {
            for target in weights.targets() {
                capabilities.require(target)?;
            }
        }
        Ok(())
    }
}

pub type EmotionTable = PresetTable<Emotion>;
pub type VisemeTable = PresetTable<VisemeCode>;

fn weights(pairs: &[(BlendTarget, f32)]) -> BlendWeights {
    pairs.iter().copied().collect()
}

/// Built-in emotion presets.
pub fn default_emotion_table() -> EmotionTable {
    use BlendTarget::*;
    PresetTable::from_entries([
        (Emotion::Neutral, BlendWeights::new()),
        (
            Emotion::Happy,
            weights(&[(MouthSmile, 0.7), (CheekSquint, 0.4), (BrowOuterUp, 0.2)]),
        ),
        (
            Emotion::Excited,
            weights(&[
                (MouthSmile, 0.9),
                (JawOpen, 0.2),
                (BrowOuterUp, 0.5),
                (CheekSquint, 0.5),
            ]),
        ),
        (
            Emotion::Playful,
            weights(&[
                (MouthSmile, 0.8),
                (CheekPuff, 0.2),
                (BrowOuterUp, 0.4),
                (CheekSquint, 0.3),
            ]),
        ),
        (
            Emotion::Sad,
            weights(&[(MouthFrown, 0.6), (BrowInnerUp, 0.7)]),
        ),
        (
            Emotion::Angry,
            weights(&[(BrowDown, 0.8), (MouthFrown, 0.4), (MouthStretch, 0.3)]),
        ),
        (
            Emotion::Surprised,
            weights(&[(BrowOuterUp, 0.8), (BrowInnerUp, 0.6), (JawOpen, 0.4)]),
        ),
        (
            Emotion::Thinking,
            weights(&[(BrowDown, 0.3), (MouthPucker, 0.2), (BrowInnerUp, 0.2)]),
        ),
        (
            Emotion::Shy,
            weights(&[(MouthSmile, 0.3), (CheekSquint, 0.3), (BrowInnerUp, 0.3)]),
        ),
        (
            Emotion::Smug,
            weights(&[(MouthSmile, 0.5), (BrowOuterUp, 0.3), (CheekSquint, 0.2)]),
        ),
        (
            Emotion::Worried,
            weights(&[(BrowInnerUp, 0.6), (MouthStretch, 0.3), (MouthFrown, 0.2)]),
        ),
    ])
}

/// Built-in viseme mouth shapes.
pub fn default_viseme_table() -> VisemeTable {
    use BlendTarget::*;
    PresetTable::from_entries([
        (VisemeCode::Sil, BlendWeights::new()),
        (VisemeCode::Aa, weights(&[(JawOpen, 0.8), (MouthStretch, 0.2)])),
        (
            VisemeCode::Ee,
            weights(&[(JawOpen, 0.3), (MouthStretch, 0.6), (MouthSmile, 0.3)]),
        ),
        (VisemeCode::Ih, weights(&[(JawOpen, 0.35), (MouthStretch, 0.3)])),
        (VisemeCode::Oh, weights(&[(JawOpen, 0.6), (MouthFunnel, 0.6)])),
        (
            VisemeCode::Ou,
            weights(&[(JawOpen, 0.25), (MouthPucker, 0.8), (MouthFunnel, 0.3)]),
        ),
        (
            VisemeCode::Ff,
            weights(&[(MouthUpperUp, 0.5), (JawOpen, 0.1), (MouthClose, 0.2)]),
        ),
        (VisemeCode::Ss, weights(&[(JawOpen, 0.1), (MouthStretch, 0.4)])),
        (VisemeCode::Mbp, weights(&[(MouthClose, 0.7)])),
    ])
}
