//! Blend Targets — the closed vocabulary of facial control values.
//!
//! Every morph target the core can drive is a member of [`BlendTarget`].
//! Names are validated against the loaded model once at startup so the
//! per-frame path never has to check whether a target exists.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{AvatarError, Result};

// ── Targets ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlendTarget {
    JawOpen,
    MouthSmile,
    MouthFrown,
    MouthFunnel,
    MouthPucker,
    MouthStretch,
    MouthClose,
    MouthUpperUp,
    BrowInnerUp,
    BrowDown,
    BrowOuterUp,
    CheekPuff,
    CheekSquint,
    EyeBlinkLeft,
    EyeBlinkRight,
}

/// Which layer owns the final write for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendLayer {
    /// Mouth/brow/cheek targets resolved by the compositor.
    Expression,
    /// Eyelid targets written directly by the blink generator.
    Blink,
}

impl BlendTarget {
    pub const ALL: [BlendTarget; 15] = [
        BlendTarget::JawOpen,
        BlendTarget::MouthSmile,
        BlendTarget::MouthFrown,
        BlendTarget::MouthFunnel,
        BlendTarget::MouthPucker,
        BlendTarget::MouthStretch,
        BlendTarget::MouthClose,
        BlendTarget::MouthUpperUp,
        BlendTarget::BrowInnerUp,
        BlendTarget::BrowDown,
        BlendTarget::BrowOuterUp,
        BlendTarget::CheekPuff,
        BlendTarget::CheekSquint,
        BlendTarget::EyeBlinkLeft,
        BlendTarget::EyeBlinkRight,
    ];

    pub const BLINK: [BlendTarget; 2] = [BlendTarget::EyeBlinkLeft, BlendTarget::EyeBlinkRight];

    /// Morph target name as it appears in the model file.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JawOpen => "jawOpen",
            Self::MouthSmile => "mouthSmile",
            Self::MouthFrown => "mouthFrown",
            Self::MouthFunnel => "mouthFunnel",
            Self::MouthPucker => "mouthPucker",
            Self::MouthStretch => "mouthStretch",
            Self::MouthClose => "mouthClose",
            Self::MouthUpperUp => "mouthUpperUp",
            Self::BrowInnerUp => "browInnerUp",
            Self::BrowDown => "browDown",
            Self::BrowOuterUp => "browOuterUp",
            Self::CheekPuff => "cheekPuff",
            Self::CheekSquint => "cheekSquint",
            Self::EyeBlinkLeft => "eyeBlinkLeft",
            Self::EyeBlinkRight => "eyeBlinkRight",
        }
    }

    pub fn layer(&self) -> BlendLayer {
        match self {
            Self::EyeBlinkLeft | Self::EyeBlinkRight => BlendLayer::Blink,
            _ => BlendLayer::Expression,
        }
    }
}

impl fmt::Display for BlendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlendTarget {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        BlendTarget::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or(())
    }
}

// ── Weights ────────────────────────────────────────────────

/// A sparse set of target weights. Missing targets read as 0.0 and every
/// stored value is kept inside [0, 1].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlendWeights(BTreeMap<BlendTarget, f32>);

impl BlendWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target: BlendTarget) -> f32 {
        self.0.get(&target).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, target: BlendTarget, weight: f32) {
        let weight = if weight.is_finite() {
            weight.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.0.insert(target, weight);
    }

    pub fn remove(&mut self, target: BlendTarget) {
        self.0.remove(&target);
    }

    pub fn targets(&self) -> impl Iterator<Item = BlendTarget> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlendTarget, f32)> + '_ {
        self.0.iter().map(|(t, w)| (*t, *w))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when no stored weight is above zero.
    pub fn is_zero(&self) -> bool {
        self.0.values().all(|w| *w <= 0.0)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl FromIterator<(BlendTarget, f32)> for BlendWeights {
    fn from_iter<I: IntoIterator<Item = (BlendTarget, f32)>>(iter: I) -> Self {
        let mut weights = BlendWeights::new();
        for (target, weight) in iter {
            weights.set(target, weight);
        }
        weights
    }
}

// ── Model Capabilities ─────────────────────────────────────

/// The morph target names actually present on the loaded face mesh.
#[derive(Debug, Clone, Default)]
pub struct ModelCapabilities {
    names: HashSet<String>,
}

impl ModelCapabilities {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// A model exposing every target in the closed vocabulary.
    pub fn full() -> Self {
        Self::from_names(BlendTarget::ALL.iter().map(|t| t.as_str()))
    }

    pub fn supports(&self, target: BlendTarget) -> bool {
        self.names.contains(target.as_str())
    }

    pub fn require(&self, target: BlendTarget) -> Result<()> {
        if self.supports(target) {
            Ok(())
        } else {
            Err(AvatarError::UnsupportedBlendTarget(target.as_str().to_string()))
        }
    }
}
