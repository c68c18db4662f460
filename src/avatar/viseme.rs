//! Viseme Detector — coarse mouth shapes from the speech spectrum.
//!
//! This is an energy/band heuristic, not phoneme recognition. [`classify`]
//! is a pure function of one [`FrequencySample`]: loudness tier first, then
//! band ratios within the tier. The detector wraps it in a time budget and
//! switches lip-sync off for good the first time the budget is exceeded.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::error;

use super::presets::VisemeCode;
use crate::config::VisemeConfig;

// ── Frequency Sample ───────────────────────────────────────

/// One frame of per-bin spectral energy, normalized to [0, 1].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrequencySample {
    bins: Vec<f32>,
}

/// Mean energy of the low, mid and high thirds of the spectrum.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandEnergies {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

impl FrequencySample {
    /// From byte magnitudes (0–255), as delivered by typical analyser nodes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bins: bytes.iter().map(|b| *b as f32 / 255.0).collect(),
        }
    }

    /// From already-normalized values. Out-of-range and non-finite values are clamped.
    pub fn from_normalized(values: &[f32]) -> Self {
        Self {
            bins: values
                .iter()
                .map(|v| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 })
                .collect(),
        }
    }

    pub fn bins(&self) -> &[f32] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn rms(&self) -> f32 {
        if self.bins.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = self.bins.iter().map(|v| v * v).sum();
        (sum_sq / self.bins.len() as f32).sqrt()
    }

    /// Split the bins into three contiguous bands and average each.
    pub fn bands(&self) -> BandEnergies {
        let n = self.bins.len();
        let (a, b) = (n / 3, 2 * n / 3);
        BandEnergies {
            low: mean(&self.bins[..a]),
            mid: mean(&self.bins[a..b]),
            high: mean(&self.bins[b..]),
        }
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

// ── Rules ──────────────────────────────────────────────────

/// Band-ratio test applied within a loudness tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandTest {
    /// Low band exceeds both other bands by `ratio`.
    LowDominant { ratio: f32 },
    HighOverMid { ratio: f32 },
    HighOverLow { ratio: f32 },
    LowOverHigh { ratio: f32 },
    /// Always matches; used as the last rule of a tier.
    Any,
}

impl BandTest {
    pub fn matches(&self, b: &BandEnergies) -> bool {
        match *self {
            BandTest::LowDominant { ratio } => b.low > b.mid * ratio && b.low > b.high * ratio,
            BandTest::HighOverMid { ratio } => b.high > b.mid * ratio,
            BandTest::HighOverLow { ratio } => b.high > b.low * ratio,
            BandTest::LowOverHigh { ratio } => b.low > b.high * ratio,
            BandTest::Any => true,
        }
    }
}

/// One row of the classification table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisemeRule {
    /// Minimum RMS for the rule's tier.
    pub min_rms: f32,
    pub band: BandTest,
    pub code: VisemeCode,
}

impl VisemeRule {
    pub fn new(min_rms: f32, band: BandTest, code: VisemeCode) -> Self {
        Self {
            min_rms,
            band,
            code,
        }
    }
}

/// Loudest tier first; each tier ends in a catch-all.
pub fn default_rules() -> Vec<VisemeRule> {
    use BandTest::*;
    use VisemeCode::*;
    vec![
        VisemeRule::new(0.35, LowDominant { ratio: 1.3 }, Aa),
        VisemeRule::new(0.35, HighOverMid { ratio: 1.3 }, Ee),
        VisemeRule::new(0.35, Any, Oh),
        VisemeRule::new(0.18, HighOverMid { ratio: 1.5 }, Ss),
        VisemeRule::new(0.18, LowOverHigh { ratio: 1.5 }, Ou),
        VisemeRule::new(0.18, Any, Ih),
        VisemeRule::new(0.0, HighOverLow { ratio: 1.2 }, Ff),
        VisemeRule::new(0.0, Any, Mbp),
    ]
}

/// Classify one sample. Deterministic and total: below the silence floor
/// the answer is `Sil`, otherwise the first matching rule (rules are read
/// loudest tier first), otherwise the configured fallback.
pub fn classify(sample: &FrequencySample, config: &VisemeConfig) -> VisemeCode {
    let rms = sample.rms();
    // NaN-safe: anything not clearly above the floor is silence.
    if !(rms >= config.silence_threshold) {
        return VisemeCode::Sil;
    }
    let bands = sample.bands();
    config
        .rules
        .iter()
        .filter(|rule| rms >= rule.min_rms)
        .find(|rule| rule.band.matches(&bands))
        .map(|rule| rule.code)
        .unwrap_or(config.fallback)
}

// ── Performance Guard ──────────────────────────────────────

/// Details of a guard trip, reported once to the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardTrip {
    pub elapsed: Duration,
    pub budget: Duration,
}

/// Trips permanently the first time a measured run exceeds the budget.
#[derive(Debug, Clone)]
pub struct PerformanceGuard {
    budget: Duration,
    tripped: bool,
}

impl PerformanceGuard {
    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            tripped: false,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// Record one run. Returns the trip details if this run tripped the guard.
    pub fn observe(&mut self, elapsed: Duration) -> Option<GuardTrip> {
        if self.tripped || elapsed <= self.budget {
            return None;
        }
        self.tripped = true;
        Some(GuardTrip {
            elapsed,
            budget: self.budget,
        })
    }
}

// ── Detector ───────────────────────────────────────────────

pub struct VisemeDetector {
    config: VisemeConfig,
    guard: PerformanceGuard,
    enabled: bool,
    current: VisemeCode,
    pending_trip: Option<GuardTrip>,
}

impl VisemeDetector {
    pub fn new(mut config: VisemeConfig) -> Self {
        // Stable: order within a tier is preserved.
        config
            .rules
            .sort_by(|a, b| b.min_rms.total_cmp(&a.min_rms));
        let budget = Duration::try_from_secs_f64(config.budget_ms.max(0.0) / 1000.0)
            .unwrap_or(Duration::MAX);
        Self {
            config,
            guard: PerformanceGuard::new(budget),
            enabled: false,
            current: VisemeCode::Sil,
            pending_trip: None,
        }
    }

    /// Start consuming samples (while talking).
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Stop consuming samples and drop back to silence.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.current = VisemeCode::Sil;
    }

    /// No audio this tick: mouth at rest, still consuming.
    pub fn rest(&mut self) {
        self.current = VisemeCode::Sil;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// False once the guard has tripped.
    pub fn lip_sync_available(&self) -> bool {
        !self.guard.is_tripped()
    }

    pub fn current(&self) -> VisemeCode {
        self.current
    }

    pub fn config(&self) -> &VisemeConfig {
        &self.config
    }

    /// Classify under the time budget and remember the result.
    pub fn detect(&mut self, sample: &FrequencySample) -> VisemeCode {
        if !self.enabled || self.guard.is_tripped() {
            self.current = VisemeCode::Sil;
            return self.current;
        }
        let started = Instant::now();
        let code = classify(sample, &self.config);
        self.finish(code, started.elapsed())
    }

    pub(crate) fn finish(&mut self, code: VisemeCode, elapsed: Duration) -> VisemeCode {
        if let Some(trip) = self.guard.observe(elapsed) {
            error!(
                "[Viseme] Detection took {:.3}ms (budget {:.3}ms) — lip-sync DISABLED for this session",
                trip.elapsed.as_secs_f64() * 1000.0,
                trip.budget.as_secs_f64() * 1000.0
            );
            self.pending_trip = Some(trip);
            self.current = VisemeCode::Sil;
            return self.current;
        }
        self.current = code;
        code
    }

    /// Trip details not yet reported to the host.
    pub fn take_trip(&mut self) -> Option<GuardTrip> {
        self.pending_trip.take()
    }
}
