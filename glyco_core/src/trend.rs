//! Trend engine: slope, acceleration and a reliability score from a smoothed
//! glucose series.
//!
//! Slopes are in mmol/L per hour. Acceleration is the mean change between
//! consecutive slopes (mmol/L/h per sample step).

use crate::types::GlucoseSample;
use crate::util::{MS_PER_HOUR, clamp01};

/// Fewer samples than this produce the degraded estimate (all zeros).
pub const MIN_SAMPLES: usize = 5;

const DIRECTION_WEIGHT: f64 = 0.6;
const MAGNITUDE_WEIGHT: f64 = 0.4;

/// Descriptive shape of the trend. Reported in diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendPhase {
    Flat,
    Rising,
    Accelerating,
    Decelerating,
    Falling,
}

impl TrendPhase {
    const FLAT_SLOPE: f64 = 0.3;
    const CURVE_ACCEL: f64 = 0.1;

    pub fn classify(slope: f64, acceleration: f64) -> Self {
        if slope <= -Self::FLAT_SLOPE {
            TrendPhase::Falling
        } else if slope < Self::FLAT_SLOPE {
            TrendPhase::Flat
        } else if acceleration >= Self::CURVE_ACCEL {
            TrendPhase::Accelerating
        } else if acceleration <= -Self::CURVE_ACCEL {
            TrendPhase::Decelerating
        } else {
            TrendPhase::Rising
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrendPhase::Flat => "flat",
            TrendPhase::Rising => "rising",
            TrendPhase::Accelerating => "accelerating",
            TrendPhase::Decelerating => "decelerating",
            TrendPhase::Falling => "falling",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendEstimate {
    pub slope: f64,
    pub acceleration: f64,
    /// Reliability of the estimate in `[0, 1]`.
    pub consistency: f64,
    pub phase: TrendPhase,
}

impl TrendEstimate {
    /// Estimate returned for insufficient data. Zero consistency trips the
    /// decision gate's hard stop downstream.
    pub const DEGRADED: TrendEstimate = TrendEstimate {
        slope: 0.0,
        acceleration: 0.0,
        consistency: 0.0,
        phase: TrendPhase::Flat,
    };
}

/// Pairwise slopes between consecutive samples, skipping non-positive time steps.
pub fn pairwise_slopes(samples: &[GlucoseSample]) -> Vec<f64> {
    samples
        .windows(2)
        .filter_map(|w| {
            let dt_ms = w[1].timestamp_ms.saturating_sub(w[0].timestamp_ms);
            if dt_ms <= 0 {
                return None;
            }
            let dt_h = dt_ms as f64 / MS_PER_HOUR;
            Some((w[1].mmol - w[0].mmol) / dt_h)
        })
        .collect()
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

/// Fraction of nonzero slopes that agree with the majority sign.
fn direction_consistency(slopes: &[f64]) -> f64 {
    let pos = slopes.iter().filter(|s| **s > 0.0).count();
    let neg = slopes.iter().filter(|s| **s < 0.0).count();
    let nonzero = pos + neg;
    if nonzero == 0 {
        return 0.0;
    }
    pos.max(neg) as f64 / nonzero as f64
}

/// 1 minus the mean relative deviation of |slope| from its mean.
fn magnitude_consistency(slopes: &[f64]) -> f64 {
    let mags: Vec<f64> = slopes.iter().map(|s| s.abs()).collect();
    let m = mean(&mags);
    if m <= 0.0 {
        return 0.0;
    }
    let dev = mags.iter().map(|x| (x - m).abs()).sum::<f64>() / mags.len() as f64;
    clamp01(1.0 - dev / m)
}

/// Estimate slope, acceleration and consistency of an ordered series.
pub fn estimate(samples: &[GlucoseSample]) -> TrendEstimate {
    if samples.len() < MIN_SAMPLES {
        return TrendEstimate::DEGRADED;
    }
    let slopes = pairwise_slopes(samples);
    if slopes.is_empty() {
        return TrendEstimate::DEGRADED;
    }
    let slope = mean(&slopes);
    let acceleration = if slopes.len() < 3 {
        0.0
    } else {
        let diffs: Vec<f64> = slopes.windows(2).map(|w| w[1] - w[0]).collect();
        mean(&diffs)
    };
    let consistency = clamp01(
        DIRECTION_WEIGHT * direction_consistency(&slopes)
            + MAGNITUDE_WEIGHT * magnitude_consistency(&slopes),
    );
    TrendEstimate {
        slope,
        acceleration,
        consistency,
        phase: TrendPhase::classify(slope, acceleration),
    }
}
