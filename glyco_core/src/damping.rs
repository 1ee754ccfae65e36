//! IOB damping curve, applied on the primary path and again on the commit path.

use crate::config::IobCfg;
use crate::util::{clamp01, smooth_ramp};

/// Shape an IOB ratio into a multiplicative factor in `[min_factor, 1]`.
///
/// - `ratio <= start` leaves the dose untouched (1.0).
/// - `ratio >= max` applies the full `min_factor`.
/// - In between, `1 - x^power` over the normalized position `x`; a smaller
///   power damps harder.
pub fn iob_damping(ratio: f64, start: f64, max: f64, min_factor: f64, power: f64) -> f64 {
    let min_factor = clamp01(min_factor);
    let ratio = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 2.0) };
    if ratio <= start {
        return 1.0;
    }
    if ratio >= max || max <= start {
        return min_factor;
    }
    let x = clamp01((ratio - start) / (max - start));
    let shaped = 1.0 - x.powf(power.max(f64::MIN_POSITIVE));
    (min_factor + (1.0 - min_factor) * shaped).clamp(min_factor, 1.0)
}

/// IOB ratio weighted up when no rise is predicted.
///
/// The boost fades out as the predicted rise above current glucose reaches
/// `peak_boost_span_mmol`, so insulin on board counts fully against a flat or
/// falling outlook and less against an incoming peak.
pub fn peak_boosted_ratio(iob_ratio: f64, bg_now: f64, predicted_peak: f64, cfg: &IobCfg) -> f64 {
    let rise = (predicted_peak - bg_now).max(0.0);
    let outlook = 1.0 - smooth_ramp(rise, 0.0, cfg.peak_boost_span_mmol);
    iob_ratio * (1.0 + cfg.peak_boost * outlook)
}

/// Primary-path factor: strong curve against the peak-boosted ratio.
pub fn primary_factor(boosted_ratio: f64, cfg: &IobCfg) -> f64 {
    iob_damping(
        boosted_ratio,
        cfg.damping_start,
        cfg.damping_max,
        cfg.min_factor,
        cfg.primary_power,
    )
}

/// Commit-path factor: milder curve against the raw ratio.
pub fn commit_factor(iob_ratio: f64, cfg: &IobCfg) -> f64 {
    iob_damping(
        iob_ratio,
        cfg.damping_start,
        cfg.damping_max,
        cfg.min_factor,
        cfg.commit_power,
    )
}
