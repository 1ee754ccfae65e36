//! Per-cycle decision context.

use crate::trend::TrendEstimate;
use crate::types::CycleInput;

/// Upper bound of the IOB ratio before any damping clamp.
pub const IOB_RATIO_MAX: f64 = 1.5;

/// Derived fresh every cycle; never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionContext {
    pub bg_now: f64,
    pub slope: f64,
    pub acceleration: f64,
    pub consistency: f64,
    pub iob_ratio: f64,
    pub delta_to_target: f64,
}

/// `current / max` clamped to `[0, 1.5]`; 0 when `max <= 0`.
#[inline]
pub fn iob_ratio(current_iob_u: f64, max_iob_u: f64) -> f64 {
    if !(max_iob_u > 0.0) {
        return 0.0;
    }
    let r = current_iob_u / max_iob_u;
    if r.is_nan() { 0.0 } else { r.clamp(0.0, IOB_RATIO_MAX) }
}

impl DecisionContext {
    pub fn build(input: &CycleInput<'_>, trend: &TrendEstimate) -> Self {
        Self {
            bg_now: input.bg_now,
            slope: trend.slope,
            acceleration: trend.acceleration,
            consistency: trend.consistency,
            iob_ratio: iob_ratio(input.iob_u, input.max_iob_u),
            delta_to_target: input.bg_now - input.target_mmol,
        }
    }
}
