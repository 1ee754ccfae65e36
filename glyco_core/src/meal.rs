//! Stateless per-cycle meal signal classifier.

use crate::config::MealCfg;
use crate::context::DecisionContext;
use crate::util::clamp01;

const SLOPE_WEIGHT: f64 = 0.45;
const ACCEL_WEIGHT: f64 = 0.35;
const DELTA_WEIGHT: f64 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MealState {
    None,
    Uncertain,
    Confirmed,
}

impl MealState {
    #[inline]
    pub fn is_signal(self) -> bool {
        self != MealState::None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MealState::None => "none",
            MealState::Uncertain => "uncertain",
            MealState::Confirmed => "confirmed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MealSignal {
    pub state: MealState,
    pub confidence: f64,
}

impl MealSignal {
    pub const NONE: MealSignal = MealSignal {
        state: MealState::None,
        confidence: 0.0,
    };
}

pub fn detect(ctx: &DecisionContext, cfg: &MealCfg, min_consistency: f64) -> MealSignal {
    if ctx.consistency < min_consistency {
        return MealSignal::NONE;
    }
    let score = |x: f64, min: f64, span: f64| {
        if span > 0.0 { clamp01((x - min) / span) } else { 0.0 }
    };
    let slope_score = score(ctx.slope, cfg.slope_min, cfg.slope_span);
    let accel_score = score(ctx.acceleration, cfg.accel_min, cfg.accel_span);
    let delta_score = score(ctx.delta_to_target, cfg.delta_min, cfg.delta_span);
    let confidence = clamp01(
        SLOPE_WEIGHT * slope_score + ACCEL_WEIGHT * accel_score + DELTA_WEIGHT * delta_score,
    );

    let rising = ctx.slope >= cfg.slope_min;
    let accelerating = ctx.acceleration >= cfg.accel_min;
    let above_target = ctx.delta_to_target >= cfg.delta_min;

    let state = if rising && accelerating && above_target && confidence >= cfg.confirm_threshold {
        MealState::Confirmed
    } else if (rising || accelerating) && above_target && confidence >= cfg.uncertain_threshold {
        MealState::Uncertain
    } else {
        MealState::None
    };
    MealSignal { state, confidence }
}
