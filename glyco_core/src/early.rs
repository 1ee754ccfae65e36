//! Two-stage anticipatory dose controller.
//!
//! Fires at most twice per episode. A fire sets a dose floor for the current
//! cycle only; the floor is applied after the trajectory damper and holds so
//! later conservative damping cannot erase it. While a stage is live and the
//! rise has neither rolled over nor been confirmed as a peak, the engine skips
//! the trajectory hard block and the micro-correction hold.

use crate::context::DecisionContext;
use crate::meal::{MealSignal, MealState};
use crate::peak::PeakSubState;
use crate::util::{clamp01, lerp, minutes_since, smooth_ramp};

const MIN_CONSISTENCY: f64 = 0.45;
const MAX_IOB_RATIO: f64 = 0.85;

const W_SLOPE: f64 = 0.32;
const W_ACCEL: f64 = 0.30;
const W_DELTA: f64 = 0.18;
const W_CONSISTENCY: f64 = 0.10;
const W_HEADROOM: f64 = 0.10;
const WATCHING_BONUS: f64 = 0.10;
const MEAL_CONFIRMED_BONUS: f64 = 0.18;
const MEAL_UNCERTAIN_BONUS: f64 = 0.10;

const STAGE1_THRESHOLD: f64 = 0.42;
const STAGE2_THRESHOLD: f64 = 0.64;
const STAGE2_MIN_GAP_MIN: f64 = 5.0;
const STAGE1_BOUNDS: (f64, f64) = (0.30, 0.60);
const STAGE2_BOUNDS: (f64, f64) = (0.45, 0.85);

const IOB_PENALTY_MAX: f64 = 0.35;
const IOB_PENALTY_START: f64 = 0.35;
const IOB_PENALTY_SPAN: f64 = 0.40;
const NIGHT_FACTOR: f64 = 0.88;

/// Persistent per-episode state. Reset on episode start/exit and on re-entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EarlyDoseState {
    /// 0, 1 or 2.
    pub stage: u8,
    pub last_fire_ms: Option<i64>,
    pub last_confidence: f64,
}

impl EarlyDoseState {
    pub fn reset(&mut self) {
        *self = EarlyDoseState::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarlyDoseOutcome {
    /// Stage carried in from the previous cycle.
    pub prior_stage: u8,
    pub stage: u8,
    pub confidence: f64,
    pub disabled: bool,
    pub fired: bool,
    /// Dose floor (U) for this cycle; 0 unless `fired`.
    pub floor_u: f64,
    pub protection_window: bool,
}

/// Weighted anticipatory confidence in `[0, 1]`.
pub fn confidence(ctx: &DecisionContext, meal: MealSignal, sub_state: PeakSubState) -> f64 {
    let slope = smooth_ramp(ctx.slope, 0.3, 1.7);
    let accel = smooth_ramp(ctx.acceleration, 0.05, 0.55);
    let delta = smooth_ramp(ctx.delta_to_target, 1.0, 4.0);
    let consistency = smooth_ramp(ctx.consistency, 0.45, 0.45);
    let headroom = 1.0 - smooth_ramp(ctx.iob_ratio, 0.0, MAX_IOB_RATIO);

    let mut c = W_SLOPE * slope
        + W_ACCEL * accel
        + W_DELTA * delta
        + W_CONSISTENCY * consistency
        + W_HEADROOM * headroom;
    if sub_state == PeakSubState::Watching {
        c += WATCHING_BONUS;
    }
    c += match meal.state {
        MealState::Confirmed => MEAL_CONFIRMED_BONUS,
        MealState::Uncertain => MEAL_UNCERTAIN_BONUS,
        MealState::None => 0.0,
    };
    clamp01(c)
}

/// Fraction of the per-cycle cap that a fire at `stage` guarantees.
pub fn floor_factor(stage: u8, confidence: f64, iob_ratio: f64, night: bool) -> f64 {
    let (threshold, (lo, hi)) = match stage {
        1 => (STAGE1_THRESHOLD, STAGE1_BOUNDS),
        2 => (STAGE2_THRESHOLD, STAGE2_BOUNDS),
        _ => return 0.0,
    };
    let t = (confidence - threshold) / (1.0 - threshold);
    let mut factor = lerp(lo, hi, t);
    factor *= 1.0 - IOB_PENALTY_MAX * smooth_ramp(iob_ratio, IOB_PENALTY_START, IOB_PENALTY_SPAN);
    if night {
        factor *= NIGHT_FACTOR;
    }
    clamp01(factor)
}

/// Run one controller step and mutate `state`.
pub fn evaluate(
    state: &mut EarlyDoseState,
    ctx: &DecisionContext,
    meal: MealSignal,
    sub_state: PeakSubState,
    now_ms: i64,
    max_single_dose_u: f64,
    night: bool,
) -> EarlyDoseOutcome {
    let prior_stage = state.stage;
    let disabled = ctx.consistency < MIN_CONSISTENCY
        || ctx.iob_ratio >= MAX_IOB_RATIO
        || sub_state == PeakSubState::Confirmed;

    let conf = if disabled { 0.0 } else { confidence(ctx, meal, sub_state) };
    state.last_confidence = conf;

    let next_stage = if disabled {
        None
    } else {
        match state.stage {
            0 if conf >= STAGE1_THRESHOLD => Some(1),
            1 if conf >= STAGE2_THRESHOLD
                && minutes_since(state.last_fire_ms, now_ms) >= STAGE2_MIN_GAP_MIN =>
            {
                Some(2)
            }
            _ => None,
        }
    };

    let mut floor_u = 0.0;
    if let Some(stage) = next_stage {
        state.stage = stage;
        state.last_fire_ms = Some(now_ms);
        floor_u = max_single_dose_u.max(0.0) * floor_factor(stage, conf, ctx.iob_ratio, night);
        tracing::debug!(stage, confidence = conf, floor_u, "early dose fired");
    }

    let protection_window = state.stage > 0
        && ctx.acceleration >= 0.0
        && sub_state != PeakSubState::Confirmed;

    EarlyDoseOutcome {
        prior_stage,
        stage: state.stage,
        confidence: conf,
        disabled,
        fired: next_stage.is_some(),
        floor_u,
        protection_window,
    }
}
