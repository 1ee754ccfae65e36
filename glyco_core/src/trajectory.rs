//! Trajectory damper and the hard/soft suppression rules.

use crate::commit::CommitLedger;
use crate::config::{HoldCfg, Tunables};
use crate::context::DecisionContext;
use crate::early::EarlyDoseOutcome;
use crate::meal::MealState;
use crate::peak::PeakCategory;
use crate::util::{clamp01, minutes_since, smooth_ramp};

const W_IOB: f64 = 0.55;
const W_SLOPE: f64 = 0.25;
const W_ACCEL: f64 = 0.20;
const DELTA_UPLIFT_GAIN: f64 = 0.35;

const LOADED_IOB_RATIO: f64 = 0.65;
const LOADED_SLOPE_MAX: f64 = 0.8;
const LOADED_FACTOR: f64 = 0.25;

const BLOCK_IOB_RATIO: f64 = 0.70;
const BLOCK_SLOPE_MAX: f64 = 0.6;
const BLOCK_ACCEL_MAX: f64 = -0.02;
const BLOCK_CONSISTENCY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamperOutcome {
    pub factor: f64,
    pub delta_uplift: f64,
    pub iob_penalty: f64,
    pub slope_penalty: f64,
    pub accel_penalty: f64,
    /// No meal signal with insulin already loaded and a slow rise.
    pub loaded: bool,
    pub skipped: bool,
}

impl DamperOutcome {
    const SKIPPED: DamperOutcome = DamperOutcome {
        factor: 1.0,
        delta_uplift: 0.0,
        iob_penalty: 0.0,
        slope_penalty: 0.0,
        accel_penalty: 0.0,
        loaded: false,
        skipped: true,
    };
}

fn meal_relaxation(meal: MealState) -> f64 {
    match meal {
        MealState::None => 1.0,
        MealState::Uncertain => 0.75,
        MealState::Confirmed => 0.55,
    }
}

/// Continuous damping factor in `[0, 1]`; 1 when the trend is unreliable.
pub fn damper(ctx: &DecisionContext, meal: MealState, min_consistency: f64) -> DamperOutcome {
    if ctx.consistency < min_consistency {
        return DamperOutcome::SKIPPED;
    }
    let delta_uplift = smooth_ramp(ctx.delta_to_target, 0.0, 6.0);
    let iob_penalty = smooth_ramp(ctx.iob_ratio, 0.35, 0.5);
    let slope_penalty = 1.0 - smooth_ramp(ctx.slope, -0.6, 1.6);
    let accel_penalty = 1.0 - smooth_ramp(ctx.acceleration, -0.10, 0.25);

    let combined =
        clamp01(W_IOB * iob_penalty + W_SLOPE * slope_penalty + W_ACCEL * accel_penalty);
    let mut factor = clamp01(1.0 - combined + DELTA_UPLIFT_GAIN * delta_uplift);
    factor = (factor / meal_relaxation(meal)).min(1.0);

    let loaded = !meal.is_signal()
        && ctx.iob_ratio >= LOADED_IOB_RATIO
        && ctx.slope < LOADED_SLOPE_MAX;
    if loaded {
        factor *= LOADED_FACTOR;
    }
    DamperOutcome {
        factor,
        delta_uplift,
        iob_penalty,
        slope_penalty,
        accel_penalty,
        loaded,
        skipped: false,
    }
}

/// Decelerating with insulin on board and no meal: dose forced to 0.
pub fn hard_block(ctx: &DecisionContext, meal: MealState) -> bool {
    !meal.is_signal()
        && ctx.iob_ratio >= BLOCK_IOB_RATIO
        && ctx.slope < BLOCK_SLOPE_MAX
        && ctx.acceleration <= BLOCK_ACCEL_MAX
        && ctx.consistency >= BLOCK_CONSISTENCY
}

/// Flat and near target with no meal and no real peak ahead.
pub fn correction_hold(
    ctx: &DecisionContext,
    meal: MealState,
    category: PeakCategory,
    cfg: &HoldCfg,
    min_consistency: f64,
) -> bool {
    !meal.is_signal()
        && category < PeakCategory::Meal
        && ctx.slope <= cfg.correction_hold_slope_max
        && ctx.acceleration <= cfg.correction_hold_accel_max
        && ctx.consistency >= min_consistency
        && ctx.delta_to_target <= cfg.correction_hold_delta_max
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapedDose {
    pub dose: f64,
    pub damper: DamperOutcome,
    pub hard_block: bool,
    pub correction_hold: bool,
    pub early_floor_applied: bool,
}

/// Damper, then the holds, then the early-dose floor.
///
/// A live protection window skips both holds. The floor is applied last;
/// only a gate hard stop or a hold drops it.
pub fn shape(
    dose: f64,
    ctx: &DecisionContext,
    meal: MealState,
    category: PeakCategory,
    early: &EarlyDoseOutcome,
    gate_blocked: bool,
    t: &Tunables,
) -> ShapedDose {
    let min_consistency = t.energy.min_consistency;
    let damping = damper(ctx, meal, min_consistency);
    let mut dose = dose * damping.factor;

    let blocked = !early.protection_window && hard_block(ctx, meal);
    let held = !early.protection_window
        && !blocked
        && correction_hold(ctx, meal, category, &t.holds, min_consistency);
    if blocked || held {
        dose = 0.0;
    }

    let floored = early.fired && !gate_blocked && !blocked && !held && early.floor_u > dose;
    if floored {
        dose = early.floor_u;
    }
    ShapedDose {
        dose,
        damper: damping,
        hard_block: blocked,
        correction_hold: held,
        early_floor_applied: floored,
    }
}

/// Rate-limit small corrections. Returns `true` when the dose is suppressed;
/// an accepted small correction restarts the cooldown clock.
pub fn anti_drip(
    dose: f64,
    meal: MealState,
    ledger: &mut CommitLedger,
    now_ms: i64,
    cfg: &HoldCfg,
) -> bool {
    let small = dose > 0.0 && dose <= cfg.small_correction_max_u && !meal.is_signal();
    if !small {
        return false;
    }
    if minutes_since(ledger.last_small_correction_ms, now_ms) < cfg.small_correction_cooldown_min {
        return true;
    }
    ledger.last_small_correction_ms = Some(now_ms);
    false
}
