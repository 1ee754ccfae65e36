//! Meal-driven commit escalation, re-entry detection and post-commit
//! absorption suppression.

use crate::config::{CommitCfg, IobCfg, MealCfg, ReentryCfg};
use crate::context::DecisionContext;
use crate::damping;
use crate::meal::{MealSignal, MealState};
use crate::peak::PeakCategory;
use crate::util::{lerp, minutes_since};

const HIGH_PEAK_BOOST: f64 = 1.15;
const FALLING_SLOPE: f64 = -0.8;
const FALLING_IOB_RATIO: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitReason {
    Meal,
    Reentry,
}

impl CommitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CommitReason::Meal => "meal",
            CommitReason::Reentry => "reentry",
        }
    }
}

/// Persistent timestamps of the last commit-related actions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitLedger {
    pub last_commit_ms: Option<i64>,
    pub last_commit_u: f64,
    pub last_commit_reason: Option<CommitReason>,
    /// Last cycle that detected a re-entry, committed or not.
    pub last_reentry_ms: Option<i64>,
    pub last_reentry_commit_ms: Option<i64>,
    pub last_small_correction_ms: Option<i64>,
}

impl CommitLedger {
    pub fn minutes_since_commit(&self, now_ms: i64) -> f64 {
        minutes_since(self.last_commit_ms, now_ms)
    }

    pub fn mark_reentry(&mut self, now_ms: i64) {
        self.last_reentry_ms = Some(now_ms);
    }

    fn record(&mut self, now_ms: i64, dose_u: f64, reason: CommitReason) {
        self.last_commit_ms = Some(now_ms);
        self.last_commit_u = dose_u;
        self.last_commit_reason = Some(reason);
        if reason == CommitReason::Reentry {
            self.last_reentry_commit_ms = Some(now_ms);
        }
    }
}

/// A second rise after a commit. The re-entry cooldown runs from both the
/// last detection and the last re-entry commit, so a detection whose commit
/// stays under the minimum dose does not repeat every cycle.
pub fn detect_reentry(
    ledger: &CommitLedger,
    ctx: &DecisionContext,
    cfg: &ReentryCfg,
    now_ms: i64,
) -> bool {
    ledger.last_commit_ms.is_some()
        && ledger.minutes_since_commit(now_ms) >= cfg.min_minutes_since_commit
        && minutes_since(ledger.last_reentry_ms, now_ms) >= cfg.cooldown_min
        && minutes_since(ledger.last_reentry_commit_ms, now_ms) >= cfg.cooldown_min
        && ctx.slope >= cfg.slope_min
        && ctx.acceleration >= cfg.accel_min
        && ctx.delta_to_target >= cfg.delta_min
        && ctx.consistency >= cfg.min_consistency
}

/// Inside the absorption window with the rise stalling or reversing.
pub fn absorption_active(
    ledger: &CommitLedger,
    ctx: &DecisionContext,
    cfg: &CommitCfg,
    min_consistency: f64,
    now_ms: i64,
) -> bool {
    if ledger.minutes_since_commit(now_ms) >= cfg.absorption_window_min {
        return false;
    }
    ctx.slope <= cfg.peak_slope_threshold
        || ctx.acceleration <= cfg.peak_accel_threshold
        || (ctx.slope <= FALLING_SLOPE
            && ctx.consistency >= min_consistency
            && ctx.iob_ratio >= FALLING_IOB_RATIO)
}

/// Fraction of the per-cycle cap to commit, or `None` without a meal signal.
/// A re-entry with no meal signal commits on the uncertain segment.
pub fn commit_fraction(
    meal: MealSignal,
    reentry: bool,
    cfg: &CommitCfg,
    meal_cfg: &MealCfg,
) -> Option<f64> {
    let state = match meal.state {
        MealState::None if reentry => MealState::Uncertain,
        MealState::None => return None,
        s => s,
    };
    let fraction = match state {
        MealState::Confirmed => {
            let span = 1.0 - meal_cfg.confirm_threshold;
            let t = if span > 0.0 {
                (meal.confidence - meal_cfg.confirm_threshold) / span
            } else {
                1.0
            };
            lerp(cfg.confirm_min, cfg.confirm_max, t)
        }
        _ => {
            let span = meal_cfg.confirm_threshold - meal_cfg.uncertain_threshold;
            let t = if span > 0.0 {
                (meal.confidence - meal_cfg.uncertain_threshold) / span
            } else {
                0.0
            };
            lerp(cfg.uncertain_min, cfg.uncertain_max, t)
        }
    };
    Some(fraction)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommitOutcome {
    pub dose: f64,
    pub absorption: bool,
    pub cooldown_ok: bool,
    pub fraction: f64,
    pub iob_factor: f64,
    /// Candidate commit size before the `max(pre, commit)` merge.
    pub commit_dose: f64,
    pub committed: Option<CommitReason>,
    /// A candidate existed but fell under the minimum commit dose.
    pub observed_only: bool,
}

/// Everything `resolve` reads besides the ledger.
#[derive(Debug, Clone, Copy)]
pub struct CommitInputs<'a> {
    pub pre_dose: f64,
    pub ctx: &'a DecisionContext,
    pub meal: MealSignal,
    pub category: PeakCategory,
    pub reentry: bool,
    pub gate_blocked: bool,
    pub max_single_dose_u: f64,
    pub min_consistency: f64,
    pub now_ms: i64,
}

/// Apply absorption suppression or a commit to the in-flight dose.
pub fn resolve(
    inp: &CommitInputs<'_>,
    ledger: &mut CommitLedger,
    cfg: &CommitCfg,
    meal_cfg: &MealCfg,
    iob_cfg: &IobCfg,
) -> CommitOutcome {
    let mut out = CommitOutcome {
        dose: inp.pre_dose,
        absorption: false,
        cooldown_ok: false,
        fraction: 0.0,
        iob_factor: 1.0,
        commit_dose: 0.0,
        committed: None,
        observed_only: false,
    };

    if !inp.reentry && absorption_active(ledger, inp.ctx, cfg, inp.min_consistency, inp.now_ms) {
        out.absorption = true;
        out.dose = inp.pre_dose * cfg.absorption_dose_factor;
        return out;
    }
    if inp.gate_blocked {
        return out;
    }

    out.cooldown_ok = inp.reentry || ledger.minutes_since_commit(inp.now_ms) >= cfg.cooldown_min;
    let Some(fraction) = commit_fraction(inp.meal, inp.reentry, cfg, meal_cfg) else {
        return out;
    };
    if !out.cooldown_ok {
        return out;
    }

    out.fraction = fraction;
    out.iob_factor = damping::commit_factor(inp.ctx.iob_ratio, iob_cfg);
    let cap = inp.max_single_dose_u.max(0.0);
    let mut commit_dose = (fraction * cap * out.iob_factor).min(cap);
    if inp.category >= PeakCategory::High {
        commit_dose = (commit_dose * HIGH_PEAK_BOOST).min(cap);
    }
    out.commit_dose = commit_dose;

    let committed = inp.pre_dose.max(commit_dose);
    if committed >= cfg.min_dose_u {
        let reason = if inp.reentry {
            CommitReason::Reentry
        } else {
            CommitReason::Meal
        };
        ledger.record(inp.now_ms, committed, reason);
        out.dose = committed;
        out.committed = Some(reason);
        tracing::info!(
            reason = reason.as_str(),
            dose_u = committed,
            fraction,
            "commit"
        );
    } else {
        out.observed_only = true;
    }
    out
}
