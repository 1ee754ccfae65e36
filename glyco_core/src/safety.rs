//! Final unconditional veto. Runs after commit logic and overrides it.

use crate::commit::CommitLedger;
use crate::config::{CommitCfg, SafetyCfg};
use crate::context::DecisionContext;

const POST_PEAK_IOB_RATIO: f64 = 0.35;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Veto {
    Hypo,
    PostPeak,
}

impl Veto {
    pub fn as_str(self) -> &'static str {
        match self {
            Veto::Hypo => "hypo-forecast",
            Veto::PostPeak => "post-peak",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyOutcome {
    pub forecast_mmol: f64,
    pub veto: Option<Veto>,
    pub dose: f64,
}

/// One-hour ballistic forecast: `bg + slope + 0.5 * accel`.
#[inline]
pub fn hypo_forecast(ctx: &DecisionContext) -> f64 {
    ctx.bg_now + ctx.slope + 0.5 * ctx.acceleration
}

pub fn apply(
    dose: f64,
    ctx: &DecisionContext,
    ledger: &CommitLedger,
    commit: &CommitCfg,
    cfg: &SafetyCfg,
    now_ms: i64,
) -> SafetyOutcome {
    let forecast_mmol = hypo_forecast(ctx);
    let veto = if forecast_mmol <= cfg.hypo_threshold_mmol {
        Some(Veto::Hypo)
    } else if ledger.minutes_since_commit(now_ms) < commit.absorption_window_min
        && (ctx.slope <= commit.peak_slope_threshold
            || ctx.acceleration <= commit.peak_accel_threshold)
        && ctx.iob_ratio >= POST_PEAK_IOB_RATIO
    {
        Some(Veto::PostPeak)
    } else {
        None
    };
    if let Some(v) = veto {
        if dose > 0.0 {
            tracing::debug!(veto = v.as_str(), forecast_mmol, dose, "safety veto");
        }
    }
    SafetyOutcome {
        forecast_mmol,
        veto,
        dose: if veto.is_some() { 0.0 } else { dose },
    }
}
