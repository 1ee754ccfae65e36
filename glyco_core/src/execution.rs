//! Maps a commanded dose onto a bolus plus a temp basal rate honoring the
//! pump's step sizes and rate cap.
//!
//! Every rounding goes down, so the delivered total never exceeds the
//! commanded dose. Rounding is to the step below, never to the nearest step.
//! A shortfall is never made up on a later cycle.

use crate::config::DeliveryCfg;
use crate::util::floor_to_step;

/// Lower bound for the cycle length used in rate conversions (minutes).
const MIN_CYCLE_MINUTES: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Nothing to deliver; the zero basal cancels a running temp basal.
    Cancel,
    Basal,
    Hybrid,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Cancel => "cancel",
            ExecutionMode::Basal => "basal",
            ExecutionMode::Hybrid => "hybrid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionResult {
    pub bolus_u: f64,
    pub basal_rate_u_per_h: f64,
    /// `bolus_u + basal_rate_u_per_h * cycle_hours`; never above the dose.
    pub delivered_u: f64,
    pub mode: ExecutionMode,
}

impl ExecutionResult {
    const CANCEL: ExecutionResult = ExecutionResult {
        bolus_u: 0.0,
        basal_rate_u_per_h: 0.0,
        delivered_u: 0.0,
        mode: ExecutionMode::Cancel,
    };
}

fn cycle_hours(cfg: &DeliveryCfg) -> f64 {
    let minutes = if cfg.cycle_minutes.is_finite() {
        cfg.cycle_minutes.max(MIN_CYCLE_MINUTES)
    } else {
        MIN_CYCLE_MINUTES
    };
    minutes / 60.0
}

/// Rate that delivers `units` over one cycle, capped and stepped down.
fn basal_rate_for(units: f64, cycle_h: f64, cfg: &DeliveryCfg) -> f64 {
    let cap = cfg.max_basal_rate_u_per_h;
    floor_to_step((units / cycle_h).min(cap), cfg.basal_step_u_per_h).min(cap)
}

/// Rounded bolus for `units`, or 0 when it would fall under the pump minimum.
fn bolus_for(units: f64, cfg: &DeliveryCfg) -> f64 {
    let b = floor_to_step(units, cfg.bolus_step_u);
    if b + 1e-9 >= cfg.min_bolus_u { b } else { 0.0 }
}

pub fn map(dose: f64, cfg: &DeliveryCfg) -> ExecutionResult {
    if !(dose.is_finite() && dose > 0.0) {
        return ExecutionResult::CANCEL;
    }
    let cycle_h = cycle_hours(cfg);

    let basal_only = dose < cfg.small_dose_threshold_u || cfg.hybrid_percent <= 0.0;
    let (mut bolus, basal_units, mode) = if basal_only {
        (0.0, dose, ExecutionMode::Basal)
    } else {
        let basal_share = dose * cfg.hybrid_percent.min(100.0) / 100.0;
        let bolus_share = dose - basal_share;
        let bolus = bolus_for(bolus_share, cfg).min(dose);
        if bolus > 0.0 {
            (bolus, basal_share, ExecutionMode::Hybrid)
        } else {
            (0.0, dose, ExecutionMode::Basal)
        }
    };

    let rate = basal_rate_for(basal_units, cycle_h, cfg);
    let shortfall = dose - bolus - rate * cycle_h;
    if shortfall >= cfg.min_bolus_u {
        bolus += bolus_for(shortfall, cfg).min(shortfall);
    }
    let bolus = bolus.min(dose);

    ExecutionResult {
        bolus_u: bolus,
        basal_rate_u_per_h: rate,
        delivered_u: bolus + rate * cycle_h,
        mode,
    }
}
