//! Energy model and the three-layer decision gate.

use crate::config::EnergyCfg;
use crate::context::DecisionContext;

/// Sensitivity floor (mmol/L per U) guarding the energy-to-dose division.
pub const MIN_ISF: f64 = 0.1;

/// Hard stop: trend too unreliable.
pub const HARD_STOP_CONSISTENCY: f64 = 0.2;
/// Hard stop: insulin already on board.
pub const HARD_STOP_IOB_RATIO: f64 = 1.1;
const FORCE_SLOPE: f64 = 2.0;
const FORCE_ACCEL: f64 = 0.5;
const FORCE_CONSISTENCY: f64 = 0.6;
const NIGHT_DAMPENING: f64 = 0.7;
const SOFT_DAMPENING_MIN: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyBreakdown {
    /// Weighted position/velocity/acceleration term after consistency scaling.
    pub base: f64,
    pub stagnation_boost: f64,
    pub total: f64,
    pub raw_dose: f64,
}

/// Evaluate the energy model and convert it into a raw candidate dose.
pub fn evaluate(
    ctx: &DecisionContext,
    cfg: &EnergyCfg,
    isf_mmol_per_u: f64,
    gain: f64,
) -> EnergyBreakdown {
    let scale = ctx
        .consistency
        .max(cfg.min_consistency)
        .powf(cfg.consistency_exp);
    let base = (cfg.k_delta * ctx.delta_to_target
        + cfg.k_slope * ctx.slope
        + cfg.k_accel * ctx.acceleration)
        * scale;

    let stagnating = ctx.delta_to_target >= cfg.stagnation_delta_min
        && ctx.slope >= cfg.stagnation_slope_max_neg
        && ctx.slope < cfg.stagnation_slope_max_pos
        && ctx.acceleration.abs() <= cfg.stagnation_accel_max_abs
        && ctx.consistency >= cfg.min_consistency;
    let stagnation_boost = if stagnating {
        cfg.stagnation_energy_boost * ctx.delta_to_target
    } else {
        0.0
    };

    let total = base + stagnation_boost;
    let raw_dose = if total <= 0.0 {
        0.0
    } else {
        (total / isf_mmol_per_u.max(MIN_ISF)) * gain
    };
    EnergyBreakdown {
        base,
        stagnation_boost,
        total,
        raw_dose,
    }
}

/// Which gate layer decided the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateLayer {
    /// (A) dose forced to 0; later stages may not raise it.
    HardStop,
    /// (C) strong, reliable rise: raw dose passes undamped.
    ForceAllow,
    /// (B) default: raw dose scaled by consistency (and night).
    SoftAllow,
}

impl GateLayer {
    pub fn as_str(self) -> &'static str {
        match self {
            GateLayer::HardStop => "hard-stop",
            GateLayer::ForceAllow => "force-allow",
            GateLayer::SoftAllow => "soft-allow",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateOutcome {
    pub layer: GateLayer,
    pub dampening: f64,
    pub decided_dose: f64,
}

impl GateOutcome {
    #[inline]
    pub fn blocked(&self) -> bool {
        self.layer == GateLayer::HardStop
    }
}

/// Apply the allow/block/force gate in fixed priority A, C, B.
pub fn gate(ctx: &DecisionContext, raw_dose: f64, night: bool) -> GateOutcome {
    if ctx.consistency < HARD_STOP_CONSISTENCY || ctx.iob_ratio > HARD_STOP_IOB_RATIO {
        return GateOutcome {
            layer: GateLayer::HardStop,
            dampening: 0.0,
            decided_dose: 0.0,
        };
    }
    if ctx.slope > FORCE_SLOPE
        && ctx.acceleration > FORCE_ACCEL
        && ctx.consistency > FORCE_CONSISTENCY
    {
        return GateOutcome {
            layer: GateLayer::ForceAllow,
            dampening: 1.0,
            decided_dose: raw_dose,
        };
    }
    let night_factor = if night { NIGHT_DAMPENING } else { 1.0 };
    let dampening = (night_factor * ctx.consistency).clamp(SOFT_DAMPENING_MIN, 1.0);
    GateOutcome {
        layer: GateLayer::SoftAllow,
        dampening,
        decided_dose: raw_dose * dampening,
    }
}
