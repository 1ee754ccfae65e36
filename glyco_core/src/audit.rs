//! Flattens a `DecisionTrace` into the ordered audit row.
//!
//! A fail-safe cycle has no trace; it still writes a row with the same
//! fields, zero delivery and the fault in `fail_safe`.

use crate::engine::DecisionTrace;
use crate::execution::ExecutionMode;

/// Field names in row order. Stable across cycles.
pub const FIELDS: &[&str] = &[
    "now_ms",
    "night",
    "segment",
    "bg",
    "slope",
    "accel",
    "consistency",
    "trend_phase",
    "iob_ratio",
    "delta_to_target",
    "energy_base",
    "energy_stagnation",
    "energy_total",
    "raw_dose",
    "gate_layer",
    "gate_dampening",
    "decided_dose",
    "meal_state",
    "meal_confidence",
    "episode_active",
    "episode_started",
    "episode_exited",
    "predicted_peak",
    "peak_category",
    "peak_sub_state",
    "peak_momentum",
    "boosted_iob_ratio",
    "primary_iob_factor",
    "dose_after_damping",
    "reentry",
    "early_prior_stage",
    "early_stage",
    "early_confidence",
    "early_floor_u",
    "early_protection",
    "trajectory_factor",
    "hard_block",
    "correction_hold",
    "early_floor_applied",
    "anti_drip_blocked",
    "absorption",
    "commit_fraction",
    "commit_dose",
    "commit_reason",
    "hypo_forecast",
    "safety_veto",
    "final_dose",
    "bolus_u",
    "basal_rate_u_per_h",
    "delivered_u",
    "execution_mode",
    "fail_safe",
];

fn f(v: f64) -> String {
    format!("{v:.4}")
}

pub fn record(t: &DecisionTrace) -> Vec<(&'static str, String)> {
    let values: [String; 52] = [
        t.now_ms.to_string(),
        t.night.to_string(),
        t.segment.to_string(),
        f(t.ctx.bg_now),
        f(t.ctx.slope),
        f(t.ctx.acceleration),
        f(t.ctx.consistency),
        t.trend.phase.as_str().to_string(),
        f(t.ctx.iob_ratio),
        f(t.ctx.delta_to_target),
        f(t.energy.base),
        f(t.energy.stagnation_boost),
        f(t.energy.total),
        f(t.energy.raw_dose),
        t.gate.layer.as_str().to_string(),
        f(t.gate.dampening),
        f(t.gate.decided_dose),
        t.meal.state.as_str().to_string(),
        f(t.meal.confidence),
        t.peak.active.to_string(),
        t.peak.started.to_string(),
        t.peak.exited.to_string(),
        f(t.peak.prediction.predicted),
        t.peak.category.as_str().to_string(),
        t.peak.sub_state.as_str().to_string(),
        f(t.peak.momentum),
        f(t.boosted_iob_ratio),
        f(t.primary_iob_factor),
        f(t.dose_after_damping),
        t.reentry.to_string(),
        t.early.prior_stage.to_string(),
        t.early.stage.to_string(),
        f(t.early.confidence),
        f(t.early.floor_u),
        t.early.protection_window.to_string(),
        f(t.damper.factor),
        t.hard_block.to_string(),
        t.correction_hold.to_string(),
        t.early_floor_applied.to_string(),
        t.anti_drip_blocked.to_string(),
        t.commit.absorption.to_string(),
        f(t.commit.fraction),
        f(t.commit.commit_dose),
        t.commit
            .committed
            .map_or("", |r| r.as_str())
            .to_string(),
        f(t.safety.forecast_mmol),
        t.safety.veto.map_or("", |v| v.as_str()).to_string(),
        f(t.final_dose_u),
        f(t.execution.bolus_u),
        f(t.execution.basal_rate_u_per_h),
        f(t.execution.delivered_u),
        t.execution.mode.as_str().to_string(),
        String::new(),
    ];
    FIELDS.iter().copied().zip(values).collect()
}

/// Row for a cycle that failed safe. Fields the pipeline never reached are
/// left empty.
pub fn fail_safe_record(
    now_ms: i64,
    night: bool,
    segment: u64,
    reason: &str,
) -> Vec<(&'static str, String)> {
    FIELDS
        .iter()
        .map(|&name| {
            let v = match name {
                "now_ms" => now_ms.to_string(),
                "night" => night.to_string(),
                "segment" => segment.to_string(),
                "final_dose" | "bolus_u" | "basal_rate_u_per_h" | "delivered_u" => f(0.0),
                "execution_mode" => ExecutionMode::Cancel.as_str().to_string(),
                "fail_safe" => reason.to_string(),
                _ => String::new(),
            };
            (name, v)
        })
        .collect()
}
