//! `From` implementations bridging `glyco_config` sections to the runtime
//! `Tunables` snapshot.

use crate::config::{
    CommitCfg, DayNightCfg, DeliveryCfg, EnergyCfg, HoldCfg, IobCfg, MealCfg, PeakCfg, ReentryCfg,
    SafetyCfg, Tunables,
};

// ── DayNightCfg ──────────────────────────────────────────────────────────────

impl From<&glyco_config::Profile> for DayNightCfg {
    fn from(c: &glyco_config::Profile) -> Self {
        Self {
            gain_day: c.gain_day,
            gain_night: c.gain_night,
            max_single_dose_day_u: c.max_single_dose_day_u,
            max_single_dose_night_u: c.max_single_dose_night_u,
        }
    }
}

// ── EnergyCfg ────────────────────────────────────────────────────────────────

impl From<&glyco_config::EnergyCfg> for EnergyCfg {
    fn from(c: &glyco_config::EnergyCfg) -> Self {
        Self {
            k_delta: c.k_delta,
            k_slope: c.k_slope,
            k_accel: c.k_accel,
            min_consistency: c.min_consistency,
            consistency_exp: c.consistency_exp,
            stagnation_energy_boost: c.stagnation_energy_boost,
            stagnation_delta_min: c.stagnation_delta_min,
            stagnation_slope_max_neg: c.stagnation_slope_max_neg,
            stagnation_slope_max_pos: c.stagnation_slope_max_pos,
            stagnation_accel_max_abs: c.stagnation_accel_max_abs,
        }
    }
}

// ── IobCfg ───────────────────────────────────────────────────────────────────

impl From<&glyco_config::IobCfg> for IobCfg {
    fn from(c: &glyco_config::IobCfg) -> Self {
        Self {
            damping_start: c.damping_start,
            damping_max: c.damping_max,
            min_factor: c.min_factor,
            primary_power: c.primary_power,
            commit_power: c.commit_power,
            peak_boost: c.peak_boost,
            peak_boost_span_mmol: c.peak_boost_span_mmol,
        }
    }
}

// ── MealCfg ──────────────────────────────────────────────────────────────────

impl From<&glyco_config::MealCfg> for MealCfg {
    fn from(c: &glyco_config::MealCfg) -> Self {
        Self {
            slope_min: c.slope_min,
            slope_span: c.slope_span,
            accel_min: c.accel_min,
            accel_span: c.accel_span,
            delta_min: c.delta_min,
            delta_span: c.delta_span,
            confirm_threshold: c.confirm_threshold,
            uncertain_threshold: c.uncertain_threshold,
        }
    }
}

// ── PeakCfg ──────────────────────────────────────────────────────────────────

impl From<&glyco_config::PeakCfg> for PeakCfg {
    fn from(c: &glyco_config::PeakCfg) -> Self {
        Self {
            horizon_hours: c.horizon_hours,
            memory_fraction: c.memory_fraction,
            momentum_half_life_min: c.momentum_half_life_min,
            momentum_gain: c.momentum_gain,
            rise_carry_gain: c.rise_carry_gain,
            max_prediction_mmol: c.max_prediction_mmol,
            watch_threshold_mmol: c.watch_threshold_mmol,
            min_consistency: c.min_consistency,
            min_slope: c.min_slope,
            min_momentum: c.min_momentum,
            confirm_cycles: c.confirm_cycles,
            exit_accel: c.exit_accel,
            exit_slope: c.exit_slope,
        }
    }
}

// ── HoldCfg ──────────────────────────────────────────────────────────────────

impl From<&glyco_config::HoldCfg> for HoldCfg {
    fn from(c: &glyco_config::HoldCfg) -> Self {
        Self {
            correction_hold_slope_max: c.correction_hold_slope_max,
            correction_hold_accel_max: c.correction_hold_accel_max,
            correction_hold_delta_max: c.correction_hold_delta_max,
            small_correction_max_u: c.small_correction_max_u,
            small_correction_cooldown_min: c.small_correction_cooldown_min,
        }
    }
}

// ── CommitCfg ────────────────────────────────────────────────────────────────

impl From<&glyco_config::CommitCfg> for CommitCfg {
    fn from(c: &glyco_config::CommitCfg) -> Self {
        Self {
            cooldown_min: c.cooldown_min,
            uncertain_min: c.uncertain_min,
            uncertain_max: c.uncertain_max,
            confirm_min: c.confirm_min,
            confirm_max: c.confirm_max,
            min_dose_u: c.min_dose_u,
            absorption_window_min: c.absorption_window_min,
            absorption_dose_factor: c.absorption_dose_factor,
            peak_slope_threshold: c.peak_slope_threshold,
            peak_accel_threshold: c.peak_accel_threshold,
        }
    }
}

// ── ReentryCfg ───────────────────────────────────────────────────────────────

impl From<&glyco_config::ReentryCfg> for ReentryCfg {
    fn from(c: &glyco_config::ReentryCfg) -> Self {
        Self {
            min_minutes_since_commit: c.min_minutes_since_commit,
            cooldown_min: c.cooldown_min,
            slope_min: c.slope_min,
            accel_min: c.accel_min,
            delta_min: c.delta_min,
            min_consistency: c.min_consistency,
        }
    }
}

// ── SafetyCfg / DeliveryCfg ──────────────────────────────────────────────────

impl From<&glyco_config::Safety> for SafetyCfg {
    fn from(c: &glyco_config::Safety) -> Self {
        Self {
            hypo_threshold_mmol: c.hypo_threshold_mmol,
        }
    }
}

impl From<&glyco_config::Delivery> for DeliveryCfg {
    fn from(c: &glyco_config::Delivery) -> Self {
        Self {
            cycle_minutes: c.cycle_minutes,
            max_basal_rate_u_per_h: c.max_basal_rate_u_per_h,
            basal_step_u_per_h: c.basal_step_u_per_h,
            bolus_step_u: c.bolus_step_u,
            min_bolus_u: c.min_bolus_u,
            small_dose_threshold_u: c.small_dose_threshold_u,
            hybrid_percent: c.hybrid_percent,
        }
    }
}

// ── Tunables ─────────────────────────────────────────────────────────────────

impl From<&glyco_config::Config> for Tunables {
    fn from(c: &glyco_config::Config) -> Self {
        Self {
            day_night: (&c.profile).into(),
            energy: (&c.energy).into(),
            iob: (&c.iob).into(),
            meal: (&c.meal).into(),
            peak: (&c.peak).into(),
            holds: (&c.holds).into(),
            commit: (&c.commit).into(),
            reentry: (&c.reentry).into(),
            safety: (&c.safety).into(),
            delivery: (&c.delivery).into(),
        }
    }
}
