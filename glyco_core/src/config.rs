//! Runtime tunables for the decision engine.
//!
//! `Tunables` is the immutable per-cycle snapshot the engine decides against.
//! It is separate from the TOML-deserialized schema in `glyco_config`; see
//! `conversions` for the mapping.

/// Day/night selection of the two tunables that differ by time of day.
#[derive(Debug, Clone)]
pub struct DayNightCfg {
    pub gain_day: f64,
    pub gain_night: f64,
    /// Per-cycle dose cap (U) by day.
    pub max_single_dose_day_u: f64,
    /// Per-cycle dose cap (U) by night.
    pub max_single_dose_night_u: f64,
}

impl DayNightCfg {
    /// Returns `(gain, max_single_dose_u)` for the requested period.
    #[inline]
    pub fn select(&self, night: bool) -> (f64, f64) {
        if night {
            (self.gain_night, self.max_single_dose_night_u)
        } else {
            (self.gain_day, self.max_single_dose_day_u)
        }
    }
}

impl Default for DayNightCfg {
    fn default() -> Self {
        Self {
            gain_day: 0.5,
            gain_night: 0.35,
            max_single_dose_day_u: 1.2,
            max_single_dose_night_u: 0.8,
        }
    }
}

/// Energy model weights and the stagnation boost window.
#[derive(Debug, Clone)]
pub struct EnergyCfg {
    pub k_delta: f64,
    pub k_slope: f64,
    pub k_accel: f64,
    /// Consistency floor for energy scaling. Also gates meal detection, the
    /// trajectory damper and the correction hold.
    pub min_consistency: f64,
    pub consistency_exp: f64,
    pub stagnation_energy_boost: f64,
    pub stagnation_delta_min: f64,
    pub stagnation_slope_max_neg: f64,
    pub stagnation_slope_max_pos: f64,
    pub stagnation_accel_max_abs: f64,
}

impl Default for EnergyCfg {
    fn default() -> Self {
        Self {
            k_delta: 0.35,
            k_slope: 0.9,
            k_accel: 1.5,
            min_consistency: 0.35,
            consistency_exp: 1.0,
            stagnation_energy_boost: 0.15,
            stagnation_delta_min: 2.0,
            stagnation_slope_max_neg: -0.3,
            stagnation_slope_max_pos: 0.3,
            stagnation_accel_max_abs: 0.15,
        }
    }
}

/// IOB damping curve parameters (see `damping::iob_damping`).
#[derive(Debug, Clone)]
pub struct IobCfg {
    pub damping_start: f64,
    pub damping_max: f64,
    pub min_factor: f64,
    pub primary_power: f64,
    pub commit_power: f64,
    pub peak_boost: f64,
    pub peak_boost_span_mmol: f64,
}

impl Default for IobCfg {
    fn default() -> Self {
        Self {
            damping_start: 0.3,
            damping_max: 1.0,
            min_factor: 0.15,
            primary_power: 1.5,
            commit_power: 2.5,
            peak_boost: 0.25,
            peak_boost_span_mmol: 3.0,
        }
    }
}

/// Meal signal scoring.
#[derive(Debug, Clone)]
pub struct MealCfg {
    pub slope_min: f64,
    pub slope_span: f64,
    pub accel_min: f64,
    pub accel_span: f64,
    pub delta_min: f64,
    pub delta_span: f64,
    pub confirm_threshold: f64,
    pub uncertain_threshold: f64,
}

impl Default for MealCfg {
    fn default() -> Self {
        Self {
            slope_min: 0.8,
            slope_span: 1.5,
            accel_min: 0.1,
            accel_span: 0.5,
            delta_min: 1.0,
            delta_span: 4.0,
            confirm_threshold: 0.65,
            uncertain_threshold: 0.35,
        }
    }
}

/// Peak episode estimator.
#[derive(Debug, Clone)]
pub struct PeakCfg {
    pub horizon_hours: f64,
    pub memory_fraction: f64,
    pub momentum_half_life_min: f64,
    pub momentum_gain: f64,
    pub rise_carry_gain: f64,
    pub max_prediction_mmol: f64,
    pub watch_threshold_mmol: f64,
    pub min_consistency: f64,
    pub min_slope: f64,
    pub min_momentum: f64,
    pub confirm_cycles: u32,
    pub exit_accel: f64,
    pub exit_slope: f64,
}

impl Default for PeakCfg {
    fn default() -> Self {
        Self {
            horizon_hours: 0.75,
            memory_fraction: 0.6,
            momentum_half_life_min: 20.0,
            momentum_gain: 0.5,
            rise_carry_gain: 0.5,
            max_prediction_mmol: 25.0,
            watch_threshold_mmol: 11.0,
            min_consistency: 0.5,
            min_slope: 1.0,
            min_momentum: 0.1,
            confirm_cycles: 3,
            exit_accel: -0.1,
            exit_slope: 0.3,
        }
    }
}

/// Micro-correction hold and anti-drip cooldown.
#[derive(Debug, Clone)]
pub struct HoldCfg {
    pub correction_hold_slope_max: f64,
    pub correction_hold_accel_max: f64,
    pub correction_hold_delta_max: f64,
    pub small_correction_max_u: f64,
    pub small_correction_cooldown_min: f64,
}

impl Default for HoldCfg {
    fn default() -> Self {
        Self {
            correction_hold_slope_max: 0.3,
            correction_hold_accel_max: 0.05,
            correction_hold_delta_max: 3.0,
            small_correction_max_u: 0.15,
            small_correction_cooldown_min: 20.0,
        }
    }
}

/// Commit escalation and post-commit absorption.
#[derive(Debug, Clone)]
pub struct CommitCfg {
    pub cooldown_min: f64,
    pub uncertain_min: f64,
    pub uncertain_max: f64,
    pub confirm_min: f64,
    pub confirm_max: f64,
    pub min_dose_u: f64,
    pub absorption_window_min: f64,
    pub absorption_dose_factor: f64,
    pub peak_slope_threshold: f64,
    pub peak_accel_threshold: f64,
}

impl Default for CommitCfg {
    fn default() -> Self {
        Self {
            cooldown_min: 45.0,
            uncertain_min: 0.25,
            uncertain_max: 0.45,
            confirm_min: 0.45,
            confirm_max: 0.8,
            min_dose_u: 0.2,
            absorption_window_min: 90.0,
            absorption_dose_factor: 0.25,
            peak_slope_threshold: 0.3,
            peak_accel_threshold: -0.05,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReentryCfg {
    pub min_minutes_since_commit: f64,
    pub cooldown_min: f64,
    pub slope_min: f64,
    pub accel_min: f64,
    pub delta_min: f64,
    pub min_consistency: f64,
}

impl Default for ReentryCfg {
    fn default() -> Self {
        Self {
            min_minutes_since_commit: 30.0,
            cooldown_min: 60.0,
            slope_min: 1.2,
            accel_min: 0.15,
            delta_min: 2.0,
            min_consistency: 0.55,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SafetyCfg {
    pub hypo_threshold_mmol: f64,
}

impl Default for SafetyCfg {
    fn default() -> Self {
        Self {
            hypo_threshold_mmol: 4.4,
        }
    }
}

/// Device rounding, caps and the bolus/basal split.
#[derive(Debug, Clone)]
pub struct DeliveryCfg {
    pub cycle_minutes: f64,
    pub max_basal_rate_u_per_h: f64,
    pub basal_step_u_per_h: f64,
    pub bolus_step_u: f64,
    pub min_bolus_u: f64,
    pub small_dose_threshold_u: f64,
    pub hybrid_percent: f64,
}

impl Default for DeliveryCfg {
    fn default() -> Self {
        Self {
            cycle_minutes: 5.0,
            max_basal_rate_u_per_h: 15.0,
            basal_step_u_per_h: 0.05,
            bolus_step_u: 0.05,
            min_bolus_u: 0.05,
            small_dose_threshold_u: 0.1,
            hybrid_percent: 50.0,
        }
    }
}

/// Complete per-cycle configuration snapshot.
#[derive(Debug, Clone, Default)]
pub struct Tunables {
    pub day_night: DayNightCfg,
    pub energy: EnergyCfg,
    pub iob: IobCfg,
    pub meal: MealCfg,
    pub peak: PeakCfg,
    pub holds: HoldCfg,
    pub commit: CommitCfg,
    pub reentry: ReentryCfg,
    pub safety: SafetyCfg,
    pub delivery: DeliveryCfg,
}
