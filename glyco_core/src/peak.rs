//! Peak episode estimator.
//!
//! An episode is a contiguous rise in glucose. While one is active the
//! estimator keeps a short memory of how hard glucose has been climbing
//! (running maxima, positive-slope area, a leaky momentum integrator) and
//! projects a peak from it. A three-step sub-state machine
//! (`Idle -> Watching -> Confirmed`) tracks how settled that projection is.
//!
//! Episode start/exit and the early-dose reset that goes with them are driven
//! by `Session::step_episode`; this module owns the per-episode arithmetic.

use crate::config::PeakCfg;
use crate::context::DecisionContext;
use crate::meal::MealState;
use crate::util::minutes_between;

const START_DELTA: f64 = 0.8;
const START_SLOPE: f64 = 0.6;
const START_CONSISTENCY: f64 = 0.45;
const EXIT_SLOPE: f64 = -0.6;
const EXIT_CONSISTENCY: f64 = 0.55;
const EXIT_DELTA: f64 = 0.6;
/// Elapsed time credited to one memory update (hours).
const MAX_MEMORY_DT_H: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeakSubState {
    #[default]
    Idle,
    Watching,
    Confirmed,
}

impl PeakSubState {
    pub fn as_str(self) -> &'static str {
        match self {
            PeakSubState::Idle => "idle",
            PeakSubState::Watching => "watching",
            PeakSubState::Confirmed => "confirmed",
        }
    }
}

/// Ordered bucket of the predicted peak (mmol/L).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PeakCategory {
    None,
    Mild,
    Meal,
    High,
    Extreme,
}

impl PeakCategory {
    pub fn from_peak(predicted_mmol: f64) -> Self {
        match predicted_mmol {
            p if p >= 17.5 => PeakCategory::Extreme,
            p if p >= 14.5 => PeakCategory::High,
            p if p >= 11.8 => PeakCategory::Meal,
            p if p >= 9.8 => PeakCategory::Mild,
            _ => PeakCategory::None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PeakCategory::None => "none",
            PeakCategory::Mild => "mild",
            PeakCategory::Meal => "meal",
            PeakCategory::High => "high",
            PeakCategory::Extreme => "extreme",
        }
    }
}

/// Coarse display band of the predicted peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PeakBand {
    Below10,
    From10To12,
    From12To15,
    From15To20,
    Above20,
}

impl PeakBand {
    pub fn from_peak(predicted_mmol: f64) -> Self {
        match predicted_mmol {
            p if p >= 20.0 => PeakBand::Above20,
            p if p >= 15.0 => PeakBand::From15To20,
            p if p >= 12.0 => PeakBand::From12To15,
            p if p >= 10.0 => PeakBand::From10To12,
            _ => PeakBand::Below10,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PeakBand::Below10 => "<10",
            PeakBand::From10To12 => "10-12",
            PeakBand::From12To15 => "12-15",
            PeakBand::From15To20 => "15-20",
            PeakBand::Above20 => ">=20",
        }
    }
}

/// Persistent episode memory. Single writer: the owning `Session`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeakEpisode {
    pub active: bool,
    pub start_ms: Option<i64>,
    pub start_bg: f64,
    /// Running max of the positive slope (mmol/L/h).
    pub max_slope: f64,
    /// Running max of the positive acceleration.
    pub max_accel: f64,
    /// Accumulated positive slope times elapsed hours (mmol/L).
    pub rise_area: f64,
    pub momentum: f64,
    pub last_update_ms: Option<i64>,
    pub sub_state: PeakSubState,
    pub confirm_count: u32,
}

/// Component projections behind one peak prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakPrediction {
    pub local: f64,
    pub memory: f64,
    pub momentum_carry: f64,
    pub rise_carry: f64,
    pub rise_since_start: f64,
    /// Max of the above, floored at current glucose and capped.
    pub predicted: f64,
}

/// What one `Session::step_episode` call observed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakOutcome {
    pub started: bool,
    pub exited: bool,
    pub active: bool,
    pub prediction: PeakPrediction,
    pub sub_state: PeakSubState,
    pub confirm_count: u32,
    pub category: PeakCategory,
    pub band: PeakBand,
    pub momentum: f64,
}

pub fn start_condition(ctx: &DecisionContext, meal: MealState) -> bool {
    meal.is_signal()
        || (ctx.delta_to_target >= START_DELTA
            && ctx.slope >= START_SLOPE
            && ctx.consistency >= START_CONSISTENCY)
}

pub fn exit_condition(ctx: &DecisionContext) -> bool {
    (ctx.slope <= EXIT_SLOPE && ctx.consistency >= EXIT_CONSISTENCY)
        || ctx.delta_to_target < EXIT_DELTA
}

/// Constant-acceleration projection with the rising parts only.
#[inline]
fn ballistic(bg: f64, slope: f64, accel: f64, horizon_h: f64) -> f64 {
    bg + slope.max(0.0) * horizon_h + 0.5 * accel.max(0.0) * horizon_h * horizon_h
}

impl PeakEpisode {
    /// Fresh episode seeded from the current trend.
    pub fn begin(&mut self, now_ms: i64, ctx: &DecisionContext) {
        *self = PeakEpisode {
            active: true,
            start_ms: Some(now_ms),
            start_bg: ctx.bg_now,
            max_slope: ctx.slope.max(0.0),
            max_accel: ctx.acceleration.max(0.0),
            last_update_ms: Some(now_ms),
            ..PeakEpisode::default()
        };
    }

    /// Deactivate and drop the sub-state. Memory is kept until the next
    /// `begin` but no longer feeds predictions.
    pub fn end(&mut self) {
        self.active = false;
        self.sub_state = PeakSubState::Idle;
        self.confirm_count = 0;
    }

    pub fn update_memory(&mut self, now_ms: i64, ctx: &DecisionContext, cfg: &PeakCfg) {
        let elapsed_min = self
            .last_update_ms
            .map_or(0.0, |t| minutes_between(t, now_ms));
        let dt_h = (elapsed_min / 60.0).min(MAX_MEMORY_DT_H);
        let rising = ctx.slope.max(0.0);

        self.max_slope = self.max_slope.max(rising);
        self.max_accel = self.max_accel.max(ctx.acceleration.max(0.0));
        self.rise_area += rising * dt_h;

        let decay = if cfg.momentum_half_life_min > 0.0 {
            0.5_f64.powf(elapsed_min / cfg.momentum_half_life_min)
        } else {
            0.0
        };
        self.momentum = self.momentum * decay + rising * dt_h;
        self.last_update_ms = Some(now_ms);
    }

    pub fn rise_since_start(&self, bg_now: f64) -> f64 {
        if self.active {
            (bg_now - self.start_bg).max(0.0)
        } else {
            0.0
        }
    }

    pub fn predict(&self, ctx: &DecisionContext, cfg: &PeakCfg) -> PeakPrediction {
        let bg = ctx.bg_now;
        let h = cfg.horizon_hours;
        let local = ballistic(bg, ctx.slope, ctx.acceleration, h);
        let rise_since_start = self.rise_since_start(bg);
        let (memory, momentum_carry, rise_carry) = if self.active {
            let slope = ctx.slope.max(cfg.memory_fraction * self.max_slope);
            let accel = ctx.acceleration.max(cfg.memory_fraction * self.max_accel);
            (
                ballistic(bg, slope, accel, h),
                bg + cfg.momentum_gain * self.momentum,
                bg + cfg.rise_carry_gain * rise_since_start,
            )
        } else {
            (bg, bg, bg)
        };
        let predicted = local
            .max(memory)
            .max(momentum_carry)
            .max(rise_carry)
            .min(cfg.max_prediction_mmol)
            .max(bg);
        PeakPrediction {
            local,
            memory,
            momentum_carry,
            rise_carry,
            rise_since_start,
            predicted,
        }
    }

    pub fn advance_sub_state(
        &mut self,
        prediction: &PeakPrediction,
        ctx: &DecisionContext,
        cfg: &PeakCfg,
    ) {
        let holds = prediction.predicted >= cfg.watch_threshold_mmol
            && ctx.consistency >= cfg.min_consistency
            && self.momentum >= cfg.min_momentum;
        match self.sub_state {
            PeakSubState::Idle => {
                let steep = ctx.slope >= cfg.min_slope || self.max_slope >= cfg.min_slope;
                if holds && steep {
                    self.sub_state = PeakSubState::Watching;
                    self.confirm_count = 1;
                }
            }
            PeakSubState::Watching => {
                if holds {
                    self.confirm_count = self.confirm_count.saturating_add(1);
                    if self.confirm_count >= cfg.confirm_cycles {
                        self.sub_state = PeakSubState::Confirmed;
                    }
                } else {
                    self.sub_state = PeakSubState::Idle;
                    self.confirm_count = 0;
                }
            }
            PeakSubState::Confirmed => {
                if ctx.acceleration < cfg.exit_accel || ctx.slope < cfg.exit_slope {
                    self.sub_state = PeakSubState::Idle;
                    self.confirm_count = 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ctx(bg: f64, slope: f64, accel: f64, consistency: f64) -> DecisionContext {
        DecisionContext {
            bg_now: bg,
            slope,
            acceleration: accel,
            consistency,
            iob_ratio: 0.0,
            delta_to_target: bg - 5.5,
        }
    }

    #[test]
    fn category_and_band_buckets() {
        assert_eq!(PeakCategory::from_peak(9.7), PeakCategory::None);
        assert_eq!(PeakCategory::from_peak(9.8), PeakCategory::Mild);
        assert_eq!(PeakCategory::from_peak(11.8), PeakCategory::Meal);
        assert_eq!(PeakCategory::from_peak(14.5), PeakCategory::High);
        assert_eq!(PeakCategory::from_peak(30.0), PeakCategory::Extreme);
        assert!(PeakCategory::High > PeakCategory::Meal);
        assert_eq!(PeakBand::from_peak(11.9).label(), "10-12");
        assert_eq!(PeakBand::from_peak(20.0).label(), ">=20");
    }

    #[test]
    fn momentum_decays_by_half_life() {
        let cfg = PeakCfg::default();
        let mut ep = PeakEpisode::default();
        ep.begin(0, &ctx(9.0, 0.0, 0.0, 0.9));
        ep.momentum = 1.0;
        ep.update_memory(20 * 60_000, &ctx(9.0, 0.0, 0.0, 0.9), &cfg);
        assert!((ep.momentum - 0.5).abs() < 1e-12);
    }

    #[test]
    fn memory_credit_is_capped() {
        let cfg = PeakCfg::default();
        let mut ep = PeakEpisode::default();
        let c = ctx(9.0, 2.0, 0.0, 0.9);
        ep.begin(0, &c);
        ep.update_memory(60 * 60_000, &c, &cfg);
        assert!((ep.rise_area - 0.4).abs() < 1e-12);
    }

    #[test]
    fn prediction_is_capped_and_never_below_bg() {
        let cfg = PeakCfg::default();
        let ep = PeakEpisode::default();
        let p = ep.predict(&ctx(8.0, -3.0, -1.0, 0.9), &cfg);
        assert_eq!(p.predicted, 8.0);
        let p = ep.predict(&ctx(20.0, 30.0, 5.0, 0.9), &cfg);
        assert_eq!(p.predicted, cfg.max_prediction_mmol);
        let p = ep.predict(&ctx(27.0, 1.0, 0.0, 0.9), &cfg);
        assert_eq!(p.predicted, 27.0);
    }

    #[test]
    fn watching_reverts_when_conditions_lapse() {
        let cfg = PeakCfg::default();
        let mut ep = PeakEpisode::default();
        let c = ctx(10.5, 2.5, 0.3, 0.9);
        ep.begin(0, &c);
        ep.momentum = 0.5;
        let p = ep.predict(&c, &cfg);
        ep.advance_sub_state(&p, &c, &cfg);
        assert_eq!(ep.sub_state, PeakSubState::Watching);
        assert_eq!(ep.confirm_count, 1);

        let weak = ctx(10.5, 2.5, 0.3, 0.2);
        ep.advance_sub_state(&p, &weak, &cfg);
        assert_eq!(ep.sub_state, PeakSubState::Idle);
        assert_eq!(ep.confirm_count, 0);
    }

    #[rstest]
    #[case(2)]
    #[case(3)]
    #[case(5)]
    fn watching_promotes_after_confirm_cycles(#[case] confirm_cycles: u32) {
        let cfg = PeakCfg {
            confirm_cycles,
            ..PeakCfg::default()
        };
        let mut ep = PeakEpisode::default();
        let c = ctx(10.5, 2.5, 0.3, 0.9);
        ep.begin(0, &c);
        ep.momentum = 0.5;
        let p = ep.predict(&c, &cfg);
        for cycle in 1..confirm_cycles {
            ep.advance_sub_state(&p, &c, &cfg);
            assert_eq!(ep.sub_state, PeakSubState::Watching, "cycle {cycle}");
            assert_eq!(ep.confirm_count, cycle);
        }
        ep.advance_sub_state(&p, &c, &cfg);
        assert_eq!(ep.sub_state, PeakSubState::Confirmed);
        assert_eq!(ep.confirm_count, confirm_cycles);
    }

    #[rstest]
    #[case::decelerating(2.5, -0.2, PeakSubState::Idle)]
    #[case::flattening(0.2, 0.3, PeakSubState::Idle)]
    #[case::at_both_limits(0.3, -0.1, PeakSubState::Confirmed)]
    #[case::still_climbing(1.5, 0.1, PeakSubState::Confirmed)]
    fn confirmed_exits_on_deceleration_or_flat_slope(
        #[case] slope: f64,
        #[case] accel: f64,
        #[case] expected: PeakSubState,
    ) {
        let cfg = PeakCfg::default();
        let mut ep = PeakEpisode::default();
        let c = ctx(12.0, slope, accel, 0.9);
        ep.begin(0, &c);
        ep.sub_state = PeakSubState::Confirmed;
        ep.confirm_count = cfg.confirm_cycles;
        let p = ep.predict(&c, &cfg);
        ep.advance_sub_state(&p, &c, &cfg);
        assert_eq!(ep.sub_state, expected);
        let count = if expected == PeakSubState::Idle { 0 } else { cfg.confirm_cycles };
        assert_eq!(ep.confirm_count, count);
    }
}
