#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and glucose trace loaders for the dosing controller.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//!   Every section defaults, so an empty file is a valid configuration.
//! - Glucose history and replay traces are CSV files with strict headers.
use serde::Deserialize;
use std::path::Path;

/// One smoothed glucose sample.
///
/// Expected headers:
/// timestamp_ms,mmol
///
/// Example:
/// timestamp_ms,mmol
/// 1700000000000,6.1
/// 1700000300000,6.4
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct GlucoseRow {
    pub timestamp_ms: i64,
    pub mmol: f64,
}

/// One control cycle of a replay trace: the glucose reading of the cycle and
/// the insulin-on-board reported by the pump at that time.
///
/// Expected headers:
/// timestamp_ms,mmol,iob_u
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct TraceRow {
    pub timestamp_ms: i64,
    pub mmol: f64,
    pub iob_u: f64,
}

/// Patient profile and day/night selection.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Profile {
    /// Target glucose (mmol/L) used when the caller does not pass one.
    pub target_mmol: f64,
    /// Maximum insulin-on-board (U); IOB ratio is measured against it.
    pub max_iob_u: f64,
    /// Effective insulin sensitivity (mmol/L per U).
    pub isf_mmol_per_u: f64,
    /// UTC hour at which night mode begins (0..=23).
    pub night_start_hour: u8,
    /// UTC hour at which night mode ends (0..=23). May wrap past midnight.
    pub night_end_hour: u8,
    pub gain_day: f64,
    pub gain_night: f64,
    /// Per-cycle dose cap (U) by day.
    pub max_single_dose_day_u: f64,
    /// Per-cycle dose cap (U) by night.
    pub max_single_dose_night_u: f64,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            target_mmol: 5.5,
            max_iob_u: 6.0,
            isf_mmol_per_u: 2.5,
            night_start_hour: 23,
            night_end_hour: 7,
            gain_day: 0.5,
            gain_night: 0.35,
            max_single_dose_day_u: 1.2,
            max_single_dose_night_u: 0.8,
        }
    }
}

impl Profile {
    /// Whether `timestamp_ms` falls into the night window.
    pub fn is_night_at(&self, timestamp_ms: i64) -> bool {
        let hour = (timestamp_ms.div_euclid(3_600_000)).rem_euclid(24) as u8;
        let (start, end) = (self.night_start_hour, self.night_end_hour);
        if start == end {
            false
        } else if start < end {
            (start..end).contains(&hour)
        } else {
            hour >= start || hour < end
        }
    }
}

/// Energy model weights and the stagnation boost window.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EnergyCfg {
    pub k_delta: f64,
    pub k_slope: f64,
    pub k_accel: f64,
    /// Consistency floor used when scaling energy; also the gate for meal
    /// detection, the trajectory damper and the correction hold.
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

/// IOB damping curve, shared by the primary and the commit path.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IobCfg {
    pub damping_start: f64,
    pub damping_max: f64,
    pub min_factor: f64,
    /// Exponent of the primary damping curve (smaller damps harder).
    pub primary_power: f64,
    /// Exponent of the commit-path damping curve.
    pub commit_power: f64,
    /// Extra weight added to the IOB ratio when no rise is predicted.
    pub peak_boost: f64,
    /// Predicted rise (mmol/L) at which the peak boost has fully faded.
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

#[derive(Debug, Deserialize)]
#[serde(default)]
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PeakCfg {
    /// Ballistic projection horizon (hours).
    pub horizon_hours: f64,
    /// Fraction of the episode's historical max slope/accel carried into the
    /// memory projection.
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
#[derive(Debug, Deserialize)]
#[serde(default)]
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

#[derive(Debug, Deserialize)]
#[serde(default)]
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

#[derive(Debug, Deserialize)]
#[serde(default)]
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Safety {
    /// One-hour ballistic forecast at or below this level forces zero dose.
    pub hypo_threshold_mmol: f64,
}

impl Default for Safety {
    fn default() -> Self {
        Self {
            hypo_threshold_mmol: 4.4,
        }
    }
}

/// Device rounding and the bolus/basal split.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Delivery {
    pub cycle_minutes: f64,
    pub max_basal_rate_u_per_h: f64,
    pub basal_step_u_per_h: f64,
    pub bolus_step_u: f64,
    pub min_bolus_u: f64,
    /// Doses below this are delivered entirely as temp basal.
    pub small_dose_threshold_u: f64,
    /// Share of a dose routed to temp basal in hybrid mode (0..=100).
    pub hybrid_percent: f64,
}

impl Default for Delivery {
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

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AuditCfg {
    /// Path of the per-cycle audit file (JSON lines). Absent disables it.
    pub file: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub profile: Profile,
    pub energy: EnergyCfg,
    pub iob: IobCfg,
    pub meal: MealCfg,
    pub peak: PeakCfg,
    pub holds: HoldCfg,
    pub commit: CommitCfg,
    pub reentry: ReentryCfg,
    pub safety: Safety,
    pub delivery: Delivery,
    pub logging: Logging,
    pub audit: AuditCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    /// Read, parse and validate a TOML config file.
    pub fn from_path(path: &Path) -> eyre::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
        let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

fn open_csv(path: &Path, expected: &[&str]) -> eyre::Result<csv::Reader<std::fs::File>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open CSV {:?}: {}", path, e))?;
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "CSV must have headers '{}', got: {}",
            expected.join(","),
            actual.join(",")
        );
    }
    Ok(rdr)
}

fn ensure_increasing(stamps: impl Iterator<Item = i64>) -> eyre::Result<()> {
    let mut prev: Option<i64> = None;
    for (idx, t) in stamps.enumerate() {
        if let Some(p) = prev
            && t <= p
        {
            eyre::bail!(
                "timestamps must be strictly increasing (row {} has {} after {})",
                idx + 2,
                t,
                p
            );
        }
        prev = Some(t);
    }
    Ok(())
}

/// Load a smoothed glucose history (`timestamp_ms,mmol`).
pub fn load_glucose_csv(path: &Path) -> eyre::Result<Vec<GlucoseRow>> {
    let mut rdr = open_csv(path, &["timestamp_ms", "mmol"])?;
    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<GlucoseRow>().enumerate() {
        match rec {
            Ok(row) if row.mmol.is_finite() => rows.push(row),
            Ok(_) => eyre::bail!("non-finite glucose value in CSV row {}", idx + 2),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }
    ensure_increasing(rows.iter().map(|r| r.timestamp_ms))?;
    Ok(rows)
}

/// Load a replay trace (`timestamp_ms,mmol,iob_u`).
pub fn load_trace_csv(path: &Path) -> eyre::Result<Vec<TraceRow>> {
    let mut rdr = open_csv(path, &["timestamp_ms", "mmol", "iob_u"])?;
    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<TraceRow>().enumerate() {
        match rec {
            Ok(row) if row.mmol.is_finite() && row.iob_u.is_finite() => rows.push(row),
            Ok(_) => eyre::bail!("non-finite value in CSV row {}", idx + 2),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }
    ensure_increasing(rows.iter().map(|r| r.timestamp_ms))?;
    Ok(rows)
}

fn finite(name: &str, v: f64) -> eyre::Result<()> {
    if !v.is_finite() {
        eyre::bail!("{name} must be finite");
    }
    Ok(())
}

fn positive(name: &str, v: f64) -> eyre::Result<()> {
    if !(v.is_finite() && v > 0.0) {
        eyre::bail!("{name} must be > 0");
    }
    Ok(())
}

fn unit_interval(name: &str, v: f64) -> eyre::Result<()> {
    if !(0.0..=1.0).contains(&v) {
        eyre::bail!("{name} must be in [0.0, 1.0]");
    }
    Ok(())
}

fn ordered(lo_name: &str, lo: f64, hi_name: &str, hi: f64) -> eyre::Result<()> {
    if lo > hi {
        eyre::bail!("{lo_name} must be <= {hi_name}");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Profile
        let p = &self.profile;
        positive("profile.target_mmol", p.target_mmol)?;
        positive("profile.max_iob_u", p.max_iob_u)?;
        positive("profile.isf_mmol_per_u", p.isf_mmol_per_u)?;
        if p.night_start_hour > 23 || p.night_end_hour > 23 {
            eyre::bail!("profile.night_*_hour must be in 0..=23");
        }
        positive("profile.gain_day", p.gain_day)?;
        positive("profile.gain_night", p.gain_night)?;
        positive("profile.max_single_dose_day_u", p.max_single_dose_day_u)?;
        positive("profile.max_single_dose_night_u", p.max_single_dose_night_u)?;
        if p.max_single_dose_day_u > 10.0 || p.max_single_dose_night_u > 10.0 {
            eyre::bail!("profile.max_single_dose_*_u is unreasonably large (>10 U per cycle)");
        }

        // Energy
        let e = &self.energy;
        for (name, v) in [
            ("energy.k_delta", e.k_delta),
            ("energy.k_slope", e.k_slope),
            ("energy.k_accel", e.k_accel),
            ("energy.stagnation_energy_boost", e.stagnation_energy_boost),
            ("energy.stagnation_delta_min", e.stagnation_delta_min),
        ] {
            finite(name, v)?;
        }
        unit_interval("energy.min_consistency", e.min_consistency)?;
        positive("energy.consistency_exp", e.consistency_exp)?;
        ordered(
            "energy.stagnation_slope_max_neg",
            e.stagnation_slope_max_neg,
            "energy.stagnation_slope_max_pos",
            e.stagnation_slope_max_pos,
        )?;
        if !(e.stagnation_accel_max_abs >= 0.0) {
            eyre::bail!("energy.stagnation_accel_max_abs must be >= 0");
        }

        // IOB damping
        let i = &self.iob;
        if !(i.damping_start >= 0.0 && i.damping_start < i.damping_max && i.damping_max <= 2.0) {
            eyre::bail!("iob.damping_start must be >= 0 and < iob.damping_max (<= 2.0)");
        }
        unit_interval("iob.min_factor", i.min_factor)?;
        positive("iob.primary_power", i.primary_power)?;
        positive("iob.commit_power", i.commit_power)?;
        if !(i.peak_boost >= 0.0 && i.peak_boost <= 1.0) {
            eyre::bail!("iob.peak_boost must be in [0.0, 1.0]");
        }
        positive("iob.peak_boost_span_mmol", i.peak_boost_span_mmol)?;

        // Meal
        let m = &self.meal;
        finite("meal.slope_min", m.slope_min)?;
        finite("meal.accel_min", m.accel_min)?;
        finite("meal.delta_min", m.delta_min)?;
        positive("meal.slope_span", m.slope_span)?;
        positive("meal.accel_span", m.accel_span)?;
        positive("meal.delta_span", m.delta_span)?;
        unit_interval("meal.uncertain_threshold", m.uncertain_threshold)?;
        unit_interval("meal.confirm_threshold", m.confirm_threshold)?;
        if m.uncertain_threshold >= m.confirm_threshold {
            eyre::bail!("meal.uncertain_threshold must be < meal.confirm_threshold");
        }

        // Peak
        let k = &self.peak;
        positive("peak.horizon_hours", k.horizon_hours)?;
        if k.horizon_hours > 3.0 {
            eyre::bail!("peak.horizon_hours is unreasonably large (>3h)");
        }
        unit_interval("peak.memory_fraction", k.memory_fraction)?;
        positive("peak.momentum_half_life_min", k.momentum_half_life_min)?;
        finite("peak.momentum_gain", k.momentum_gain)?;
        finite("peak.rise_carry_gain", k.rise_carry_gain)?;
        if k.momentum_gain < 0.0 || k.rise_carry_gain < 0.0 {
            eyre::bail!("peak.momentum_gain and peak.rise_carry_gain must be >= 0");
        }
        positive("peak.max_prediction_mmol", k.max_prediction_mmol)?;
        positive("peak.watch_threshold_mmol", k.watch_threshold_mmol)?;
        unit_interval("peak.min_consistency", k.min_consistency)?;
        finite("peak.min_slope", k.min_slope)?;
        finite("peak.min_momentum", k.min_momentum)?;
        if k.confirm_cycles == 0 {
            eyre::bail!("peak.confirm_cycles must be >= 1");
        }
        finite("peak.exit_accel", k.exit_accel)?;
        finite("peak.exit_slope", k.exit_slope)?;

        // Holds
        let h = &self.holds;
        finite("holds.correction_hold_slope_max", h.correction_hold_slope_max)?;
        finite("holds.correction_hold_accel_max", h.correction_hold_accel_max)?;
        finite("holds.correction_hold_delta_max", h.correction_hold_delta_max)?;
        if !(h.small_correction_max_u >= 0.0) {
            eyre::bail!("holds.small_correction_max_u must be >= 0");
        }
        if !(h.small_correction_cooldown_min >= 0.0) {
            eyre::bail!("holds.small_correction_cooldown_min must be >= 0");
        }

        // Commit
        let c = &self.commit;
        if !(c.cooldown_min >= 0.0) {
            eyre::bail!("commit.cooldown_min must be >= 0");
        }
        unit_interval("commit.uncertain_min", c.uncertain_min)?;
        unit_interval("commit.uncertain_max", c.uncertain_max)?;
        unit_interval("commit.confirm_min", c.confirm_min)?;
        unit_interval("commit.confirm_max", c.confirm_max)?;
        ordered(
            "commit.uncertain_min",
            c.uncertain_min,
            "commit.uncertain_max",
            c.uncertain_max,
        )?;
        ordered(
            "commit.confirm_min",
            c.confirm_min,
            "commit.confirm_max",
            c.confirm_max,
        )?;
        if !(c.min_dose_u >= 0.0) {
            eyre::bail!("commit.min_dose_u must be >= 0");
        }
        if !(c.absorption_window_min >= 0.0) {
            eyre::bail!("commit.absorption_window_min must be >= 0");
        }
        unit_interval("commit.absorption_dose_factor", c.absorption_dose_factor)?;
        finite("commit.peak_slope_threshold", c.peak_slope_threshold)?;
        finite("commit.peak_accel_threshold", c.peak_accel_threshold)?;

        // Re-entry
        let r = &self.reentry;
        if !(r.min_minutes_since_commit >= 0.0 && r.cooldown_min >= 0.0) {
            eyre::bail!("reentry minute thresholds must be >= 0");
        }
        finite("reentry.slope_min", r.slope_min)?;
        finite("reentry.accel_min", r.accel_min)?;
        finite("reentry.delta_min", r.delta_min)?;
        unit_interval("reentry.min_consistency", r.min_consistency)?;

        // Safety
        positive("safety.hypo_threshold_mmol", self.safety.hypo_threshold_mmol)?;

        // Delivery
        let d = &self.delivery;
        positive("delivery.cycle_minutes", d.cycle_minutes)?;
        if d.cycle_minutes > 60.0 {
            eyre::bail!("delivery.cycle_minutes is unreasonably large (>60)");
        }
        positive("delivery.max_basal_rate_u_per_h", d.max_basal_rate_u_per_h)?;
        positive("delivery.basal_step_u_per_h", d.basal_step_u_per_h)?;
        positive("delivery.bolus_step_u", d.bolus_step_u)?;
        positive("delivery.min_bolus_u", d.min_bolus_u)?;
        if !(d.small_dose_threshold_u >= 0.0) {
            eyre::bail!("delivery.small_dose_threshold_u must be >= 0");
        }
        if !(0.0..=100.0).contains(&d.hybrid_percent) {
            eyre::bail!("delivery.hybrid_percent must be in [0, 100]");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}

#[cfg(test)]
mod night_window_tests {
    use super::Profile;

    const HOUR: i64 = 3_600_000;

    #[test]
    fn wraps_past_midnight() {
        let p = Profile::default(); // 23 -> 7
        assert!(p.is_night_at(23 * HOUR));
        assert!(p.is_night_at(2 * HOUR));
        assert!(!p.is_night_at(7 * HOUR));
        assert!(!p.is_night_at(12 * HOUR));
    }

    #[test]
    fn same_start_and_end_disables_night() {
        let p = Profile {
            night_start_hour: 4,
            night_end_hour: 4,
            ..Profile::default()
        };
        assert!(!p.is_night_at(4 * HOUR));
    }
}
