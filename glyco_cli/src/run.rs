//! Command bodies: one-shot advise, trace replay and self-check.

use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use glyco_config::Config;
use glyco_core::{Advice, CycleInput, Engine, EngineError, GlucoseSample, Tunables};
use glyco_pump::SimulatedPump;
use glyco_traits::{Clock, Pump, SystemClock};
use serde_json::json;

use crate::audit_file::JsonlAudit;

/// Glucose history handed to the engine each cycle, in minutes before now.
pub const HISTORY_WINDOW_MIN: i64 = 45;

const MS_PER_MINUTE: i64 = 60_000;

/// A history whose newest sample is older than this is reported as stale.
const STALE_AFTER_MIN: f64 = 15.0;

/// Load the config at `path`, or the built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => {
            Config::from_path(p).wrap_err_with(|| format!("invalid configuration in {p:?}"))
        }
        None => Ok(Config::default()),
    }
}

fn window_start(history: &[GlucoseSample], now_ms: i64) -> usize {
    let from = now_ms.saturating_sub(HISTORY_WINDOW_MIN * MS_PER_MINUTE);
    history.partition_point(|s| s.timestamp_ms < from)
}

/// Age of the newest sample, if it is past the stale threshold.
fn stale_minutes(clock: &dyn Clock, newest_ms: i64) -> Option<f64> {
    let age = clock.minutes_since(newest_ms);
    (age > STALE_AFTER_MIN).then_some(age)
}

fn cycle_input<'a>(
    cfg: &Config,
    now_ms: i64,
    bg_now: f64,
    history: &'a [GlucoseSample],
    iob_u: f64,
    night: bool,
) -> CycleInput<'a> {
    CycleInput {
        now_ms,
        bg_now,
        history,
        iob_u,
        max_iob_u: cfg.profile.max_iob_u,
        isf_mmol_per_u: cfg.profile.isf_mmol_per_u,
        target_mmol: cfg.profile.target_mmol,
        night,
    }
}

fn build_engine(cfg: &Config, audit: Option<&Path>) -> Result<Engine> {
    let mut builder = Engine::builder().tunables(Tunables::from(cfg));
    if let Some(path) = audit {
        builder = builder.audit_sink(JsonlAudit::open(path)?);
    }
    builder.build()
}

fn cycle_minutes(cfg: &Config) -> u32 {
    cfg.delivery.cycle_minutes.floor().max(1.0) as u32
}

fn advice_json(now_ms: i64, night: bool, a: &Advice) -> serde_json::Value {
    json!({
        "now_ms": now_ms,
        "night": night,
        "bolus_u": a.bolus_u,
        "basal_rate_u_per_h": a.basal_rate_u_per_h,
        "should_deliver": a.should_deliver,
        "diagnostic": a.diagnostic,
    })
}

fn advice_line(a: &Advice, minutes: u32) -> String {
    if !a.should_deliver {
        return format!("no delivery; temp basal cancelled ({})", a.diagnostic);
    }
    format!(
        "bolus {:.2} U, temp basal {:.2} U/h for {minutes} min ({})",
        a.bolus_u, a.basal_rate_u_per_h, a.diagnostic
    )
}

pub fn run_advise(
    cfg: &Config,
    history: &Path,
    iob_u: f64,
    now_ms: Option<i64>,
    force_night: bool,
    json: bool,
) -> Result<()> {
    if !iob_u.is_finite() {
        return Err(eyre::Report::new(EngineError::InvalidInput(format!(
            "--iob must be finite, got {iob_u}"
        ))));
    }
    let samples: Vec<GlucoseSample> = glyco_config::load_glucose_csv(history)
        .wrap_err_with(|| format!("unreadable glucose data in {history:?}"))?
        .into_iter()
        .map(GlucoseSample::from)
        .collect();
    let Some(last) = samples.last().copied() else {
        eyre::bail!("unreadable glucose data in {history:?}: no samples");
    };
    let now = match now_ms {
        Some(t) => t,
        None => {
            if let Some(age) = stale_minutes(&SystemClock::new(), last.timestamp_ms) {
                tracing::warn!(
                    age_min = age,
                    "newest glucose sample is stale; deciding at its timestamp"
                );
            }
            last.timestamp_ms
        }
    };
    let night = force_night || cfg.profile.is_night_at(now);
    let visible = &samples[window_start(&samples, now)..];
    let visible = &visible[..visible.partition_point(|s| s.timestamp_ms <= now)];

    let audit = cfg.audit.file.as_deref().map(Path::new);
    let mut engine = build_engine(cfg, audit)?;
    let bg_now = visible.last().map_or(last.mmol, |s| s.mmol);
    let advice = engine.advise(&cycle_input(cfg, now, bg_now, visible, iob_u, night));
    tracing::info!(
        now_ms = now,
        samples = visible.len(),
        bolus_u = advice.bolus_u,
        basal_rate_u_per_h = advice.basal_rate_u_per_h,
        "advise"
    );

    if json {
        println!("{}", advice_json(now, night, &advice));
    } else {
        println!("{}", advice_line(&advice, cycle_minutes(cfg)));
    }
    Ok(())
}

/// Carry out one advice. Returns the pump's complaint, if any.
fn deliver(pump: &mut dyn Pump, advice: &Advice, minutes: u32) -> Option<String> {
    if advice.bolus_u > 0.0
        && let Err(e) = pump.deliver_bolus(advice.bolus_u)
    {
        return Some(e.to_string());
    }
    pump.set_temp_basal(advice.basal_rate_u_per_h, minutes)
        .err()
        .map(|e| e.to_string())
}

#[derive(Debug, Default)]
struct ReplaySummary {
    cycles: usize,
    deliveries: usize,
    fail_safe: usize,
    pump_errors: usize,
}

pub fn run_replay(cfg: &Config, trace: &Path, audit: Option<PathBuf>, json: bool) -> Result<()> {
    let rows = glyco_config::load_trace_csv(trace)
        .wrap_err_with(|| format!("unreadable glucose data in {trace:?}"))?;
    let audit = audit.or_else(|| cfg.audit.file.as_ref().map(PathBuf::from));
    let mut engine = build_engine(cfg, audit.as_deref())?;
    let mut pump = SimulatedPump::new(cfg.delivery.max_basal_rate_u_per_h);
    let minutes = cycle_minutes(cfg);

    let mut history: Vec<GlucoseSample> = Vec::with_capacity(rows.len());
    let mut summary = ReplaySummary::default();
    for row in &rows {
        history.push(GlucoseSample::new(row.timestamp_ms, row.mmol));
        let night = cfg.profile.is_night_at(row.timestamp_ms);
        let window = &history[window_start(&history, row.timestamp_ms)..];
        let input = cycle_input(cfg, row.timestamp_ms, row.mmol, window, row.iob_u, night);
        let advice = engine.advise(&input);
        let pump_error = deliver(&mut pump, &advice, minutes);

        summary.cycles += 1;
        if advice.should_deliver {
            summary.deliveries += 1;
        }
        if advice.diagnostic.starts_with("fail-safe") {
            summary.fail_safe += 1;
        }
        if let Some(e) = &pump_error {
            summary.pump_errors += 1;
            tracing::warn!(now_ms = row.timestamp_ms, error = %e, "pump rejected command");
        }

        if json {
            let mut line = advice_json(row.timestamp_ms, night, &advice);
            line["bg_mmol"] = json!(row.mmol);
            line["iob_u"] = json!(row.iob_u);
            line["pump_error"] = json!(pump_error);
            println!("{line}");
        } else {
            let line = format!(
                "{} bg={:.1} iob={:.2} -> {}",
                row.timestamp_ms,
                row.mmol,
                row.iob_u,
                advice_line(&advice, minutes)
            );
            match pump_error {
                Some(e) => println!("{line} [pump: {e}]"),
                None => println!("{line}"),
            }
        }
    }

    tracing::info!(
        cycles = summary.cycles,
        delivered_u = pump.delivered_total_u(),
        "replay finished"
    );
    if json {
        println!(
            "{}",
            json!({
                "summary": {
                    "cycles": summary.cycles,
                    "deliveries": summary.deliveries,
                    "fail_safe": summary.fail_safe,
                    "pump_errors": summary.pump_errors,
                    "boluses": pump.bolus_count(),
                    "bolus_total_u": pump.bolus_total_u(),
                    "basal_total_u": pump.basal_total_u(),
                    "delivered_total_u": pump.delivered_total_u(),
                }
            })
        );
    } else {
        println!(
            "replayed {} cycles: {} deliveries, {} fail-safe, {} pump errors; bolus {:.2} U ({} boluses), basal {:.2} U, total {:.2} U",
            summary.cycles,
            summary.deliveries,
            summary.fail_safe,
            summary.pump_errors,
            pump.bolus_total_u(),
            pump.bolus_count(),
            pump.basal_total_u(),
            pump.delivered_total_u()
        );
    }
    Ok(())
}

pub fn run_self_check(cfg: &Config, source: Option<&Path>, json: bool) -> Result<()> {
    cfg.validate().wrap_err("invalid configuration")?;
    let engine = build_engine(cfg, None)?;
    let t = engine.tunables();
    let source = source.map_or_else(|| "defaults".to_string(), |p| p.display().to_string());
    if json {
        println!(
            "{}",
            json!({
                "status": "ok",
                "config": source,
                "cycle_minutes": t.delivery.cycle_minutes,
                "max_basal_rate_u_per_h": t.delivery.max_basal_rate_u_per_h,
                "max_single_dose_day_u": t.day_night.max_single_dose_day_u,
                "max_single_dose_night_u": t.day_night.max_single_dose_night_u,
            })
        );
    } else {
        println!(
            "OK: config {source} valid (cycle {} min, max basal {:.2} U/h, dose cap {:.2}/{:.2} U day/night)",
            t.delivery.cycle_minutes,
            t.delivery.max_basal_rate_u_per_h,
            t.day_night.max_single_dose_day_u,
            t.day_night.max_single_dose_night_u
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: i64) -> Vec<GlucoseSample> {
        (0..n)
            .map(|i| GlucoseSample::new(i * 5 * MS_PER_MINUTE, 6.0))
            .collect()
    }

    #[test]
    fn window_keeps_last_45_minutes() {
        let h = series(20);
        let now = 19 * 5 * MS_PER_MINUTE;
        let start = window_start(&h, now);
        assert_eq!(h.len() - start, 10);
        assert_eq!(h[start].timestamp_ms, now - 45 * MS_PER_MINUTE);
    }

    struct FixedClock(i64);

    impl Clock for FixedClock {
        fn now_ms(&self) -> i64 {
            self.0
        }
    }

    #[test]
    fn stale_history_is_flagged() {
        let clock = FixedClock(60 * MS_PER_MINUTE);
        assert_eq!(stale_minutes(&clock, 50 * MS_PER_MINUTE), None);
        assert_eq!(stale_minutes(&clock, 30 * MS_PER_MINUTE), Some(30.0));
        assert_eq!(stale_minutes(&clock, 90 * MS_PER_MINUTE), None);
    }

    #[test]
    fn zero_advice_cancels_basal_without_bolus() {
        let mut pump = SimulatedPump::new(15.0);
        let err = deliver(&mut pump, &Advice::zero("test"), 5);
        assert!(err.is_none());
        assert_eq!(pump.bolus_count(), 0);
        assert!(pump.temp_basal().is_none());
    }

    #[test]
    fn suspended_pump_reports_error() {
        let mut pump = SimulatedPump::new(15.0);
        pump.suspend();
        let err = deliver(&mut pump, &Advice::new(0.2, 1.0, String::new()), 5);
        assert!(err.is_some());
    }

    #[test]
    fn default_config_builds_engine() {
        let cfg = Config::default();
        let engine = build_engine(&cfg, None).unwrap();
        assert_eq!(engine.tunables().delivery.cycle_minutes, 5.0);
        assert_eq!(cycle_minutes(&cfg), 5);
    }
}
