#![allow(dead_code)]

use glyco_core::{CycleInput, GlucoseSample};

pub const MIN: i64 = 60_000;

/// Six samples 5 minutes apart whose pairwise slopes climb
/// 1.2, 1.6, 2.0, 2.4, 2.8 mmol/L/h, ending at `end_bg` at `end_ms`.
/// Trend: slope 2.0, acceleration 0.4, consistency ~0.904.
pub fn rising_history(end_ms: i64, end_bg: f64) -> Vec<GlucoseSample> {
    let slopes = [1.2, 1.6, 2.0, 2.4, 2.8];
    let mut bg = end_bg;
    let mut out = vec![GlucoseSample::new(end_ms, end_bg)];
    for (i, s) in slopes.iter().rev().enumerate() {
        bg -= s / 12.0;
        out.push(GlucoseSample::new(end_ms - (i as i64 + 1) * 5 * MIN, bg));
    }
    out.reverse();
    out
}

pub fn flat_history(end_ms: i64, bg: f64, n: usize) -> Vec<GlucoseSample> {
    (0..n)
        .map(|i| GlucoseSample::new(end_ms - (n - 1 - i) as i64 * 5 * MIN, bg))
        .collect()
}

pub fn input(now_ms: i64, history: &[GlucoseSample], iob_u: f64) -> CycleInput<'_> {
    CycleInput {
        now_ms,
        bg_now: history.last().map_or(5.5, |s| s.mmol),
        history,
        iob_u,
        max_iob_u: 6.0,
        isf_mmol_per_u: 2.5,
        target_mmol: 5.5,
        night: false,
    }
}
