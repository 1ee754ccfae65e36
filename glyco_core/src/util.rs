//! Numeric shaping helpers shared by every stage of the pipeline.

/// Milliseconds in one minute.
pub const MS_PER_MINUTE: f64 = 60_000.0;
/// Milliseconds in one hour.
pub const MS_PER_HOUR: f64 = 3_600_000.0;

/// Clamp to `[0, 1]`; NaN maps to 0.
#[inline]
pub fn clamp01(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

/// Hermite smoothstep of `x` clamped to `[0, 1]`.
#[inline]
pub fn smoothstep(x: f64) -> f64 {
    let t = clamp01(x);
    t * t * (3.0 - 2.0 * t)
}

/// 0 at `start`, 1 at `start + span`, linear in between.
/// A non-positive span degenerates to a step at `start`.
#[inline]
pub fn linear_ramp(x: f64, start: f64, span: f64) -> f64 {
    if span > 0.0 {
        clamp01((x - start) / span)
    } else if x >= start {
        1.0
    } else {
        0.0
    }
}

/// `linear_ramp` passed through `smoothstep`.
#[inline]
pub fn smooth_ramp(x: f64, start: f64, span: f64) -> f64 {
    smoothstep(linear_ramp(x, start, span))
}

/// Linear interpolation with `t` clamped to `[0, 1]`.
#[inline]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * clamp01(t)
}

/// Minutes from `earlier_ms` to `later_ms`, floored at 0.
#[inline]
pub fn minutes_between(earlier_ms: i64, later_ms: i64) -> f64 {
    (later_ms.saturating_sub(earlier_ms)).max(0) as f64 / MS_PER_MINUTE
}

/// Minutes elapsed since an optional event; `None` means "never", i.e. infinitely long ago.
#[inline]
pub fn minutes_since(event_ms: Option<i64>, now_ms: i64) -> f64 {
    event_ms.map_or(f64::INFINITY, |t| minutes_between(t, now_ms))
}

/// Round `x` down to a multiple of `step`.
/// - Non-positive or non-finite `x` and `step` yield 0.
/// - A 1e-9 tolerance absorbs representation error (0.15 / 0.05 = 2.999…).
#[inline]
pub fn floor_to_step(x: f64, step: f64) -> f64 {
    if !(x.is_finite() && x > 0.0 && step.is_finite() && step > 0.0) {
        return 0.0;
    }
    ((x / step) + 1e-9).floor() * step
}
