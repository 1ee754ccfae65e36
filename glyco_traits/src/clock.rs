use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock abstraction; glucose samples are stamped in Unix milliseconds,
/// so the engine's notion of "now" must come from the same time base.
pub trait Clock {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;

    /// Minutes elapsed since `earlier_ms`, saturating at 0 when `earlier_ms`
    /// lies in the future.
    fn minutes_since(&self, earlier_ms: i64) -> f64 {
        (self.now_ms().saturating_sub(earlier_ms)).max(0) as f64 / 60_000.0
    }
}

/// Real-time clock backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}
