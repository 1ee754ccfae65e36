//! Plain data crossing the engine boundary.

/// One smoothed glucose reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlucoseSample {
    /// Unix milliseconds.
    pub timestamp_ms: i64,
    /// Glucose concentration (mmol/L).
    pub mmol: f64,
}

impl GlucoseSample {
    pub fn new(timestamp_ms: i64, mmol: f64) -> Self {
        Self { timestamp_ms, mmol }
    }
}

impl From<glyco_config::GlucoseRow> for GlucoseSample {
    fn from(r: glyco_config::GlucoseRow) -> Self {
        Self::new(r.timestamp_ms, r.mmol)
    }
}

/// Everything the scheduler supplies for one control cycle, apart from the
/// configuration snapshot.
#[derive(Debug, Clone, Copy)]
pub struct CycleInput<'a> {
    /// Decision time (Unix ms); all cooldowns are measured against it.
    pub now_ms: i64,
    /// Current glucose (mmol/L).
    pub bg_now: f64,
    /// Pre-smoothed glucose history, ordered by time.
    pub history: &'a [GlucoseSample],
    /// Current insulin-on-board (U).
    pub iob_u: f64,
    /// Maximum insulin-on-board (U).
    pub max_iob_u: f64,
    /// Effective insulin sensitivity (mmol/L per U).
    pub isf_mmol_per_u: f64,
    /// Target glucose (mmol/L).
    pub target_mmol: f64,
    pub night: bool,
}

/// Output of a decision cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Advice {
    pub bolus_u: f64,
    /// Temp basal rate (U/h); an explicit 0 cancels a running temp basal.
    pub basal_rate_u_per_h: f64,
    /// True iff `bolus_u >= 0.05` or `basal_rate_u_per_h > 0`.
    pub should_deliver: bool,
    pub diagnostic: String,
}

/// Smallest bolus that counts as a delivery.
pub const DELIVER_BOLUS_MIN_U: f64 = 0.05;

impl Advice {
    pub fn new(bolus_u: f64, basal_rate_u_per_h: f64, diagnostic: String) -> Self {
        Self {
            bolus_u,
            basal_rate_u_per_h,
            should_deliver: bolus_u >= DELIVER_BOLUS_MIN_U || basal_rate_u_per_h > 0.0,
            diagnostic,
        }
    }

    /// Zero dose with an explicit basal cancel.
    pub fn zero(diagnostic: impl Into<String>) -> Self {
        Self::new(0.0, 0.0, diagnostic.into())
    }
}

/// One entry of the delivery history ring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryRecord {
    pub timestamp_ms: i64,
    pub delivered_u: f64,
}
