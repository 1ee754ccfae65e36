//! Seams between the decision engine and the world around it.
//!
//! The engine never talks to a pump, a clock, or an audit file directly; the
//! scheduler wires implementations of these traits in.
pub mod clock;

pub use clock::{Clock, SystemClock};

/// Boxed error type used at every trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Write-only sink for the per-cycle audit row.
///
/// Rows are ordered `(field, value)` pairs; the field set is stable across
/// cycles so a sink can treat the first row as a header.
pub trait AuditSink {
    fn write_row(&mut self, row: &[(&'static str, String)]) -> Result<(), BoxError>;
}

/// Insulin pump as seen by the scheduler that carries out an advice.
pub trait Pump {
    /// Deliver an immediate bolus of `units`.
    fn deliver_bolus(&mut self, units: f64) -> Result<(), BoxError>;
    /// Set a temporary basal rate (U/h) for `minutes`. A rate of 0 cancels a
    /// running temp basal.
    fn set_temp_basal(&mut self, rate_u_per_h: f64, minutes: u32) -> Result<(), BoxError>;
}
